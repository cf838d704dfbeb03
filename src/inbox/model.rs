//! Email, annotation and prompt types.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Categories for which action items are extracted and kept.
pub const ACTIONABLE_CATEGORIES: &[&str] = &["Important", "To-Do"];

/// Whether a category carries action items.
pub fn is_actionable(category: &str) -> bool {
    ACTIONABLE_CATEGORIES.contains(&category)
}

/// A task pulled out of an email body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub task: String,
    #[serde(default)]
    pub deadline: Option<String>,
}

impl ActionItem {
    pub fn new(task: impl Into<String>, deadline: Option<&str>) -> Self {
        Self {
            task: task.into(),
            deadline: deadline.map(str::to_string),
        }
    }
}

/// An immutable record from the raw inbox source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEmail {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

/// Derived, mutable data layered onto a raw email. Keyed by email id on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub draft: Option<String>,
}

/// The merged view of a raw email and its annotation.
///
/// Never persisted as a whole: it is re-derived on every load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub category: Option<String>,
    pub action_items: Vec<ActionItem>,
    pub summary: Option<String>,
    pub draft: Option<String>,
}

impl Email {
    /// Build an email with default (empty) annotations.
    pub fn from_raw(raw: RawEmail) -> Self {
        Self {
            id: raw.id,
            sender: raw.sender,
            subject: raw.subject,
            body: raw.body,
            timestamp: raw.timestamp,
            read: raw.read,
            category: None,
            action_items: Vec::new(),
            summary: None,
            draft: None,
        }
    }

    /// Overlay a stored annotation onto this email.
    pub fn apply_annotation(&mut self, record: AnnotationRecord) {
        self.category = record.category;
        self.action_items = record.action_items;
        self.summary = record.summary;
        self.draft = record.draft;
    }

    /// The annotation part of this email, as persisted.
    pub fn annotation(&self) -> AnnotationRecord {
        AnnotationRecord {
            category: self.category.clone(),
            action_items: self.action_items.clone(),
            summary: self.summary.clone(),
            draft: self.draft.clone(),
        }
    }

    /// Whether this email still needs categorization.
    pub fn needs_processing(&self) -> bool {
        self.category.as_deref().is_none_or(str::is_empty)
    }

    /// Whether the category is actionable.
    pub fn is_actionable(&self) -> bool {
        self.category.as_deref().is_some_and(is_actionable)
    }

    /// Numeric ordering key of the id, if the id is numeric.
    pub fn numeric_id(&self) -> Option<NumericId> {
        NumericId::parse(&self.id)
    }
}

/// A decimal integer id of arbitrary length, ordered by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericId {
    negative: bool,
    /// Digits without leading zeros; empty for zero.
    magnitude: String,
}

impl NumericId {
    /// Accepts surrounding whitespace, an optional sign and leading zeros.
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        let (negative, digits) = match id.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, id.strip_prefix('+').unwrap_or(id)),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let magnitude = digits.trim_start_matches('0').to_string();
        Some(Self {
            negative: negative && !magnitude.is_empty(),
            magnitude,
        })
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        self.magnitude
            .len()
            .cmp(&other.magnitude.len())
            .then_with(|| self.magnitude.cmp(&other.magnitude))
    }
}

impl Ord for NumericId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, false) => self.cmp_magnitude(other),
            (true, true) => other.cmp_magnitude(self),
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
        }
    }
}

impl PartialOrd for NumericId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The three prompt templates driving the enrichment client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub categorization_prompt: String,
    pub action_extraction_prompt: String,
    pub auto_reply_prompt: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            categorization_prompt: "Categorize this email into exactly one of: Important, To-Do, \
                                    Work, Newsletter, Spam, General."
                .to_string(),
            action_extraction_prompt: "Extract the tasks from this email. Respond with a JSON \
                                       array of objects with \"task\" and \"deadline\" fields."
                .to_string(),
            auto_reply_prompt: "Draft a short, polite reply to this email.".to_string(),
        }
    }
}

/// Accept RFC 3339 timestamps and naive `YYYY-MM-DDTHH:MM:SS[.f]` (read as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw:?}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ActionItem>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ActionItem>>::deserialize(deserializer)?.unwrap_or_default())
}
