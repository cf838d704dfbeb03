//! Inbox loader — joins the read-only raw inbox with the annotation store.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::error::StoreError;
use crate::inbox::model::{Email, RawEmail};
use crate::store::{AnnotationStore, read_optional};

/// Builds the merged email view. Performs no writes.
pub struct InboxLoader {
    raw_path: PathBuf,
    annotations: Arc<AnnotationStore>,
}

impl InboxLoader {
    pub fn new(raw_path: impl Into<PathBuf>, annotations: Arc<AnnotationStore>) -> Self {
        Self {
            raw_path: raw_path.into(),
            annotations,
        }
    }

    /// All emails, newest id first.
    ///
    /// Ordering is by the numeric value of the id, not by timestamp. A
    /// non-numeric id is rejected.
    pub async fn load_emails(&self) -> Result<Vec<Email>, StoreError> {
        let raw = self.load_raw().await?;
        let mut annotations = self.annotations.load().await?.into_map();

        let mut keyed = Vec::with_capacity(raw.len());
        for record in raw {
            let mut email = Email::from_raw(record);
            let key = email.numeric_id().ok_or_else(|| StoreError::InvalidEmailId {
                id: email.id.clone(),
            })?;
            if let Some(annotation) = annotations.remove(&email.id) {
                email.apply_annotation(annotation);
            }
            keyed.push((key, email));
        }

        if !annotations.is_empty() {
            debug!(orphaned = annotations.len(), "Annotations without a raw email");
        }

        keyed.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(keyed.into_iter().map(|(_, email)| email).collect())
    }

    /// Look up one email by id.
    pub async fn find_email(&self, id: &str) -> Result<Email, StoreError> {
        self.load_emails()
            .await?
            .into_iter()
            .find(|email| email.id == id)
            .ok_or_else(|| StoreError::EmailNotFound { id: id.to_string() })
    }

    async fn load_raw(&self) -> Result<Vec<RawEmail>, StoreError> {
        let Some(content) = read_optional(&self.raw_path).await? else {
            debug!(path = %self.raw_path.display(), "No raw inbox file");
            return Ok(Vec::new());
        };
        serde_json::from_str(&content).map_err(|e| StoreError::Parse {
            path: self.raw_path.display().to_string(),
            reason: e.to_string(),
        })
    }
}
