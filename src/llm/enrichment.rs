//! Enrichment client — categorize, extract action items, draft replies, chat.
//!
//! Two modes:
//! - **Remote**: prompts go to an [`LlmProvider`] through the rate-limit
//!   retry policy.
//! - **Mock**: no network; deterministic heuristics and canned text. Used
//!   when no credential is configured or the provider failed to build.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::provider::{ChatMessage, CompletionRequest, LlmProvider};
use super::retry::{RetryError, RetryPolicy, retry_on_rate_limit};
use crate::inbox::model::ActionItem;

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful email assistant.";
const MOCK_REPLY: &str = "Mock reply: Received your email.";

/// Classification and extraction should not vary between runs.
const DETERMINISTIC_TEMPERATURE: f32 = 0.0;
/// A category is a word or two; cap runaway answers.
const CATEGORY_MAX_TOKENS: u32 = 32;

/// Why an enrichment call produced no content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentFailure {
    /// Every attempt was rate limited.
    RateLimited { attempts: u32 },
    /// Any other provider failure. Not retried.
    Backend { reason: String },
}

impl EnrichmentFailure {
    /// Text shown to users in place of model output.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "Error calling the language model (rate limit exceeded).",
            Self::Backend { .. } => "Error calling the language model.",
        }
    }
}

impl fmt::Display for EnrichmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { attempts } => write!(f, "rate limited after {attempts} attempts"),
            Self::Backend { reason } => write!(f, "backend error: {reason}"),
        }
    }
}

/// Result of a text-producing enrichment call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    Failed(EnrichmentFailure),
}

impl Completion {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Failed(_) => None,
        }
    }

    /// The model text, or the failure placeholder.
    pub fn into_display_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Failed(failure) => failure.placeholder().to_string(),
        }
    }
}

enum Backend {
    Mock,
    Remote {
        provider: Arc<dyn LlmProvider>,
        retry: RetryPolicy,
    },
}

/// Enrichment operations over free text. Construct once and share.
pub struct EnrichmentClient {
    backend: Backend,
}

impl EnrichmentClient {
    /// Offline client with deterministic output.
    pub fn mock() -> Self {
        Self {
            backend: Backend::Mock,
        }
    }

    /// Client backed by a remote provider.
    pub fn remote(provider: Arc<dyn LlmProvider>, retry: RetryPolicy) -> Self {
        Self {
            backend: Backend::Remote { provider, retry },
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self.backend, Backend::Mock)
    }

    /// Short label for logs and health output.
    pub fn mode(&self) -> &'static str {
        match self.backend {
            Backend::Mock => "mock",
            Backend::Remote { .. } => "remote",
        }
    }

    /// Pick a category for an email.
    pub async fn categorize(
        &self,
        sender: &str,
        subject: &str,
        body: &str,
        prompt_template: &str,
    ) -> Completion {
        if self.is_mock() {
            return Completion::Text(mock_category(body).to_string());
        }

        let prompt = format!(
            "{prompt_template}\n\nSender: {sender}\nSubject: {subject}\nBody:\n{body}\n\n\
             Respond ONLY with the category name from the list."
        );
        let request = CompletionRequest::prompt(prompt)
            .with_temperature(DETERMINISTIC_TEMPERATURE)
            .with_max_tokens(CATEGORY_MAX_TOKENS);
        match self.ask(request).await {
            Completion::Text(text) => Completion::Text(text.trim().to_string()),
            failed => failed,
        }
    }

    /// Best-effort task extraction. Any failure yields an empty list.
    pub async fn extract_action_items(&self, body: &str, prompt_template: &str) -> Vec<ActionItem> {
        if self.is_mock() {
            return mock_action_items(body);
        }

        let prompt =
            format!("{prompt_template}\n\nEmail Body:\n{body}\n\nRespond ONLY with valid JSON.");
        let request = CompletionRequest::prompt(prompt).with_temperature(DETERMINISTIC_TEMPERATURE);
        match self.ask(request).await {
            Completion::Text(text) => parse_action_items(&text).unwrap_or_else(|e| {
                warn!(error = %e, "Could not parse action items, using none");
                Vec::new()
            }),
            Completion::Failed(failure) => {
                warn!(%failure, "Action item extraction failed");
                Vec::new()
            }
        }
    }

    /// Draft a reply to `body`, following the user's `instructions`.
    pub async fn draft_reply(&self, body: &str, prompt_template: &str, instructions: &str) -> Completion {
        if self.is_mock() {
            return Completion::Text(MOCK_REPLY.to_string());
        }

        let prompt = format!(
            "{prompt_template}\n\nUser Instructions: {instructions}\n\nEmail Context:\n{body}\n\nDraft:"
        );
        self.ask(CompletionRequest::prompt(prompt)).await
    }

    /// Free-form chat about an optional email context.
    pub async fn chat(&self, message: &str, context: &str, prompt_template: &str) -> Completion {
        if self.is_mock() {
            return Completion::Text(format!("Mock response to: {message}"));
        }

        let mut system = CHAT_SYSTEM_PROMPT.to_string();
        if !prompt_template.trim().is_empty() {
            system.push('\n');
            system.push_str(prompt_template);
        }
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(format!("Context:\n{context}\n\nUser: {message}")),
        ]);
        self.ask(request).await
    }

    /// The shared "ask the model" primitive.
    async fn ask(&self, request: CompletionRequest) -> Completion {
        let Backend::Remote { provider, retry } = &self.backend else {
            return Completion::Failed(EnrichmentFailure::Backend {
                reason: "no remote provider configured".to_string(),
            });
        };

        let result = retry_on_rate_limit(*retry, move || provider.complete(request.clone())).await;
        match result {
            Ok(response) => {
                debug!(
                    model = provider.model_name(),
                    output_tokens = response.output_tokens,
                    "Enrichment call succeeded"
                );
                Completion::Text(response.content)
            }
            Err(RetryError::Exhausted { attempts }) => {
                warn!(model = provider.model_name(), attempts, "Rate limit retries exhausted");
                Completion::Failed(EnrichmentFailure::RateLimited { attempts })
            }
            Err(RetryError::Permanent(e)) => {
                warn!(model = provider.model_name(), error = %e, "Enrichment call failed");
                Completion::Failed(EnrichmentFailure::Backend {
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Keyword heuristic used in mock mode. Order matters.
pub fn mock_category(body: &str) -> &'static str {
    let body = body.to_lowercase();
    if body.contains("urgent") || body.contains("deadline") {
        "Important"
    } else if body.contains("newsletter") {
        "Newsletter"
    } else if body.contains("prize") {
        "Spam"
    } else if body.contains("meeting") {
        "Work"
    } else {
        "General"
    }
}

fn mock_action_items(body: &str) -> Vec<ActionItem> {
    if body.to_lowercase().contains("report") {
        vec![ActionItem::new("Submit Q4 Report", Some("Tomorrow EOD"))]
    } else {
        Vec::new()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActionItemsPayload {
    List(Vec<ActionItem>),
    Wrapped { action_items: Vec<ActionItem> },
}

/// Parse model output into action items, tolerating markdown code fences.
pub fn parse_action_items(text: &str) -> Result<Vec<ActionItem>, serde_json::Error> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let payload: ActionItemsPayload = serde_json::from_str(cleaned.trim())?;
    Ok(match payload {
        ActionItemsPayload::List(items) | ActionItemsPayload::Wrapped { action_items: items } => {
            items
        }
    })
}
