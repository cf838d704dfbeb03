//! Sequential, paced enrichment of un-annotated emails.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::inbox::InboxLoader;
use crate::inbox::model::{Email, PromptConfig};
use crate::llm::{Completion, EnrichmentClient};
use crate::store::{AnnotationStore, PromptStore};

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Wait after each newly processed email, to stay under the backend's
    /// per-minute quota. Applied in mock mode too.
    pub pacing: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(2500),
        }
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Emails categorized in this run.
    pub processed: usize,
    /// Emails whose categorization failed; left uncategorized for the next run.
    pub failed: usize,
    /// Non-actionable emails whose stale action items were cleared.
    pub repaired: usize,
    /// The full updated set, in load order.
    pub emails: Vec<Email>,
}

/// Brings every uncategorized email up to date.
pub struct IngestionPipeline {
    inbox: Arc<InboxLoader>,
    annotations: Arc<AnnotationStore>,
    prompts: Arc<PromptStore>,
    client: Arc<EnrichmentClient>,
    config: PipelineConfig,
    run_lock: Mutex<()>,
}

impl IngestionPipeline {
    pub fn new(
        inbox: Arc<InboxLoader>,
        annotations: Arc<AnnotationStore>,
        prompts: Arc<PromptStore>,
        client: Arc<EnrichmentClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            inbox,
            annotations,
            prompts,
            client,
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// Run one ingestion pass. Overlapping calls wait for each other.
    ///
    /// Nothing is persisted until the whole pass has finished.
    pub async fn run(&self) -> Result<IngestReport, PipelineError> {
        let _guard = self.run_lock.lock().await;

        let mut emails = self.inbox.load_emails().await.map_err(PipelineError::Load)?;
        let prompts = self.prompts.load().await.map_err(PipelineError::Load)?;

        info!(
            total = emails.len(),
            mode = self.client.mode(),
            "Starting ingestion run"
        );

        let mut processed = 0;
        let mut failed = 0;
        let mut repaired = 0;

        for email in emails.iter_mut() {
            if email.needs_processing() {
                if self.enrich(email, &prompts).await {
                    processed += 1;
                } else {
                    failed += 1;
                }
                if !self.config.pacing.is_zero() {
                    tokio::time::sleep(self.config.pacing).await;
                }
            }

            // Holds for every email after a run, including failed ones.
            if !email.is_actionable() && !email.action_items.is_empty() {
                debug!(
                    id = %email.id,
                    category = email.category.as_deref().unwrap_or_default(),
                    "Clearing action items on non-actionable email"
                );
                email.action_items.clear();
                repaired += 1;
            }
        }

        self.annotations
            .save_all(&emails)
            .await
            .map_err(PipelineError::Persist)?;

        info!(processed, failed, repaired, "Ingestion run complete");
        Ok(IngestReport {
            processed,
            failed,
            repaired,
            emails,
        })
    }

    /// Categorize one email and fill its action items. Returns false if
    /// categorization failed, leaving the category unset.
    async fn enrich(&self, email: &mut Email, prompts: &PromptConfig) -> bool {
        let category = match self
            .client
            .categorize(
                &email.sender,
                &email.subject,
                &email.body,
                &prompts.categorization_prompt,
            )
            .await
        {
            Completion::Text(category) if !category.is_empty() => category,
            Completion::Text(_) => {
                warn!(id = %email.id, "Model returned an empty category");
                return false;
            }
            Completion::Failed(failure) => {
                warn!(id = %email.id, %failure, "Categorization failed");
                return false;
            }
        };

        email.category = Some(category);
        email.action_items = if email.is_actionable() {
            self.client
                .extract_action_items(&email.body, &prompts.action_extraction_prompt)
                .await
        } else {
            Vec::new()
        };

        debug!(
            id = %email.id,
            category = email.category.as_deref().unwrap_or_default(),
            action_items = email.action_items.len(),
            "Email categorized"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::inbox::model::{ActionItem, is_actionable};
    use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
    use crate::llm::RetryPolicy;

    struct Fixture {
        _dir: tempfile::TempDir,
        inbox: Arc<InboxLoader>,
        annotations: Arc<AnnotationStore>,
        prompts: Arc<PromptStore>,
    }

    impl Fixture {
        async fn new(emails: &[(&str, &str)]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let raw: Vec<serde_json::Value> = emails
                .iter()
                .map(|(id, body)| {
                    serde_json::json!({
                        "id": id,
                        "sender": "someone@example.com",
                        "subject": format!("Email {id}"),
                        "body": body,
                        "timestamp": "2024-05-01T08:30:00",
                        "read": false,
                    })
                })
                .collect();
            let raw_path = dir.path().join("mock_inbox.json");
            tokio::fs::write(&raw_path, serde_json::to_string(&raw).unwrap())
                .await
                .unwrap();

            let annotations = Arc::new(AnnotationStore::new(dir.path().join("processed_emails.json")));
            let inbox = Arc::new(InboxLoader::new(raw_path, Arc::clone(&annotations)));
            let prompts = Arc::new(PromptStore::new(dir.path().join("default_prompts.json")));
            Self {
                _dir: dir,
                inbox,
                annotations,
                prompts,
            }
        }

        fn pipeline(&self, client: EnrichmentClient) -> IngestionPipeline {
            IngestionPipeline::new(
                Arc::clone(&self.inbox),
                Arc::clone(&self.annotations),
                Arc::clone(&self.prompts),
                Arc::new(client),
                PipelineConfig {
                    pacing: Duration::ZERO,
                },
            )
        }
    }

    /// Provider returning scripted responses; rate-limited once the script runs out.
    struct ScriptedLlm {
        script: StdMutex<VecDeque<Result<String, LlmError>>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(content)) => Ok(CompletionResponse {
                    content,
                    input_tokens: 0,
                    output_tokens: 0,
                    finish_reason: FinishReason::Stop,
                }),
                Some(Err(e)) => Err(e),
                None => Err(LlmError::RateLimited {
                    provider: "scripted".into(),
                }),
            }
        }
    }

    fn scripted(script: Vec<Result<String, LlmError>>) -> EnrichmentClient {
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedLlm {
            script: StdMutex::new(script.into()),
        });
        EnrichmentClient::remote(provider, RetryPolicy::new(2, Duration::from_millis(1)))
    }

    fn find<'a>(emails: &'a [Email], id: &str) -> &'a Email {
        emails.iter().find(|e| e.id == id).unwrap()
    }

    #[tokio::test]
    async fn mock_run_categorizes_everything() {
        let fx = Fixture::new(&[
            ("1", "URGENT: the Q4 report is due"),
            ("2", "Monthly newsletter"),
            ("3", "Team meeting at noon"),
            ("4", "Hello"),
        ])
        .await;

        let report = fx.pipeline(EnrichmentClient::mock()).run().await.unwrap();

        assert_eq!(report.processed, 4);
        assert_eq!(report.failed, 0);
        let ids: Vec<&str> = report.emails.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["4", "3", "2", "1"]);

        let urgent = find(&report.emails, "1");
        assert_eq!(urgent.category.as_deref(), Some("Important"));
        assert_eq!(urgent.action_items, vec![ActionItem::new("Submit Q4 Report", Some("Tomorrow EOD"))]);
        assert_eq!(find(&report.emails, "2").category.as_deref(), Some("Newsletter"));
        assert_eq!(find(&report.emails, "3").category.as_deref(), Some("Work"));
        assert_eq!(find(&report.emails, "4").category.as_deref(), Some("General"));
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let fx = Fixture::new(&[("1", "urgent report"), ("2", "win a prize")]).await;
        let pipeline = fx.pipeline(EnrichmentClient::mock());

        let first = pipeline.run().await.unwrap();
        let stored_after_first = fx.annotations.load().await.unwrap().into_map();

        let second = pipeline.run().await.unwrap();
        let stored_after_second = fx.annotations.load().await.unwrap().into_map();

        assert_eq!(first.processed, 2);
        assert_eq!(second.processed, 0);
        assert_eq!(stored_after_first, stored_after_second);
        assert_eq!(first.emails, second.emails);
    }

    #[tokio::test]
    async fn non_actionable_emails_never_keep_action_items() {
        let fx = Fixture::new(&[("1", "meeting about the report"), ("2", "deadline for report")]).await;

        // Legacy state: a Work email carrying action items.
        let mut stale = fx.inbox.find_email("1").await.unwrap();
        stale.category = Some("Work".into());
        stale.action_items = vec![ActionItem::new("Old task", None)];
        fx.annotations.save_one(&stale).await.unwrap();

        let report = fx.pipeline(EnrichmentClient::mock()).run().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.repaired, 1);
        for email in &report.emails {
            let actionable = email.category.as_deref().is_some_and(is_actionable);
            assert!(actionable || email.action_items.is_empty(), "email {}", email.id);
        }
        let stored = fx.annotations.load().await.unwrap().into_map();
        assert!(stored["1"].action_items.is_empty());
        assert_eq!(stored["2"].action_items.len(), 1);
    }

    #[tokio::test]
    async fn actionable_emails_keep_their_action_items() {
        let fx = Fixture::new(&[("1", "anything")]).await;
        let mut todo = fx.inbox.find_email("1").await.unwrap();
        todo.category = Some("To-Do".into());
        todo.action_items = vec![ActionItem::new("Keep me", Some("Soon"))];
        fx.annotations.save_one(&todo).await.unwrap();

        let report = fx.pipeline(EnrichmentClient::mock()).run().await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.repaired, 0);
        assert_eq!(report.emails[0].action_items, todo.action_items);
    }

    #[tokio::test]
    async fn remote_run_extracts_only_for_actionable() {
        let fx = Fixture::new(&[("1", "first"), ("2", "second")]).await;
        // Load order is id 2 then id 1.
        let client = scripted(vec![
            Ok("Newsletter".into()),
            Ok("To-Do".into()),
            Ok("```json\n[{\"task\": \"Reply\", \"deadline\": \"Friday\"}]\n```".into()),
        ]);

        let report = fx.pipeline(client).run().await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(find(&report.emails, "2").category.as_deref(), Some("Newsletter"));
        assert!(find(&report.emails, "2").action_items.is_empty());
        assert_eq!(
            find(&report.emails, "1").action_items,
            vec![ActionItem::new("Reply", Some("Friday"))]
        );
    }

    #[tokio::test]
    async fn failed_categorization_does_not_stop_the_batch() {
        let fx = Fixture::new(&[("1", "first"), ("2", "second"), ("3", "third")]).await;
        // id 3: backend error; id 2: ok; id 1: rate limited until exhausted.
        let client = scripted(vec![
            Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "500".into(),
            }),
            Ok("Work".into()),
        ]);

        let report = fx.pipeline(client).run().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 2);
        assert!(find(&report.emails, "3").category.is_none());
        assert_eq!(find(&report.emails, "2").category.as_deref(), Some("Work"));
        assert!(find(&report.emails, "1").category.is_none());

        // Failed emails are picked up again on the next run.
        let retry = fx.pipeline(EnrichmentClient::mock()).run().await.unwrap();
        assert_eq!(retry.processed, 2);
    }

    #[tokio::test]
    async fn failed_categorization_still_clears_stale_action_items() {
        let fx = Fixture::new(&[("1", "anything")]).await;
        let mut stale = fx.inbox.find_email("1").await.unwrap();
        stale.action_items = vec![ActionItem::new("stale", None)];
        fx.annotations.save_one(&stale).await.unwrap();

        let client = scripted(vec![Err(LlmError::RequestFailed {
            provider: "scripted".into(),
            reason: "500".into(),
        })]);
        let report = fx.pipeline(client).run().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.repaired, 1);
        let email = find(&report.emails, "1");
        assert!(email.category.is_none());
        assert!(email.action_items.is_empty());

        let stored = fx.annotations.load().await.unwrap().into_map();
        assert!(stored["1"].category.is_none());
        assert!(stored["1"].action_items.is_empty());
    }

    #[tokio::test]
    async fn run_persists_full_set_and_drops_orphans() {
        let fx = Fixture::new(&[("1", "hello")]).await;
        let mut ghost = fx.inbox.find_email("1").await.unwrap();
        ghost.id = "500".into();
        ghost.category = Some("Work".into());
        fx.annotations.save_one(&ghost).await.unwrap();

        fx.pipeline(EnrichmentClient::mock()).run().await.unwrap();

        let stored = fx.annotations.load().await.unwrap().into_map();
        assert_eq!(stored.len(), 1);
        assert!(stored.contains_key("1"));
    }

    #[tokio::test]
    async fn uses_stored_prompts() {
        let fx = Fixture::new(&[("1", "hello")]).await;
        fx.prompts
            .save(&PromptConfig {
                categorization_prompt: "CUSTOM".into(),
                ..PromptConfig::default()
            })
            .await
            .unwrap();

        struct EchoPrompt;

        #[async_trait]
        impl LlmProvider for EchoPrompt {
            fn model_name(&self) -> &str {
                "echo"
            }

            async fn complete(
                &self,
                request: CompletionRequest,
            ) -> Result<CompletionResponse, LlmError> {
                let first_line = request.messages[0].content.lines().next().unwrap_or("").to_string();
                Ok(CompletionResponse {
                    content: first_line,
                    input_tokens: 0,
                    output_tokens: 0,
                    finish_reason: FinishReason::Stop,
                })
            }
        }

        let client = EnrichmentClient::remote(Arc::new(EchoPrompt), RetryPolicy::default());
        let report = fx.pipeline(client).run().await.unwrap();
        assert_eq!(report.emails[0].category.as_deref(), Some("CUSTOM"));
    }

    #[tokio::test]
    async fn pacing_applies_per_processed_email() {
        let fx = Fixture::new(&[("1", "a"), ("2", "b")]).await;
        let pipeline = IngestionPipeline::new(
            Arc::clone(&fx.inbox),
            Arc::clone(&fx.annotations),
            Arc::clone(&fx.prompts),
            Arc::new(EnrichmentClient::mock()),
            PipelineConfig {
                pacing: Duration::from_millis(200),
            },
        );

        let started = std::time::Instant::now();
        pipeline.run().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(400));

        // Nothing left to process: no pacing.
        let started = std::time::Instant::now();
        pipeline.run().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
    }
}
