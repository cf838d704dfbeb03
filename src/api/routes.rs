//! REST endpoints: emails, ingestion, prompts, chat and drafts.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::error::{PipelineError, StoreError};
use crate::inbox::InboxLoader;
use crate::inbox::model::{Email, PromptConfig};
use crate::llm::{EnrichmentClient, build_enrichment_client};
use crate::pipeline::{IngestionPipeline, PipelineConfig};
use crate::store::{AnnotationStore, PromptStore};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub inbox: Arc<InboxLoader>,
    pub annotations: Arc<AnnotationStore>,
    pub prompts: Arc<PromptStore>,
    pub client: Arc<EnrichmentClient>,
    pub pipeline: Arc<IngestionPipeline>,
}

impl AppState {
    /// Wire stores, client and pipeline from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_client(config, build_enrichment_client(config))
    }

    /// Same as [`AppState::from_config`] with an explicit enrichment client.
    pub fn with_client(config: &AppConfig, client: EnrichmentClient) -> Self {
        let annotations = Arc::new(AnnotationStore::new(config.annotations_path()));
        let inbox = Arc::new(InboxLoader::new(
            config.raw_inbox_path(),
            Arc::clone(&annotations),
        ));
        let prompts = Arc::new(PromptStore::new(config.prompts_path()));
        let client = Arc::new(client);
        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&inbox),
            Arc::clone(&annotations),
            Arc::clone(&prompts),
            Arc::clone(&client),
            PipelineConfig {
                pacing: config.pacing,
            },
        ));

        Self {
            inbox,
            annotations,
            prompts,
            client,
            pipeline,
        }
    }
}

/// Build the API router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/emails", get(list_emails))
        .route("/api/emails/ingest", post(ingest_emails))
        .route("/api/emails/{id}/draft", post(save_draft))
        .route("/api/prompts", get(get_prompts).post(update_prompts))
        .route("/api/agent/chat", post(agent_chat))
        .route("/api/drafts/generate", post(generate_draft))
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

/// JSON error response: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::EmailNotFound { .. } => Self {
                status: StatusCode::NOT_FOUND,
                message: "Email not found".to_string(),
            },
            other => {
                error!(error = %other, "Store operation failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        error!(error = %e, "Ingestion failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

// ── Request bodies ──────────────────────────────────────────────────────

/// Chat or draft-generation request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub email_id: Option<String>,
}

/// A draft reply saved against an email.
#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    #[serde(default)]
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub to: String,
}

// ── Handlers ────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "mode": state.client.mode(),
    }))
}

async fn list_emails(State(state): State<AppState>) -> Result<Json<Vec<Email>>, ApiError> {
    Ok(Json(state.inbox.load_emails().await?))
}

async fn ingest_emails(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = state.pipeline.run().await?;
    Ok(Json(json!({
        "message": format!("Processed {} emails", report.processed),
        "processed": report.processed,
        "failed": report.failed,
        "emails": report.emails,
    })))
}

async fn get_prompts(State(state): State<AppState>) -> Result<Json<PromptConfig>, ApiError> {
    Ok(Json(state.prompts.load().await?))
}

async fn update_prompts(
    State(state): State<AppState>,
    Json(config): Json<PromptConfig>,
) -> Result<impl IntoResponse, ApiError> {
    state.prompts.save(&config).await?;
    Ok(Json(json!({ "message": "Prompts updated" })))
}

async fn agent_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let prompts = state.prompts.load().await?;
    let context = match request.email_id.as_deref() {
        Some(id) => {
            let email = state.inbox.find_email(id).await?;
            format!("Subject: {}\nBody: {}", email.subject, email.body)
        }
        None => String::new(),
    };

    let response = state
        .client
        .chat(&request.message, &context, &prompts.auto_reply_prompt)
        .await;
    Ok(Json(json!({ "response": response.into_display_text() })))
}

async fn generate_draft(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let prompts = state.prompts.load().await?;
    let context = match request.email_id.as_deref() {
        Some(id) => state.inbox.find_email(id).await?.body,
        None => String::new(),
    };

    let draft = state
        .client
        .draft_reply(&context, &prompts.auto_reply_prompt, &request.message)
        .await;
    Ok(Json(json!({ "draft": draft.into_display_text() })))
}

async fn save_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<DraftRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut email = state.inbox.find_email(&id).await?;
    email.draft = Some(draft.body.clone());
    state.annotations.save_one(&email).await?;

    info!(id = %id, to = %draft.to, subject = %draft.subject, "Draft saved");
    Ok(Json(json!({ "message": "Draft saved" })))
}
