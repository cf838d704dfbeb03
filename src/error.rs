//! Error types for the inbox agent.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Flat-file storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Email id {id:?} is not numeric")]
    InvalidEmailId { id: String },

    #[error("Email not found: {id}")]
    EmailNotFound { id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited")]
    RateLimited { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ingestion pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to load inbox: {0}")]
    Load(#[source] StoreError),

    #[error("Failed to persist annotations: {0}")]
    Persist(#[source] StoreError),
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
