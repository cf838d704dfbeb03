//! LLM integration.
//!
//! - [`provider`]: the `LlmProvider` trait and request/response types
//! - [`gemini`]: Gemini REST provider
//! - [`retry`]: bounded exponential backoff on rate limiting
//! - [`enrichment`]: the email-facing operations, with an offline mock mode

pub mod enrichment;
pub mod gemini;
pub mod provider;
pub mod retry;

pub use enrichment::{Completion, EnrichmentClient, EnrichmentFailure};
pub use gemini::GeminiProvider;
pub use provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider};
pub use retry::RetryPolicy;

use std::sync::Arc;

use secrecy::SecretString;

use crate::config::AppConfig;
use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = GeminiProvider::new(config.api_key.clone(), &config.model)?;
    tracing::info!("Using Gemini (model: {})", config.model);
    Ok(Arc::new(provider))
}

/// Build the enrichment client for this process.
///
/// No credential, or a provider that fails to build, means mock mode.
pub fn build_enrichment_client(config: &AppConfig) -> EnrichmentClient {
    let Some(api_key) = config.api_key.clone() else {
        tracing::info!("No valid Gemini API key found, using mock mode");
        return EnrichmentClient::mock();
    };

    let llm_config = LlmConfig {
        api_key,
        model: config.model.clone(),
    };
    match create_provider(&llm_config) {
        Ok(provider) => EnrichmentClient::remote(
            provider,
            RetryPolicy::new(config.max_attempts, config.retry_base_delay),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to configure Gemini, falling back to mock mode");
            EnrichmentClient::mock()
        }
    }
}
