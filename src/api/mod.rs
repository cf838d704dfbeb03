//! HTTP API for the dashboard.

pub mod routes;

pub use routes::{AppState, api_routes};

use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::error::Result;

/// Bind the configured port and serve the API until the process exits.
pub async fn serve(config: &AppConfig, state: AppState) -> Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = api_routes(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "API server started");
    axum::serve(listener, app).await?;
    Ok(())
}
