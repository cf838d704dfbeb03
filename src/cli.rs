//! Command dispatch for the `inbox-agent` binary.

use std::str::FromStr;

use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::error::{ConfigError, Result};

/// What the binary was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    /// Serve the HTTP API until the process exits.
    #[default]
    Serve,
    /// Run one ingestion pass, print the report and exit.
    Ingest,
}

impl FromStr for Command {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "serve" => Ok(Self::Serve),
            "ingest" => Ok(Self::Ingest),
            other => Err(ConfigError::InvalidValue {
                key: "command".into(),
                message: format!("unknown command {other:?} (expected `serve` or `ingest`)"),
            }),
        }
    }
}

/// Run `command` (default `serve`) against `config`.
pub async fn run(config: &AppConfig, command: Option<&str>) -> Result<()> {
    let command = match command {
        Some(name) => name.parse()?,
        None => Command::default(),
    };

    let state = AppState::from_config(config);

    eprintln!("📬 Inbox Agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Data: {}", config.data_dir.display());
    eprintln!("   Enrichment: {} (model: {})", state.client.mode(), config.model);

    match command {
        Command::Serve => {
            eprintln!("   API: http://0.0.0.0:{}/api/emails\n", config.port);
            api::serve(config, state).await?;
        }
        Command::Ingest => {
            let report = state.pipeline.run().await?;
            println!(
                "Processed {} emails ({} failed, {} repaired)",
                report.processed, report.failed, report.repaired
            );
        }
    }

    Ok(())
}
