//! Prompt template storage. Updates always replace the whole record.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{read_optional, write_json_atomic};
use crate::error::StoreError;
use crate::inbox::model::PromptConfig;

/// File-backed prompt store. Writes are serialized within this process.
pub struct PromptStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PromptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current prompts, or the built-in defaults when nothing is stored.
    pub async fn load(&self) -> Result<PromptConfig, StoreError> {
        let Some(content) = read_optional(&self.path).await? else {
            debug!(path = %self.path.display(), "No prompt file, using defaults");
            return Ok(PromptConfig::default());
        };

        serde_json::from_str(&content).map_err(|e| StoreError::Parse {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Overwrite the stored prompts wholesale.
    pub async fn save(&self, config: &PromptConfig) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        write_json_atomic(&self.path, config).await?;
        info!(path = %self.path.display(), "Prompts updated");
        Ok(())
    }
}
