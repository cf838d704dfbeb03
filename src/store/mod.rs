//! Flat-file persistence: annotations and prompt templates as JSON.
//!
//! Writes go to a sibling temp file which is then renamed over the target,
//! so a crash mid-write never leaves a truncated file behind.

pub mod annotations;
pub mod prompts;

pub use annotations::{AnnotationLoad, AnnotationMap, AnnotationStore};
pub use prompts::PromptStore;

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use tokio::fs;

use crate::error::StoreError;

/// Read a file, mapping "does not exist" to `None`.
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    fs::write(tmp_path, json).await?;
    fs::rename(tmp_path, path).await?;
    Ok(())
}
