//! Annotation store — the sole writer of derived email data.
//!
//! On disk this is a JSON object keyed by email id. Records for ids that no
//! longer exist in the raw inbox are tolerated and carried along untouched
//! until the next full-replace write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{read_optional, write_json_atomic};
use crate::error::StoreError;
use crate::inbox::model::{AnnotationRecord, Email};

/// Email id → annotation.
pub type AnnotationMap = BTreeMap<String, AnnotationRecord>;

/// Outcome of reading the annotation file.
///
/// Missing and corrupt state both degrade to an empty mapping, but stay
/// distinguishable so callers (and tests) can see which branch was taken.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationLoad {
    /// The file existed and parsed.
    Loaded(AnnotationMap),
    /// No annotation file yet.
    Missing,
    /// The file existed but was not a valid annotation mapping.
    Corrupt { reason: String },
}

impl AnnotationLoad {
    /// The mapping to work with; empty for missing or corrupt state.
    pub fn into_map(self) -> AnnotationMap {
        match self {
            Self::Loaded(map) => map,
            Self::Missing | Self::Corrupt { .. } => AnnotationMap::new(),
        }
    }
}

/// File-backed annotation store.
///
/// Read-modify-write sequences are serialized within this process. There is
/// no protection against other processes writing the same file.
pub struct AnnotationStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AnnotationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full mapping.
    pub async fn load(&self) -> Result<AnnotationLoad, StoreError> {
        let Some(content) = read_optional(&self.path).await? else {
            return Ok(AnnotationLoad::Missing);
        };

        match serde_json::from_str::<AnnotationMap>(&content) {
            Ok(map) => Ok(AnnotationLoad::Loaded(map)),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Annotation file is corrupt, treating as empty"
                );
                Ok(AnnotationLoad::Corrupt {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Upsert one email's annotation, keeping every other record.
    pub async fn save_one(&self, email: &Email) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.load().await?.into_map();
        map.insert(email.id.clone(), email.annotation());
        write_json_atomic(&self.path, &map).await?;

        debug!(id = %email.id, "Saved annotation");
        Ok(())
    }

    /// Replace the whole mapping with the annotations of `emails`.
    ///
    /// Records for ids not in `emails` are dropped: pass the complete set.
    pub async fn save_all(&self, emails: &[Email]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let map: AnnotationMap = emails
            .iter()
            .map(|email| (email.id.clone(), email.annotation()))
            .collect();
        write_json_atomic(&self.path, &map).await?;

        debug!(count = map.len(), "Saved all annotations");
        Ok(())
    }
}
