//! Keyed JSON file store for knowledge bundles.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::KnowledgeBundle;
use crate::{Result, TcmRagError};

/// Key the pipeline stores the latest bundle under.
pub const DEFAULT_KEY: &str = "query_results";

#[derive(Debug, Serialize, Deserialize)]
struct StoredBundle {
    key: String,
    stored_at: DateTime<Utc>,
    bundle: KnowledgeBundle,
}

/// One JSON file per key under a directory.
///
/// Writes go through a temp file and a rename, one writer at a time.
pub struct KnowledgeStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl KnowledgeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Keys outside `[A-Za-z0-9_-]` are hashed.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let stem = if is_plain_key(key) {
            key.to_string()
        } else {
            format!("{:x}", Sha256::digest(key.as_bytes()))
        };
        self.dir.join(format!("{}.json", stem))
    }

    /// Persist `bundle` under `key`, replacing any previous value.
    pub async fn write(&self, key: &str, bundle: &KnowledgeBundle) -> Result<PathBuf> {
        let _guard = self.write_lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            TcmRagError::Store(format!("create {}: {}", self.dir.display(), e))
        })?;

        let envelope = StoredBundle {
            key: key.to_string(),
            stored_at: Utc::now(),
            bundle: bundle.clone(),
        };
        let json = serde_json::to_vec_pretty(&envelope)?;

        let target = self.path_for(key);
        let temp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&temp, &json)
            .await
            .map_err(|e| TcmRagError::Store(format!("write {}: {}", temp.display(), e)))?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(TcmRagError::Store(format!(
                "rename to {}: {}",
                target.display(),
                e
            )));
        }

        log::debug!(
            "Stored {} entities under {:?} at {}",
            bundle.len(),
            key,
            target.display()
        );
        Ok(target)
    }

    /// Load the bundle stored under `key`; `Ok(None)` if nothing is stored.
    pub async fn read(&self, key: &str) -> Result<Option<KnowledgeBundle>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TcmRagError::Store(format!("read {}: {}", path.display(), e)))
            }
        };
        let stored: StoredBundle = serde_json::from_slice(&bytes)
            .map_err(|e| TcmRagError::Store(format!("parse {}: {}", path.display(), e)))?;
        Ok(Some(stored.bundle))
    }
}
