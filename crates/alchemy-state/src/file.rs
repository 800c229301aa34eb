//! Local filesystem state store
//!
//! One JSON document per record, stored at
//! `<root>/<encoded prefix>/<encoded key>.json`. Writes go through a
//! temp file and a rename so a crash never leaves a half-written record
//! behind.

use crate::error::{Result, StateError};
use crate::keys;
use crate::store::StateStore;
use alchemy_core::ResourceRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

const RECORD_EXTENSION: &str = "json";

/// Filesystem-backed state store for single-machine runs
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn prefix_dir(&self, prefix: &str) -> PathBuf {
        self.root.join(keys::prefix_to_path(prefix))
    }

    fn record_path(&self, prefix: &str, key: &str) -> PathBuf {
        // Appended rather than set_extension: encoded segments may
        // themselves contain dots.
        let rel = format!("{}.{}", keys::key_to_path(key), RECORD_EXTENSION);
        self.prefix_dir(prefix).join(rel)
    }

    /// Walk the prefix directory, collecting relative record paths.
    async fn walk(&self, prefix: &str) -> Result<Vec<String>> {
        let base = self.prefix_dir(prefix);
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut pending = vec![(base.clone(), String::new())];
        let mut found = Vec::new();
        while let Some((dir, rel)) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let child_rel = if rel.is_empty() {
                    name.to_string()
                } else {
                    format!("{rel}/{name}")
                };
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), child_rel));
                } else if let Some(stem) = child_rel.strip_suffix(&format!(".{RECORD_EXTENSION}")) {
                    found.push(stem.to_string());
                }
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<ResourceRecord>> {
        let path = self.record_path(prefix, key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = self
            .walk(prefix)
            .await?
            .into_iter()
            .map(|rel| keys::path_to_key(&rel))
            .collect::<Result<Vec<_>>>()?;
        keys.sort();
        Ok(keys)
    }

    async fn set(&self, prefix: &str, key: &str, record: &ResourceRecord) -> Result<()> {
        let path = self.record_path(prefix, key);
        let parent = path
            .parent()
            .ok_or_else(|| StateError::InvalidKey(format!("key '{key}' resolves to no parent")))?;
        fs::create_dir_all(parent).await?;

        let content = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(prefix, key, status = %record.status, "persisted record");
        Ok(())
    }

    async fn delete(&self, prefix: &str, key: &str) -> Result<()> {
        let path = self.record_path(prefix, key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(prefix, key, "deleted record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
