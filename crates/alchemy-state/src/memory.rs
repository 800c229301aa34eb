//! In-memory state store
//!
//! Backs tests and dry runs. Records go through a JSON round-trip on
//! the way in so anything that would not survive real persistence fails
//! here too.

use crate::error::Result;
use crate::keys;
use crate::store::StateStore;
use alchemy_core::ResourceRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    /// Storage-path → serialized record
    entries: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn full_path(prefix: &str, key: &str) -> String {
        format!("{}/{}", keys::prefix_to_path(prefix), keys::key_to_path(key))
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<ResourceRecord>> {
        let entries = self.entries.lock().expect("state mutex poisoned");
        match entries.get(&Self::full_path(prefix, key)) {
            Some(raw) => Ok(Some(serde_json::from_value(raw.clone())?)),
            None => Ok(None),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let base = format!("{}/", keys::prefix_to_path(prefix));
        let entries = self.entries.lock().expect("state mutex poisoned");
        entries
            .keys()
            .filter_map(|path| path.strip_prefix(&base))
            .map(keys::path_to_key)
            .collect()
    }

    async fn set(&self, prefix: &str, key: &str, record: &ResourceRecord) -> Result<()> {
        let raw = serde_json::to_value(record)?;
        let mut entries = self.entries.lock().expect("state mutex poisoned");
        entries.insert(Self::full_path(prefix, key), raw);
        Ok(())
    }

    async fn delete(&self, prefix: &str, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("state mutex poisoned");
        entries.remove(&Self::full_path(prefix, key));
        Ok(())
    }
}
