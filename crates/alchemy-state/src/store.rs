//! State store interface
//!
//! Durable key/value persistence for resource records, scoped under a
//! caller-supplied prefix (the scope path). Backends are interchangeable
//! behind this trait: a local filesystem store for single-machine runs,
//! an in-memory store for tests, and a networked store for shared state.

use crate::error::Result;
use alchemy_core::ResourceRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Durable record storage under a prefix
///
/// Each logical key (`prefix` + `key`) is written by exactly one
/// resource's lifecycle execution at a time per run; backends only need
/// per-key atomicity, not cross-key transactions.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch one record, or `None` if absent.
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<ResourceRecord>>;

    /// Fetch several records; absent keys are simply not in the result.
    async fn get_batch(
        &self,
        prefix: &str,
        keys: &[String],
    ) -> Result<BTreeMap<String, ResourceRecord>> {
        let mut records = BTreeMap::new();
        for key in keys {
            if let Some(record) = self.get(prefix, key).await? {
                records.insert(key.clone(), record);
            }
        }
        Ok(records)
    }

    /// All logical keys under the prefix, recursively, in sorted order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Number of records under the prefix.
    async fn count(&self, prefix: &str) -> Result<usize> {
        Ok(self.list(prefix).await?.len())
    }

    /// Every record under the prefix, keyed by logical key.
    async fn all(&self, prefix: &str) -> Result<BTreeMap<String, ResourceRecord>> {
        let keys = self.list(prefix).await?;
        self.get_batch(prefix, &keys).await
    }

    /// Write one record, creating intermediate containers as needed.
    /// Overwrites atomically per key.
    async fn set(&self, prefix: &str, key: &str, record: &ResourceRecord) -> Result<()>;

    /// Remove one record. Deleting an absent key is not an error.
    async fn delete(&self, prefix: &str, key: &str) -> Result<()>;
}
