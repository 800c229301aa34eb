//! Persisted resource records
//!
//! One record per resource identity, durably stored through a state
//! store. Records outlive the in-memory scope that declared them; the
//! engine transitions their status and persists every transition before
//! exposing the result to anything downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Durable state of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Fully-qualified name: scope chain plus local name, slash-joined.
    /// Immutable once created.
    pub fqn: String,

    /// Provider-declared resource kind (opaque to the engine)
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Current lifecycle status
    pub status: ResourceStatus,

    /// Last-applied input configuration, codec-encoded
    pub props: serde_json::Value,

    /// Last-observed physical attributes returned by the provider,
    /// codec-encoded. Always present once the resource has completed
    /// creating or updating, until it is deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    /// FQNs whose output this resource's construction read
    #[serde(default)]
    pub dependencies: BTreeSet<String>,

    /// Ordered ancestor scope names
    #[serde(default)]
    pub scope_path: Vec<String>,

    /// When the record was first written
    pub created_at: DateTime<Utc>,

    /// Last transition timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(
        fqn: impl Into<String>,
        resource_type: impl Into<String>,
        props: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            fqn: fqn.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Creating,
            props,
            output: None,
            dependencies: BTreeSet::new(),
            scope_path: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = String>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn with_scope_path(mut self, scope_path: Vec<String>) -> Self {
        self.scope_path = scope_path;
        self
    }

    /// Move to a new lifecycle status, stamping the transition time.
    pub fn transition(&mut self, status: ResourceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Lifecycle status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Create call in flight (or interrupted)
    Creating,
    /// Create completed
    Created,
    /// Update call in flight (or interrupted)
    Updating,
    /// Update completed
    Updated,
    /// Delete call in flight (or interrupted)
    Deleting,
    /// Delete completed; the record is removed on this transition
    Deleted,
    /// The last provider call failed
    Failed,
}

impl ResourceStatus {
    /// Whether the resource has a settled, live backing object.
    pub fn is_live(self) -> bool {
        matches!(self, ResourceStatus::Created | ResourceStatus::Updated)
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Creating => write!(f, "creating"),
            ResourceStatus::Created => write!(f, "created"),
            ResourceStatus::Updating => write!(f, "updating"),
            ResourceStatus::Updated => write!(f, "updated"),
            ResourceStatus::Deleting => write!(f, "deleting"),
            ResourceStatus::Deleted => write!(f, "deleted"),
            ResourceStatus::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_json() {
        let record = ResourceRecord::new("app/dev/db", "postgres", serde_json::json!({"size": 10}))
            .with_status(ResourceStatus::Created)
            .with_output(serde_json::json!({"url": "postgres://localhost"}))
            .with_dependencies(["app/dev/network".to_string()])
            .with_scope_path(vec!["app".to_string(), "dev".to_string()]);

        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: ResourceRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.fqn, "app/dev/db");
        assert_eq!(decoded.resource_type, "postgres");
        assert_eq!(decoded.status, ResourceStatus::Created);
        assert!(decoded.dependencies.contains("app/dev/network"));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ResourceStatus::Creating).unwrap();
        assert_eq!(json, "\"creating\"");
    }

    #[test]
    fn transition_bumps_updated_at() {
        let mut record = ResourceRecord::new("app/dev/db", "postgres", serde_json::json!({}));
        let before = record.updated_at;
        record.transition(ResourceStatus::Created);
        assert_eq!(record.status, ResourceStatus::Created);
        assert!(record.updated_at >= before);
    }

    #[test]
    fn is_live() {
        assert!(ResourceStatus::Created.is_live());
        assert!(ResourceStatus::Updated.is_live());
        assert!(!ResourceStatus::Deleting.is_live());
        assert!(!ResourceStatus::Failed.is_live());
    }
}
