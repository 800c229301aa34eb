//! Run reporting types

use alchemy_core::{ResourceStatus, Value};
use indexmap::IndexMap;

/// What the engine did (or decided not to do) to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Provider create was invoked
    Create,
    /// Provider update was invoked
    Update,
    /// Provider delete was invoked
    Delete,
    /// Read-only fetch of current output
    Read,
    /// No provider call: props unchanged, or nothing recorded to delete
    Skip,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Create => write!(f, "create"),
            ActionKind::Update => write!(f, "update"),
            ActionKind::Delete => write!(f, "delete"),
            ActionKind::Read => write!(f, "read"),
            ActionKind::Skip => write!(f, "skip"),
        }
    }
}

/// Result of one resource's lifecycle execution
#[derive(Debug, Clone)]
pub struct ResourceOutcome {
    pub fqn: String,
    pub resource_type: String,
    pub action: ActionKind,
    /// Durable status after this run; `None` when no record exists
    /// (never created, or removed by a delete transition).
    pub status: Option<ResourceStatus>,
    /// Decoded output, exposed to dependents and to the caller
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl ResourceOutcome {
    pub(crate) fn failure(
        fqn: impl Into<String>,
        resource_type: impl Into<String>,
        action: ActionKind,
        error: String,
    ) -> Self {
        Self {
            fqn: fqn.into(),
            resource_type: resource_type.into(),
            action,
            status: Some(ResourceStatus::Failed),
            output: None,
            error: Some(error),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Everything one run did, in declaration order
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: IndexMap<String, ResourceOutcome>,
    /// Present on the outermost scope of an `up` run
    pub reconcile: Option<ReconcileReport>,
    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(|o| !o.is_failure())
            && self.reconcile.as_ref().is_none_or(ReconcileReport::is_success)
    }

    /// Decoded output of a resource, if it settled successfully.
    pub fn output(&self, fqn: &str) -> Option<&Value> {
        self.outcomes.get(fqn).and_then(|o| o.output.as_ref())
    }

    /// First failure, for surfacing a run error with its FQN attached.
    pub fn first_failure(&self) -> Option<&ResourceOutcome> {
        self.outcomes.values().find(|o| o.is_failure())
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for outcome in self.outcomes.values() {
            if outcome.is_failure() {
                summary.failed += 1;
                continue;
            }
            match outcome.action {
                ActionKind::Create => summary.created += 1,
                ActionKind::Update => summary.updated += 1,
                ActionKind::Delete => summary.deleted += 1,
                ActionKind::Read => summary.read += 1,
                ActionKind::Skip => summary.skipped += 1,
            }
        }
        if let Some(reconcile) = &self.reconcile {
            summary.deleted += reconcile.deleted.len();
            summary.failed += reconcile.failed.len();
        }
        summary
    }
}

/// Counts of what a run did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub read: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} unchanged, {} failed",
            self.created, self.updated, self.deleted, self.skipped, self.failed
        )
    }
}

/// Result of orphan reconciliation: partial success, never a rollback
#[derive(Debug, Default, Clone)]
pub struct ReconcileReport {
    /// Logical keys deleted, in the order they were deleted
    pub deleted: Vec<String>,
    /// Logical key → error message for deletions that failed
    pub failed: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
