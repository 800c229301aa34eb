//! Engine error types

use thiserror::Error;

/// Errors raised while building or executing a run
#[derive(Error, Debug)]
pub enum EngineError {
    /// Construction-time, fatal: no partial ordering is produced.
    #[error("dependency cycle detected at '{0}'")]
    CycleDetected(String),

    #[error("resource '{fqn}' depends on undeclared resource '{dependency}'")]
    MissingDependency { fqn: String, dependency: String },

    #[error("no provider registered for resource type '{resource_type}' (resource '{fqn}')")]
    UnknownResourceType { fqn: String, resource_type: String },

    #[error("resource '{0}' is already declared in this run")]
    DuplicateResource(String),

    #[error("invalid resource or scope name: {0}")]
    InvalidName(String),

    #[error("invalid scope configuration: {0}")]
    Config(String),

    /// Opaque wrapper around whatever the provider implementation
    /// raised. Marks the resource failed and fails its dependents
    /// without attempting them.
    #[error("resource '{fqn}' provider call failed: {source}")]
    Provider {
        fqn: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("resource '{fqn}' failed because dependency '{dependency}' failed")]
    DependencyFailed { fqn: String, dependency: String },

    #[error("scheduler failure: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Core(#[from] alchemy_core::CoreError),

    #[error(transparent)]
    State(#[from] alchemy_state::StateError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
