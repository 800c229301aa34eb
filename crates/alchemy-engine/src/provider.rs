//! Provider capability contract
//!
//! The engine consumes resource providers only through this trait: a
//! type identifier plus lifecycle functions from desired props and
//! prior output to new output. Providers never touch the state store;
//! all persistence flows through the engine. Lifecycle calls may be
//! repeated after a crash, so implementations must be safely retryable
//! from the engine's point of view.

use crate::scope::Phase;
use alchemy_core::Value;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of a single provider lifecycle call
pub type ProviderResult<T> = anyhow::Result<T>;

/// A resource provider implementation
#[async_trait]
pub trait Provider: Send + Sync {
    /// The resource kind this provider manages (opaque to the engine).
    fn resource_type(&self) -> &str;

    /// Bring the resource into existence. `prior_output` is present
    /// when a live object is being adopted.
    async fn create(
        &self,
        ctx: &ProviderContext,
        props: &Value,
        prior_output: Option<&Value>,
    ) -> ProviderResult<Value>;

    /// Converge an existing resource onto new props.
    async fn update(
        &self,
        ctx: &ProviderContext,
        prior_output: &Value,
        props: &Value,
    ) -> ProviderResult<Value>;

    /// Tear the resource down.
    async fn delete(&self, ctx: &ProviderContext, prior_output: &Value) -> ProviderResult<()>;

    /// Fetch the current live output for an identity, if this provider
    /// supports it. Backs the read phase and the adopt flag.
    async fn read(&self, _ctx: &ProviderContext, _fqn: &str) -> ProviderResult<Option<Value>> {
        Ok(None)
    }
}

/// What a provider sees about the run it is called from
#[derive(Clone)]
pub struct ProviderContext {
    fqn: String,
    stage: String,
    phase: Phase,
    credentials: serde_json::Value,
    dependency_outputs: IndexMap<String, Value>,
}

impl ProviderContext {
    pub(crate) fn new(
        fqn: String,
        stage: String,
        phase: Phase,
        credentials: serde_json::Value,
        dependency_outputs: IndexMap<String, Value>,
    ) -> Self {
        Self {
            fqn,
            stage,
            phase,
            credentials,
            dependency_outputs,
        }
    }

    /// Fully-qualified name of the resource being operated on.
    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Opaque credential bag configured on the scope.
    pub fn credentials(&self) -> &serde_json::Value {
        &self.credentials
    }

    /// Output of a direct dependency, by FQN. Only dependencies that
    /// completed successfully before this call are present.
    pub fn dependency_output(&self, fqn: &str) -> Option<&Value> {
        self.dependency_outputs.get(fqn)
    }

    pub fn dependency_outputs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.dependency_outputs.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Providers available to a run, keyed by resource type
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own type identifier. The last
    /// registration for a type wins.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers
            .insert(provider.resource_type().to_string(), provider);
    }

    pub fn get(&self, resource_type: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(resource_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
