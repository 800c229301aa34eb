use alchemy_core::Value;
use alchemy_engine::{Phase, Provider, ProviderContext, ProviderRegistry, ProviderResult, Scope};
use alchemy_state::StateStore;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Provider double that records every lifecycle call in order and can
/// be told to fail or to report pre-existing live objects.
pub struct MockProvider {
    resource_type: String,
    calls: Mutex<Vec<String>>,
    fail: Mutex<HashSet<String>>,
    live: Mutex<HashMap<String, Value>>,
}

impl MockProvider {
    pub fn new(resource_type: &str) -> Arc<Self> {
        Arc::new(Self {
            resource_type: resource_type.to_string(),
            calls: Mutex::new(Vec::new()),
            fail: Mutex::new(HashSet::new()),
            live: Mutex::new(HashMap::new()),
        })
    }

    /// Make every lifecycle call for this FQN fail.
    pub fn fail_on(&self, fqn: &str) {
        self.fail.lock().unwrap().insert(fqn.to_string());
    }

    /// Pretend the live system already has this object (for read/adopt).
    #[allow(dead_code)]
    pub fn seed_live(&self, fqn: &str, output: Value) {
        self.live.lock().unwrap().insert(fqn.to_string(), output);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Index of a call in the log, panicking if it never happened.
    pub fn call_index(&self, call: &str) -> usize {
        self.calls()
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("call '{call}' not found in {:?}", self.calls()))
    }

    fn log(&self, op: &str, fqn: &str) {
        self.calls.lock().unwrap().push(format!("{op} {fqn}"));
    }

    fn check_fail(&self, fqn: &str) -> ProviderResult<()> {
        if self.fail.lock().unwrap().contains(fqn) {
            anyhow::bail!("injected failure for {fqn}");
        }
        Ok(())
    }

    fn output_for(&self, ctx: &ProviderContext) -> Value {
        Value::object([
            (
                "url",
                Value::from(format!("{}://{}", self.resource_type, ctx.fqn())),
            ),
            (
                "deps_seen",
                Value::from(ctx.dependency_outputs().count() as i64),
            ),
        ])
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        _props: &Value,
        _prior_output: Option<&Value>,
    ) -> ProviderResult<Value> {
        self.log("create", ctx.fqn());
        self.check_fail(ctx.fqn())?;
        Ok(self.output_for(ctx))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        _prior_output: &Value,
        _props: &Value,
    ) -> ProviderResult<Value> {
        self.log("update", ctx.fqn());
        self.check_fail(ctx.fqn())?;
        Ok(self.output_for(ctx))
    }

    async fn delete(&self, ctx: &ProviderContext, _prior_output: &Value) -> ProviderResult<()> {
        self.log("delete", ctx.fqn());
        self.check_fail(ctx.fqn())?;
        Ok(())
    }

    async fn read(&self, ctx: &ProviderContext, fqn: &str) -> ProviderResult<Option<Value>> {
        self.log("read", ctx.fqn());
        Ok(self.live.lock().unwrap().get(fqn).cloned())
    }
}

pub fn registry(provider: &Arc<MockProvider>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::clone(provider) as Arc<dyn Provider>);
    registry
}

/// Fresh scope over a (usually shared) store; scopes are per run, the
/// store is what persists between them.
pub fn scope(store: Arc<dyn StateStore>, phase: Phase) -> Scope {
    Scope::builder("app")
        .stage("dev")
        .phase(phase)
        .passphrase("test-passphrase")
        .store(store)
        .build()
        .unwrap()
}
