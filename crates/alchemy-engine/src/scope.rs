//! Scopes
//!
//! A scope binds one run's stage, phase, state store, credentials and
//! encryption passphrase, and collects the resources declared within
//! it. Scopes nest: children prefix their resources' FQNs with the
//! parent chain. A scope's path is immutable once chosen — reusing the
//! same path across runs is exactly what makes runs idempotent.
//!
//! Resource records outlive the in-memory scope; they persist in the
//! state store under the root scope's prefix.

use crate::engine;
use crate::error::{EngineError, Result};
use crate::provider::ProviderRegistry;
use crate::reconcile;
use crate::report::RunReport;
use alchemy_core::{SecretCipher, Value};
use alchemy_state::StateStore;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, Weak};

/// What a run is doing to the declared graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Create or update resources to match the declaration
    Up,
    /// Tear declared resources down, dependents first
    Destroy,
    /// Fetch current outputs without changing anything
    Read,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Up => write!(f, "up"),
            Phase::Destroy => write!(f, "destroy"),
            Phase::Read => write!(f, "read"),
        }
    }
}

/// Run-wide context shared by every scope in the tree
pub(crate) struct RunInner {
    pub(crate) stage: String,
    pub(crate) phase: Phase,
    pub(crate) cipher: SecretCipher,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) credentials: serde_json::Value,
    pub(crate) concurrency: usize,
    /// Root scope segments; the store prefix for the whole run
    pub(crate) root_path: Vec<String>,
    /// FQN → declaration, in declaration order
    pub(crate) resources: Mutex<IndexMap<String, DeclaredResource>>,
}

impl RunInner {
    /// Store prefix shared by every record of this run.
    pub(crate) fn prefix(&self) -> String {
        self.root_path.join("/")
    }

    /// Logical store key for an FQN under this run's prefix.
    pub(crate) fn key_of(&self, fqn: &str) -> String {
        let prefix = format!("{}/", self.prefix());
        fqn.strip_prefix(&prefix)
            .unwrap_or(fqn)
            .replace('/', ":")
    }
}

/// A declared resource waiting for the engine
#[derive(Clone)]
pub(crate) struct DeclaredResource {
    pub(crate) fqn: String,
    pub(crate) key: String,
    pub(crate) resource_type: String,
    pub(crate) props: Value,
    pub(crate) dependencies: Vec<String>,
    pub(crate) adopt: bool,
    pub(crate) scope_path: Vec<String>,
}

struct ScopeNode {
    name: String,
    /// Full segment chain from the root, this node included
    path: Vec<String>,
    /// Never owning; the tree is held from the root down.
    parent: Weak<ScopeNode>,
    children: Mutex<Vec<Arc<ScopeNode>>>,
    run: Arc<RunInner>,
}

/// Handle on a node of the scope tree
#[derive(Clone)]
pub struct Scope {
    node: Arc<ScopeNode>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.node.name)
            .field("path", &self.node.path)
            .finish()
    }
}

impl Scope {
    /// Start configuring a root scope.
    pub fn builder(name: impl Into<String>) -> ScopeBuilder {
        ScopeBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Segment chain from the root, this scope included.
    pub fn path(&self) -> &[String] {
        &self.node.path
    }

    pub fn phase(&self) -> Phase {
        self.node.run.phase
    }

    pub fn stage(&self) -> &str {
        &self.node.run.stage
    }

    fn is_root(&self) -> bool {
        self.node.parent.upgrade().is_none()
    }

    /// Open a nested scope. Resources declared in it get this scope's
    /// path as their FQN prefix.
    pub fn child(&self, name: impl Into<String>) -> Result<Scope> {
        let name = name.into();
        validate_name(&name)?;
        let mut path = self.node.path.clone();
        path.push(name.clone());
        let child = Arc::new(ScopeNode {
            name,
            path,
            parent: Arc::downgrade(&self.node),
            children: Mutex::new(Vec::new()),
            run: Arc::clone(&self.node.run),
        });
        self.node
            .children
            .lock()
            .expect("scope mutex poisoned")
            .push(Arc::clone(&child));
        Ok(Scope { node: child })
    }

    /// Declare a resource in this scope. Returns its FQN, which other
    /// declarations use to name their dependencies.
    pub fn declare(&self, spec: ResourceSpec) -> Result<String> {
        validate_name(&spec.name)?;
        let fqn = format!("{}/{}", self.node.path.join("/"), spec.name);
        let run = &self.node.run;
        let key = run.key_of(&fqn);

        let mut resources = run.resources.lock().expect("scope mutex poisoned");
        if resources.contains_key(&fqn) {
            return Err(EngineError::DuplicateResource(fqn));
        }
        tracing::debug!(fqn = %fqn, resource_type = %spec.resource_type, "declared resource");
        resources.insert(
            fqn.clone(),
            DeclaredResource {
                fqn: fqn.clone(),
                key,
                resource_type: spec.resource_type,
                props: spec.props,
                dependencies: spec.dependencies,
                adopt: spec.adopt,
                scope_path: self.node.path.clone(),
            },
        );
        Ok(fqn)
    }

    /// Execute the run over everything declared in this scope tree.
    ///
    /// Walks the dependency graph in order, loading prior state,
    /// diffing, and invoking provider lifecycle functions; every
    /// successful transition is persisted before anything downstream
    /// can observe it. On the outermost scope of an `up` run, finishes
    /// by reconciling orphans: previously recorded resources that are
    /// no longer declared are deleted in reverse dependency order.
    pub async fn run(&self, providers: &ProviderRegistry) -> Result<RunReport> {
        let run = Arc::clone(&self.node.run);
        let providers = Arc::new(providers.clone());
        let mut report = engine::execute(Arc::clone(&run), Arc::clone(&providers)).await?;

        if self.is_root() && run.phase == Phase::Up {
            let declared: Vec<String> = {
                let resources = run.resources.lock().expect("scope mutex poisoned");
                resources.values().map(|r| r.key.clone()).collect()
            };
            report.reconcile = Some(reconcile::reconcile(&run, &providers, &declared).await?);
        }
        Ok(report)
    }
}

/// Builder for a root scope
pub struct ScopeBuilder {
    name: String,
    stage: String,
    phase: Phase,
    passphrase: String,
    credentials: serde_json::Value,
    concurrency: usize,
    store: Option<Arc<dyn StateStore>>,
}

impl ScopeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage: "dev".to_string(),
            phase: Phase::Up,
            passphrase: String::new(),
            credentials: serde_json::Value::Null,
            concurrency: 16,
            store: None,
        }
    }

    /// Logical environment label. Part of the state prefix, so each
    /// stage owns an isolated record namespace.
    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Passphrase protecting secret values in persisted records.
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = passphrase.into();
        self
    }

    /// Opaque credential bag handed through to providers.
    pub fn credentials(mut self, credentials: serde_json::Value) -> Self {
        self.credentials = credentials;
        self
    }

    /// Cap on concurrently running lifecycle calls.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Scope> {
        validate_name(&self.name)?;
        validate_name(&self.stage)?;
        let store = self
            .store
            .ok_or_else(|| EngineError::Config("no state store configured".to_string()))?;

        let root_path = vec![self.name.clone(), self.stage.clone()];
        let run = Arc::new(RunInner {
            stage: self.stage,
            phase: self.phase,
            cipher: SecretCipher::new(&self.passphrase),
            store,
            credentials: self.credentials,
            concurrency: self.concurrency,
            root_path: root_path.clone(),
            resources: Mutex::new(IndexMap::new()),
        });
        let node = Arc::new(ScopeNode {
            name: self.name,
            path: root_path,
            parent: Weak::new(),
            children: Mutex::new(Vec::new()),
            run,
        });
        Ok(Scope { node })
    }
}

/// Desired state of one resource
pub struct ResourceSpec {
    name: String,
    resource_type: String,
    props: Value,
    dependencies: Vec<String>,
    adopt: bool,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            props: Value::Null,
            dependencies: Vec::new(),
            adopt: false,
        }
    }

    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    /// Name a resource whose output this one's construction reads.
    /// Dependencies order execution and surface the dependency's
    /// output in the provider context.
    pub fn depends_on(mut self, fqn: impl Into<String>) -> Self {
        self.dependencies.push(fqn.into());
        self
    }

    /// If the identity already exists in the live system, take it over
    /// as prior state instead of failing the create.
    pub fn adopt(mut self) -> Self {
        self.adopt = true;
        self
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EngineError::InvalidName("name is empty".to_string()));
    }
    if name.contains('/') {
        return Err(EngineError::InvalidName(format!(
            "'{name}' must not contain '/'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alchemy_state::MemoryStore;

    fn scope() -> Scope {
        Scope::builder("app")
            .stage("dev")
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn fqn_includes_scope_chain() {
        let root = scope();
        let fqn = root
            .declare(ResourceSpec::new("db", "postgres"))
            .unwrap();
        assert_eq!(fqn, "app/dev/db");

        let backend = root.child("backend").unwrap();
        let nested = backend
            .declare(ResourceSpec::new("api", "service"))
            .unwrap();
        assert_eq!(nested, "app/dev/backend/api");
    }

    #[test]
    fn keys_are_relative_and_colon_joined() {
        let root = scope();
        assert_eq!(root.node.run.key_of("app/dev/db"), "db");
        assert_eq!(root.node.run.key_of("app/dev/backend/api"), "backend:api");
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let root = scope();
        root.declare(ResourceSpec::new("db", "postgres")).unwrap();
        let err = root.declare(ResourceSpec::new("db", "postgres")).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateResource(_)));
    }

    #[test]
    fn names_with_separators_are_rejected() {
        let root = scope();
        assert!(matches!(
            root.declare(ResourceSpec::new("a/b", "postgres")).unwrap_err(),
            EngineError::InvalidName(_)
        ));
        assert!(matches!(
            root.child("x/y").unwrap_err(),
            EngineError::InvalidName(_)
        ));
    }

    #[test]
    fn builder_requires_a_store() {
        let err = Scope::builder("app").build().unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
