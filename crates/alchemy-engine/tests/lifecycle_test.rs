mod common;

use alchemy_core::{ResourceStatus, Value};
use alchemy_engine::{ActionKind, EngineError, Phase, ResourceSpec};
use alchemy_state::{MemoryStore, StateStore};
use common::{MockProvider, registry, scope};
use std::sync::Arc;

fn db_props() -> Value {
    Value::object([("size", Value::from(10)), ("engine", Value::from("postgres"))])
}

fn api_props() -> Value {
    Value::object([("replicas", Value::from(2))])
}

#[tokio::test]
async fn dependencies_are_created_first_and_their_outputs_exposed() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");
    let root = scope(store.clone(), Phase::Up);

    let db = root
        .declare(ResourceSpec::new("db", "service").with_props(db_props()))
        .unwrap();
    let api = root
        .declare(
            ResourceSpec::new("api", "service")
                .with_props(api_props())
                .depends_on(&db),
        )
        .unwrap();

    let report = root.run(&registry(&provider)).await.unwrap();
    assert!(report.is_success(), "{:?}", report.outcomes);

    // db settles before api even starts
    assert!(provider.call_index("create app/dev/db") < provider.call_index("create app/dev/api"));

    // api saw its dependency's output
    let api_output = report.output(&api).unwrap();
    assert_eq!(api_output.get("deps_seen"), Some(&Value::from(1)));

    // records are persisted as created, with dependencies recorded
    let record = store.get("app/dev", "api").await.unwrap().unwrap();
    assert_eq!(record.status, ResourceStatus::Created);
    assert!(record.dependencies.contains("app/dev/db"));
    assert!(record.output.is_some());
}

#[tokio::test]
async fn rerunning_identical_props_skips_every_provider_call() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");

    for _ in 0..2 {
        let root = scope(store.clone(), Phase::Up);
        let db = root
            .declare(ResourceSpec::new("db", "service").with_props(db_props()))
            .unwrap();
        root.declare(
            ResourceSpec::new("api", "service")
                .with_props(api_props())
                .depends_on(&db),
        )
        .unwrap();
        let report = root.run(&registry(&provider)).await.unwrap();
        assert!(report.is_success());
    }

    // Two creates from the first run, nothing from the second
    assert_eq!(provider.calls().len(), 2);

    let record = store.get("app/dev", "db").await.unwrap().unwrap();
    assert_eq!(record.status, ResourceStatus::Created);
}

#[tokio::test]
async fn changed_props_trigger_an_update() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");

    let first = scope(store.clone(), Phase::Up);
    first
        .declare(ResourceSpec::new("db", "service").with_props(db_props()))
        .unwrap();
    first.run(&registry(&provider)).await.unwrap();

    let second = scope(store.clone(), Phase::Up);
    second
        .declare(
            ResourceSpec::new("db", "service")
                .with_props(Value::object([("size", Value::from(20))])),
        )
        .unwrap();
    let report = second.run(&registry(&provider)).await.unwrap();

    let outcome = &report.outcomes["app/dev/db"];
    assert_eq!(outcome.action, ActionKind::Update);
    assert_eq!(provider.calls(), ["create app/dev/db", "update app/dev/db"]);

    let record = store.get("app/dev", "db").await.unwrap().unwrap();
    assert_eq!(record.status, ResourceStatus::Updated);
}

#[tokio::test]
async fn failed_dependency_fails_dependents_without_calling_them() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");
    provider.fail_on("app/dev/db");

    let root = scope(store.clone(), Phase::Up);
    let db = root
        .declare(ResourceSpec::new("db", "service").with_props(db_props()))
        .unwrap();
    root.declare(
        ResourceSpec::new("api", "service")
            .with_props(api_props())
            .depends_on(&db),
    )
    .unwrap();

    let report = root.run(&registry(&provider)).await.unwrap();
    assert!(!report.is_success());

    // api's provider was never invoked
    assert_eq!(provider.calls(), ["create app/dev/db"]);

    let api_outcome = &report.outcomes["app/dev/api"];
    assert!(api_outcome.is_failure());
    assert!(api_outcome.error.as_ref().unwrap().contains("app/dev/db"));

    // the failing resource is durably marked failed; the dependent was
    // never attempted, so it has no record at all
    let db_record = store.get("app/dev", "db").await.unwrap().unwrap();
    assert_eq!(db_record.status, ResourceStatus::Failed);
    assert!(store.get("app/dev", "api").await.unwrap().is_none());
}

#[tokio::test]
async fn destroy_deletes_dependents_before_dependencies() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");

    let up = scope(store.clone(), Phase::Up);
    let db = up
        .declare(ResourceSpec::new("db", "service").with_props(db_props()))
        .unwrap();
    up.declare(
        ResourceSpec::new("api", "service")
            .with_props(api_props())
            .depends_on(&db),
    )
    .unwrap();
    up.run(&registry(&provider)).await.unwrap();

    let down = scope(store.clone(), Phase::Destroy);
    let db = down
        .declare(ResourceSpec::new("db", "service").with_props(db_props()))
        .unwrap();
    down.declare(
        ResourceSpec::new("api", "service")
            .with_props(api_props())
            .depends_on(&db),
    )
    .unwrap();
    let report = down.run(&registry(&provider)).await.unwrap();
    assert!(report.is_success());

    assert!(provider.call_index("delete app/dev/api") < provider.call_index("delete app/dev/db"));

    // delete transitions removed both records
    assert_eq!(store.count("app/dev").await.unwrap(), 0);
}

#[tokio::test]
async fn dependency_cycles_fail_before_any_provider_call() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");
    let root = scope(store.clone(), Phase::Up);

    root.declare(ResourceSpec::new("a", "service").depends_on("app/dev/b"))
        .unwrap();
    root.declare(ResourceSpec::new("b", "service").depends_on("app/dev/a"))
        .unwrap();

    let err = root.run(&registry(&provider)).await.unwrap_err();
    assert!(matches!(err, EngineError::CycleDetected(_)));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn undeclared_dependency_is_a_construction_error() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");
    let root = scope(store.clone(), Phase::Up);

    root.declare(ResourceSpec::new("api", "service").depends_on("app/dev/ghost"))
        .unwrap();

    let err = root.run(&registry(&provider)).await.unwrap_err();
    assert!(matches!(err, EngineError::MissingDependency { .. }));
}

#[tokio::test]
async fn unregistered_resource_type_fails_preflight() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");
    let root = scope(store.clone(), Phase::Up);

    root.declare(ResourceSpec::new("queue", "exotic-type"))
        .unwrap();

    let err = root.run(&registry(&provider)).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownResourceType { .. }));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn adopt_takes_over_an_out_of_band_resource() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");
    provider.seed_live(
        "app/dev/db",
        Value::object([("url", Value::from("service://preexisting"))]),
    );

    let root = scope(store.clone(), Phase::Up);
    root.declare(
        ResourceSpec::new("db", "service")
            .with_props(db_props())
            .adopt(),
    )
    .unwrap();

    let report = root.run(&registry(&provider)).await.unwrap();
    assert!(report.is_success());

    // The live object became prior state: updated, never created
    let calls = provider.calls();
    assert!(calls.contains(&"update app/dev/db".to_string()));
    assert!(!calls.contains(&"create app/dev/db".to_string()));

    let record = store.get("app/dev", "db").await.unwrap().unwrap();
    assert_eq!(record.status, ResourceStatus::Updated);
}

#[tokio::test]
async fn secret_props_are_encrypted_at_rest_and_still_skip_on_rerun() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");

    let props = Value::object([
        ("user", Value::from("admin")),
        ("password", Value::secret("hunter2")),
    ]);

    for _ in 0..2 {
        let root = scope(store.clone(), Phase::Up);
        root.declare(ResourceSpec::new("db", "service").with_props(props.clone()))
            .unwrap();
        let report = root.run(&registry(&provider)).await.unwrap();
        assert!(report.is_success());
    }

    // One create; the rerun skipped despite the nondeterministic
    // ciphertext in the persisted props
    assert_eq!(provider.calls(), ["create app/dev/db"]);

    let record = store.get("app/dev", "db").await.unwrap().unwrap();
    let rendered = serde_json::to_string(&record.props).unwrap();
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("@secret"));
    assert!(rendered.contains("v2:"));
}

#[tokio::test]
async fn read_phase_fetches_without_persisting() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");

    let up = scope(store.clone(), Phase::Up);
    up.declare(ResourceSpec::new("db", "service").with_props(db_props()))
        .unwrap();
    up.run(&registry(&provider)).await.unwrap();
    let before = store.get("app/dev", "db").await.unwrap().unwrap();

    let read = scope(store.clone(), Phase::Read);
    read.declare(ResourceSpec::new("db", "service").with_props(db_props()))
        .unwrap();
    let report = read.run(&registry(&provider)).await.unwrap();

    let outcome = &report.outcomes["app/dev/db"];
    assert_eq!(outcome.action, ActionKind::Read);
    assert_eq!(outcome.status, Some(ResourceStatus::Created));
    assert!(outcome.output.is_some());

    // No mutation calls, no record changes
    let calls = provider.calls();
    assert_eq!(
        calls.iter().filter(|c| !c.starts_with("read")).count(),
        1,
        "only the original create mutates: {calls:?}"
    );
    let after = store.get("app/dev", "db").await.unwrap().unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn independent_resources_all_settle() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");
    let root = scope(store.clone(), Phase::Up);

    for name in ["a", "b", "c", "d", "e"] {
        root.declare(ResourceSpec::new(name, "service")).unwrap();
    }
    let report = root.run(&registry(&provider)).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.summary().created, 5);
    assert_eq!(store.count("app/dev").await.unwrap(), 5);
}

#[tokio::test]
async fn nested_scope_resources_use_prefixed_identities() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new("service");
    let root = scope(store.clone(), Phase::Up);

    let backend = root.child("backend").unwrap();
    let fqn = backend
        .declare(ResourceSpec::new("api", "service").with_props(api_props()))
        .unwrap();
    assert_eq!(fqn, "app/dev/backend/api");

    let report = root.run(&registry(&provider)).await.unwrap();
    assert!(report.is_success());

    let record = store.get("app/dev", "backend:api").await.unwrap().unwrap();
    assert_eq!(record.fqn, "app/dev/backend/api");
    assert_eq!(record.scope_path, ["app", "dev", "backend"]);
}
