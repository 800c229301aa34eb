//! End-to-end test of the wire protocol: a real listener on an
//! ephemeral port, the `RemoteStore` client on one side and a
//! `FileStore`-backed service on the other.

use alchemy_core::{ResourceRecord, ResourceStatus};
use alchemy_state::{FileStore, RemoteStore, StateError, StateStore};
use std::sync::Arc;
use tempfile::TempDir;

const TOKEN: &str = "integration-test-token";

struct TestServer {
    endpoint: String,
    base: String,
    // Held so the state directory outlives the server task
    _root: TempDir,
}

async fn start_server() -> TestServer {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(root.path()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        alchemy_server::serve(listener, store, TOKEN).await.unwrap();
    });
    TestServer {
        endpoint: format!("http://{addr}/state"),
        base: format!("http://{addr}"),
        _root: root,
    }
}

fn record(fqn: &str) -> ResourceRecord {
    ResourceRecord::new(fqn, "bucket", serde_json::json!({"region": "us-east-1"}))
        .with_status(ResourceStatus::Created)
        .with_output(serde_json::json!({"arn": format!("arn:{fqn}")}))
}

#[tokio::test]
async fn full_store_contract_over_the_wire() {
    let server = start_server().await;
    let store = RemoteStore::new(&server.endpoint, TOKEN);

    // set followed by get returns the just-written value
    store.set("app/dev", "db", &record("app/dev/db")).await.unwrap();
    store.set("app/dev", "api", &record("app/dev/api")).await.unwrap();
    let loaded = store.get("app/dev", "db").await.unwrap().unwrap();
    assert_eq!(loaded.fqn, "app/dev/db");

    assert_eq!(store.list("app/dev").await.unwrap(), ["api", "db"]);
    assert_eq!(store.count("app/dev").await.unwrap(), 2);

    let all = store.all("app/dev").await.unwrap();
    assert_eq!(all.len(), 2);

    let batch = store
        .get_batch("app/dev", &["db".to_string(), "ghost".to_string()])
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);

    // deleting an absent key twice succeeds both times
    store.delete("app/dev", "db").await.unwrap();
    store.delete("app/dev", "db").await.unwrap();
    assert!(store.get("app/dev", "db").await.unwrap().is_none());
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let server = start_server().await;
    let store = RemoteStore::new(&server.endpoint, "wrong-token");

    let err = store.get("app/dev", "db").await.unwrap_err();
    assert!(matches!(err, StateError::Unauthorized));
}

#[tokio::test]
async fn non_post_on_state_endpoint_is_405() {
    let server = start_server().await;
    let response = reqwest::Client::new()
        .get(&server.endpoint)
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn malformed_body_is_400_with_structured_error() {
    let server = start_server().await;
    let response = reqwest::Client::new()
        .post(&server.endpoint)
        .bearer_auth(TOKEN)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("malformed"));
}

#[tokio::test]
async fn missing_field_is_400() {
    let server = start_server().await;
    let response = reqwest::Client::new()
        .post(&server.endpoint)
        .bearer_auth(TOKEN)
        .json(&serde_json::json!({"method": "get", "prefix": "app/dev"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_method_is_404() {
    let server = start_server().await;
    let response = reqwest::Client::new()
        .post(&server.endpoint)
        .bearer_auth(TOKEN)
        .json(&serde_json::json!({"method": "truncate", "prefix": "app/dev"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_endpoint_needs_no_auth() {
    let server = start_server().await;
    let response = reqwest::Client::new()
        .get(format!("{}/status", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}
