//! State service dispatch
//!
//! Maps wire requests onto a [`StateStore`]. Mutations for the
//! namespace are funneled through a single writer task so concurrent
//! writes to the same key cannot lose updates; reads hit the store
//! directly and never queue behind writes.

use alchemy_state::protocol::{WireRequest, method};
use alchemy_state::{StateError, StateStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const WRITER_MAILBOX: usize = 64;

/// Errors produced while handling a wire request
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid record payload: {0}")]
    InvalidPayload(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("state service writer is gone")]
    WriterGone,

    #[error(transparent)]
    Store(#[from] StateError),
}

impl ServiceError {
    /// HTTP status the error maps to.
    pub fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ServiceError::MissingField(_) | ServiceError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::UnknownMethod(_) => StatusCode::NOT_FOUND,
            ServiceError::Store(StateError::Unauthorized) => StatusCode::UNAUTHORIZED,
            ServiceError::WriterGone | ServiceError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

struct WriteOp {
    request: WireRequest,
    reply: oneshot::Sender<Result<serde_json::Value, ServiceError>>,
}

/// One state namespace behind a wire endpoint
#[derive(Clone)]
pub struct StateService {
    store: Arc<dyn StateStore>,
    writer: mpsc::Sender<WriteOp>,
}

impl StateService {
    /// Spawn the writer task and return a handle.
    pub fn spawn(store: Arc<dyn StateStore>) -> Self {
        let (tx, mut rx) = mpsc::channel::<WriteOp>(WRITER_MAILBOX);
        let writer_store = Arc::clone(&store);
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                let result = apply_write(writer_store.as_ref(), &op.request).await;
                // Receiver may have given up; nothing to do then.
                let _ = op.reply.send(result);
            }
            tracing::debug!("state writer task stopped");
        });
        Self { store, writer: tx }
    }

    /// Handle one wire request.
    pub async fn handle(&self, request: WireRequest) -> Result<serde_json::Value, ServiceError> {
        match request.method.as_str() {
            method::SET | method::DELETE => {
                let (reply, rx) = oneshot::channel();
                self.writer
                    .send(WriteOp { request, reply })
                    .await
                    .map_err(|_| ServiceError::WriterGone)?;
                rx.await.map_err(|_| ServiceError::WriterGone)?
            }
            _ => apply_read(self.store.as_ref(), &request).await,
        }
    }
}

fn require<'a>(field: &'a Option<String>, name: &'static str) -> Result<&'a str, ServiceError> {
    field.as_deref().ok_or(ServiceError::MissingField(name))
}

async fn apply_read(
    store: &dyn StateStore,
    request: &WireRequest,
) -> Result<serde_json::Value, ServiceError> {
    let prefix = &request.prefix;
    match request.method.as_str() {
        method::GET => {
            let key = require(&request.key, "key")?;
            let record = store.get(prefix, key).await?;
            Ok(serde_json::to_value(record).map_err(StateError::from)?)
        }
        method::GET_BATCH => {
            let keys = request
                .keys
                .as_deref()
                .ok_or(ServiceError::MissingField("keys"))?;
            let records = store.get_batch(prefix, keys).await?;
            Ok(serde_json::to_value(records).map_err(StateError::from)?)
        }
        method::LIST => {
            let keys = store.list(prefix).await?;
            Ok(serde_json::to_value(keys).map_err(StateError::from)?)
        }
        method::COUNT => {
            let count = store.count(prefix).await?;
            Ok(serde_json::json!(count))
        }
        method::ALL => {
            let records = store.all(prefix).await?;
            Ok(serde_json::to_value(records).map_err(StateError::from)?)
        }
        other => Err(ServiceError::UnknownMethod(other.to_string())),
    }
}

async fn apply_write(
    store: &dyn StateStore,
    request: &WireRequest,
) -> Result<serde_json::Value, ServiceError> {
    let prefix = &request.prefix;
    match request.method.as_str() {
        method::SET => {
            let key = require(&request.key, "key")?;
            let value = request
                .value
                .as_ref()
                .ok_or(ServiceError::MissingField("value"))?;
            let record = serde_json::from_value(value.clone())
                .map_err(|e| ServiceError::InvalidPayload(e.to_string()))?;
            store.set(prefix, key, &record).await?;
            Ok(serde_json::json!({"ok": true}))
        }
        method::DELETE => {
            let key = require(&request.key, "key")?;
            store.delete(prefix, key).await?;
            Ok(serde_json::json!({"ok": true}))
        }
        other => Err(ServiceError::UnknownMethod(other.to_string())),
    }
}
