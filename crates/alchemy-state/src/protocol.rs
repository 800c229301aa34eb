//! Wire protocol for the networked state store
//!
//! A single POST endpoint accepts a JSON body naming the operation;
//! both the client ([`crate::RemoteStore`]) and the server speak these
//! types. Responses mirror the [`crate::StateStore`] contract: records
//! or `null` for `get`, mappings for `getBatch`/`all`, an array for
//! `list`, a number for `count`, and `{"ok": true}` for mutations.

use serde::{Deserialize, Serialize};

/// Method names accepted by the endpoint
pub mod method {
    pub const GET: &str = "get";
    pub const GET_BATCH: &str = "getBatch";
    pub const LIST: &str = "list";
    pub const COUNT: &str = "count";
    pub const ALL: &str = "all";
    pub const SET: &str = "set";
    pub const DELETE: &str = "delete";
}

/// Request body for the state endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    pub method: String,
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl WireRequest {
    pub fn new(method: &str, prefix: &str) -> Self {
        Self {
            method: method.to_string(),
            prefix: prefix.to_string(),
            key: None,
            keys: None,
            value: None,
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn with_keys(mut self, keys: &[String]) -> Self {
        self.keys = Some(keys.to_vec());
        self
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// Error body returned for every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<serde_json::Value>,
}
