//! Networked state store client
//!
//! Talks to an HTTP-fronted state service (see `alchemy-server`) with a
//! bearer token attached to every request. Transport failures and
//! server errors surface as [`StateError::Unavailable`]; a rejected
//! token surfaces as [`StateError::Unauthorized`] and is not retried.

use crate::error::{Result, StateError};
use crate::protocol::{WireError, WireRequest, method};
use crate::store::StateStore;
use alchemy_core::ResourceRecord;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::BTreeMap;

/// Client for the remote state endpoint
pub struct RemoteStore {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl RemoteStore {
    /// `endpoint` is the full URL of the state endpoint, e.g.
    /// `http://127.0.0.1:7373/state`.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }

    async fn call(&self, request: WireRequest) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| StateError::Unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(StateError::Unauthorized);
        }
        if !status.is_success() {
            let detail = match response.json::<WireError>().await {
                Ok(body) => body.error,
                Err(_) => format!("status {status}"),
            };
            return Err(StateError::Unavailable(format!(
                "state service returned {status}: {detail}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| StateError::Unavailable(format!("malformed response body: {e}")))
    }
}

#[async_trait]
impl StateStore for RemoteStore {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<ResourceRecord>> {
        let raw = self
            .call(WireRequest::new(method::GET, prefix).with_key(key))
            .await?;
        if raw.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(raw)?))
    }

    async fn get_batch(
        &self,
        prefix: &str,
        keys: &[String],
    ) -> Result<BTreeMap<String, ResourceRecord>> {
        let raw = self
            .call(WireRequest::new(method::GET_BATCH, prefix).with_keys(keys))
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let raw = self.call(WireRequest::new(method::LIST, prefix)).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn count(&self, prefix: &str) -> Result<usize> {
        let raw = self.call(WireRequest::new(method::COUNT, prefix)).await?;
        raw.as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| StateError::Unavailable("count returned a non-number".to_string()))
    }

    async fn all(&self, prefix: &str) -> Result<BTreeMap<String, ResourceRecord>> {
        let raw = self.call(WireRequest::new(method::ALL, prefix)).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn set(&self, prefix: &str, key: &str, record: &ResourceRecord) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.call(WireRequest::new(method::SET, prefix).with_key(key).with_value(value))
            .await?;
        Ok(())
    }

    async fn delete(&self, prefix: &str, key: &str) -> Result<()> {
        self.call(WireRequest::new(method::DELETE, prefix).with_key(key))
            .await?;
        Ok(())
    }
}
