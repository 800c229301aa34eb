//! Secret-aware value codec
//!
//! Converts a [`Value`] tree to plain JSON and back without loss.
//! Special kinds are framed as single-key wrapper objects with an
//! explicit tag, so decoding dispatches on the tag instead of guessing
//! from shape:
//!
//! ```json
//! {"@secret": "v2:..."}        // encrypted secret
//! {"@symbol": "Symbol(name)"}  // interned symbol
//! {"@scope": null}             // scope back-reference, payload dropped
//! ```
//!
//! The tag set is closed; adding a kind means adding a variant to
//! [`Value`] and an arm to both match statements below.

use crate::error::{CoreError, Result};
use crate::secret::SecretCipher;
use crate::value::{Secret, Symbol, Value};
use serde_json::json;

pub const SECRET_TAG: &str = "@secret";
pub const SYMBOL_TAG: &str = "@symbol";
pub const SCOPE_TAG: &str = "@scope";

/// Encode a value tree into persistable JSON, encrypting secrets.
pub fn encode(value: &Value, cipher: &SecretCipher) -> Result<serde_json::Value> {
    match value {
        Value::Null => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(json!(b)),
        Value::Number(n) => Ok(serde_json::Value::Number(n.clone())),
        Value::String(s) => Ok(json!(s)),
        Value::Sequence(items) => {
            let mut encoded = Vec::with_capacity(items.len());
            for item in items {
                encoded.push(encode(item, cipher)?);
            }
            Ok(serde_json::Value::Array(encoded))
        }
        Value::Object(map) => {
            let mut encoded = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                encoded.insert(key.clone(), encode(item, cipher)?);
            }
            Ok(serde_json::Value::Object(encoded))
        }
        Value::Secret(secret) => {
            let ciphertext = cipher.encrypt(secret.expose())?;
            Ok(json!({ SECRET_TAG: ciphertext }))
        }
        Value::Symbol(Symbol::Named(name)) => {
            Ok(json!({ SYMBOL_TAG: format!("Symbol({name})") }))
        }
        Value::Symbol(Symbol::Unique(description)) => Err(CoreError::Serialization(format!(
            "unique symbol Symbol({description}) has no persistable identity"
        ))),
        // Scopes exist only while a run is being constructed; the tag
        // records that one was here, the payload is always null.
        Value::ScopeRef => Ok(json!({ SCOPE_TAG: null })),
    }
}

/// Decode persisted JSON back into a value tree, decrypting secrets.
pub fn decode(value: &serde_json::Value, cipher: &SecretCipher) -> Result<Value> {
    match value {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => Ok(Value::Number(n.clone())),
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Array(items) => {
            let mut decoded = Vec::with_capacity(items.len());
            for item in items {
                decoded.push(decode(item, cipher)?);
            }
            Ok(Value::Sequence(decoded))
        }
        serde_json::Value::Object(map) => {
            if map.len() == 1
                && let Some((key, payload)) = map.iter().next()
            {
                match key.as_str() {
                    SECRET_TAG => return decode_secret(payload, cipher),
                    SYMBOL_TAG => return decode_symbol(payload),
                    SCOPE_TAG => return Ok(Value::ScopeRef),
                    _ => {}
                }
            }
            let mut decoded = indexmap::IndexMap::with_capacity(map.len());
            for (key, item) in map {
                decoded.insert(key.clone(), decode(item, cipher)?);
            }
            Ok(Value::Object(decoded))
        }
    }
}

fn decode_secret(payload: &serde_json::Value, cipher: &SecretCipher) -> Result<Value> {
    let ciphertext = payload.as_str().ok_or_else(|| {
        CoreError::Serialization(format!("{SECRET_TAG} payload must be a string"))
    })?;
    let plaintext = cipher.decrypt(ciphertext)?;
    Ok(Value::Secret(Secret::new(plaintext)))
}

fn decode_symbol(payload: &serde_json::Value) -> Result<Value> {
    let rendered = payload.as_str().ok_or_else(|| {
        CoreError::Serialization(format!("{SYMBOL_TAG} payload must be a string"))
    })?;
    let name = rendered
        .strip_prefix("Symbol(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| {
            CoreError::Serialization(format!("malformed symbol payload: {rendered}"))
        })?;
    Ok(Value::Symbol(Symbol::named(name)))
}
