//! In-memory value model
//!
//! Resource inputs and outputs are arbitrary trees of primitives,
//! sequences and keyed mappings, plus three kinds the codec treats
//! specially: [`Secret`] wrappers, symbolic values and back-references
//! to scopes. The tree is a closed sum type so the codec can dispatch
//! on tags exhaustively instead of reflecting over concrete types.

use indexmap::IndexMap;
use serde_json::Number;
use std::fmt;

/// A value tree as providers see it
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Ordered sequence
    Sequence(Vec<Value>),
    /// Keyed mapping, insertion order preserved
    Object(IndexMap<String, Value>),
    /// Secret string, encrypted at rest
    Secret(Secret),
    /// Symbolic value
    Symbol(Symbol),
    /// Back-reference to the enclosing scope. Construction-time only;
    /// persisted as a null-payload tag and never reconstructed.
    ScopeRef,
}

impl Value {
    /// Build an object value from key/value pairs, keeping their order.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Shorthand for a secret string value.
    pub fn secret(plaintext: impl Into<String>) -> Self {
        Value::Secret(Secret::new(plaintext))
    }

    /// Look up a key on an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// String payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Sequence(v)
    }
}

/// A string that must never be persisted or logged in clear text.
///
/// The plaintext is only reachable through [`Secret::expose`]; `Debug`
/// output is redacted and there is deliberately no `Display` impl or
/// equality against bare strings.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(plaintext: impl Into<String>) -> Self {
        Self(plaintext.into())
    }

    /// Access the plaintext.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}

/// A symbolic value.
///
/// Named symbols are interned by name and round-trip through the codec;
/// unique symbols carry only a description and have no identity that
/// could survive persistence, so encoding one is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Named(String),
    Unique(String),
}

impl Symbol {
    pub fn named(name: impl Into<String>) -> Self {
        Symbol::Named(name.into())
    }

    pub fn unique(description: impl Into<String>) -> Self {
        Symbol::Unique(description.into())
    }

    /// The interned name, if this symbol has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Symbol::Named(name) => Some(name),
            Symbol::Unique(_) => None,
        }
    }
}
