//! Payload flattening.
//!
//! Webhook bodies are arbitrary provider JSON. Downstream nodes address
//! individual values by a synthetic key built from the originating node id
//! and the value's path: object keys are joined with `_`, array indices with
//! `__`. For example `{"a":1,"b":[true,null]}` under prefix `n` becomes
//! `n_a`, `n_b__0` and `n_b__1`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Separator placed before an object key.
pub const KEY_SEPARATOR: &str = "_";

/// Separator placed before an array index.
pub const INDEX_SEPARATOR: &str = "__";

/// A flat mapping from synthetic keys to scalar or null values.
///
/// Keys are kept sorted so the serialized form is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatPayload(BTreeMap<String, JsonValue>);

impl FlatPayload {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Returns the value under `key` rendered for use in a URL or header.
    ///
    /// Strings are returned verbatim, numbers and booleans in their JSON form.
    /// Null, empty strings and missing keys yield `None`.
    #[must_use]
    pub fn get_text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            JsonValue::String(s) if s.is_empty() => None,
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            JsonValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Stores a scalar value, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, JsonValue)> for FlatPayload {
    fn from_iter<I: IntoIterator<Item = (String, JsonValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Flattens `value` under `prefix` into a new payload.
#[must_use]
pub fn flatten(value: &JsonValue, prefix: &str) -> FlatPayload {
    let mut out = FlatPayload::new();
    flatten_into(value, prefix, &mut out);
    out
}

/// Flattens `value` under `prefix`, adding entries to `out`.
///
/// Empty objects and arrays contribute nothing.
pub fn flatten_into(value: &JsonValue, prefix: &str, out: &mut FlatPayload) {
    match value {
        JsonValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(item, &format!("{prefix}{INDEX_SEPARATOR}{i}"), out);
            }
        }
        JsonValue::Object(fields) => {
            for (key, item) in fields {
                flatten_into(item, &format!("{prefix}{KEY_SEPARATOR}{key}"), out);
            }
        }
        JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_) | JsonValue::Null => {
            out.0.insert(prefix.to_string(), value.clone());
        }
    }
}
