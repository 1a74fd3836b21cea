//! Session Data
//!
//! Key/value data that survives across screens and flows for the lifetime of
//! the process (login state, the user's name, a selected item id...).
//!
//! # Merge Policy
//!
//! [`SessionStore::merge`] is shallow: each top-level key in the update
//! replaces the stored value wholesale. Nested objects are never deep-merged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Session bookkeeping
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// When the store was created (Unix timestamp ms)
    pub created_at: u64,
    /// When the store was last written (Unix timestamp ms)
    pub last_modified_at: u64,
    /// Number of write operations applied
    pub write_count: u64,
}

impl SessionMetadata {
    fn new() -> Self {
        let now = now_ms();
        Self {
            created_at: now,
            last_modified_at: now,
            write_count: 0,
        }
    }

    fn touch(&mut self) {
        self.last_modified_at = now_ms();
        self.write_count = self.write_count.saturating_add(1);
    }
}

/// Cross-screen key/value store
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionStore {
    data: Map<String, Value>,
    /// Store metadata
    pub metadata: SessionMetadata,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Map::new(),
            metadata: SessionMetadata::new(),
        }
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        tracing::trace!(key = %key, "Session set");
        self.data.insert(key, value);
        self.metadata.touch();
    }

    /// Read a value; `None` on miss
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Shallow top-level merge, last write wins. Returns the touched keys.
    pub fn merge(&mut self, partial: Map<String, Value>) -> Vec<String> {
        if partial.is_empty() {
            return Vec::new();
        }
        let keys: Vec<String> = partial.keys().cloned().collect();
        for (key, value) in partial {
            self.data.insert(key, value);
        }
        self.metadata.touch();
        tracing::debug!(keys = ?keys, "Session merged");
        keys
    }

    /// Remove one key, returning its value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.metadata.touch();
        }
        removed
    }

    /// Remove every key (keeps metadata)
    pub fn clear(&mut self) {
        if !self.data.is_empty() {
            tracing::debug!(count = self.data.len(), "Session cleared");
            self.data.clear();
            self.metadata.touch();
        }
    }

    /// Whether `key` is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// All stored keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Borrow the underlying map (for variable resolution)
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Deep copy of the stored data
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.data.clone()
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Get current timestamp in milliseconds
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_round_trip_nested_values() {
        let mut store = SessionStore::new();
        let value = json!({"profile": {"name": "ann", "tags": ["a", "b"]}, "n": 1.5});

        store.set("user", value.clone());

        assert_eq!(store.get("user"), Some(&value));
        assert_eq!(store.metadata.write_count, 1);
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = SessionStore::new();
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut store = SessionStore::new();
        store.merge(obj(json!({"a": 1})));
        let touched = store.merge(obj(json!({"a": 2, "b": 3})));

        assert_eq!(touched, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(Value::Object(store.snapshot()), json!({"a": 2, "b": 3}));
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut store = SessionStore::new();
        store.set("prefs", json!({"theme": "dark", "lang": "en"}));
        store.merge(obj(json!({"prefs": {"theme": "light"}})));

        assert_eq!(store.get("prefs"), Some(&json!({"theme": "light"})));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = SessionStore::new();
        store.set("a", json!(1));
        store.set("b", json!(2));

        assert_eq!(store.remove("a"), Some(json!(1)));
        assert_eq!(store.remove("a"), None);
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut store = SessionStore::new();
        store.set("list", json!([1, 2]));

        let mut snapshot = store.snapshot();
        snapshot.insert("list".to_string(), json!([]));

        assert_eq!(store.get("list"), Some(&json!([1, 2])));
    }
}
