use std::collections::HashMap;
use std::sync::RwLock;

/// Storage keys shared by the stores built on [`KeyValueStore`].
pub mod keys {
    /// Durable consent record.
    pub const CONSENT: &str = "cookie_consent";
    /// Tab-scoped session identifier.
    pub const SESSION_ID: &str = "session_id";
    /// Tab-scoped first-touch campaign parameters.
    pub const UTM_PARAMS: &str = "utm_params";
    /// Durable compare-list selection.
    pub const COMPARE_LIST: &str = "compare_list";
}

/// String key-value storage seam.
///
/// The portal frontends back this with browser `localStorage` (durable scope)
/// and `sessionStorage` (tab scope); headless embedders and tests use
/// [`MemoryStore`]. Two separate instances express the two scopes.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory [`KeyValueStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner
            .read()
            .ok()
            .and_then(|map| map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("missing").is_none());

        store.set("k", "v1");
        assert_eq!(store.get("k").as_deref(), Some("v1"));

        store.set("k", "v2");
        assert_eq!(store.get("k").as_deref(), Some("v2"));

        store.remove("k");
        assert!(store.get("k").is_none());
    }
}
