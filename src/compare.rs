use std::sync::{Arc, Mutex};

use crate::storage::{keys, KeyValueStore};

/// Maximum number of properties in a comparison.
pub const COMPARE_LIMIT: usize = 2;

/// Outcome of an [`CompareStore::add`] call. Every call yields an explicit
/// outcome so the caller can show the right UI, a "replace oldest?" prompt
/// on `LimitReached` in particular.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Duplicate,
    LimitReached,
}

/// Bounded property selection for side-by-side comparison.
///
/// Holds at most [`COMPARE_LIMIT`] distinct ids in insertion order and writes
/// every mutation through to durable local storage.
pub struct CompareStore {
    store: Arc<dyn KeyValueStore>,
    ids: Mutex<Vec<String>>,
}

impl CompareStore {
    /// Loads the persisted selection, dropping duplicates and anything past
    /// the limit left behind by older clients.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let mut ids: Vec<String> = store
            .get(keys::COMPARE_LIST)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        ids.dedup();
        ids.truncate(COMPARE_LIMIT);
        Self {
            store,
            ids: Mutex::new(ids),
        }
    }

    pub fn add(&self, id: &str) -> AddOutcome {
        let mut ids = self.lock();
        if ids.iter().any(|existing| existing == id) {
            return AddOutcome::Duplicate;
        }
        if ids.len() >= COMPARE_LIMIT {
            return AddOutcome::LimitReached;
        }
        ids.push(id.to_string());
        self.persist(&ids);
        AddOutcome::Added
    }

    pub fn remove(&self, id: &str) {
        let mut ids = self.lock();
        ids.retain(|existing| existing != id);
        self.persist(&ids);
    }

    pub fn clear(&self) {
        let mut ids = self.lock();
        ids.clear();
        self.persist(&ids);
    }

    /// Drops the oldest-inserted id and appends `new_id`. No-op when
    /// `new_id` is already selected: no duplicate is created and the
    /// existing order is kept.
    pub fn replace_oldest(&self, new_id: &str) {
        let mut ids = self.lock();
        if ids.iter().any(|existing| existing == new_id) {
            return;
        }
        if !ids.is_empty() {
            ids.remove(0);
        }
        ids.push(new_id.to_string());
        ids.truncate(COMPARE_LIMIT);
        self.persist(&ids);
    }

    /// Keeps only ids the backend still knows. Used after a compare-list
    /// fetch to silently prune stale selections instead of erroring.
    pub fn prune(&self, valid_ids: &[String]) {
        let mut ids = self.lock();
        let before = ids.len();
        ids.retain(|id| valid_ids.contains(id));
        if ids.len() != before {
            tracing::debug!("Pruned {} stale compare id(s)", before - ids.len());
            self.persist(&ids);
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.lock().iter().any(|existing| existing == id)
    }

    pub fn is_full(&self) -> bool {
        self.lock().len() >= COMPARE_LIMIT
    }

    /// Selected ids in insertion order, oldest first.
    pub fn ids(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.ids.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, ids: &[String]) {
        match serde_json::to_string(ids) {
            Ok(json) => self.store.set(keys::COMPARE_LIST, &json),
            Err(e) => tracing::warn!("Failed to persist compare list: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn compare() -> CompareStore {
        CompareStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_add_bounds() {
        let store = compare();
        assert_eq!(store.add("A"), AddOutcome::Added);
        assert_eq!(store.add("B"), AddOutcome::Added);
        assert_eq!(store.add("C"), AddOutcome::LimitReached);
        assert_eq!(store.ids(), vec!["A", "B"]);
        assert!(store.is_full());
    }

    #[test]
    fn test_add_duplicate_regardless_of_fullness() {
        let store = compare();
        store.add("A");
        assert_eq!(store.add("A"), AddOutcome::Duplicate);
        store.add("B");
        assert_eq!(store.add("A"), AddOutcome::Duplicate);
        assert_eq!(store.add("B"), AddOutcome::Duplicate);
    }

    #[test]
    fn test_replace_oldest() {
        let store = compare();
        store.add("A");
        store.add("B");

        store.replace_oldest("C");
        assert_eq!(store.ids(), vec!["B", "C"]);

        // Replacing with an already-present id changes nothing.
        store.replace_oldest("B");
        assert_eq!(store.ids(), vec!["B", "C"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = compare();
        store.add("A");
        store.add("B");
        store.remove("A");
        assert_eq!(store.ids(), vec!["B"]);
        assert!(!store.is_full());

        store.clear();
        assert!(store.ids().is_empty());
    }

    #[test]
    fn test_selection_survives_reload() {
        let kv = Arc::new(MemoryStore::new());
        {
            let store = CompareStore::new(kv.clone());
            store.add("A");
            store.add("B");
        }
        let reloaded = CompareStore::new(kv);
        assert_eq!(reloaded.ids(), vec!["A", "B"]);
    }

    #[test]
    fn test_prune_keeps_valid_ids_only() {
        let store = compare();
        store.add("A");
        store.add("B");
        store.prune(&["B".to_string(), "Z".to_string()]);
        assert_eq!(store.ids(), vec!["B"]);
    }
}
