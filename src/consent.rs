use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{ConsentState, ConsentUpdate};
use crate::storage::{keys, KeyValueStore};

/// Source of truth for whether tracking is permitted.
///
/// Reads and writes the persisted consent record and broadcasts every change
/// so the pixel loader and event tracker re-evaluate without a reload.
pub struct ConsentStore {
    store: Arc<dyn KeyValueStore>,
    tx: watch::Sender<ConsentState>,
}

impl ConsentStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let initial = load(store.as_ref());
        let (tx, _rx) = watch::channel(initial);
        Self { store, tx }
    }

    /// Returns the current consent record, or the fail-closed default when
    /// nothing is stored.
    pub fn current(&self) -> ConsentState {
        load(self.store.as_ref())
    }

    /// Applies a banner interaction: merges the partial update into the
    /// stored record, forces `functional` on, stamps the interaction time,
    /// persists, and notifies subscribers.
    pub fn set(&self, update: ConsentUpdate) {
        let mut state = self.current();
        if let Some(analytics) = update.analytics {
            state.analytics = analytics;
        }
        if let Some(marketing) = update.marketing {
            state.marketing = marketing;
        }
        state.functional = true;
        state.timestamp = chrono::Utc::now().timestamp_millis();

        match serde_json::to_string(&state) {
            Ok(json) => self.store.set(keys::CONSENT, &json),
            Err(e) => tracing::warn!("Failed to persist consent record: {}", e),
        }

        tracing::info!(
            "Consent updated: analytics={}, marketing={}",
            state.analytics,
            state.marketing
        );
        self.tx.send_replace(state);
    }

    /// Subscribes to consent changes. The receiver yields the record as of
    /// subscription time and every record written afterwards.
    pub fn subscribe(&self) -> watch::Receiver<ConsentState> {
        self.tx.subscribe()
    }

    pub fn analytics_allowed(&self) -> bool {
        self.current().analytics
    }

    pub fn marketing_allowed(&self) -> bool {
        self.current().marketing
    }
}

/// Parses the stored record. The legacy simple form, the bare strings
/// `"true"` or `"false"`, is still accepted and implies both analytics and
/// marketing.
fn load(store: &dyn KeyValueStore) -> ConsentState {
    let Some(raw) = store.get(keys::CONSENT) else {
        return ConsentState::default();
    };

    match raw.trim() {
        "true" => {
            return ConsentState {
                analytics: true,
                marketing: true,
                functional: true,
                timestamp: 0,
            }
        }
        "false" => return ConsentState::default(),
        _ => {}
    }

    match serde_json::from_str::<ConsentState>(&raw) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!("Unreadable consent record, treating as no consent: {}", e);
            ConsentState::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn test_absent_record_means_no_consent() {
        let consent = ConsentStore::new(store());
        let state = consent.current();
        assert!(!state.analytics);
        assert!(!state.marketing);
        assert!(state.functional);
    }

    #[test]
    fn test_legacy_boolean_string_accepted() {
        let kv = store();
        kv.set(keys::CONSENT, "true");
        let consent = ConsentStore::new(kv.clone());
        assert!(consent.analytics_allowed());
        assert!(consent.marketing_allowed());

        kv.set(keys::CONSENT, "false");
        assert!(!consent.analytics_allowed());
    }

    #[test]
    fn test_set_merges_and_forces_functional() {
        let consent = ConsentStore::new(store());
        consent.set(ConsentUpdate {
            analytics: Some(true),
            marketing: None,
        });

        let state = consent.current();
        assert!(state.analytics);
        assert!(!state.marketing);
        assert!(state.functional);
        assert!(state.timestamp > 0);

        // Second interaction keeps the earlier analytics grant.
        consent.set(ConsentUpdate {
            analytics: None,
            marketing: Some(true),
        });
        let state = consent.current();
        assert!(state.analytics);
        assert!(state.marketing);
    }

    #[test]
    fn test_corrupt_record_fails_closed() {
        let kv = store();
        kv.set(keys::CONSENT, "{not json");
        let consent = ConsentStore::new(kv);
        assert!(!consent.analytics_allowed());
    }

    #[tokio::test]
    async fn test_subscribers_notified_on_change() {
        let consent = ConsentStore::new(store());
        let mut rx = consent.subscribe();
        assert!(!rx.borrow().analytics);

        consent.set(ConsentUpdate {
            analytics: Some(true),
            marketing: Some(true),
        });

        rx.changed().await.expect("sender alive");
        assert!(rx.borrow().analytics);
    }
}
