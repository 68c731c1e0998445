use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::consent::ConsentStore;
use crate::models::{LeadAttributionSnapshot, SessionEvent, SessionEventRow};
use crate::services::IngestService;
use crate::session::SessionContext;

/// Capacity of the in-memory session event buffer.
pub const SESSION_EVENT_CAPACITY: usize = 10;
/// Maximum entries in the attribution snapshot's event summary.
pub const EVENTS_SUMMARY_LIMIT: usize = 5;
/// Maximum entries returned by `last_viewed_properties`.
pub const LAST_VIEWED_LIMIT: usize = 5;

/// Metadata keys that may accompany a session event. Anything else is
/// dropped before the event is buffered or persisted, so a stray form value
/// or email address can never leak into attribution data.
const META_ALLOWED_KEYS: &[&str] = &[
    "property_type",
    "price",
    "currency",
    "bedrooms",
    "bathrooms",
    "area",
    "city",
    "district",
    "finishing",
    "status",
    "page",
    "position",
    "query",
    "sort",
    "value",
];

/// Bounded session-event buffer and lead-attribution assembly.
///
/// Owned by the session-scoped context and passed by reference to
/// event-emitting call sites. Holds the last [`SESSION_EVENT_CAPACITY`]
/// interaction events and derives the attribution snapshot at
/// lead-submission time.
pub struct AttributionEngine {
    consent: Arc<ConsentStore>,
    session: Arc<SessionContext>,
    ingest: Arc<IngestService>,
    buffer: Mutex<VecDeque<SessionEvent>>,
}

impl AttributionEngine {
    pub fn new(
        consent: Arc<ConsentStore>,
        session: Arc<SessionContext>,
        ingest: Arc<IngestService>,
    ) -> Self {
        Self {
            consent,
            session,
            ingest,
            buffer: Mutex::new(VecDeque::with_capacity(SESSION_EVENT_CAPACITY)),
        }
    }

    /// Records an interaction event: sanitizes the metadata, appends to the
    /// bounded buffer (evicting the oldest beyond capacity), and mirrors the
    /// sanitized event to the remote session-event table when analytics
    /// consent is granted. Remote persistence is fire-and-forget.
    pub fn log_session_event(
        &self,
        event_name: &str,
        entity_id: Option<&str>,
        meta: Option<Map<String, Value>>,
    ) {
        let event = SessionEvent {
            event_name: event_name.to_string(),
            page_path: self.session.current_page().unwrap_or_else(|| "/".to_string()),
            entity_id: entity_id.map(|id| id.to_string()),
            meta: meta.and_then(sanitize_meta),
            ts: chrono::Utc::now().timestamp_millis(),
        };

        {
            let mut buffer = self.lock();
            if buffer.len() >= SESSION_EVENT_CAPACITY {
                buffer.pop_front();
            }
            buffer.push_back(event.clone());
        }

        if !self.consent.analytics_allowed() {
            return;
        }

        let row = SessionEventRow {
            session_id: self.session.session_id(),
            event_name: event.event_name,
            page_path: event.page_path,
            entity_id: event.entity_id,
            meta: event.meta,
        };
        let ingest = Arc::clone(&self.ingest);
        tokio::spawn(async move {
            if let Err(e) = ingest.insert_session_event(&row).await {
                tracing::debug!("Session event persistence failed (ignored): {}", e);
            }
        });
    }

    /// Assembles the lead-attribution snapshot. The campaign field group
    /// (`utm_*`, referrer domain, event summary) is present only while
    /// analytics consent is granted; with consent denied every gated field
    /// is null or empty, never a partial mix.
    pub fn lead_attribution(&self) -> LeadAttributionSnapshot {
        let analytics = self.consent.analytics_allowed();
        let utm = if analytics {
            self.session.utm()
        } else {
            Default::default()
        };

        LeadAttributionSnapshot {
            session_id: self.session.session_id(),
            landing_page: self.session.landing_page(),
            last_page_before_submit: self.session.current_page(),
            device_type: self.session.device_type(),
            browser_language: self.session.language().to_string(),
            utm_source: utm.utm_source,
            utm_medium: utm.utm_medium,
            utm_campaign: utm.utm_campaign,
            utm_term: utm.utm_term,
            utm_content: utm.utm_content,
            referrer_domain: if analytics {
                self.session.referrer_domain()
            } else {
                None
            },
            last_events_summary: if analytics {
                self.events_summary()
            } else {
                Vec::new()
            },
        }
    }

    /// Up to [`LAST_VIEWED_LIMIT`] most recently viewed distinct property
    /// ids, newest first.
    pub fn last_viewed_properties(&self) -> Vec<String> {
        let buffer = self.lock();
        let mut seen = Vec::new();
        for event in buffer.iter().rev() {
            if event.event_name != "property_viewed" {
                continue;
            }
            let Some(ref id) = event.entity_id else {
                continue;
            };
            if seen.contains(id) {
                continue;
            }
            seen.push(id.clone());
            if seen.len() >= LAST_VIEWED_LIMIT {
                break;
            }
        }
        seen
    }

    /// Buffered events, oldest first.
    pub fn buffered_events(&self) -> Vec<SessionEvent> {
        self.lock().iter().cloned().collect()
    }

    fn events_summary(&self) -> Vec<String> {
        self.lock()
            .iter()
            .rev()
            .take(EVENTS_SUMMARY_LIMIT)
            .map(|event| match event.entity_id {
                Some(ref id) => format!("{}:{}", event.event_name, id),
                None => event.event_name.clone(),
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<SessionEvent>> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keeps only allow-listed metadata keys. Returns `None` when nothing
/// survives, so an all-dropped map is stored as absent metadata.
pub fn sanitize_meta(meta: Map<String, Value>) -> Option<Map<String, Value>> {
    let sanitized: Map<String, Value> = meta
        .into_iter()
        .filter(|(key, _)| META_ALLOWED_KEYS.contains(&key.as_str()))
        .collect();
    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn engine() -> AttributionEngine {
        let config = Config {
            portal_api_url: "http://127.0.0.1:1".to_string(),
            portal_api_key: "anon".to_string(),
            settings_cache_ttl_secs: 300,
            excluded_routes: vec![],
            debounce_ms: 300,
            request_timeout_secs: 1,
        };
        let session = Arc::new(SessionContext::new(
            Arc::new(MemoryStore::new()),
            "test-agent",
            "en",
            None,
        ));
        AttributionEngine::new(
            Arc::new(ConsentStore::new(Arc::new(MemoryStore::new()))),
            session,
            Arc::new(IngestService::new(&config).expect("ingest service")),
        )
    }

    fn meta(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_buffer_bounded_fifo() {
        let engine = engine();
        for i in 0..15 {
            engine.log_session_event(&format!("event_{}", i), None, None);
        }

        let events = engine.buffered_events();
        assert_eq!(events.len(), SESSION_EVENT_CAPACITY);
        assert_eq!(events[0].event_name, "event_5");
        assert_eq!(events[9].event_name, "event_14");
    }

    #[test]
    fn test_meta_sanitized_against_allow_list() {
        let engine = engine();
        engine.log_session_event(
            "x",
            None,
            Some(meta(&[
                ("bedrooms", json!(3)),
                ("email", json!("a@b.com")),
            ])),
        );

        let events = engine.buffered_events();
        let stored = events[0].meta.as_ref().expect("meta kept");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.get("bedrooms"), Some(&json!(3)));
        assert!(stored.get("email").is_none());
    }

    #[test]
    fn test_meta_dropped_entirely_when_nothing_survives() {
        let engine = engine();
        engine.log_session_event("x", None, Some(meta(&[("phone", json!("0100000"))])));
        assert!(engine.buffered_events()[0].meta.is_none());
    }

    #[test]
    fn test_last_viewed_distinct_recency_order() {
        let engine = engine();
        for id in ["A", "B", "A", "C", "D"] {
            engine.log_session_event("property_viewed", Some(id), None);
        }
        engine.log_session_event("search_performed", None, None);

        assert_eq!(engine.last_viewed_properties(), vec!["D", "C", "A", "B"]);
    }

    #[test]
    fn test_events_summary_capped_and_newest_first() {
        let engine = engine();
        for i in 0..8 {
            engine.log_session_event(&format!("e{}", i), None, None);
        }
        engine.log_session_event("property_viewed", Some("42"), None);

        let snapshot_summary = engine.events_summary();
        assert_eq!(snapshot_summary.len(), EVENTS_SUMMARY_LIMIT);
        assert_eq!(snapshot_summary[0], "property_viewed:42");
    }
}
