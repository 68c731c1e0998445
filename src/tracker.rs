use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::consent::ConsentStore;
use crate::models::AnalyticsEventRow;
use crate::pixels::PixelRegistry;
use crate::routes::RouteFilter;
use crate::services::IngestService;
use crate::session::SessionContext;

/// Scroll-depth milestones reported once per page visit.
pub const SCROLL_MILESTONES: [u8; 4] = [25, 50, 75, 100];

/// First-party event tracker with consent-gated third-party mirroring.
///
/// `track` never surfaces an error to the caller: first-party persistence is
/// fire-and-forget (failures are logged and swallowed) and mirroring only
/// reaches tracking objects that are actually present.
pub struct EventTracker {
    consent: Arc<ConsentStore>,
    session: Arc<SessionContext>,
    ingest: Arc<IngestService>,
    pixels: Arc<PixelRegistry>,
    routes: RouteFilter,
    debounce_window: Duration,
    debounced: Mutex<Option<JoinHandle<()>>>,
    scroll: Mutex<ScrollDepthState>,
}

#[derive(Debug, Default)]
struct ScrollDepthState {
    fired: [bool; SCROLL_MILESTONES.len()],
}

impl EventTracker {
    pub fn new(
        consent: Arc<ConsentStore>,
        session: Arc<SessionContext>,
        ingest: Arc<IngestService>,
        pixels: Arc<PixelRegistry>,
        routes: RouteFilter,
        debounce_window: Duration,
    ) -> Self {
        Self {
            consent,
            session,
            ingest,
            pixels,
            routes,
            debounce_window,
            debounced: Mutex::new(None),
            scroll: Mutex::new(ScrollDepthState::default()),
        }
    }

    /// Records an event. Always attempts first-party persistence; mirrors to
    /// third-party pixels only while analytics consent is granted. Excluded
    /// routes are not tracked at all.
    pub async fn track(&self, event_name: &str, data: Value) {
        let page_path = self.session.current_page().unwrap_or_else(|| "/".to_string());
        if self.routes.is_excluded(&page_path) {
            tracing::debug!("Route {} excluded from tracking", page_path);
            return;
        }

        let utm = self.session.utm();
        let row = AnalyticsEventRow {
            event_name: event_name.to_string(),
            event_data: data.clone(),
            session_id: self.session.session_id(),
            page_url: page_path,
            page_title: self.session.current_title(),
            referrer: self.session.referrer_domain(),
            device_type: self.session.device_type(),
            language: self.session.language().to_string(),
            utm_source: utm.utm_source,
            utm_medium: utm.utm_medium,
            utm_campaign: utm.utm_campaign,
            utm_term: utm.utm_term,
            utm_content: utm.utm_content,
        };

        let ingest = Arc::clone(&self.ingest);
        tokio::spawn(async move {
            if let Err(e) = ingest.insert_event(&row).await {
                tracing::debug!("Analytics event persistence failed (ignored): {}", e);
            }
        });

        if self.consent.analytics_allowed() {
            let mirrored = self.pixels.mirror(event_name, &data);
            if mirrored > 0 {
                tracing::debug!("Event '{}' mirrored to {} pixel(s)", event_name, mirrored);
            }
        }
    }

    /// Debounced variant for high-frequency signals: calls within the
    /// configured window collapse to the last one.
    pub fn track_debounced(self: &Arc<Self>, event_name: &str, data: Value) {
        let tracker = Arc::clone(self);
        let event_name = event_name.to_string();
        let window = self.debounce_window;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            tracker.track(&event_name, data).await;
        });

        let mut slot = self.debounced.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Records a navigation: updates the session page trail, re-arms the
    /// scroll-depth milestones, and tracks a `page_view` event.
    pub async fn track_page_view(&self, path: &str, title: Option<&str>) {
        self.session.enter_page(path, title);
        {
            let mut scroll = self.scroll.lock().unwrap_or_else(|e| e.into_inner());
            *scroll = ScrollDepthState::default();
        }
        self.track("page_view", json!({})).await;
    }

    /// Reports a scroll position. Each crossed milestone (25/50/75/100%)
    /// fires exactly once per page visit; a milestone already reported for
    /// the current page never re-fires.
    pub async fn track_scroll(&self, percent: u8) {
        let newly_crossed: Vec<u8> = {
            let mut scroll = self.scroll.lock().unwrap_or_else(|e| e.into_inner());
            let mut crossed = Vec::new();
            for (i, milestone) in SCROLL_MILESTONES.iter().enumerate() {
                if percent >= *milestone && !scroll.fired[i] {
                    scroll.fired[i] = true;
                    crossed.push(*milestone);
                }
            }
            crossed
        };

        for milestone in newly_crossed {
            self.track("scroll_depth", json!({ "depth": milestone })).await;
        }
    }
}
