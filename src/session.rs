use std::sync::{Arc, Mutex};

use crate::models::{DeviceType, UtmParams};
use crate::storage::{keys, KeyValueStore};

/// Per-tab browsing session: identity, first-touch campaign capture, and the
/// page trail the attribution snapshot is assembled from.
///
/// Backed by the tab-scoped store, so the identity survives reloads within a
/// tab but never crosses tabs or browser restarts.
pub struct SessionContext {
    store: Arc<dyn KeyValueStore>,
    device_type: DeviceType,
    language: String,
    /// Referrer reduced to hostname at construction time. The full URL may
    /// carry query or path PII and is dropped immediately.
    referrer_domain: Option<String>,
    trail: Mutex<PageTrail>,
}

#[derive(Debug, Default)]
struct PageTrail {
    landing_page: Option<String>,
    current_page: Option<String>,
    current_title: Option<String>,
}

impl SessionContext {
    /// Builds the session context from the environment the embedder observed
    /// at startup: the user agent, the browser language, and the raw referrer.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        user_agent: &str,
        language: &str,
        referrer: Option<&str>,
    ) -> Self {
        Self {
            store,
            device_type: DeviceType::from_user_agent(user_agent),
            language: language.to_string(),
            referrer_domain: referrer.and_then(reduce_to_hostname),
            trail: Mutex::new(PageTrail::default()),
        }
    }

    /// Returns the session identifier, creating it on first access.
    /// Never regenerated within the session.
    pub fn session_id(&self) -> String {
        if let Some(id) = self.store.get(keys::SESSION_ID) {
            return id;
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.store.set(keys::SESSION_ID, &id);
        tracing::debug!("✓ Session id created: {}", id);
        id
    }

    /// First-touch campaign capture. Stores the `utm_*` parameters of the
    /// given URL once per session; later URLs never overwrite the record.
    pub fn capture_utm(&self, url: &str) {
        if self.store.get(keys::UTM_PARAMS).is_some() {
            return;
        }
        let query = match url.split_once('?') {
            Some((_, query)) => query,
            None => return,
        };
        let utm = UtmParams::from_query(query);
        if utm.is_empty() {
            return;
        }
        match serde_json::to_string(&utm) {
            Ok(json) => {
                self.store.set(keys::UTM_PARAMS, &json);
                tracing::debug!("✓ Campaign parameters captured: {:?}", utm.utm_source);
            }
            Err(e) => tracing::warn!("Failed to persist campaign parameters: {}", e),
        }
    }

    /// Returns the captured campaign parameters, empty when none were seen.
    pub fn utm(&self) -> UtmParams {
        self.store
            .get(keys::UTM_PARAMS)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    /// Records a navigation. The first tracked page becomes the landing page
    /// for the rest of the session.
    pub fn enter_page(&self, path: &str, title: Option<&str>) {
        let mut trail = self.trail.lock().unwrap_or_else(|e| e.into_inner());
        if trail.landing_page.is_none() {
            trail.landing_page = Some(path.to_string());
        }
        trail.current_page = Some(path.to_string());
        trail.current_title = title.map(|t| t.to_string());
    }

    pub fn landing_page(&self) -> Option<String> {
        self.trail
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .landing_page
            .clone()
    }

    pub fn current_page(&self) -> Option<String> {
        self.trail
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_page
            .clone()
    }

    pub fn current_title(&self) -> Option<String> {
        self.trail
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_title
            .clone()
    }

    pub fn referrer_domain(&self) -> Option<String> {
        self.referrer_domain.clone()
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

fn reduce_to_hostname(referrer: &str) -> Option<String> {
    match url::Url::parse(referrer) {
        Ok(url) => url.host_str().map(|h| h.to_string()),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn context() -> SessionContext {
        SessionContext::new(
            Arc::new(MemoryStore::new()),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
            "ar-EG",
            Some("https://www.google.com/search?q=new+capital+apartments"),
        )
    }

    #[test]
    fn test_session_id_is_stable() {
        let ctx = context();
        let first = ctx.session_id();
        let second = ctx.session_id();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_utm_capture_is_first_touch_only() {
        let ctx = context();
        ctx.capture_utm("/properties"); // no query, nothing captured
        assert!(ctx.utm().is_empty());

        ctx.capture_utm("/?utm_source=google&utm_campaign=spring");
        assert_eq!(ctx.utm().utm_source.as_deref(), Some("google"));

        // Later campaign URLs never overwrite the first touch.
        ctx.capture_utm("/?utm_source=facebook");
        assert_eq!(ctx.utm().utm_source.as_deref(), Some("google"));
        assert_eq!(ctx.utm().utm_campaign.as_deref(), Some("spring"));
    }

    #[test]
    fn test_landing_and_current_page_trail() {
        let ctx = context();
        assert!(ctx.landing_page().is_none());

        ctx.enter_page("/properties", Some("Properties"));
        ctx.enter_page("/find-property", None);

        assert_eq!(ctx.landing_page().as_deref(), Some("/properties"));
        assert_eq!(ctx.current_page().as_deref(), Some("/find-property"));
        assert!(ctx.current_title().is_none());
    }

    #[test]
    fn test_referrer_reduced_to_hostname() {
        let ctx = context();
        assert_eq!(ctx.referrer_domain().as_deref(), Some("www.google.com"));

        let no_ref = SessionContext::new(Arc::new(MemoryStore::new()), "ua", "en", None);
        assert!(no_ref.referrer_domain().is_none());
    }
}
