use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::consent::ConsentStore;
use crate::services::SettingsService;

/// Third-party tracking vendors the portal can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelVendor {
    Ga4,
    MetaPixel,
}

impl PixelVendor {
    pub const ALL: [PixelVendor; 2] = [PixelVendor::Ga4, PixelVendor::MetaPixel];

    /// Stable id of the injected script element. The idempotency check keys
    /// on this id, so a vendor is injected at most once per page lifetime.
    pub fn element_id(&self) -> &'static str {
        match self {
            PixelVendor::Ga4 => "ga4-tag-script",
            PixelVendor::MetaPixel => "meta-pixel-script",
        }
    }

    /// Key of the vendor's row in the remote settings table.
    pub fn settings_key(&self) -> &'static str {
        match self {
            PixelVendor::Ga4 => "ga4_measurement_id",
            PixelVendor::MetaPixel => "meta_pixel_id",
        }
    }

    fn script_src(&self, value: &str) -> String {
        match self {
            PixelVendor::Ga4 => {
                format!("https://www.googletagmanager.com/gtag/js?id={}", value)
            }
            PixelVendor::MetaPixel => {
                format!("https://connect.facebook.net/en_US/fbevents.js#id={}", value)
            }
        }
    }
}

// ============ Event mirroring ============

/// A live third-party tracking object (gtag, fbq) events are mirrored into.
pub trait PixelHook: Send + Sync {
    fn send(&self, event_name: &str, payload: &Value);
}

/// Registry of the third-party tracking objects currently present.
///
/// A vendor whose script never loaded simply has no hook here; mirroring
/// checks for presence and treats absence as normal, not as an error.
#[derive(Default)]
pub struct PixelRegistry {
    hooks: RwLock<HashMap<PixelVendor, Arc<dyn PixelHook>>>,
}

impl PixelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, vendor: PixelVendor, hook: Arc<dyn PixelHook>) {
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.insert(vendor, hook);
        }
    }

    pub fn has(&self, vendor: PixelVendor) -> bool {
        self.hooks
            .read()
            .map(|hooks| hooks.contains_key(&vendor))
            .unwrap_or(false)
    }

    /// Mirrors an event to every present tracking object. Returns how many
    /// vendors received it.
    pub fn mirror(&self, event_name: &str, payload: &Value) -> usize {
        let Ok(hooks) = self.hooks.read() else {
            return 0;
        };
        for hook in hooks.values() {
            hook.send(event_name, payload);
        }
        hooks.len()
    }
}

// ============ Script injection ============

/// Idempotent side-effecting script acquisition keyed by a stable element id.
///
/// Browser embedders append a `<script>` tag to the document; headless
/// embedders and tests record the injection instead.
pub trait ScriptInjector: Send + Sync {
    /// True when a script with this element id has already been injected.
    fn contains(&self, element_id: &str) -> bool;
    fn inject(&self, element_id: &str, src: &str);
}

/// Recording [`ScriptInjector`] for headless use.
#[derive(Default)]
pub struct InMemoryInjector {
    injected: Mutex<HashMap<String, String>>,
}

impl InMemoryInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources injected so far, keyed by element id.
    pub fn injected(&self) -> HashMap<String, String> {
        self.injected
            .lock()
            .map(|map| map.clone())
            .unwrap_or_default()
    }
}

impl ScriptInjector for InMemoryInjector {
    fn contains(&self, element_id: &str) -> bool {
        self.injected
            .lock()
            .map(|map| map.contains_key(element_id))
            .unwrap_or(false)
    }

    fn inject(&self, element_id: &str, src: &str) {
        if let Ok(mut map) = self.injected.lock() {
            map.insert(element_id.to_string(), src.to_string());
        }
    }
}

// ============ Loader ============

/// Per-vendor script loader: `NotLoaded -> Loaded`, terminal and idempotent.
///
/// A vendor loads when its consent category is granted and its remote
/// setting is enabled with a non-empty value. Revoking consent later in the
/// session does not unload an already-injected script; that is a known
/// limitation of script injection, kept as-is.
pub struct PixelLoader {
    settings: Arc<SettingsService>,
    injector: Arc<dyn ScriptInjector>,
    consent: Arc<ConsentStore>,
    loaded: Mutex<HashSet<PixelVendor>>,
}

impl PixelLoader {
    pub fn new(
        settings: Arc<SettingsService>,
        injector: Arc<dyn ScriptInjector>,
        consent: Arc<ConsentStore>,
    ) -> Self {
        Self {
            settings,
            injector,
            consent,
            loaded: Mutex::new(HashSet::new()),
        }
    }

    /// Re-evaluates every vendor against current consent and remote
    /// settings, injecting whichever became eligible. Safe to call any
    /// number of times.
    pub async fn evaluate(&self) {
        let consent = self.consent.current();

        for vendor in PixelVendor::ALL {
            let granted = match vendor {
                PixelVendor::Ga4 => consent.analytics,
                PixelVendor::MetaPixel => consent.marketing,
            };
            if !granted || self.is_loaded(vendor) {
                continue;
            }

            let setting = match self.settings.get(vendor.settings_key()).await {
                Ok(Some(setting)) if setting.is_active() => setting,
                Ok(_) => {
                    tracing::debug!("{:?} disabled or unconfigured, skipping", vendor);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Settings lookup failed for {:?}: {}", vendor, e);
                    continue;
                }
            };

            let value = setting.value.as_deref().unwrap_or_default();
            let element_id = vendor.element_id();
            if self.injector.contains(element_id) {
                self.mark_loaded(vendor);
                continue;
            }

            self.injector.inject(element_id, &vendor.script_src(value));
            self.mark_loaded(vendor);
            tracing::info!("✓ {:?} script injected", vendor);
        }
    }

    /// Watches consent changes and re-evaluates on every one, so granting
    /// consent loads pixels without a page reload.
    pub fn spawn_consent_watcher(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.consent.subscribe();
        tokio::spawn(async move {
            loop {
                self.evaluate().await;
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    pub fn is_loaded(&self, vendor: PixelVendor) -> bool {
        self.loaded
            .lock()
            .map(|set| set.contains(&vendor))
            .unwrap_or(false)
    }

    fn mark_loaded(&self, vendor: PixelVendor) {
        if let Ok(mut set) = self.loaded.lock() {
            set.insert(vendor);
        }
    }
}
