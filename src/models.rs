use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============ Consent ============

/// Visitor consent record, persisted in durable local storage.
///
/// Absence of a stored record means no consent was given: third-party
/// tracking stays off while first-party technical logging proceeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentState {
    /// Permission to run analytics tracking (GA4, event mirroring).
    pub analytics: bool,
    /// Permission to run marketing pixels (Meta Pixel).
    pub marketing: bool,
    /// Functional storage, always implied once the visitor interacts with the banner.
    pub functional: bool,
    /// Epoch milliseconds of the last banner interaction.
    pub timestamp: i64,
}

impl Default for ConsentState {
    /// The fail-closed default used when no record exists.
    fn default() -> Self {
        Self {
            analytics: false,
            marketing: false,
            functional: true,
            timestamp: 0,
        }
    }
}

/// Partial consent update from a banner interaction.
///
/// Unset fields keep their previous value; `functional` is always forced on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsentUpdate {
    pub analytics: Option<bool>,
    pub marketing: Option<bool>,
}

// ============ Campaign attribution ============

/// Campaign parameters captured from the first URL that carried any of them.
///
/// First-touch attribution: once stored for the session they are never
/// overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UtmParams {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
}

impl UtmParams {
    /// Extracts campaign parameters from a raw query string (with or without
    /// a leading `?`). Unknown keys are ignored.
    pub fn from_query(query: &str) -> Self {
        let mut utm = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            if value.is_empty() {
                continue;
            }
            let value = value.into_owned();
            match key.as_ref() {
                "utm_source" => utm.utm_source = Some(value),
                "utm_medium" => utm.utm_medium = Some(value),
                "utm_campaign" => utm.utm_campaign = Some(value),
                "utm_term" => utm.utm_term = Some(value),
                "utm_content" => utm.utm_content = Some(value),
                _ => {}
            }
        }
        utm
    }

    /// True when no campaign parameter is present.
    pub fn is_empty(&self) -> bool {
        self.utm_source.is_none()
            && self.utm_medium.is_none()
            && self.utm_campaign.is_none()
            && self.utm_term.is_none()
            && self.utm_content.is_none()
    }
}

// ============ Device ============

/// Coarse device classification derived from the user agent string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceType {
    /// Classifies a user agent string. Tablets are checked before phones
    /// because tablet user agents also carry mobile markers.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        if ua.contains("ipad") || ua.contains("tablet") {
            DeviceType::Tablet
        } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
            DeviceType::Mobile
        } else {
            DeviceType::Desktop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
        }
    }
}

// ============ Session events ============

/// One interaction event in the in-memory attribution buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Event name (e.g., "property_viewed", "lead_submitted").
    pub event_name: String,
    /// Path of the page the event happened on.
    pub page_path: String,
    /// Optional id of the entity the event refers to (property, project).
    pub entity_id: Option<String>,
    /// Sanitized metadata, restricted to the allow-listed keys.
    pub meta: Option<Map<String, Value>>,
    /// Epoch milliseconds.
    pub ts: i64,
}

// ============ Remote table rows ============

/// Row shape of the first-party analytics event table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEventRow {
    /// Event name.
    pub event_name: String,
    /// Free-form event payload.
    pub event_data: Value,
    /// Opaque per-tab session identifier.
    pub session_id: String,
    /// Path of the page the event fired on.
    pub page_url: String,
    /// Title of the page, when known.
    pub page_title: Option<String>,
    /// Referrer hostname. The full referrer URL is never retained.
    pub referrer: Option<String>,
    /// Coarse device classification.
    pub device_type: DeviceType,
    /// Browser language tag.
    pub language: String,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
}

/// Row shape of the attribution session-event table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEventRow {
    pub session_id: String,
    pub event_name: String,
    pub page_path: String,
    pub entity_id: Option<String>,
    pub meta: Option<Map<String, Value>>,
}

// ============ Lead attribution ============

/// Attribution snapshot assembled at lead-submission time.
///
/// The identity group (session, pages, device, language) is always present.
/// The campaign group (`utm_*`, `referrer_domain`, `last_events_summary`) is
/// populated only while analytics consent is granted, all fields together or
/// none of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadAttributionSnapshot {
    pub session_id: String,
    pub landing_page: Option<String>,
    pub last_page_before_submit: Option<String>,
    pub device_type: DeviceType,
    pub browser_language: String,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub referrer_domain: Option<String>,
    pub last_events_summary: Vec<String>,
}

// ============ Remote settings ============

/// One vendor setting row from the remote settings table.
///
/// A missing row or `enabled = false` suppresses that vendor entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSetting {
    /// Vendor setting key (e.g., "ga4_measurement_id", "meta_pixel_id").
    pub key: String,
    pub enabled: bool,
    /// The vendor-specific value, a measurement or pixel id.
    pub value: Option<String>,
}

impl TrackingSetting {
    /// True when the setting is enabled and carries a non-empty value.
    pub fn is_active(&self) -> bool {
        self.enabled
            && self
                .value
                .as_deref()
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false)
    }
}

// ============ Property listings ============

/// Summary card of a property as returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySummary {
    pub id: String,
    pub title: String,
    pub city: Option<String>,
    pub area: Option<String>,
    pub price: Option<u64>,
    pub bedrooms: Option<u8>,
    pub bathrooms: Option<u8>,
    pub area_sqm: Option<u32>,
    pub cover_image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_from_user_agent() {
        assert_eq!(
            DeviceType::from_user_agent(
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148"
            ),
            DeviceType::Mobile
        );
        assert_eq!(
            DeviceType::from_user_agent("Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X)"),
            DeviceType::Tablet
        );
        assert_eq!(
            DeviceType::from_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"),
            DeviceType::Desktop
        );
    }

    #[test]
    fn test_utm_from_query_ignores_unknown_keys() {
        let utm = UtmParams::from_query("?utm_source=google&utm_medium=cpc&gclid=abc123");
        assert_eq!(utm.utm_source.as_deref(), Some("google"));
        assert_eq!(utm.utm_medium.as_deref(), Some("cpc"));
        assert!(utm.utm_campaign.is_none());
        assert!(!utm.is_empty());
    }

    #[test]
    fn test_utm_empty_values_not_captured() {
        let utm = UtmParams::from_query("utm_source=&utm_term=");
        assert!(utm.is_empty());
    }

    #[test]
    fn test_tracking_setting_active_requires_value() {
        let setting = TrackingSetting {
            key: "ga4_measurement_id".to_string(),
            enabled: true,
            value: Some("  ".to_string()),
        };
        assert!(!setting.is_active());

        let setting = TrackingSetting {
            key: "ga4_measurement_id".to_string(),
            enabled: true,
            value: Some("G-ABC123".to_string()),
        };
        assert!(setting.is_active());
    }
}
