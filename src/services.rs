use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::Client;

use crate::circuit_breaker::{create_ingest_circuit_breaker, IngestCircuitBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::filters::FilterSet;
use crate::leads::LeadSubmission;
use crate::models::{AnalyticsEventRow, PropertySummary, SessionEventRow, TrackingSetting};
use crate::scroll::{PageFetcher, PageResult};

fn build_client(timeout_secs: u64) -> Result<Client, AppError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {}", e)))
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::error!("{} returned error {}: {}", what, status, error_text);
        return Err(AppError::RemoteApiError(format!(
            "{} returned status {}: {}",
            what, status, error_text
        )));
    }
    Ok(response)
}

// ============ First-party event ingest ============

/// Writer for the first-party analytics tables.
///
/// All writes are best-effort telemetry: callers fire-and-forget them and a
/// circuit breaker stops the client from hammering a failing endpoint.
pub struct IngestService {
    client: Client,
    base_url: String,
    api_key: String,
    breaker: IngestCircuitBreaker,
}

impl IngestService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(config.request_timeout_secs)?,
            base_url: config.portal_api_url.clone(),
            api_key: config.portal_api_key.clone(),
            breaker: create_ingest_circuit_breaker(),
        })
    }

    /// Inserts one row into the analytics event table.
    pub async fn insert_event(&self, row: &AnalyticsEventRow) -> Result<(), AppError> {
        self.guarded_insert("analytics_events", serde_json::to_value(row)?)
            .await
    }

    /// Inserts one row into the attribution session-event table.
    pub async fn insert_session_event(&self, row: &SessionEventRow) -> Result<(), AppError> {
        self.guarded_insert("session_events", serde_json::to_value(row)?)
            .await
    }

    async fn guarded_insert(&self, table: &str, body: serde_json::Value) -> Result<(), AppError> {
        use failsafe::futures::CircuitBreaker;

        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let request = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "return=minimal")
            .json(&body);

        let call = async {
            let response = request
                .send()
                .await
                .map_err(|e| AppError::RemoteApiError(format!("Insert request failed: {}", e)))?;
            check_status(response, table).await?;
            Ok::<(), AppError>(())
        };

        match self.breaker.call(call).await {
            Ok(()) => Ok(()),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => Err(AppError::RemoteApiError(
                "Analytics ingest circuit open, dropping event".to_string(),
            )),
        }
    }
}

// ============ Remote tracking settings ============

/// Cached lookup of the vendor tracking settings table.
pub struct SettingsService {
    client: Client,
    base_url: String,
    api_key: String,
    cache: Cache<String, Vec<TrackingSetting>>,
}

const SETTINGS_CACHE_KEY: &str = "tracking";

impl SettingsService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        // Settings change rarely; a short TTL keeps a toggled pixel from
        // staying dark for the rest of the session.
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.settings_cache_ttl_secs))
            .max_capacity(16)
            .build();
        Ok(Self {
            client: build_client(config.request_timeout_secs)?,
            base_url: config.portal_api_url.clone(),
            api_key: config.portal_api_key.clone(),
            cache,
        })
    }

    /// Fetches all vendor tracking settings, served from cache within the TTL.
    pub async fn tracking_settings(&self) -> Result<Vec<TrackingSetting>, AppError> {
        if let Some(cached) = self.cache.get(SETTINGS_CACHE_KEY).await {
            return Ok(cached);
        }

        let url = reqwest::Url::parse_with_params(
            &format!("{}/rest/v1/site_settings", self.base_url),
            &[("select", "key,enabled,value")],
        )
        .map_err(|e| AppError::RemoteApiError(format!("Failed to build URL: {}", e)))?;

        let response = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| AppError::RemoteApiError(format!("Settings request failed: {}", e)))?;

        let response = check_status(response, "site_settings").await?;
        let settings: Vec<TrackingSetting> = response.json().await.map_err(|e| {
            AppError::RemoteApiError(format!("Failed to parse settings response: {}", e))
        })?;

        tracing::debug!("✓ Fetched {} tracking setting(s)", settings.len());
        self.cache
            .insert(SETTINGS_CACHE_KEY.to_string(), settings.clone())
            .await;
        Ok(settings)
    }

    /// Looks up a single vendor setting by key.
    pub async fn get(&self, key: &str) -> Result<Option<TrackingSetting>, AppError> {
        let settings = self.tracking_settings().await?;
        Ok(settings.into_iter().find(|s| s.key == key))
    }
}

// ============ Property listings ============

/// Wire shape of the paged listing endpoint.
#[derive(Debug, serde::Deserialize)]
struct ListingResponse {
    data: Vec<PropertySummary>,
    total: u64,
}

/// Read client for the property listing endpoint.
pub struct PropertyService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PropertyService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(config.request_timeout_secs)?,
            base_url: config.portal_api_url.clone(),
            api_key: config.portal_api_key.clone(),
        })
    }

    /// Fetches one page of listings for the given filters.
    pub async fn list(&self, filters: &FilterSet) -> Result<PageResult<PropertySummary>, AppError> {
        let query = filters.to_query_string();
        let url = if query.is_empty() {
            format!("{}/rest/v1/properties", self.base_url)
        } else {
            format!("{}/rest/v1/properties?{}", self.base_url, query)
        };

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| AppError::RemoteApiError(format!("Listing request failed: {}", e)))?;

        let response = check_status(response, "properties").await?;
        let listing: ListingResponse = response.json().await.map_err(|e| {
            AppError::RemoteApiError(format!("Failed to parse listing response: {}", e))
        })?;

        let has_next_page = (filters.page as u64) * (filters.limit as u64) < listing.total;
        Ok(PageResult {
            data: listing.data,
            has_next_page,
            total: listing.total,
        })
    }

    /// Fetches the given ids. Ids the backend no longer knows are simply
    /// absent from the result; the caller prunes its selection accordingly.
    pub async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<PropertySummary>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = reqwest::Url::parse_with_params(
            &format!("{}/rest/v1/properties", self.base_url),
            &[("id", format!("in.({})", ids.join(",")))],
        )
        .map_err(|e| AppError::RemoteApiError(format!("Failed to build URL: {}", e)))?;

        let response = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| AppError::RemoteApiError(format!("Property fetch failed: {}", e)))?;

        let response = check_status(response, "properties").await?;
        let properties = response.json().await.map_err(|e| {
            AppError::RemoteApiError(format!("Failed to parse property response: {}", e))
        })?;

        Ok(properties)
    }

    /// Builds an infinite-scroll fetcher bound to a fixed filter set. The
    /// engine supplies the page number per fetch.
    pub fn page_fetcher(self: &Arc<Self>, filters: FilterSet) -> PageFetcher<PropertySummary> {
        let service = Arc::clone(self);
        Arc::new(move |page| {
            let service = Arc::clone(&service);
            let mut filters = filters.clone();
            Box::pin(async move {
                filters.page = page;
                service.list(&filters).await
            })
        })
    }
}

// ============ Lead submission ============

/// Writer for the lead table.
pub struct LeadService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl LeadService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(config.request_timeout_secs)?,
            base_url: config.portal_api_url.clone(),
            api_key: config.portal_api_key.clone(),
        })
    }

    /// Submits a validated lead with its attribution snapshot.
    pub async fn submit(&self, lead: &LeadSubmission) -> Result<(), AppError> {
        let url = format!("{}/rest/v1/leads", self.base_url);
        tracing::info!("Submitting lead from page {:?}", lead.attribution.last_page_before_submit);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "return=minimal")
            .json(lead)
            .send()
            .await
            .map_err(|e| AppError::RemoteApiError(format!("Lead submission failed: {}", e)))?;

        check_status(response, "leads").await?;
        tracing::info!("✓ Lead submitted successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            portal_api_url: "https://portal.example.com".to_string(),
            portal_api_key: "anon".to_string(),
            settings_cache_ttl_secs: 300,
            excluded_routes: vec![],
            debounce_ms: 300,
            request_timeout_secs: 10,
        }
    }

    #[tokio::test]
    async fn test_service_creation() {
        let config = test_config();
        assert!(IngestService::new(&config).is_ok());
        assert!(SettingsService::new(&config).is_ok());
        assert!(PropertyService::new(&config).is_ok());
        assert!(LeadService::new(&config).is_ok());
    }
}
