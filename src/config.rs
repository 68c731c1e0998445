use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub portal_api_url: String,
    pub portal_api_key: String,
    pub settings_cache_ttl_secs: u64,
    pub excluded_routes: Vec<String>,
    pub debounce_ms: u64,
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            portal_api_url: std::env::var("PORTAL_API_URL")
                .map_err(|_| anyhow::anyhow!("PORTAL_API_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("PORTAL_API_URL cannot be empty");
                    }
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("PORTAL_API_URL must start with http:// or https://");
                    }
                    Ok(url.trim_end_matches('/').to_string())
                })?,
            portal_api_key: std::env::var("PORTAL_API_KEY")
                .map_err(|_| anyhow::anyhow!("PORTAL_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("PORTAL_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            settings_cache_ttl_secs: std::env::var("SETTINGS_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SETTINGS_CACHE_TTL_SECS must be a valid number"))?,
            excluded_routes: std::env::var("EXCLUDED_ROUTES")
                .unwrap_or_else(|_| "/admin/*,/client-portal/*".to_string())
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            debounce_ms: std::env::var("DEBOUNCE_MS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DEBOUNCE_MS must be a valid number"))?,
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("REQUEST_TIMEOUT_SECS must be a valid number"))?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Portal API URL: {}", config.portal_api_url);
        tracing::debug!(
            "Settings cache TTL: {}s, debounce window: {}ms",
            config.settings_cache_ttl_secs,
            config.debounce_ms
        );
        tracing::debug!("Excluded routes: {:?}", config.excluded_routes);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a config directly, the way tests assemble the stack without env vars.
    pub fn test_config(base_url: &str) -> Config {
        Config {
            portal_api_url: base_url.trim_end_matches('/').to_string(),
            portal_api_key: "test_anon_key".to_string(),
            settings_cache_ttl_secs: 300,
            excluded_routes: vec!["/admin/*".to_string()],
            debounce_ms: 300,
            request_timeout_secs: 10,
        }
    }

    #[test]
    fn test_config_is_constructible() {
        let config = test_config("https://portal.example.com/");
        assert_eq!(config.portal_api_url, "https://portal.example.com");
        assert_eq!(config.excluded_routes, vec!["/admin/*"]);
    }
}
