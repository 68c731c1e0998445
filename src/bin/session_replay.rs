//! Replays a recorded browsing session through the client core and prints
//! the resulting lead-attribution snapshot.
//!
//! Input is JSONL on stdin or from a file argument, one step per line:
//!
//! ```text
//! {"type":"utm","url":"/?utm_source=google&utm_campaign=spring"}
//! {"type":"consent","analytics":true,"marketing":false}
//! {"type":"page","path":"/properties","title":"Properties"}
//! {"type":"scroll","percent":60}
//! {"type":"event","name":"property_viewed","entity_id":"prop-42"}
//! ```
//!
//! Usage: session-replay [steps.jsonl]

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_estate_client::attribution::AttributionEngine;
use rust_estate_client::config::Config;
use rust_estate_client::consent::ConsentStore;
use rust_estate_client::models::ConsentUpdate;
use rust_estate_client::pixels::{InMemoryInjector, PixelLoader, PixelRegistry};
use rust_estate_client::routes::RouteFilter;
use rust_estate_client::services::{IngestService, SettingsService};
use rust_estate_client::session::SessionContext;
use rust_estate_client::storage::MemoryStore;
use rust_estate_client::tracker::EventTracker;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplayStep {
    Utm {
        url: String,
    },
    Consent {
        analytics: Option<bool>,
        marketing: Option<bool>,
    },
    Page {
        path: String,
        title: Option<String>,
    },
    Scroll {
        percent: u8,
    },
    Event {
        name: String,
        entity_id: Option<String>,
        meta: Option<Map<String, Value>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_estate_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Assemble the client stack with in-memory storage, the way a headless
    // embedder does. Remote writes are best-effort; a missing backend only
    // costs dropped telemetry.
    let session_store = Arc::new(MemoryStore::new());
    let local_store = Arc::new(MemoryStore::new());

    let consent = Arc::new(ConsentStore::new(local_store));
    let session = Arc::new(SessionContext::new(
        session_store,
        "session-replay-cli",
        "en",
        None,
    ));
    let ingest = Arc::new(IngestService::new(&config)?);
    let pixels = Arc::new(PixelRegistry::new());
    let attribution = Arc::new(AttributionEngine::new(
        consent.clone(),
        session.clone(),
        ingest.clone(),
    ));
    let tracker = Arc::new(EventTracker::new(
        consent.clone(),
        session.clone(),
        ingest,
        pixels,
        RouteFilter::from_globs(&config.excluded_routes)?,
        Duration::from_millis(config.debounce_ms),
    ));

    let loader = Arc::new(PixelLoader::new(
        Arc::new(SettingsService::new(&config)?),
        Arc::new(InMemoryInjector::new()),
        consent.clone(),
    ));
    let watcher = loader.spawn_consent_watcher();

    // Read replay steps
    let input = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut applied = 0usize;
    for (line_no, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let step: ReplayStep = match serde_json::from_str(line) {
            Ok(step) => step,
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", line_no + 1, e);
                continue;
            }
        };

        match step {
            ReplayStep::Utm { url } => session.capture_utm(&url),
            ReplayStep::Consent {
                analytics,
                marketing,
            } => consent.set(ConsentUpdate {
                analytics,
                marketing,
            }),
            ReplayStep::Page { path, title } => {
                tracker.track_page_view(&path, title.as_deref()).await
            }
            ReplayStep::Scroll { percent } => tracker.track_scroll(percent).await,
            ReplayStep::Event {
                name,
                entity_id,
                meta,
            } => {
                attribution.log_session_event(&name, entity_id.as_deref(), meta);
                tracker.track(&name, json!({})).await;
            }
        }
        applied += 1;
    }

    tracing::info!("✓ Replayed {} step(s)", applied);
    watcher.abort();

    let snapshot = attribution.lead_attribution();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}
