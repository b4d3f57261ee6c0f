//! ============================================================================
//! Catalog Service Client - Public item catalog over HTTP
//! ============================================================================
//! Handles the shared catalog endpoints:
//! - Fetch the current catalog
//! - Ask the service to re-crawl (refresh) or re-derive regions
//! - Replace the catalog wholesale (an empty list clears it)
//! Also reads/writes the JSON files used for catalog and overlay backups.
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::types::{CatalogItem, CollectionError, CollectionResult, OwnershipOverlay};

/// Default file name for overlay exports
pub const OVERLAY_EXPORT_FILENAME: &str = "my_collection_status.json";
/// Default file name for catalog exports
pub const CATALOG_EXPORT_FILENAME: &str = "chiikawa_public_db.json";

/// Interpret a catalog payload. Anything other than an array is an empty
/// catalog; array entries that do not parse as items are dropped.
pub fn parse_catalog(value: serde_json::Value) -> Vec<CatalogItem> {
    let serde_json::Value::Array(entries) = value else {
        warn!("Catalog payload is not an array; treating as empty");
        return Vec::new();
    };

    let total = entries.len();
    let items: Vec<CatalogItem> = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!("Dropping unreadable catalog entry: {}", e);
                None
            }
        })
        .collect();

    if items.len() < total {
        warn!("Dropped {} of {} catalog entries", total - items.len(), total);
    }
    items
}

/// Envelope the mutating endpoints answer with
#[derive(Debug, Clone, Default, Deserialize)]
struct ServiceReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    updated: Option<usize>,
}

impl ServiceReply {
    fn into_checked(self) -> CollectionResult<Self> {
        if self.status.as_deref() == Some("error") {
            return Err(CollectionError::Catalog(
                self.message.unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        Ok(self)
    }
}

/// Result of a refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResult {
    pub items: Vec<CatalogItem>,
    pub total: usize,
}

/// Result of a region fix pass
#[derive(Debug, Clone, Serialize)]
pub struct FixRegionsResult {
    pub items: Vec<CatalogItem>,
    pub updated: usize,
}

/// Catalog operations the tracker relies on
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn fetch(&self) -> CollectionResult<Vec<CatalogItem>>;

    async fn refresh(&self, current: &[CatalogItem]) -> CollectionResult<RefreshResult>;

    async fn fix_regions(&self, current: &[CatalogItem]) -> CollectionResult<FixRegionsResult>;

    async fn import(&self, items: &[CatalogItem]) -> CollectionResult<()>;
}

/// HTTP client for the catalog service
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> CollectionResult<ServiceReply> {
        let response = self.client.post(self.url(path)).json(body).send().await?;

        let status = response.status();
        let text = response.text().await?;
        // The service reports failures in the body as well as the status line
        let reply: ServiceReply = serde_json::from_str(&text).unwrap_or_default();
        let reply = reply.into_checked()?;

        if !status.is_success() {
            error!("Catalog service {} returned {}: {}", path, status, text);
            return Err(CollectionError::Catalog(format!("{} returned {}", path, status)));
        }
        Ok(reply)
    }
}

#[async_trait]
impl CatalogService for CatalogClient {
    /// Current catalog
    async fn fetch(&self) -> CollectionResult<Vec<CatalogItem>> {
        let response = self.client.get(self.url("/api/public_items")).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Catalog fetch failed: {} - {}", status, body);
            return Err(CollectionError::Catalog(format!("fetch returned {}", status)));
        }

        let value: serde_json::Value = response.json().await?;
        if let Some(reply) = value.as_object().filter(|o| o.get("status").is_some()) {
            if reply.get("status").and_then(|s| s.as_str()) == Some("error") {
                let message = reply
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("request failed");
                return Err(CollectionError::Catalog(message.to_string()));
            }
        }

        let items = parse_catalog(value);
        info!("Fetched {} catalog items", items.len());
        Ok(items)
    }

    /// Ask the service to rebuild the catalog from its sources
    async fn refresh(&self, current: &[CatalogItem]) -> CollectionResult<RefreshResult> {
        info!("Requesting catalog refresh");
        let reply = self.post("/api/refresh", &current).await?;

        let items = match reply.data {
            Some(data) => parse_catalog(data),
            None => self.fetch().await?,
        };
        let total = reply.total.unwrap_or(items.len());

        info!("Catalog refreshed: {} items", total);
        Ok(RefreshResult { items, total })
    }

    /// Ask the service to re-derive regions and coordinates
    async fn fix_regions(&self, current: &[CatalogItem]) -> CollectionResult<FixRegionsResult> {
        info!("Requesting region fix");
        let reply = self.post("/api/fix_regions", &current).await?;

        let items = match reply.data {
            Some(data) => parse_catalog(data),
            None => self.fetch().await?,
        };
        let updated = reply.updated.unwrap_or(0);

        info!("Region fix updated {} items", updated);
        Ok(FixRegionsResult { items, updated })
    }

    /// Replace the catalog. An empty slice clears it.
    async fn import(&self, items: &[CatalogItem]) -> CollectionResult<()> {
        info!("Importing {} catalog items", items.len());
        let reply = self.post("/api/import_public_data", &items).await?;
        if let Some(message) = reply.message {
            debug!("Catalog import: {}", message);
        }
        Ok(())
    }
}

// ============================================================================
// Backup files
// ============================================================================

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> CollectionResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Save the overlay as a pretty-printed JSON object
pub fn export_overlay(path: &Path, overlay: &OwnershipOverlay) -> CollectionResult<()> {
    write_pretty(path, overlay)
}

/// Save the catalog as a pretty-printed JSON array
pub fn export_catalog(path: &Path, catalog: &[CatalogItem]) -> CollectionResult<()> {
    write_pretty(path, catalog)
}

/// Read an overlay backup. Unlike stored state, a bad file is an error.
pub fn read_overlay_file(path: &Path) -> CollectionResult<OwnershipOverlay> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| CollectionError::InvalidData(format!("{}: {}", path.display(), e)))
}

/// Read a catalog backup; the file must hold a JSON array
pub fn read_catalog_file(path: &Path) -> CollectionResult<Vec<CatalogItem>> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| CollectionError::InvalidData(format!("{}: {}", path.display(), e)))
}
