//! Spreadsheet API client.
//!
//! Read-only value-range access keyed by (document id, tab, range),
//! with a TTL cache to bound call volume within a run and
//! classified retry on transient failures.

pub mod cache;
pub mod retry;

use common::{Error, SheetErrorKind};
use serde::Deserialize;
use tracing::debug;

pub use cache::{CacheKey, SheetCache};
pub use retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Async spreadsheet reader with caching and retry.
#[derive(Debug)]
pub struct SheetsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    cache: SheetCache,
    retry: RetryPolicy,
}

impl SheetsClient {
    pub fn new(api_key: String, cache: SheetCache, retry: RetryPolicy) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), api_key, cache, retry)
    }

    pub fn with_base_url(
        base_url: String,
        api_key: String,
        cache: SheetCache,
        retry: RetryPolicy,
    ) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url,
            api_key,
            cache,
            retry,
        }
    }

    /// Drop every cached range. Called at the start of each
    /// orchestration cycle so every run sees fresh data at least once.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// Read a rectangular cell range, cached. An empty `range` reads
    /// the whole tab.
    pub async fn read_range(
        &self,
        document_id: &str,
        tab: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, Error> {
        let key = CacheKey::new(document_id, tab, range);
        if let Some(rows) = self.cache.get(&key) {
            debug!("sheet cache hit: {} {}!{}", document_id, tab, range);
            return Ok(rows);
        }

        let rows = self
            .retry
            .run(|| self.fetch(document_id, tab, range))
            .await?;
        self.cache.insert(key, rows.clone());
        Ok(rows)
    }

    async fn fetch(
        &self,
        document_id: &str,
        tab: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, Error> {
        let cell_ref = if range.is_empty() {
            tab.to_string()
        } else {
            format!("{}!{}", tab, range)
        };
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url, document_id, cell_ref
        );

        let resp = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(retry::classify_transport)?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::SheetApi {
                kind: retry::classify_status(status),
                message: format!("GET {} -> {}: {}", cell_ref, status, body),
            });
        }

        let body: ValueRange = resp.json().await.map_err(|e| Error::SheetApi {
            kind: SheetErrorKind::Malformed,
            message: e.to_string(),
        })?;

        debug!(
            "fetched {} rows from {} {}!{}",
            body.values.len(),
            document_id,
            tab,
            range
        );
        Ok(body.values)
    }
}
