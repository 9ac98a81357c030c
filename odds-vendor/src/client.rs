//! The Odds API client
//!
//! Provides the metered REST calls used by the aggregation engine.

use crate::types::{CommenceWindow, OddsQuery, QuotaSnapshot};
use crate::urls::{event_odds_url, sport_events_url, sport_odds_url, ODDS_API_BASE};
use crate::OddsVendor;
use async_trait::async_trait;
use chrono::Utc;
use odds_core::{Game, OddsError, OddsResult};
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The Odds API client
#[derive(Clone)]
pub struct OddsApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    quota: Arc<Mutex<Option<QuotaSnapshot>>>,
}

impl OddsApiClient {
    /// Create a client against the production API
    pub fn new(api_key: Option<String>) -> OddsResult<Self> {
        Self::with_options(api_key, ODDS_API_BASE, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit base URL and request timeout
    pub fn with_options(
        api_key: Option<String>,
        base_url: &str,
        timeout: Duration,
    ) -> OddsResult<Self> {
        url::Url::parse(base_url)
            .map_err(|e| OddsError::config(format!("Invalid odds API base URL {}: {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OddsError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            quota: Arc::new(Mutex::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_key(&self) -> OddsResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| OddsError::config("ODDS_API_KEY is not configured"))
    }

    /// Issue a GET and decode the JSON body
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> OddsResult<T> {
        params.push(("apiKey", self.api_key()?.to_string()));

        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OddsError::timeout(format!("{}: {}", url, e))
                } else {
                    OddsError::network(format!("Failed to fetch {}: {}", url, e))
                }
            })?;

        self.record_quota(response.headers());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OddsError::api(status.as_u16(), body));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                OddsError::timeout(format!("{}: {}", url, e))
            } else {
                OddsError::parse(format!("Failed to parse response from {}: {}", url, e))
            }
        })
    }

    fn record_quota(&self, headers: &HeaderMap) {
        let snapshot = quota_from_headers(headers);
        if snapshot.remaining.is_none() && snapshot.used.is_none() {
            return;
        }

        if let Some(remaining) = snapshot.remaining {
            debug!(
                "Odds API quota: {} remaining, {:?} used, last call cost {:?}",
                remaining, snapshot.used, snapshot.last_cost
            );
            if remaining < 100 {
                warn!("Odds API quota running low: {} requests remaining", remaining);
            }
        }

        *self.quota.lock() = Some(snapshot);
    }
}

/// Read `x-requests-*` quota headers
fn quota_from_headers(headers: &HeaderMap) -> QuotaSnapshot {
    let read = |name: &str| -> Option<u64> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|v| v as u64)
    };

    QuotaSnapshot {
        remaining: read("x-requests-remaining"),
        used: read("x-requests-used"),
        last_cost: read("x-requests-last"),
        observed_at: Utc::now(),
    }
}

#[async_trait]
impl OddsVendor for OddsApiClient {
    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, query), fields(markets = %query.markets.join(",")))]
    async fn sport_odds(&self, sport: &str, query: &OddsQuery) -> OddsResult<Vec<Game>> {
        let url = sport_odds_url(&self.base_url, sport);
        self.get_json(&url, query.query_pairs()).await
    }

    #[instrument(skip(self, window))]
    async fn sport_events(&self, sport: &str, window: &CommenceWindow) -> OddsResult<Vec<Game>> {
        let url = sport_events_url(&self.base_url, sport);
        let mut params = vec![("dateFormat", "iso".to_string())];
        params.extend(window.query_pairs());
        self.get_json(&url, params).await
    }

    #[instrument(skip(self, query), fields(markets = %query.markets.join(",")))]
    async fn event_odds(&self, sport: &str, event_id: &str, query: &OddsQuery) -> OddsResult<Game> {
        let url = event_odds_url(&self.base_url, sport, event_id);
        self.get_json(&url, query.query_pairs()).await
    }

    fn quota(&self) -> Option<QuotaSnapshot> {
        *self.quota.lock()
    }
}
