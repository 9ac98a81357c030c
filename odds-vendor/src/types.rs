//! Request and quota types for The Odds API

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Price format requested from the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OddsFormat {
    #[default]
    American,
    Decimal,
}

impl OddsFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OddsFormat::American => "american",
            OddsFormat::Decimal => "decimal",
        }
    }
}

impl fmt::Display for OddsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OddsFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "american" | "us" => Ok(OddsFormat::American),
            "decimal" | "eu" => Ok(OddsFormat::Decimal),
            _ => Err(format!("Unknown odds format: {}", s)),
        }
    }
}

/// Restricts results to games starting inside `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommenceWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl CommenceWindow {
    /// The full UTC day of `date`
    pub fn for_date(date: NaiveDate) -> Self {
        let from = date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
        let to = date
            .succ_opt()
            .and_then(|next| next.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc());
        Self { from, to }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Vendor query parameters for this window
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(from) = self.from {
            pairs.push((
                "commenceTimeFrom",
                from.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(to) = self.to {
            pairs.push(("commenceTimeTo", to.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        pairs
    }

    /// Compact form used inside cache keys
    pub fn cache_fragment(&self) -> String {
        match (self.from, self.to) {
            (None, None) => "any".to_string(),
            (from, to) => format!(
                "{}-{}",
                from.map(|f| f.timestamp()).unwrap_or_default(),
                to.map(|t| t.timestamp()).unwrap_or_default()
            ),
        }
    }
}

/// Parameters of a single odds request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OddsQuery {
    /// Comma-separated region list (e.g., "us" or "us,us_dfs")
    pub regions: String,
    pub markets: Vec<String>,
    pub bookmakers: Vec<String>,
    pub odds_format: OddsFormat,
    pub window: CommenceWindow,
}

impl OddsQuery {
    /// Query parameters, excluding the API key
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("regions", self.regions.clone()),
            ("markets", self.markets.join(",")),
            ("oddsFormat", self.odds_format.as_str().to_string()),
            ("dateFormat", "iso".to_string()),
        ];
        if !self.bookmakers.is_empty() {
            pairs.push(("bookmakers", self.bookmakers.join(",")));
        }
        pairs.extend(self.window.query_pairs());
        pairs
    }

    /// Same request restricted to a different market list
    pub fn with_markets(&self, markets: Vec<String>) -> Self {
        Self {
            markets,
            ..self.clone()
        }
    }
}

/// Request quota reported by the vendor's response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub remaining: Option<u64>,
    pub used: Option<u64>,
    pub last_cost: Option<u64>,
    pub observed_at: DateTime<Utc>,
}
