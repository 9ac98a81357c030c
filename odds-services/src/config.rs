//! Engine configuration
//!
//! Loaded once at process start from environment variables and shared
//! read-only afterwards.

use crate::cache_store::{CacheTtls, PropCacheConfig};
use crate::market_classifier::bookmakers_for_plan;
use odds_core::SubscriptionPlan;
use odds_vendor::urls::ODDS_API_BASE;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Bookmakers available to every paid and unpaid plan
pub const RESTRICTED_BOOKMAKERS: &[&str] = &["draftkings", "fanduel", "betmgm", "williamhill_us"];

/// Bookmakers available to full-access plans
pub const FULL_BOOKMAKERS: &[&str] = &[
    "draftkings",
    "fanduel",
    "betmgm",
    "williamhill_us",
    "espnbet",
    "betrivers",
    "fanatics",
    "bovada",
    "betonlineag",
];

/// Pick'em books that only quote player propositions
pub const PROP_ONLY_BOOKMAKERS: &[&str] = &["prizepicks", "underdog", "pick6"];

/// Vendor-imposed ceiling on bookmakers per request
pub const DEFAULT_MAX_BOOKMAKERS: usize = 12;

/// Which bookmakers each plan may see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmakerPolicy {
    pub full: Vec<String>,
    pub restricted: Vec<String>,
    pub prop_only: Vec<String>,
    pub max_bookmakers: usize,
}

impl Default for BookmakerPolicy {
    fn default() -> Self {
        Self {
            full: to_owned(FULL_BOOKMAKERS),
            restricted: to_owned(RESTRICTED_BOOKMAKERS),
            prop_only: to_owned(PROP_ONLY_BOOKMAKERS),
            max_bookmakers: DEFAULT_MAX_BOOKMAKERS,
        }
    }
}

impl BookmakerPolicy {
    /// The restricted allowlist must be a strict subset of the full one,
    /// as served: after deduplication and the `max_bookmakers` cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let restricted = bookmakers_for_plan(SubscriptionPlan::Free, self);
        if self.max_bookmakers <= restricted.len() {
            return Err(ConfigError::Invalid {
                field: "ODDS_MAX_BOOKMAKERS".to_string(),
                error: format!(
                    "must exceed the {} restricted bookmakers",
                    restricted.len()
                ),
            });
        }

        let full = bookmakers_for_plan(SubscriptionPlan::Premium, self);
        if let Some(book) = restricted.iter().find(|b| !full.contains(b)) {
            return Err(ConfigError::Invalid {
                field: "ODDS_RESTRICTED_BOOKMAKERS".to_string(),
                error: format!("{} is not in the full bookmaker list", book),
            });
        }
        if restricted.len() >= full.len() {
            return Err(ConfigError::Invalid {
                field: "ODDS_FULL_BOOKMAKERS".to_string(),
                error: "must list more distinct bookmakers than the restricted list".to_string(),
            });
        }
        Ok(())
    }
}

/// Process-wide engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Vendor API key
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub request_timeout: Duration,
    /// TTLs of the in-memory odds cache by category
    pub ttls: CacheTtls,
    /// TTL of per-event period odds
    pub period_ttl: Duration,
    /// TTL of per-sport event lists
    pub events_ttl: Duration,
    /// Lifetime of rows written to the persistent cache
    pub persist_ttl: Duration,
    pub prop_cache: PropCacheConfig,
    pub bookmakers: BookmakerPolicy,
    /// Games per sport that get period odds on full plans
    pub period_game_limit: usize,
    pub restricted_period_game_limit: usize,
    /// Simultaneous per-event vendor calls
    pub prop_concurrency: usize,
    pub prop_regions: String,
    pub default_regions: String,
    pub sweep_interval: Duration,
    pub cache_db_path: String,
    pub server_port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: ODDS_API_BASE.to_string(),
            request_timeout: Duration::from_secs(10),
            ttls: CacheTtls::default(),
            period_ttl: Duration::from_secs(30 * 60),
            events_ttl: Duration::from_secs(5 * 60),
            persist_ttl: Duration::from_secs(2 * 60),
            prop_cache: PropCacheConfig::default(),
            bookmakers: BookmakerPolicy::default(),
            period_game_limit: 10,
            restricted_period_game_limit: 3,
            prop_concurrency: 5,
            prop_regions: "us,us_dfs".to_string(),
            default_regions: "us".to_string(),
            sweep_interval: Duration::from_secs(60),
            cache_db_path: "data/odds_cache.db".to_string(),
            server_port: 3001,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Every variable is optional; unset values keep their defaults.
    /// A missing `ODDS_API_KEY` is not an error here: requests are
    /// rejected later, before any vendor call is attempted.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let secs = |name: &str, default: Duration| -> Result<Duration, ConfigError> {
            match get(name) {
                Some(v) => parse::<u64>(name, &v).map(Duration::from_secs),
                None => Ok(default),
            }
        };
        let count = |name: &str, default: usize| -> Result<usize, ConfigError> {
            match get(name) {
                Some(v) => parse::<usize>(name, &v),
                None => Ok(default),
            }
        };
        let list = |name: &str, default: Vec<String>| -> Vec<String> {
            get(name).map(|v| split_list(&v)).unwrap_or(default)
        };

        let ttls = CacheTtls {
            base: secs("ODDS_BASE_TTL_SECS", defaults.ttls.base)?,
            alternate: secs("ODDS_ALTERNATE_TTL_SECS", defaults.ttls.alternate)?,
            prop: secs("ODDS_PROP_TTL_SECS", defaults.ttls.prop)?,
        };

        let prop_cache = PropCacheConfig {
            max_entries: count("ODDS_PROP_CACHE_MAX_ENTRIES", defaults.prop_cache.max_entries)?,
            stale_after: secs("ODDS_PROP_STALE_SECS", defaults.prop_cache.stale_after)?,
            ttl: ttls.prop,
        };

        let bookmakers = BookmakerPolicy {
            full: list("ODDS_FULL_BOOKMAKERS", defaults.bookmakers.full),
            restricted: list("ODDS_RESTRICTED_BOOKMAKERS", defaults.bookmakers.restricted),
            prop_only: list("ODDS_PROP_ONLY_BOOKMAKERS", defaults.bookmakers.prop_only),
            max_bookmakers: count("ODDS_MAX_BOOKMAKERS", defaults.bookmakers.max_bookmakers)?,
        };
        bookmakers.validate()?;

        if prop_cache.stale_after >= prop_cache.ttl {
            return Err(ConfigError::Invalid {
                field: "ODDS_PROP_STALE_SECS".to_string(),
                error: "must be shorter than ODDS_PROP_TTL_SECS".to_string(),
            });
        }
        if prop_cache.max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "ODDS_PROP_CACHE_MAX_ENTRIES".to_string(),
                error: "must be at least 1".to_string(),
            });
        }

        let sweep_interval = secs("ODDS_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?;
        if sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "ODDS_SWEEP_INTERVAL_SECS".to_string(),
                error: "must be at least 1".to_string(),
            });
        }

        let prop_concurrency = count("ODDS_PROP_CONCURRENCY", defaults.prop_concurrency)?.max(1);

        let server_port = match get("SERVER_PORT") {
            Some(v) => parse::<u16>("SERVER_PORT", &v)?,
            None => defaults.server_port,
        };

        Ok(Self {
            api_key: get("ODDS_API_KEY"),
            api_base_url: get("ODDS_API_BASE_URL").unwrap_or(defaults.api_base_url),
            request_timeout: secs("ODDS_REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
            ttls,
            period_ttl: secs("ODDS_PERIOD_TTL_SECS", defaults.period_ttl)?,
            events_ttl: secs("ODDS_EVENTS_TTL_SECS", defaults.events_ttl)?,
            persist_ttl: secs("ODDS_PERSIST_TTL_SECS", defaults.persist_ttl)?,
            prop_cache,
            bookmakers,
            period_game_limit: count("ODDS_PERIOD_GAME_LIMIT", defaults.period_game_limit)?,
            restricted_period_game_limit: count(
                "ODDS_RESTRICTED_PERIOD_GAME_LIMIT",
                defaults.restricted_period_game_limit,
            )?,
            prop_concurrency,
            prop_regions: get("ODDS_PROP_REGIONS").unwrap_or(defaults.prop_regions),
            default_regions: get("ODDS_DEFAULT_REGIONS").unwrap_or(defaults.default_regions),
            sweep_interval,
            cache_db_path: get("CACHE_DB_PATH").unwrap_or(defaults.cache_db_path),
            server_port,
        })
    }
}

fn parse<T: FromStr>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::Invalid {
        field: field.to_string(),
        error: format!("{} ({})", e, value),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {error}")]
    Invalid { field: String, error: String },
}
