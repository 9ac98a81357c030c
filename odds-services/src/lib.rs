//! Aggregation services for the odds engine
//!
//! This crate owns everything between the HTTP surface and the vendor:
//! - market classification and bookmaker allowlists
//! - the in-memory TTL cache, proposition cache and in-flight registry
//! - the SQLite-backed persistent odds cache
//! - the aggregation coordinator that plans and merges vendor calls

pub mod cache_store;
pub mod config;
pub mod market_classifier;
pub mod odds_service;
pub mod odds_store;

pub use cache_store::{CacheCategory, CacheStats, CacheStore, CacheTtls, PropCacheConfig};
pub use config::{BookmakerPolicy, ConfigError, EngineConfig};
pub use market_classifier::{canonicalize, classify, MarketCategory};
pub use odds_service::{BetType, OddsParams, OddsRequest, OddsResponse, OddsService};
pub use odds_store::{OddsStore, OddsStoreError, SqliteOddsStore};
