//! The Odds API integration for the odds aggregation engine
//!
//! This crate provides the HTTP client for the metered odds vendor and
//! the `OddsVendor` trait the aggregation layer is written against.

pub mod client;
pub mod types;
pub mod urls;

pub use client::OddsApiClient;
pub use types::{CommenceWindow, OddsFormat, OddsQuery, QuotaSnapshot};

use async_trait::async_trait;
use odds_core::{Game, OddsResult};

/// Outbound calls to the odds vendor.
///
/// Every method is one billed (or, for events, free) vendor request.
#[async_trait]
pub trait OddsVendor: Send + Sync {
    /// Whether credentials are configured. No call should be issued without them.
    fn has_credentials(&self) -> bool;

    /// `GET /sports/{sport}/odds`
    async fn sport_odds(&self, sport: &str, query: &OddsQuery) -> OddsResult<Vec<Game>>;

    /// `GET /sports/{sport}/events`
    async fn sport_events(&self, sport: &str, window: &CommenceWindow) -> OddsResult<Vec<Game>>;

    /// `GET /sports/{sport}/events/{event_id}/odds`
    async fn event_odds(&self, sport: &str, event_id: &str, query: &OddsQuery) -> OddsResult<Game>;

    /// Last quota figures reported by the vendor, if known
    fn quota(&self) -> Option<QuotaSnapshot> {
        None
    }
}
