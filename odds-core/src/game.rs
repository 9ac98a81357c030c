//! Game, bookmaker, market and outcome shapes as served by the odds vendor

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single sporting event with the odds offered on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Vendor-assigned event identifier
    pub id: String,

    /// Vendor sport key (e.g., "basketball_nba")
    pub sport_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport_title: Option<String>,

    /// Scheduled start time
    pub commence_time: DateTime<Utc>,

    pub home_team: String,

    pub away_team: String,

    /// Books quoting this game. The events endpoint returns none.
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

/// Odds offered by one bookmaker on one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmaker {
    pub key: String,
    pub title: String,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub markets: Vec<Market>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,

    /// Handicap or total line
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub point: Option<Decimal>,

    /// Player name on proposition outcomes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Game {
    /// Whether the game has already begun at `now`
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.commence_time <= now
    }

    pub fn bookmaker(&self, key: &str) -> Option<&Bookmaker> {
        self.bookmakers.iter().find(|b| b.key == key)
    }

    /// Merge bookmakers into this game.
    ///
    /// Markets are appended onto an existing bookmaker with the same key,
    /// skipping market keys it already carries. Returns the number of
    /// markets added.
    pub fn merge_bookmakers(&mut self, incoming: Vec<Bookmaker>) -> usize {
        let mut added = 0;
        for bookmaker in incoming {
            match self.bookmakers.iter_mut().find(|b| b.key == bookmaker.key) {
                Some(existing) => {
                    added += existing.merge_markets(bookmaker.markets);
                }
                None => {
                    added += bookmaker.markets.len();
                    self.bookmakers.push(bookmaker);
                }
            }
        }
        added
    }

    /// Keep only the given market keys, dropping bookmakers left empty
    pub fn retain_markets(&mut self, keys: &HashSet<String>) {
        for bookmaker in &mut self.bookmakers {
            bookmaker.markets.retain(|m| keys.contains(&m.key));
        }
        self.bookmakers.retain(|b| !b.markets.is_empty());
    }

    /// Keep only bookmakers whose key is in `allowed`
    pub fn retain_bookmakers<S: AsRef<str>>(&mut self, allowed: &[S]) {
        self.bookmakers
            .retain(|b| allowed.iter().any(|a| a.as_ref() == b.key));
    }

    /// Total number of markets across all bookmakers
    pub fn market_count(&self) -> usize {
        self.bookmakers.iter().map(|b| b.markets.len()).sum()
    }

    /// Copy of this game carrying only markets for which `keep` is true
    pub fn slice_markets<F>(&self, keep: F) -> Game
    where
        F: Fn(&str) -> bool,
    {
        let mut game = self.clone();
        for bookmaker in &mut game.bookmakers {
            bookmaker.markets.retain(|m| keep(&m.key));
        }
        game.bookmakers.retain(|b| !b.markets.is_empty());
        game
    }
}

impl Bookmaker {
    pub fn has_market(&self, key: &str) -> bool {
        self.markets.iter().any(|m| m.key == key)
    }

    /// Whether this bookmaker quotes at least one of `keys`
    pub fn has_any_market(&self, keys: &HashSet<String>) -> bool {
        self.markets.iter().any(|m| keys.contains(&m.key))
    }

    /// Append markets whose key is not already present. Returns how many were added.
    pub fn merge_markets(&mut self, incoming: Vec<Market>) -> usize {
        let mut added = 0;
        for market in incoming {
            if !self.has_market(&market.key) {
                self.markets.push(market);
                added += 1;
            }
        }
        added
    }
}
