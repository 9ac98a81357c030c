//! Persistent Odds Store
//!
//! SQLite-backed second cache layer. Games are flattened into one row per
//! (sport, event, bookmaker, market) and grouped back into games on read.
//! The store is an optimization only: callers log and ignore its errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use odds_core::{Bookmaker, Game, Market, Outcome};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Backing store for odds rows
#[async_trait]
pub trait OddsStore: Send + Sync {
    /// Unexpired games for `sport`, restricted to the given markets and bookmakers
    async fn load_games(
        &self,
        sport: &str,
        markets: &[String],
        bookmakers: &[String],
    ) -> Result<Vec<Game>, OddsStoreError>;

    /// Upsert every market of every game, expiring after `ttl`.
    /// Returns the number of rows written.
    async fn store_games(
        &self,
        sport: &str,
        games: &[Game],
        ttl: Duration,
    ) -> Result<usize, OddsStoreError>;
}

/// SQLite implementation of [`OddsStore`]
pub struct SqliteOddsStore {
    conn: Mutex<Connection>,
}

/// One flattened row as read back from SQLite
struct OddsRow {
    event_id: String,
    sport_key: String,
    sport_title: Option<String>,
    commence_time: i64,
    home_team: String,
    away_team: String,
    bookmaker_key: String,
    bookmaker_title: String,
    bookmaker_last_update: i64,
    market_key: String,
    market_last_update: Option<i64>,
    outcomes: String,
}

impl SqliteOddsStore {
    /// Open (or create) the store at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, OddsStoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OddsStoreError::Io(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Create an in-memory store (useful for testing)
    pub fn new_in_memory() -> Result<Self, OddsStoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    fn init_schema(&self) -> Result<(), OddsStoreError> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS odds_cache (
                sport_key TEXT NOT NULL,
                event_id TEXT NOT NULL,
                bookmaker_key TEXT NOT NULL,
                market_key TEXT NOT NULL,
                sport_title TEXT,
                commence_time INTEGER NOT NULL,
                home_team TEXT NOT NULL,
                away_team TEXT NOT NULL,
                bookmaker_title TEXT NOT NULL,
                bookmaker_last_update INTEGER NOT NULL,
                market_last_update INTEGER,
                outcomes JSON NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (sport_key, event_id, bookmaker_key, market_key)
            );

            CREATE INDEX IF NOT EXISTS idx_odds_cache_sport
            ON odds_cache(sport_key, expires_at);
            "#,
        )?;

        Ok(())
    }

    fn load_rows(&self, sport: &str, now: i64) -> Result<Vec<OddsRow>, OddsStoreError> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"
            SELECT event_id, sport_key, sport_title, commence_time, home_team, away_team,
                   bookmaker_key, bookmaker_title, bookmaker_last_update,
                   market_key, market_last_update, outcomes
            FROM odds_cache
            WHERE sport_key = ?1 AND expires_at > ?2
            ORDER BY commence_time, event_id, bookmaker_key, market_key
            "#,
        )?;

        let rows = stmt
            .query_map(params![sport, now], |row| {
                Ok(OddsRow {
                    event_id: row.get(0)?,
                    sport_key: row.get(1)?,
                    sport_title: row.get(2)?,
                    commence_time: row.get(3)?,
                    home_team: row.get(4)?,
                    away_team: row.get(5)?,
                    bookmaker_key: row.get(6)?,
                    bookmaker_title: row.get(7)?,
                    bookmaker_last_update: row.get(8)?,
                    market_key: row.get(9)?,
                    market_last_update: row.get(10)?,
                    outcomes: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn write_games(&self, sport: &str, games: &[Game], expires_at: i64, now: i64) -> Result<usize, OddsStoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM odds_cache WHERE expires_at <= ?1", params![now])?;

        let mut written = 0;
        for game in games {
            for bookmaker in &game.bookmakers {
                for market in &bookmaker.markets {
                    let outcomes = serde_json::to_string(&market.outcomes)?;

                    tx.execute(
                        r#"
                        INSERT OR REPLACE INTO odds_cache (
                            sport_key, event_id, bookmaker_key, market_key, sport_title,
                            commence_time, home_team, away_team, bookmaker_title,
                            bookmaker_last_update, market_last_update, outcomes, expires_at
                        )
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                        "#,
                        params![
                            sport,
                            game.id,
                            bookmaker.key,
                            market.key,
                            game.sport_title,
                            game.commence_time.timestamp(),
                            game.home_team,
                            game.away_team,
                            bookmaker.title,
                            bookmaker.last_update.timestamp(),
                            market.last_update.map(|t| t.timestamp()),
                            outcomes,
                            expires_at,
                        ],
                    )?;
                    written += 1;
                }
            }
        }

        tx.commit()?;
        Ok(written)
    }
}

/// Group flattened rows back into games
fn rebuild_games(rows: Vec<OddsRow>, markets: &[String], bookmakers: &[String]) -> Vec<Game> {
    let mut games: IndexMap<String, Game> = IndexMap::new();

    for row in rows {
        if !markets.is_empty() && !markets.contains(&row.market_key) {
            continue;
        }
        if !bookmakers.is_empty() && !bookmakers.contains(&row.bookmaker_key) {
            continue;
        }

        let outcomes: Vec<Outcome> = match serde_json::from_str(&row.outcomes) {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(
                    "Skipping malformed cached outcomes for {}/{}/{}: {}",
                    row.event_id, row.bookmaker_key, row.market_key, e
                );
                continue;
            }
        };

        let game = games.entry(row.event_id.clone()).or_insert_with(|| Game {
            id: row.event_id.clone(),
            sport_key: row.sport_key.clone(),
            sport_title: row.sport_title.clone(),
            commence_time: from_timestamp(row.commence_time),
            home_team: row.home_team.clone(),
            away_team: row.away_team.clone(),
            bookmakers: Vec::new(),
        });

        let market = Market {
            key: row.market_key,
            last_update: row.market_last_update.map(from_timestamp),
            outcomes,
        };

        game.merge_bookmakers(vec![Bookmaker {
            key: row.bookmaker_key,
            title: row.bookmaker_title,
            last_update: from_timestamp(row.bookmaker_last_update),
            markets: vec![market],
        }]);
    }

    games.into_values().collect()
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

#[async_trait]
impl OddsStore for SqliteOddsStore {
    async fn load_games(
        &self,
        sport: &str,
        markets: &[String],
        bookmakers: &[String],
    ) -> Result<Vec<Game>, OddsStoreError> {
        let rows = self.load_rows(sport, Utc::now().timestamp())?;
        let games = rebuild_games(rows, markets, bookmakers);
        debug!("Loaded {} {} games from persistent cache", games.len(), sport);
        Ok(games)
    }

    async fn store_games(
        &self,
        sport: &str,
        games: &[Game],
        ttl: Duration,
    ) -> Result<usize, OddsStoreError> {
        let now = Utc::now().timestamp();
        let expires_at = now + ttl.as_secs() as i64;
        let written = self.write_games(sport, games, expires_at, now)?;
        debug!("Persisted {} {} odds rows", written, sport);
        Ok(written)
    }
}

/// Errors from the persistent odds store
#[derive(Debug, thiserror::Error)]
pub enum OddsStoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(String),
}
