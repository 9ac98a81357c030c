//! End-to-end aggregation tests against a mock vendor
//!
//! Run with: cargo test -p odds-services --test aggregation

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use odds_core::{Bookmaker, Game, Market, OddsError, OddsResult, Outcome, SubscriptionPlan};
use odds_services::config::RESTRICTED_BOOKMAKERS;
use odds_services::{
    CacheStore, EngineConfig, OddsParams, OddsRequest, OddsService, OddsStore, OddsStoreError,
    SqliteOddsStore,
};
use odds_vendor::{CommenceWindow, OddsQuery, OddsVendor};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Every book the mock quotes, including ones no plan may see
const MOCK_BOOKS: &[&str] = &[
    "draftkings",
    "fanduel",
    "betmgm",
    "williamhill_us",
    "espnbet",
    "bovada",
    "prizepicks",
    "pinnacle",
];

/// A market the mock always adds on top of the requested ones
const UNREQUESTED_MARKET: &str = "team_totals";

struct MockVendor {
    credentials: bool,
    delay: Duration,
    /// Extra latency on per-event calls only
    event_odds_delay: Duration,
    failing_sports: HashSet<String>,
    upcoming: usize,
    odds_calls: AtomicUsize,
    event_calls: AtomicUsize,
    event_odds_calls: AtomicUsize,
    event_odds_bookmakers: Mutex<Vec<Vec<String>>>,
    active_event_odds: AtomicUsize,
    peak_event_odds: AtomicUsize,
}

impl MockVendor {
    fn new() -> Self {
        Self {
            credentials: true,
            delay: Duration::ZERO,
            event_odds_delay: Duration::ZERO,
            failing_sports: HashSet::new(),
            upcoming: 5,
            odds_calls: AtomicUsize::new(0),
            event_calls: AtomicUsize::new(0),
            event_odds_calls: AtomicUsize::new(0),
            event_odds_bookmakers: Mutex::new(Vec::new()),
            active_event_odds: AtomicUsize::new(0),
            peak_event_odds: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_event_odds_delay(mut self, delay: Duration) -> Self {
        self.event_odds_delay = delay;
        self
    }

    fn failing(mut self, sport: &str) -> Self {
        self.failing_sports.insert(sport.to_string());
        self
    }

    fn without_credentials(mut self) -> Self {
        self.credentials = false;
        self
    }

    async fn respond(&self, sport: &str) -> OddsResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing_sports.contains(sport) {
            return Err(OddsError::api(500, "upstream unavailable"));
        }
        Ok(())
    }

    /// Upcoming events plus one that started an hour ago
    fn schedule(&self, sport: &str) -> Vec<Game> {
        let now = Utc::now();
        let mut games = vec![event(sport, "started", now - ChronoDuration::hours(1))];
        for i in 0..self.upcoming {
            let id = format!("{}-{}", sport, i);
            games.push(event(sport, &id, now + ChronoDuration::hours(i as i64 + 1)));
        }
        games
    }
}

fn event(sport: &str, id: &str, commence_time: chrono::DateTime<Utc>) -> Game {
    Game {
        id: id.to_string(),
        sport_key: sport.to_string(),
        sport_title: None,
        commence_time,
        home_team: "Home".to_string(),
        away_team: "Away".to_string(),
        bookmakers: vec![],
    }
}

fn quoted_bookmakers(markets: &[String]) -> Vec<Bookmaker> {
    MOCK_BOOKS
        .iter()
        .map(|book| Bookmaker {
            key: book.to_string(),
            title: book.to_string(),
            last_update: Utc::now(),
            markets: markets
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(UNREQUESTED_MARKET))
                .map(|key| Market {
                    key: key.to_string(),
                    last_update: None,
                    outcomes: vec![Outcome {
                        name: "Home".to_string(),
                        price: dec!(-110),
                        point: Some(dec!(3.5)),
                        description: None,
                    }],
                })
                .collect(),
        })
        .collect()
}

#[async_trait]
impl OddsVendor for MockVendor {
    fn has_credentials(&self) -> bool {
        self.credentials
    }

    async fn sport_odds(&self, sport: &str, query: &OddsQuery) -> OddsResult<Vec<Game>> {
        self.odds_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(sport).await?;
        Ok(self
            .schedule(sport)
            .into_iter()
            .map(|mut g| {
                g.bookmakers = quoted_bookmakers(&query.markets);
                g
            })
            .collect())
    }

    async fn sport_events(&self, sport: &str, _window: &CommenceWindow) -> OddsResult<Vec<Game>> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(sport).await?;
        Ok(self.schedule(sport))
    }

    async fn event_odds(&self, sport: &str, event_id: &str, query: &OddsQuery) -> OddsResult<Game> {
        self.event_odds_calls.fetch_add(1, Ordering::SeqCst);
        self.event_odds_bookmakers.lock().push(query.bookmakers.clone());

        let active = self.active_event_odds.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_event_odds.fetch_max(active, Ordering::SeqCst);
        if !self.event_odds_delay.is_zero() {
            tokio::time::sleep(self.event_odds_delay).await;
        }
        self.active_event_odds.fetch_sub(1, Ordering::SeqCst);

        self.respond(sport).await?;
        let mut game = self
            .schedule(sport)
            .into_iter()
            .find(|g| g.id == event_id)
            .ok_or_else(|| OddsError::api(404, "event not found"))?;
        game.bookmakers = quoted_bookmakers(&query.markets);
        Ok(game)
    }
}

/// A persistent store that is always down
struct BrokenStore;

#[async_trait]
impl OddsStore for BrokenStore {
    async fn load_games(
        &self,
        _sport: &str,
        _markets: &[String],
        _bookmakers: &[String],
    ) -> Result<Vec<Game>, OddsStoreError> {
        Err(OddsStoreError::Io("disk unavailable".to_string()))
    }

    async fn store_games(&self, _sport: &str, _games: &[Game], _ttl: Duration) -> Result<usize, OddsStoreError> {
        Err(OddsStoreError::Io("disk unavailable".to_string()))
    }
}

fn service(vendor: Arc<MockVendor>, store: Option<Arc<dyn OddsStore>>) -> OddsService {
    service_with(vendor, store, EngineConfig::default())
}

fn service_with(vendor: Arc<MockVendor>, store: Option<Arc<dyn OddsStore>>, config: EngineConfig) -> OddsService {
    let config = EngineConfig {
        api_key: Some("test-key".to_string()),
        ..config
    };
    let cache = Arc::new(CacheStore::new(config.ttls, config.prop_cache));
    OddsService::new(vendor, cache, store, Arc::new(config))
}

fn request(sports: &str, markets: &str, plan: SubscriptionPlan) -> OddsRequest {
    let params = OddsParams {
        sports: Some(sports.to_string()),
        markets: Some(markets.to_string()),
        ..OddsParams::default()
    };
    OddsRequest::parse(params, plan).unwrap()
}

fn props_request(sports: &str, markets: &str, plan: SubscriptionPlan) -> OddsRequest {
    let params = OddsParams {
        sports: Some(sports.to_string()),
        markets: Some(markets.to_string()),
        bet_type: Some("props".to_string()),
        ..OddsParams::default()
    };
    OddsRequest::parse(params, plan).unwrap()
}

fn market_keys(games: &[Game]) -> HashSet<String> {
    games
        .iter()
        .flat_map(|g| g.bookmakers.iter())
        .flat_map(|b| b.markets.iter())
        .map(|m| m.key.clone())
        .collect()
}

#[tokio::test]
async fn test_identical_concurrent_requests_share_one_vendor_call() {
    let vendor = Arc::new(MockVendor::new().with_delay(Duration::from_millis(50)));
    let service = service(vendor.clone(), None);

    let (a, b) = tokio::join!(
        service.get_odds(request("basketball_nba", "h2h,spreads", SubscriptionPlan::Premium)),
        service.get_odds(request("basketball_nba", "h2h,spreads", SubscriptionPlan::Premium)),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(vendor.odds_calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.games, b.games);
    assert_eq!(a.counts, b.counts);
    assert_eq!(service.cache().in_flight_count(), 0);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_memory() {
    let vendor = Arc::new(MockVendor::new());
    let service = service(vendor.clone(), None);

    service
        .get_odds(request("basketball_nba", "h2h", SubscriptionPlan::Premium))
        .await
        .unwrap();
    service
        .get_odds(request("basketball_nba", "h2h", SubscriptionPlan::Premium))
        .await
        .unwrap();

    assert_eq!(vendor.odds_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_regular_slice_is_reused_after_mixed_request() {
    let vendor = Arc::new(MockVendor::new());
    let service = service(vendor.clone(), None);

    service
        .get_odds(request("basketball_nba", "h2h,alternate_spreads", SubscriptionPlan::Premium))
        .await
        .unwrap();
    let regular = service
        .get_odds(request("basketball_nba", "h2h", SubscriptionPlan::Premium))
        .await
        .unwrap();

    assert_eq!(vendor.odds_calls.load(Ordering::SeqCst), 1);
    assert_eq!(market_keys(&regular.games), HashSet::from(["h2h".to_string()]));
}

#[tokio::test]
async fn test_failing_sport_does_not_sink_the_request() {
    let vendor = Arc::new(MockVendor::new().failing("icehockey_nhl"));
    let service = service(vendor.clone(), None);

    let response = service
        .get_odds(request("basketball_nba,icehockey_nhl", "h2h", SubscriptionPlan::Premium))
        .await
        .unwrap();

    assert_eq!(response.counts.get("basketball_nba"), Some(&5));
    assert_eq!(response.counts.get("icehockey_nhl"), Some(&0));
    assert!(response.games.iter().all(|g| g.sport_key == "basketball_nba"));
}

#[tokio::test]
async fn test_started_games_are_dropped() {
    let vendor = Arc::new(MockVendor::new());
    let service = service(vendor, None);

    let response = service
        .get_odds(request("basketball_nba", "h2h", SubscriptionPlan::Free))
        .await
        .unwrap();

    let now = Utc::now();
    assert_eq!(response.games.len(), 5);
    assert!(response.games.iter().all(|g| !g.has_started(now)));
}

#[tokio::test]
async fn test_response_is_trimmed_to_requested_markets_and_plan_books() {
    let vendor = Arc::new(MockVendor::new());
    let service = service(vendor, None);

    let response = service
        .get_odds(request("basketball_nba", "spreads", SubscriptionPlan::Free))
        .await
        .unwrap();

    assert_eq!(market_keys(&response.games), HashSet::from(["spreads".to_string()]));
    for game in &response.games {
        assert!(!game.bookmakers.is_empty());
        for book in &game.bookmakers {
            assert!(RESTRICTED_BOOKMAKERS.contains(&book.key.as_str()), "{} leaked", book.key);
        }
    }
}

#[tokio::test]
async fn test_period_markets_respect_plan_game_limit() {
    let vendor = Arc::new(MockVendor::new());
    let service = service(vendor.clone(), None);

    let response = service
        .get_odds(request("basketball_nba", "h2h,h2h_q1", SubscriptionPlan::Free))
        .await
        .unwrap();

    assert_eq!(vendor.event_odds_calls.load(Ordering::SeqCst), 3);
    let with_period = response
        .games
        .iter()
        .filter(|g| g.bookmakers.iter().any(|b| b.has_market("h2h_q1")))
        .count();
    assert_eq!(with_period, 3);
}

#[tokio::test]
async fn test_repeat_period_request_hits_cache_without_duplicating_markets() {
    let vendor = Arc::new(MockVendor::new());
    let service = service(vendor.clone(), None);

    service
        .get_odds(request("basketball_nba", "h2h,h2h_q1", SubscriptionPlan::Free))
        .await
        .unwrap();
    let second = service
        .get_odds(request("basketball_nba", "h2h,h2h_q1", SubscriptionPlan::Free))
        .await
        .unwrap();

    assert_eq!(vendor.odds_calls.load(Ordering::SeqCst), 1);
    assert_eq!(vendor.event_odds_calls.load(Ordering::SeqCst), 3);

    let with_period = second
        .games
        .iter()
        .filter(|g| g.bookmakers.iter().any(|b| b.has_market("h2h_q1")))
        .count();
    assert_eq!(with_period, 3);

    for book in second.games.iter().flat_map(|g| g.bookmakers.iter()) {
        let keys: Vec<&str> = book.markets.iter().map(|m| m.key.as_str()).collect();
        let unique: HashSet<&str> = keys.iter().copied().collect();
        assert_eq!(keys.len(), unique.len(), "{} repeats a market: {:?}", book.key, keys);
    }
}

#[tokio::test]
async fn test_prop_fan_out_is_bounded() {
    let vendor = Arc::new(MockVendor::new().with_event_odds_delay(Duration::from_millis(20)));
    let config = EngineConfig {
        prop_concurrency: 2,
        ..EngineConfig::default()
    };
    let service = service_with(vendor.clone(), None, config);

    let response = service
        .get_odds(props_request("basketball_nba", "player_points", SubscriptionPlan::Premium))
        .await
        .unwrap();

    assert_eq!(vendor.event_odds_calls.load(Ordering::SeqCst), 5);
    assert_eq!(vendor.peak_event_odds.load(Ordering::SeqCst), 2);
    assert_eq!(response.counts.get("basketball_nba"), Some(&5));
}

#[tokio::test]
async fn test_restricted_plan_props_stay_on_restricted_books() {
    let vendor = Arc::new(MockVendor::new());
    let service = service(vendor.clone(), None);

    let response = service
        .get_odds(props_request("basketball_nba", "h2h,player_points", SubscriptionPlan::Free))
        .await
        .unwrap();

    // One call per upcoming event; the started one is skipped
    assert_eq!(vendor.event_calls.load(Ordering::SeqCst), 1);
    assert_eq!(vendor.event_odds_calls.load(Ordering::SeqCst), 5);

    for books in vendor.event_odds_bookmakers.lock().iter() {
        assert!(books.iter().all(|b| RESTRICTED_BOOKMAKERS.contains(&b.as_str())));
    }
    for book in response.games.iter().flat_map(|g| g.bookmakers.iter()) {
        assert!(RESTRICTED_BOOKMAKERS.contains(&book.key.as_str()), "{} leaked", book.key);
    }
    assert!(market_keys(&response.games).contains("player_points"));
}

#[tokio::test]
async fn test_props_ignored_for_straight_bets() {
    let vendor = Arc::new(MockVendor::new());
    let service = service(vendor.clone(), None);

    let response = service
        .get_odds(request("basketball_nba", "h2h,player_points", SubscriptionPlan::Premium))
        .await
        .unwrap();

    assert_eq!(vendor.event_calls.load(Ordering::SeqCst), 0);
    assert_eq!(vendor.event_odds_calls.load(Ordering::SeqCst), 0);
    assert!(!market_keys(&response.games).contains("player_points"));
}

#[tokio::test]
async fn test_all_props_keeps_every_fetched_market() {
    let vendor = Arc::new(MockVendor::new());
    let service = service(vendor, None);

    let params = OddsParams {
        sports: Some("basketball_nba".to_string()),
        markets: Some("player_points".to_string()),
        bet_type: Some("props".to_string()),
        all_props: Some(true),
        ..OddsParams::default()
    };
    let response = service
        .get_odds(OddsRequest::parse(params, SubscriptionPlan::Premium).unwrap())
        .await
        .unwrap();

    let markets = market_keys(&response.games);
    assert!(markets.contains("player_points"));
    assert!(markets.contains(UNREQUESTED_MARKET));
}

#[tokio::test(start_paused = true)]
async fn test_stale_props_are_served_then_refreshed_once() {
    let vendor = Arc::new(MockVendor::new());
    let service = service(vendor.clone(), None);
    let req = || props_request("basketball_nba", "player_points", SubscriptionPlan::Premium);

    service.get_odds(req()).await.unwrap();
    assert_eq!(vendor.event_odds_calls.load(Ordering::SeqCst), 5);

    // Past the stale threshold, within the prop TTL
    tokio::time::advance(Duration::from_secs(11 * 60)).await;

    let stale = service.get_odds(req()).await.unwrap();
    assert_eq!(stale.counts.get("basketball_nba"), Some(&5));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(vendor.event_odds_calls.load(Ordering::SeqCst), 10);
    assert_eq!(service.cache().stats().refreshing, 0);

    // Refreshed entries are fresh again
    service.get_odds(req()).await.unwrap();
    assert_eq!(vendor.event_odds_calls.load(Ordering::SeqCst), 10);
}

#[tokio::test(start_paused = true)]
async fn test_request_after_expiry_joins_running_refresh() {
    let vendor = Arc::new(MockVendor::new().with_event_odds_delay(Duration::from_secs(60)));
    let service = service(vendor.clone(), None);
    let req = || props_request("basketball_nba", "player_points", SubscriptionPlan::Premium);

    // Props land in the cache once the first round of calls returns
    service.get_odds(req()).await.unwrap();
    assert_eq!(vendor.event_odds_calls.load(Ordering::SeqCst), 5);

    // Stale but not yet expired: served as-is while refreshes start
    tokio::time::advance(Duration::from_secs(1750)).await;
    service.get_odds(req()).await.unwrap();
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
    assert_eq!(vendor.event_odds_calls.load(Ordering::SeqCst), 10);

    // Entries expire while the refreshes are still waiting on the vendor
    tokio::time::advance(Duration::from_secs(55)).await;
    let joined = service.get_odds(req()).await.unwrap();

    assert_eq!(joined.counts.get("basketball_nba"), Some(&5));
    assert_eq!(vendor.event_odds_calls.load(Ordering::SeqCst), 10);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(service.cache().in_flight_count(), 0);
    assert_eq!(service.cache().stats().refreshing, 0);
}

#[tokio::test]
async fn test_missing_sports_is_rejected() {
    let result = OddsRequest::parse(OddsParams::default(), SubscriptionPlan::Premium);
    assert!(matches!(result, Err(OddsError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_missing_credentials_fail_before_vendor_call() {
    let vendor = Arc::new(MockVendor::new().without_credentials());
    let service = service(vendor.clone(), None);

    let result = service
        .get_odds(request("basketball_nba", "h2h", SubscriptionPlan::Premium))
        .await;

    assert!(matches!(result, Err(OddsError::Config(_))));
    assert_eq!(vendor.odds_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_broken_persistent_store_is_ignored() {
    let vendor = Arc::new(MockVendor::new());
    let service = service(vendor.clone(), Some(Arc::new(BrokenStore)));

    let response = service
        .get_odds(request("basketball_nba", "h2h", SubscriptionPlan::Premium))
        .await
        .unwrap();

    assert_eq!(response.games.len(), 5);
    assert_eq!(vendor.odds_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_persistent_store_answers_after_memory_is_lost() {
    let vendor = Arc::new(MockVendor::new());
    let store: Arc<dyn OddsStore> = Arc::new(SqliteOddsStore::new_in_memory().unwrap());

    let first = service(vendor.clone(), Some(store.clone()))
        .get_odds(request("basketball_nba", "h2h,spreads", SubscriptionPlan::Premium))
        .await
        .unwrap();

    // Fresh memory cache, same persistent store
    let second = service(vendor.clone(), Some(store))
        .get_odds(request("basketball_nba", "h2h,spreads", SubscriptionPlan::Premium))
        .await
        .unwrap();

    assert_eq!(vendor.odds_calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.games.len(), second.games.len());
    assert_eq!(market_keys(&second.games), market_keys(&first.games));
}
