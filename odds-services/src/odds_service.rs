//! Odds aggregation service
//!
//! Turns one inbound odds request into the smallest set of vendor calls
//! that can answer it:
//! 1. base markets per sport (persistent store, memory cache, then vendor),
//! 2. period markets for the first games of each sport, one call per event,
//! 3. player props for every upcoming event, fanned out with bounded concurrency.
//!
//! Every vendor call goes through the in-flight registry, so concurrent
//! requests with the same signature share a single billed call. A failing
//! sport or event only loses its own contribution.

use crate::cache_store::{CacheStore, InFlightGuard, RefreshGuard, PROP_KEY_PREFIX};
use crate::config::EngineConfig;
use crate::market_classifier::{
    bookmakers_for_plan, canonicalize, classify, is_alternate, is_market_supported,
    prop_bookmakers_for_plan, MarketCategory, BASE_MARKETS,
};
use crate::odds_store::OddsStore;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::{join_all, BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use odds_core::{Game, OddsError, OddsResult, SubscriptionPlan};
use odds_vendor::{CommenceWindow, OddsFormat, OddsQuery, OddsVendor, QuotaSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Upper bound on sports in a single request

/// Whether player propositions may be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetType {
    #[default]
    Straight,
    Props,
}

impl std::str::FromStr for BetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "straight" | "game" => Ok(BetType::Straight),
            "props" | "prop" | "player_props" => Ok(BetType::Props),
            _ => Err(format!("Unknown bet type: {}", s)),
        }
    }
}

/// Raw query parameters of the odds endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsParams {
    /// Comma-separated sport keys (required)
    pub sports: Option<String>,
    pub regions: Option<String>,
    /// Comma-separated market keys; aliases are accepted
    pub markets: Option<String>,
    pub odds_format: Option<String>,
    /// `YYYY-MM-DD`, restricts to games starting that UTC day
    pub date: Option<String>,
    pub bet_type: Option<String>,
    /// Return every market fetched for props instead of only the requested ones
    pub all_props: Option<bool>,
}

/// A validated odds request
#[derive(Debug, Clone, PartialEq)]
pub struct OddsRequest {
    pub sports: Vec<String>,
    pub regions: Option<String>,
    /// Canonical market keys, deduplicated in request order
    pub markets: Vec<String>,
    pub odds_format: OddsFormat,
    pub window: CommenceWindow,
    pub bet_type: BetType,
    pub all_props: bool,
    pub plan: SubscriptionPlan,
}

impl OddsRequest {
    /// Validate raw parameters
    pub fn parse(params: OddsParams, plan: SubscriptionPlan) -> OddsResult<Self> {
        let sports = split_dedup(params.sports.as_deref().unwrap_or_default(), |s| s.to_lowercase());
        if sports.is_empty() {
            return Err(OddsError::invalid_request("sports parameter is required"));
        }

        let mut markets = split_dedup(params.markets.as_deref().unwrap_or_default(), canonicalize);
        if markets.is_empty() {
            markets = BASE_MARKETS.iter().map(|m| m.to_string()).collect();
        }

        let odds_format = match params.odds_format.as_deref().map(str::trim) {
            None | Some("") => OddsFormat::default(),
            Some(f) => f.parse().map_err(OddsError::invalid_request)?,
        };

        let window = match params.date.as_deref().map(str::trim) {
            None | Some("") => CommenceWindow::default(),
            Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map(CommenceWindow::for_date)
                .map_err(|e| OddsError::invalid_request(format!("invalid date {}: {}", d, e)))?,
        };

        let bet_type = match params.bet_type.as_deref() {
            None => BetType::default(),
            Some(b) => b.parse().map_err(OddsError::invalid_request)?,
        };

        let regions = params
            .regions
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty());

        Ok(Self {
            sports,
            regions,
            markets,
            odds_format,
            window,
            bet_type,
            all_props: params.all_props.unwrap_or(false),
            plan,
        })
    }
}

/// Assembled odds for a request
#[derive(Debug, Clone, Serialize)]
pub struct OddsResponse {
    pub games: Vec<Game>,
    /// Games returned per sport
    pub counts: BTreeMap<String, usize>,
}

/// Markets to fetch for one sport, by phase
#[derive(Debug, Clone)]
struct SportPlan {
    sport: String,
    base: Vec<String>,
    period: Vec<String>,
    props: Vec<String>,
}

#[derive(Debug, Clone)]
struct FetchPlan {
    sports: Vec<SportPlan>,
    requested: HashSet<String>,
    bookmakers: Vec<String>,
    prop_bookmakers: Vec<String>,
    regions: String,
    period_game_limit: usize,
}

impl FetchPlan {
    fn has_period(&self) -> bool {
        self.sports.iter().any(|s| !s.period.is_empty())
    }

    fn has_props(&self) -> bool {
        self.sports.iter().any(|s| !s.props.is_empty())
    }
}

/// Odds aggregation service
#[derive(Clone)]
pub struct OddsService {
    vendor: Arc<dyn OddsVendor>,
    cache: Arc<CacheStore>,
    store: Option<Arc<dyn OddsStore>>,
    config: Arc<EngineConfig>,
}

impl OddsService {
    pub fn new(
        vendor: Arc<dyn OddsVendor>,
        cache: Arc<CacheStore>,
        store: Option<Arc<dyn OddsStore>>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            vendor,
            cache,
            store,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn quota(&self) -> Option<QuotaSnapshot> {
        self.vendor.quota()
    }

    /// Periodically purge expired cache entries
    pub fn spawn_cache_sweeper(&self) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!("Purged {} expired cache entries", purged);
                }
            }
        })
    }

    /// Assemble odds for a request
    #[instrument(skip(self, request), fields(sports = %request.sports.join(","), plan = %request.plan))]
    pub async fn get_odds(&self, request: OddsRequest) -> OddsResult<OddsResponse> {
        if !self.vendor.has_credentials() {
            return Err(OddsError::config("Odds API key is not configured"));
        }

        let plan = self.plan(&request);
        let now = Utc::now();

        let mut games: IndexMap<String, Vec<Game>> = plan
            .sports
            .iter()
            .map(|s| (s.sport.clone(), Vec::new()))
            .collect();

        // Base markets
        let (req, fetch_plan) = (&request, &plan);
        let base_results = join_all(
            plan.sports
                .iter()
                .filter(|s| !s.base.is_empty())
                .map(|s| async move { (s.sport.clone(), self.fetch_base(req, fetch_plan, s).await) }),
        )
        .await;

        for (sport, result) in base_results {
            match result {
                Ok(sport_games) => {
                    games.insert(sport, sport_games);
                }
                Err(e) => log_failure(&format!("Failed to fetch {} odds", sport), &e),
            }
        }

        for sport_games in games.values_mut() {
            retain_upcoming(sport_games, now);
        }

        if plan.has_period() {
            self.apply_period_odds(&request, &plan, &mut games).await;
        }

        if plan.has_props() {
            self.apply_prop_odds(&request, &plan, &mut games, now).await;
        }

        let allowed = if plan.has_props() {
            &plan.prop_bookmakers
        } else {
            &plan.bookmakers
        };
        let trim_markets = !(request.bet_type == BetType::Props && request.all_props);

        for sport_games in games.values_mut() {
            for game in sport_games.iter_mut() {
                game.retain_bookmakers(allowed);
                if trim_markets {
                    game.retain_markets(&plan.requested);
                }
            }
        }

        let counts: BTreeMap<String, usize> = games
            .iter()
            .map(|(sport, list)| (sport.clone(), list.len()))
            .collect();
        info!("Assembled odds: {:?}", counts);

        Ok(OddsResponse {
            games: games.into_values().flatten().collect(),
            counts,
        })
    }

    fn plan(&self, request: &OddsRequest) -> FetchPlan {
        let sports = request
            .sports
            .iter()
            .map(|sport| {
                let mut sport_plan = SportPlan {
                    sport: sport.clone(),
                    base: Vec::new(),
                    period: Vec::new(),
                    props: Vec::new(),
                };

                for market in &request.markets {
                    if !is_market_supported(sport, market) {
                        debug!("Skipping {} for {}: not offered by the vendor", market, sport);
                        continue;
                    }
                    match classify(market) {
                        MarketCategory::Base => sport_plan.base.push(market.clone()),
                        MarketCategory::Period => sport_plan.period.push(market.clone()),
                        MarketCategory::PlayerProp if request.bet_type == BetType::Props => {
                            sport_plan.props.push(market.clone())
                        }
                        MarketCategory::PlayerProp => {
                            debug!("Skipping {}: player props need betType=props", market)
                        }
                    }
                }

                sport_plan
            })
            .collect();

        let period_game_limit = if request.plan.is_full() {
            self.config.period_game_limit
        } else {
            self.config.restricted_period_game_limit
        };

        FetchPlan {
            sports,
            requested: request.markets.iter().cloned().collect(),
            bookmakers: bookmakers_for_plan(request.plan, &self.config.bookmakers),
            prop_bookmakers: prop_bookmakers_for_plan(request.plan, &self.config.bookmakers),
            regions: request
                .regions
                .clone()
                .unwrap_or_else(|| self.config.default_regions.clone()),
            period_game_limit,
        }
    }

    // =========================================================================
    // Base markets
    // =========================================================================

    async fn fetch_base(
        &self,
        request: &OddsRequest,
        plan: &FetchPlan,
        sport_plan: &SportPlan,
    ) -> OddsResult<Vec<Game>> {
        let sport = sport_plan.sport.as_str();
        let query = OddsQuery {
            regions: plan.regions.clone(),
            markets: sport_plan.base.clone(),
            bookmakers: plan.bookmakers.clone(),
            odds_format: request.odds_format,
            window: request.window,
        };

        // Prop requests want the freshest lines, so they skip the persistent layer
        if !plan.has_props() {
            if let Some(games) = self.load_persisted(sport, &query).await {
                return Ok(games);
            }
        }

        if let Some(games) = self.cached_for_sport(&odds_cache_key(sport, &query), sport) {
            debug!("Memory cache hit for {} base odds", sport);
            return Ok(games);
        }

        let (regular, alternate): (Vec<String>, Vec<String>) =
            query.markets.iter().cloned().partition(|m| !is_alternate(m));

        let mut partial: Vec<Game> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        for slice in [regular, alternate] {
            if slice.is_empty() {
                continue;
            }
            let key = odds_cache_key(sport, &query.with_markets(slice.clone()));
            match self.cached_for_sport(&key, sport) {
                Some(games) => merge_game_lists(&mut partial, games),
                None => missing.extend(slice),
            }
        }

        if missing.is_empty() {
            debug!("Memory cache hit for {} regular and alternate slices", sport);
            return Ok(partial);
        }

        match self.fetch_sport_odds(sport, query.with_markets(missing)).await {
            Ok(mut games) => {
                merge_game_lists(&mut games, partial);
                Ok(games)
            }
            Err(e) if !partial.is_empty() => {
                warn!("Serving cached {} slice after vendor failure: {}", sport, e);
                Ok(partial)
            }
            Err(e) => Err(e),
        }
    }

    async fn load_persisted(&self, sport: &str, query: &OddsQuery) -> Option<Vec<Game>> {
        let store = self.store.as_ref()?;
        // Rows are stored without their price format
        if query.odds_format != OddsFormat::American {
            return None;
        }

        match store.load_games(sport, &query.markets, &query.bookmakers).await {
            Ok(games) => {
                let games: Vec<Game> = games
                    .into_iter()
                    .filter(|g| in_window(g, &query.window))
                    .collect();
                if covers_markets(&games, &query.markets) {
                    debug!("Persistent cache hit for {} ({} games)", sport, games.len());
                    Some(games)
                } else {
                    None
                }
            }
            Err(e) => {
                warn!("Persistent odds cache unavailable for {}: {}", sport, e);
                None
            }
        }
    }

    /// Memory cache read that discards entries tagged with another sport
    fn cached_for_sport(&self, key: &str, sport: &str) -> Option<Vec<Game>> {
        let games = self.cache.get(key)?;
        if games.iter().any(|g| g.sport_key != sport) {
            warn!("Discarding cache entry {} containing games from another sport", key);
            self.cache.delete(key);
            return None;
        }
        Some(games)
    }

    async fn fetch_sport_odds(&self, sport: &str, query: OddsQuery) -> OddsResult<Vec<Game>> {
        let key = odds_cache_key(sport, &query);

        let vendor = Arc::clone(&self.vendor);
        let cache = Arc::clone(&self.cache);
        let store = self.store.clone();
        let config = Arc::clone(&self.config);
        let sport = sport.to_string();
        let fetch_key = key.clone();

        let fetch = async move {
            // A call that settled between our miss and registration already cached this
            if let Some(games) = cache.get(&fetch_key) {
                return Ok(games);
            }

            let games = vendor.sport_odds(&sport, &query).await?;
            info!("Fetched {} {} games from vendor", games.len(), sport);

            cache_base_shapes(&cache, &config, &sport, &query, &games);

            if let Some(store) = store {
                if query.odds_format == OddsFormat::American {
                    if let Err(e) = store.store_games(&sport, &games, config.persist_ttl).await {
                        warn!("Failed to persist {} odds: {}", sport, e);
                    }
                }
            }

            Ok(games)
        }
        .boxed();

        self.coalesce(&key, fetch).await
    }

    // =========================================================================
    // Period markets
    // =========================================================================

    async fn apply_period_odds(
        &self,
        request: &OddsRequest,
        plan: &FetchPlan,
        games: &mut IndexMap<String, Vec<Game>>,
    ) {
        let mut units = Vec::new();
        for sport_plan in plan.sports.iter().filter(|s| !s.period.is_empty()) {
            let query = OddsQuery {
                regions: plan.regions.clone(),
                markets: sport_plan.period.clone(),
                bookmakers: plan.bookmakers.clone(),
                odds_format: request.odds_format,
                window: CommenceWindow::default(),
            };
            if let Some(sport_games) = games.get(&sport_plan.sport) {
                for game in sport_games.iter().take(plan.period_game_limit) {
                    units.push((sport_plan.sport.clone(), game.id.clone(), query.clone()));
                }
            }
        }

        if units.is_empty() {
            return;
        }
        debug!("Fetching period odds for {} events", units.len());

        let results: Vec<_> = stream::iter(units)
            .map(|(sport, event_id, query)| async move {
                let result = self.fetch_period_odds(&sport, &event_id, &query).await;
                (sport, event_id, result)
            })
            .buffer_unordered(self.config.prop_concurrency)
            .collect()
            .await;

        for (sport, event_id, result) in results {
            match result {
                Ok(period_game) => {
                    if let Some(game) = games
                        .get_mut(&sport)
                        .and_then(|list| list.iter_mut().find(|g| g.id == event_id))
                    {
                        game.merge_bookmakers(period_game.bookmakers);
                    }
                }
                Err(e) => log_failure(&format!("Period odds unavailable for {} event {}", sport, event_id), &e),
            }
        }
    }

    async fn fetch_period_odds(&self, sport: &str, event_id: &str, query: &OddsQuery) -> OddsResult<Game> {
        let key = period_cache_key(sport, event_id, query);

        if let Some(game) = self.cache.get(&key).and_then(|games| games.into_iter().next()) {
            debug!("Period cache hit for {}", key);
            return Ok(game);
        }

        let cache = Arc::clone(&self.cache);
        let ttl = self.config.period_ttl;
        let call = self.vendor_event_odds(sport, event_id, query);
        let cache_key = key.clone();

        let fetch = async move {
            let game = call.await?;
            cache.set(&cache_key, vec![game.clone()], Some(ttl));
            Ok(vec![game])
        }
        .boxed();

        first_game(self.coalesce(&key, fetch).await?, event_id)
    }

    // =========================================================================
    // Player props
    // =========================================================================

    async fn apply_prop_odds(
        &self,
        request: &OddsRequest,
        plan: &FetchPlan,
        games: &mut IndexMap<String, Vec<Game>>,
        now: DateTime<Utc>,
    ) {
        let prop_sports: Vec<&SportPlan> = plan.sports.iter().filter(|s| !s.props.is_empty()).collect();

        let event_lists = join_all(prop_sports.into_iter().map(|sport_plan| async move {
            let events = self.fetch_events(&sport_plan.sport, &request.window).await;
            (sport_plan, events)
        }))
        .await;

        let mut units = Vec::new();
        for (sport_plan, result) in event_lists {
            match result {
                Ok(events) => {
                    let query = OddsQuery {
                        regions: self.config.prop_regions.clone(),
                        markets: sport_plan.props.clone(),
                        bookmakers: plan.prop_bookmakers.clone(),
                        odds_format: request.odds_format,
                        window: CommenceWindow::default(),
                    };
                    for event in events.iter().filter(|e| !e.has_started(now)) {
                        units.push((sport_plan.sport.clone(), event.id.clone(), query.clone()));
                    }
                }
                Err(e) => log_failure(&format!("Failed to list {} events", sport_plan.sport), &e),
            }
        }

        if units.is_empty() {
            return;
        }
        debug!("Fetching player props for {} events", units.len());

        let results: Vec<_> = stream::iter(units)
            .map(|(sport, event_id, query)| async move {
                let result = self.fetch_prop_odds(&sport, &event_id, &query).await;
                (sport, event_id, query, result)
            })
            .buffer_unordered(self.config.prop_concurrency)
            .collect()
            .await;

        for (sport, event_id, query, result) in results {
            let mut prop_game = match result {
                Ok(game) => game,
                Err(e) => {
                    log_failure(&format!("Player props unavailable for {} event {}", sport, event_id), &e);
                    continue;
                }
            };

            let wanted: HashSet<String> = query.markets.iter().cloned().collect();
            prop_game.bookmakers.retain(|b| b.has_any_market(&wanted));
            if prop_game.bookmakers.is_empty() {
                continue;
            }

            let sport_games = games.entry(sport).or_default();
            match sport_games.iter_mut().find(|g| g.id == prop_game.id) {
                Some(existing) => {
                    existing.merge_bookmakers(prop_game.bookmakers);
                }
                None => sport_games.push(prop_game),
            }
        }
    }

    async fn fetch_events(&self, sport: &str, window: &CommenceWindow) -> OddsResult<Vec<Game>> {
        let key = format!("events:{}:{}", sport, window.cache_fragment());

        if let Some(events) = self.cached_for_sport(&key, sport) {
            return Ok(events);
        }

        let vendor = Arc::clone(&self.vendor);
        let cache = Arc::clone(&self.cache);
        let ttl = self.config.events_ttl;
        let sport = sport.to_string();
        let window = *window;
        let cache_key = key.clone();

        let fetch = async move {
            let events = vendor.sport_events(&sport, &window).await?;
            debug!("Discovered {} {} events", events.len(), sport);
            cache.set(&cache_key, events.clone(), Some(ttl));
            Ok(events)
        }
        .boxed();

        self.coalesce(&key, fetch).await
    }

    async fn fetch_prop_odds(&self, sport: &str, event_id: &str, query: &OddsQuery) -> OddsResult<Game> {
        let key = prop_cache_key(sport, event_id, query);

        if let Some(lookup) = self.cache.get_prop(&key) {
            if lookup.is_stale {
                debug!("Serving stale props for {} (age {:?})", key, lookup.age);
                self.spawn_prop_refresh(&key, sport, event_id, query);
            }
            return Ok(lookup.data);
        }

        let fetch = self.prop_fetch(&key, sport, event_id, query);
        first_game(self.coalesce(&key, fetch).await?, event_id)
    }

    /// Refresh a stale prop entry in the background, at most once per key.
    /// The refresh registers as the key's in-flight call, so a request that
    /// misses while it runs shares its result.
    fn spawn_prop_refresh(&self, key: &str, sport: &str, event_id: &str, query: &OddsQuery) {
        let Some(guard) = RefreshGuard::acquire(&self.cache, key) else {
            return;
        };

        let cache = Arc::clone(&self.cache);
        let fetch = self.prop_fetch(key, sport, event_id, query);
        let key = key.to_string();

        tokio::spawn(async move {
            let _refresh = guard;
            let (handle, leader) = cache.join_or_register(&key, fetch);
            if !leader {
                debug!("Prop fetch for {} already in flight", key);
                return;
            }

            let _in_flight = InFlightGuard::new(&cache, &key);
            match handle.await {
                Ok(_) => debug!("Refreshed stale props for {}", key),
                Err(e) => log_failure(&format!("Background prop refresh failed for {}", key), &e),
            }
        });
    }

    /// Vendor call for one event's props that stores the result in the prop cache
    fn prop_fetch(
        &self,
        key: &str,
        sport: &str,
        event_id: &str,
        query: &OddsQuery,
    ) -> BoxFuture<'static, OddsResult<Vec<Game>>> {
        let cache = Arc::clone(&self.cache);
        let call = self.vendor_event_odds(sport, event_id, query);
        let cache_key = key.to_string();

        async move {
            let game = call.await?;
            cache.set_prop(&cache_key, game.clone());
            Ok(vec![game])
        }
        .boxed()
    }

    // =========================================================================
    // Vendor plumbing
    // =========================================================================

    fn vendor_event_odds(
        &self,
        sport: &str,
        event_id: &str,
        query: &OddsQuery,
    ) -> impl Future<Output = OddsResult<Game>> + Send + 'static {
        let vendor = Arc::clone(&self.vendor);
        let sport = sport.to_string();
        let event_id = event_id.to_string();
        let query = query.clone();
        async move { vendor.event_odds(&sport, &event_id, &query).await }
    }

    /// Run `fetch` unless an identical call is already in flight, in which
    /// case its result is shared instead.
    async fn coalesce(
        &self,
        key: &str,
        fetch: BoxFuture<'static, OddsResult<Vec<Game>>>,
    ) -> OddsResult<Vec<Game>> {
        let (handle, leader) = self.cache.join_or_register(key, fetch);
        if !leader {
            debug!("Joining in-flight vendor call for {}", key);
            return handle.await;
        }

        let _guard = InFlightGuard::new(&self.cache, key);
        handle.await
    }
}

fn log_failure(context: &str, err: &OddsError) {
    if err.is_vendor_failure() {
        warn!("{}: {}", context, err);
    } else {
        error!("{}: {}", context, err);
    }
}

/// Cache the fetched games under the request key and, when the request
/// mixed regular and alternate markets, under each slice's own key.
fn cache_base_shapes(
    cache: &CacheStore,
    config: &EngineConfig,
    sport: &str,
    query: &OddsQuery,
    games: &[Game],
) {
    let (regular, alternate): (Vec<String>, Vec<String>) =
        query.markets.iter().cloned().partition(|m| !is_alternate(m));
    let mixed = !regular.is_empty() && !alternate.is_empty();

    // The combined shape carries regular lines, so it expires with them
    let combined_ttl = if mixed { Some(config.ttls.base) } else { None };
    cache.set(&odds_cache_key(sport, query), games.to_vec(), combined_ttl);

    if mixed {
        for slice in [regular, alternate] {
            let sliced: Vec<Game> = games
                .iter()
                .map(|g| g.slice_markets(|m| slice.iter().any(|s| s == m)))
                .collect();
            cache.set(&odds_cache_key(sport, &query.with_markets(slice)), sliced, None);
        }
    }
}

fn sorted_join(items: &[String]) -> String {
    let mut sorted: Vec<&str> = items.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

/// Cache key of a per-sport odds request
pub fn odds_cache_key(sport: &str, query: &OddsQuery) -> String {
    format!(
        "odds:{}:{}:{}:{}:{}:{}",
        sport,
        query.regions,
        sorted_join(&query.markets),
        query.bookmakers.join(","),
        query.odds_format,
        query.window.cache_fragment()
    )
}

fn period_cache_key(sport: &str, event_id: &str, query: &OddsQuery) -> String {
    format!(
        "period:{}:{}:{}:{}:{}",
        sport,
        event_id,
        sorted_join(&query.markets),
        query.bookmakers.join(","),
        query.odds_format
    )
}

fn prop_cache_key(sport: &str, event_id: &str, query: &OddsQuery) -> String {
    format!(
        "{}{}:{}:{}:{}:{}:{}",
        PROP_KEY_PREFIX,
        sport,
        event_id,
        sorted_join(&query.markets),
        query.bookmakers.join(","),
        query.regions,
        query.odds_format
    )
}

fn first_game(games: Vec<Game>, event_id: &str) -> OddsResult<Game> {
    games
        .into_iter()
        .next()
        .ok_or_else(|| OddsError::internal(format!("empty result for event {}", event_id)))
}

/// Drop games that have already started
pub fn retain_upcoming(games: &mut Vec<Game>, now: DateTime<Utc>) {
    games.retain(|g| !g.has_started(now));
}

/// Merge `incoming` into `target` by game id
pub fn merge_game_lists(target: &mut Vec<Game>, incoming: Vec<Game>) {
    for game in incoming {
        match target.iter_mut().find(|g| g.id == game.id) {
            Some(existing) => {
                existing.merge_bookmakers(game.bookmakers);
            }
            None => target.push(game),
        }
    }
}

fn in_window(game: &Game, window: &CommenceWindow) -> bool {
    window.from.map_or(true, |from| game.commence_time >= from)
        && window.to.map_or(true, |to| game.commence_time < to)
}

/// Every market appears on at least one bookmaker of at least one game
fn covers_markets(games: &[Game], markets: &[String]) -> bool {
    !games.is_empty()
        && markets.iter().all(|market| {
            games
                .iter()
                .any(|g| g.bookmakers.iter().any(|b| b.has_market(market)))
        })
}

fn split_dedup<F>(raw: &str, normalize: F) -> Vec<String>
where
    F: Fn(&str) -> String,
{
    let mut seen = HashSet::new();
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(normalize)
        .filter(|s| seen.insert(s.clone()))
        .collect()
}
