//! Odds Cache Store
//!
//! Process-local caches owned by the aggregation service:
//! - a TTL cache whose expiry depends on the category of the key,
//! - an in-flight registry that coalesces identical vendor calls,
//! - a bounded proposition cache with stale-while-revalidate reads.
//!
//! Timestamps use `tokio::time::Instant` so expiry follows the runtime
//! clock (and can be driven with `tokio::time::advance` in tests).

use futures::future::{BoxFuture, FutureExt, Shared};
use odds_core::{Game, OddsResult};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::market_classifier::{classify, MarketCategory};

/// Prefix of proposition cache keys
pub const PROP_KEY_PREFIX: &str = "props:";

/// Shared handle to a vendor call that is currently running
pub type InFlightHandle = Shared<BoxFuture<'static, OddsResult<Vec<Game>>>>;

/// TTL class of a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    /// Full-game lines: shortest TTL
    Base,
    /// Alternate lines: medium TTL
    Alternate,
    /// Player propositions: longest TTL
    Prop,
}

impl CacheCategory {
    /// Infer the category from the market keys embedded in a cache key
    pub fn from_key(key: &str) -> Self {
        let has_prop = key.starts_with(PROP_KEY_PREFIX)
            || key
                .split(|c| c == ':' || c == ',')
                .any(|segment| classify(segment) == MarketCategory::PlayerProp);

        if has_prop {
            CacheCategory::Prop
        } else if key.contains("alternate") {
            CacheCategory::Alternate
        } else {
            CacheCategory::Base
        }
    }
}

/// Per-category TTLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub base: Duration,
    pub alternate: Duration,
    pub prop: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            alternate: Duration::from_secs(5 * 60),
            prop: Duration::from_secs(30 * 60),
        }
    }
}

impl CacheTtls {
    pub fn for_category(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::Base => self.base,
            CacheCategory::Alternate => self.alternate,
            CacheCategory::Prop => self.prop,
        }
    }
}

/// A cached value with its insertion time
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub data: V,
    pub timestamp: Instant,
    pub ttl_override: Option<Duration>,
}

impl<V> CacheEntry<V> {
    fn ttl(&self, ttls: &CacheTtls) -> Duration {
        self.ttl_override
            .unwrap_or_else(|| ttls.for_category(CacheCategory::from_key(&self.key)))
    }

    fn is_fresh(&self, ttls: &CacheTtls, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) < self.ttl(ttls)
    }
}

/// Key/value cache with category-derived expiry and lazy deletion
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttls: CacheTtls,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttls,
        }
    }

    /// Fresh data for `key`; an expired entry is removed and misses
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.is_fresh(&self.ttls, now) => return Some(entry.data.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if !entry.is_fresh(&self.ttls, now) {
                entries.remove(key);
                debug!("Cache entry expired: {}", key);
            }
        }
        None
    }

    pub fn set(&self, key: &str, data: V, ttl_override: Option<Duration>) {
        let entry = CacheEntry {
            key: key.to_string(),
            data,
            timestamp: Instant::now(),
            ttl_override,
        };
        self.entries.write().insert(key.to_string(), entry);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(&self.ttls, now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether a live (possibly expired, not yet purged) entry exists
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}

/// Bounds of the proposition cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropCacheConfig {
    pub max_entries: usize,
    /// Age after which a read reports stale data
    pub stale_after: Duration,
    /// Age after which an entry is discarded
    pub ttl: Duration,
}

impl Default for PropCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            stale_after: Duration::from_secs(10 * 60),
            ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Result of a proposition cache read
#[derive(Debug, Clone, PartialEq)]
pub struct PropLookup<V> {
    pub data: V,
    pub is_stale: bool,
    pub age: Duration,
}

/// Bounded cache evicting the oldest entry when full
#[derive(Debug)]
pub struct PropCache<V> {
    entries: HashMap<String, (V, Instant)>,
    config: PropCacheConfig,
}

impl<V: Clone> PropCache<V> {
    pub fn new(config: PropCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<PropLookup<V>> {
        let (data, timestamp) = self.entries.get(key)?;
        let age = Instant::now().saturating_duration_since(*timestamp);

        if age >= self.config.ttl {
            self.entries.remove(key);
            return None;
        }

        Some(PropLookup {
            data: data.clone(),
            is_stale: age > self.config.stale_after,
            age,
        })
    }

    /// Store `data` under `key`. A zero-capacity cache stores nothing.
    pub fn insert(&mut self, key: &str, data: V) {
        if self.config.max_entries == 0 {
            return;
        }
        if !self.entries.contains_key(key) && self.entries.len() >= self.config.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(key.to_string(), (data, Instant::now()));
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, (_, timestamp))| *timestamp)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            debug!("Evicting oldest prop cache entry: {}", key);
            self.entries.remove(&key);
        }
    }

    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, timestamp)| now.saturating_duration_since(*timestamp) < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All process-local caches used by the odds service
pub struct CacheStore {
    odds: TtlCache<Vec<Game>>,
    props: Mutex<PropCache<Game>>,
    refreshing: Mutex<HashSet<String>>,
    in_flight: Mutex<HashMap<String, InFlightHandle>>,
}

impl CacheStore {
    pub fn new(ttls: CacheTtls, prop_config: PropCacheConfig) -> Self {
        Self {
            odds: TtlCache::new(ttls),
            props: Mutex::new(PropCache::new(prop_config)),
            refreshing: Mutex::new(HashSet::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Odds cache
    // =========================================================================

    pub fn get(&self, key: &str) -> Option<Vec<Game>> {
        self.odds.get(key)
    }

    pub fn set(&self, key: &str, games: Vec<Game>, ttl_override: Option<Duration>) {
        self.odds.set(key, games, ttl_override);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.odds.delete(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.odds.contains(key)
    }

    // =========================================================================
    // In-flight registry
    // =========================================================================

    pub fn get_in_flight(&self, key: &str) -> Option<InFlightHandle> {
        self.in_flight.lock().get(key).cloned()
    }

    pub fn set_in_flight(&self, key: &str, handle: InFlightHandle) {
        self.in_flight.lock().insert(key.to_string(), handle);
    }

    pub fn delete_in_flight(&self, key: &str) {
        self.in_flight.lock().remove(key);
    }

    /// Join the call already running for `key`, or register `fetch` as it.
    ///
    /// Returns the shared handle and whether the caller became the leader.
    /// The leader must deregister once the handle settles (see
    /// [`InFlightGuard`]).
    pub fn join_or_register(
        &self,
        key: &str,
        fetch: BoxFuture<'static, OddsResult<Vec<Game>>>,
    ) -> (InFlightHandle, bool) {
        let mut in_flight = self.in_flight.lock();
        if let Some(existing) = in_flight.get(key) {
            return (existing.clone(), false);
        }

        let handle = fetch.shared();
        in_flight.insert(key.to_string(), handle.clone());
        (handle, true)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    // =========================================================================
    // Proposition cache
    // =========================================================================

    pub fn get_prop(&self, key: &str) -> Option<PropLookup<Game>> {
        self.props.lock().get(key)
    }

    pub fn set_prop(&self, key: &str, game: Game) {
        self.props.lock().insert(key, game);
    }

    /// Mark `key` as being refreshed. False if a refresh is already running.
    pub fn try_begin_refresh(&self, key: &str) -> bool {
        self.refreshing.lock().insert(key.to_string())
    }

    pub fn end_refresh(&self, key: &str) {
        self.refreshing.lock().remove(key);
    }

    pub fn is_refreshing(&self, key: &str) -> bool {
        self.refreshing.lock().contains(key)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop expired entries from both caches
    pub fn purge_expired(&self) -> usize {
        self.odds.purge_expired() + self.props.lock().purge_expired()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            odds_entries: self.odds.len(),
            prop_entries: self.props.lock().len(),
            in_flight: self.in_flight_count(),
            refreshing: self.refreshing.lock().len(),
        }
    }
}

/// Removes an in-flight registration when dropped, so a failed or
/// cancelled fetch never blocks later attempts for the same key.
pub struct InFlightGuard<'a> {
    store: &'a CacheStore,
    key: &'a str,
}

impl<'a> InFlightGuard<'a> {
    pub fn new(store: &'a CacheStore, key: &'a str) -> Self {
        Self { store, key }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.store.delete_in_flight(self.key);
    }
}

/// Clears a background refresh marker when dropped
pub struct RefreshGuard {
    store: Arc<CacheStore>,
    key: String,
}

impl RefreshGuard {
    /// Claim the refresh slot for `key`, or `None` if one is already running
    pub fn acquire(store: &Arc<CacheStore>, key: &str) -> Option<Self> {
        if store.try_begin_refresh(key) {
            Some(Self {
                store: Arc::clone(store),
                key: key.to_string(),
            })
        } else {
            None
        }
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.store.end_refresh(&self.key);
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub odds_entries: usize,
    pub prop_entries: usize,
    pub in_flight: usize,
    pub refreshing: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use odds_core::OddsError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn game(id: &str) -> Game {
        Game {
            id: id.to_string(),
            sport_key: "basketball_nba".to_string(),
            sport_title: None,
            commence_time: Utc::now(),
            home_team: "Boston Celtics".to_string(),
            away_team: "New York Knicks".to_string(),
            bookmakers: vec![],
        }
    }

    fn store() -> CacheStore {
        CacheStore::new(CacheTtls::default(), PropCacheConfig::default())
    }

    #[test]
    fn test_category_from_key() {
        assert_eq!(CacheCategory::from_key("odds:basketball_nba:us:h2h,spreads"), CacheCategory::Base);
        assert_eq!(
            CacheCategory::from_key("odds:basketball_nba:us:alternate_spreads"),
            CacheCategory::Alternate
        );
        assert_eq!(
            CacheCategory::from_key("odds:basketball_nba:us:h2h,player_points"),
            CacheCategory::Prop
        );
        assert_eq!(CacheCategory::from_key("props:basketball_nba:evt1"), CacheCategory::Prop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_set_then_expiry() {
        let cache = store();
        let key = "odds:basketball_nba:us:h2h,spreads";
        let ttl = CacheTtls::default().base;

        let original = vec![game("evt1")];
        cache.set(key, original.clone(), None);
        assert_eq!(cache.get(key), Some(original));

        tokio::time::advance(ttl / 2).await;
        assert!(cache.get(key).is_some());

        tokio::time::advance(ttl).await;
        assert!(cache.get(key).is_none());
        assert!(!cache.contains(key), "expired entry should be deleted on read");

        cache.set(key, vec![game("evt2")], None);
        assert_eq!(cache.get(key).unwrap()[0].id, "evt2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_alternate_keys_outlive_base_keys() {
        let cache = store();
        let ttls = CacheTtls::default();

        cache.set("odds:nba:h2h", vec![game("a")], None);
        cache.set("odds:nba:alternate_spreads", vec![game("b")], None);

        tokio::time::advance(ttls.base + Duration::from_secs(1)).await;
        assert!(cache.get("odds:nba:h2h").is_none());
        assert!(cache.get("odds:nba:alternate_spreads").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_override_wins() {
        let cache = store();
        cache.set("odds:nba:h2h", vec![game("a")], Some(Duration::from_secs(3600)));

        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(cache.get("odds:nba:h2h").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = store();
        cache.set("odds:nba:h2h", vec![game("a")], None);
        cache.set("odds:nba:alternate_totals", vec![game("b")], None);

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().odds_entries, 1);
    }

    #[test]
    fn test_delete() {
        let cache = store();
        cache.set("odds:nba:h2h", vec![game("a")], None);
        assert!(cache.delete("odds:nba:h2h"));
        assert!(!cache.delete("odds:nba:h2h"));
        assert!(cache.get("odds:nba:h2h").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prop_cache_is_bounded_and_evicts_oldest() {
        let config = PropCacheConfig {
            max_entries: 3,
            ..PropCacheConfig::default()
        };
        let mut cache = PropCache::new(config);

        for i in 0..3 {
            cache.insert(&format!("props:k{}", i), i);
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        // Re-inserting an existing key never evicts
        cache.insert("props:k1", 10);
        assert_eq!(cache.len(), 3);

        cache.insert("props:k3", 3);
        assert_eq!(cache.len(), 3);
        assert!(cache.get("props:k0").is_none(), "oldest entry should be evicted");
        assert_eq!(cache.get("props:k1").unwrap().data, 10);
        assert!(cache.get("props:k3").is_some());
    }

    #[test]
    fn test_zero_capacity_prop_cache_stores_nothing() {
        let config = PropCacheConfig {
            max_entries: 0,
            ..PropCacheConfig::default()
        };
        let mut cache = PropCache::new(config);

        cache.insert("props:k", 1);
        assert_eq!(cache.len(), 0);
        assert!(cache.get("props:k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prop_cache_stale_then_expired() {
        let config = PropCacheConfig {
            max_entries: 10,
            stale_after: Duration::from_secs(60),
            ttl: Duration::from_secs(120),
        };
        let mut cache = PropCache::new(config);
        cache.insert("props:k", "data");

        let fresh = cache.get("props:k").unwrap();
        assert!(!fresh.is_stale);

        tokio::time::advance(Duration::from_secs(90)).await;
        let stale = cache.get("props:k").unwrap();
        assert!(stale.is_stale);
        assert_eq!(stale.data, "data");
        assert_eq!(stale.age, Duration::from_secs(90));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get("props:k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_refresh_guard_is_exclusive() {
        let cache = Arc::new(store());

        let guard = RefreshGuard::acquire(&cache, "props:k").unwrap();
        assert!(RefreshGuard::acquire(&cache, "props:k").is_none());
        assert!(cache.is_refreshing("props:k"));

        drop(guard);
        assert!(!cache.is_refreshing("props:k"));
        assert!(RefreshGuard::acquire(&cache, "props:k").is_some());
    }

    #[tokio::test]
    async fn test_join_or_register_shares_one_call() {
        let cache = store();
        let calls = Arc::new(AtomicUsize::new(0));

        let make = |calls: Arc<AtomicUsize>| {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, OddsError>(vec![game("evt1")])
            }
            .boxed()
        };

        let (first, leader) = cache.join_or_register("k", make(calls.clone()));
        let (second, follower_is_leader) = cache.join_or_register("k", make(calls.clone()));
        assert!(leader);
        assert!(!follower_is_leader);
        assert_eq!(cache.in_flight_count(), 1);

        let (a, b) = tokio::join!(first, second);
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_guard_deregisters_on_failure() {
        let cache = store();
        let (handle, leader) =
            cache.join_or_register("k", async { Err(OddsError::timeout("slow")) }.boxed());
        assert!(leader);

        {
            let _guard = InFlightGuard::new(&cache, "k");
            assert!(handle.await.is_err());
        }

        assert!(cache.get_in_flight("k").is_none());
        let (_, leader_again) = cache.join_or_register("k", async { Ok(vec![]) }.boxed());
        assert!(leader_again);
    }
}
