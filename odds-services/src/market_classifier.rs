//! Market classification helpers
//!
//! Pure functions over static tables: market-key aliases, market
//! categories, per-sport market support and bookmaker allowlists.

use crate::config::BookmakerPolicy;
use odds_core::SubscriptionPlan;
use std::collections::HashSet;

pub use odds_vendor::urls::{event_odds_url, sport_events_url, sport_odds_url};

/// Markets every sport supports
pub const BASE_MARKETS: &[&str] = &["h2h", "spreads", "totals"];

/// Which fetch phase a market belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketCategory {
    /// Full-game markets, fetched per sport
    Base,
    /// Quarter/half/period/inning markets, fetched per event
    Period,
    /// Player propositions, fetched per event
    PlayerProp,
}

/// Sport family, derived from the vendor sport-key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SportFamily {
    Basketball,
    AmericanFootball,
    IceHockey,
    Baseball,
    Soccer,
    Other,
}

const MARKET_ALIASES: &[(&str, &str)] = &[
    ("moneyline", "h2h"),
    ("money_line", "h2h"),
    ("ml", "h2h"),
    ("spread", "spreads"),
    ("point_spread", "spreads"),
    ("run_line", "spreads"),
    ("puck_line", "spreads"),
    ("handicap", "spreads"),
    ("total", "totals"),
    ("over_under", "totals"),
    ("ou", "totals"),
    ("alt_spreads", "alternate_spreads"),
    ("alternate_spread", "alternate_spreads"),
    ("alt_totals", "alternate_totals"),
    ("alternate_total", "alternate_totals"),
    ("team_total", "team_totals"),
    ("btts", "btts"),
    ("both_teams_to_score", "btts"),
    ("player_point", "player_points"),
    ("player_rebound", "player_rebounds"),
    ("player_assist", "player_assists"),
    ("player_threes_made", "player_threes"),
    ("pra", "player_points_rebounds_assists"),
    ("anytime_td", "player_anytime_td"),
    ("strikeouts", "pitcher_strikeouts"),
    ("anytime_goal_scorer", "player_goal_scorer_anytime"),
];

const PERIOD_PATTERNS: &[&str] = &[
    "_q1",
    "_q2",
    "_q3",
    "_q4",
    "_h1",
    "_h2",
    "_p1",
    "_p2",
    "_p3",
    "_1st_1_innings",
    "_1st_3_innings",
    "_1st_5_innings",
    "_1st_7_innings",
];

const PLAYER_PROP_PREFIXES: &[&str] = &["player_", "batter_", "pitcher_"];

const NORTH_AMERICAN_EXTRAS: &[&str] = &[
    "alternate_spreads",
    "alternate_totals",
    "team_totals",
    "alternate_team_totals",
];

const SOCCER_EXTRAS: &[&str] = &["h2h_3_way", "draw_no_bet", "btts", "double_chance"];

const QUARTER_HALF_MARKETS: &[&str] = &[
    "h2h_q1", "h2h_q2", "h2h_q3", "h2h_q4", "h2h_h1", "h2h_h2",
    "spreads_q1", "spreads_q2", "spreads_q3", "spreads_q4", "spreads_h1", "spreads_h2",
    "totals_q1", "totals_q2", "totals_q3", "totals_q4", "totals_h1", "totals_h2",
];

const HOCKEY_PERIOD_MARKETS: &[&str] = &[
    "h2h_p1", "h2h_p2", "h2h_p3",
    "spreads_p1", "spreads_p2", "spreads_p3",
    "totals_p1", "totals_p2", "totals_p3",
];

const BASEBALL_INNING_MARKETS: &[&str] = &[
    "h2h_1st_1_innings",
    "h2h_1st_3_innings",
    "h2h_1st_5_innings",
    "h2h_1st_7_innings",
    "spreads_1st_5_innings",
    "totals_1st_1_innings",
    "totals_1st_5_innings",
];

const BASKETBALL_PROPS: &[&str] = &[
    "player_points",
    "player_rebounds",
    "player_assists",
    "player_threes",
    "player_points_rebounds_assists",
    "player_blocks",
    "player_steals",
];

const FOOTBALL_PROPS: &[&str] = &[
    "player_pass_yds",
    "player_pass_tds",
    "player_rush_yds",
    "player_reception_yds",
    "player_receptions",
    "player_anytime_td",
];

const HOCKEY_PROPS: &[&str] = &[
    "player_points",
    "player_goals",
    "player_assists",
    "player_shots_on_goal",
    "player_total_saves",
];

const BASEBALL_PROPS: &[&str] = &[
    "batter_hits",
    "batter_home_runs",
    "batter_total_bases",
    "batter_rbis",
    "pitcher_strikeouts",
    "pitcher_hits_allowed",
];

const SOCCER_PROPS: &[&str] = &[
    "player_goal_scorer_anytime",
    "player_first_goal_scorer",
    "player_shots_on_target",
];

/// Map a vendor market alias onto its canonical key.
///
/// Unmapped keys pass through (trimmed and lower-cased).
pub fn canonicalize(market_key: &str) -> String {
    let key = market_key.trim().to_lowercase();
    MARKET_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(key)
}

/// Classify a canonical market key
pub fn classify(market_key: &str) -> MarketCategory {
    if PLAYER_PROP_PREFIXES.iter().any(|p| market_key.starts_with(p)) {
        MarketCategory::PlayerProp
    } else if PERIOD_PATTERNS.iter().any(|p| market_key.contains(p)) {
        MarketCategory::Period
    } else {
        MarketCategory::Base
    }
}

/// Alternate lines of a base market
pub fn is_alternate(market_key: &str) -> bool {
    market_key.contains("alternate")
}

impl SportFamily {
    pub fn from_sport_key(sport_key: &str) -> Self {
        match sport_key.split('_').next().unwrap_or_default() {
            "basketball" => SportFamily::Basketball,
            "americanfootball" => SportFamily::AmericanFootball,
            "icehockey" => SportFamily::IceHockey,
            "baseball" => SportFamily::Baseball,
            "soccer" => SportFamily::Soccer,
            _ => SportFamily::Other,
        }
    }

    fn extras(&self) -> &'static [&'static str] {
        match self {
            SportFamily::Basketball
            | SportFamily::AmericanFootball
            | SportFamily::IceHockey
            | SportFamily::Baseball => NORTH_AMERICAN_EXTRAS,
            SportFamily::Soccer => SOCCER_EXTRAS,
            SportFamily::Other => &[],
        }
    }

    fn period_markets(&self) -> &'static [&'static str] {
        match self {
            SportFamily::Basketball | SportFamily::AmericanFootball => QUARTER_HALF_MARKETS,
            SportFamily::IceHockey => HOCKEY_PERIOD_MARKETS,
            SportFamily::Baseball => BASEBALL_INNING_MARKETS,
            SportFamily::Soccer | SportFamily::Other => &[],
        }
    }

    fn prop_markets(&self) -> &'static [&'static str] {
        match self {
            SportFamily::Basketball => BASKETBALL_PROPS,
            SportFamily::AmericanFootball => FOOTBALL_PROPS,
            SportFamily::IceHockey => HOCKEY_PROPS,
            SportFamily::Baseball => BASEBALL_PROPS,
            SportFamily::Soccer => SOCCER_PROPS,
            SportFamily::Other => &[],
        }
    }
}

/// Every market key the vendor accepts for `sport_key`
pub fn supported_markets_for_sport(sport_key: &str) -> Vec<&'static str> {
    let family = SportFamily::from_sport_key(sport_key);
    BASE_MARKETS
        .iter()
        .chain(family.extras())
        .chain(family.period_markets())
        .chain(family.prop_markets())
        .copied()
        .collect()
}

pub fn is_market_supported(sport_key: &str, market_key: &str) -> bool {
    let family = SportFamily::from_sport_key(sport_key);
    BASE_MARKETS.contains(&market_key)
        || family.extras().contains(&market_key)
        || family.period_markets().contains(&market_key)
        || family.prop_markets().contains(&market_key)
}

/// Bookmaker allowlist for a plan: deduplicated, order-stable, capped
pub fn bookmakers_for_plan(plan: SubscriptionPlan, policy: &BookmakerPolicy) -> Vec<String> {
    let source = if plan.is_full() {
        &policy.full
    } else {
        &policy.restricted
    };
    dedupe_capped(source.iter(), policy.max_bookmakers)
}

/// Allowlist for proposition requests.
///
/// Full plans additionally see prop-only books; restricted plans keep
/// exactly their regular allowlist.
pub fn prop_bookmakers_for_plan(plan: SubscriptionPlan, policy: &BookmakerPolicy) -> Vec<String> {
    if plan.is_full() {
        dedupe_capped(
            policy.full.iter().chain(policy.prop_only.iter()),
            policy.max_bookmakers,
        )
    } else {
        bookmakers_for_plan(plan, policy)
    }
}

fn dedupe_capped<'a, I>(books: I, max: usize) -> Vec<String>
where
    I: Iterator<Item = &'a String>,
{
    let mut seen: HashSet<&str> = HashSet::new();
    let mut capped = Vec::new();
    for book in books {
        if capped.len() == max {
            break;
        }
        if seen.insert(book.as_str()) {
            capped.push(book.clone());
        }
    }
    capped
}
