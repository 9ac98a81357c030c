//! Vendor endpoint URLs

/// Production base URL for The Odds API v4
pub const ODDS_API_BASE: &str = "https://api.the-odds-api.com/v4";

/// `{base}/sports/{sport}/odds`
pub fn sport_odds_url(base_url: &str, sport: &str) -> String {
    format!("{}/sports/{}/odds", base_url.trim_end_matches('/'), sport)
}

/// `{base}/sports/{sport}/events`
pub fn sport_events_url(base_url: &str, sport: &str) -> String {
    format!("{}/sports/{}/events", base_url.trim_end_matches('/'), sport)
}

/// `{base}/sports/{sport}/events/{event_id}/odds`
pub fn event_odds_url(base_url: &str, sport: &str, event_id: &str) -> String {
    format!(
        "{}/sports/{}/events/{}/odds",
        base_url.trim_end_matches('/'),
        sport,
        event_id
    )
}
