//! Odds Aggregation API Server
//!
//! HTTP API server that answers odds requests from cached and freshly
//! fetched vendor data.

mod routes;

use axum::{
    http::{header, HeaderName, Method},
    Router,
};
use odds_services::{CacheStore, EngineConfig, OddsService, OddsStore, SqliteOddsStore};
use odds_vendor::OddsApiClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub odds_service: Arc<OddsService>,
}

/// Build the router for `state`
pub fn app(state: AppState) -> Router {
    // Configure CORS for frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(routes::PLAN_HEADER),
        ]);

    Router::new()
        .nest("/api", routes::api_routes())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,odds_api=debug,odds_services=debug")),
        )
        .init();

    info!("Starting Odds Aggregation API");

    let config = EngineConfig::from_env()?;

    if config.api_key.is_some() {
        info!("Odds API key found in environment");
    } else {
        warn!("ODDS_API_KEY not set - odds requests will be rejected until it is configured");
    }

    // Initialize vendor client
    let client = OddsApiClient::with_options(
        config.api_key.clone(),
        &config.api_base_url,
        config.request_timeout,
    )?;
    info!("Odds API client targeting {}", client.base_url());

    // Initialize persistent odds cache (optional - the engine runs without it)
    info!("Initializing persistent odds cache at: {}", config.cache_db_path);
    let store: Option<Arc<dyn OddsStore>> = match SqliteOddsStore::new(&config.cache_db_path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!("Persistent odds cache unavailable: {}. Continuing with memory cache only.", e);
            None
        }
    };

    let cache = Arc::new(CacheStore::new(config.ttls, config.prop_cache));
    let port = config.server_port;

    let odds_service = OddsService::new(Arc::new(client), cache, store, Arc::new(config));

    // Sweep expired cache entries in background
    odds_service.spawn_cache_sweeper();

    // Create app state
    let state = AppState {
        odds_service: Arc::new(odds_service),
    };

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
