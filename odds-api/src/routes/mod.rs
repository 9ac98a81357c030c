//! API route definitions

mod health;
mod odds;

use axum::Router;
use crate::AppState;

pub use odds::PLAN_HEADER;

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(odds::routes())
        .merge(health::routes())
}
