//! Odds endpoint

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use odds_core::{Game, OddsError, SubscriptionPlan};
use odds_services::{OddsParams, OddsRequest};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::AppState;

/// Header carrying the caller's subscription plan, set by the auth gateway
pub const PLAN_HEADER: &str = "x-subscription-plan";

/// Response for the odds endpoint
#[derive(Debug, Serialize)]
pub struct OddsListResponse {
    pub games: Vec<Game>,
    /// Games per requested sport
    pub counts: BTreeMap<String, usize>,
    pub count: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Create odds routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/odds", get(get_odds))
}

/// Assemble odds for the requested sports and markets
async fn get_odds(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<OddsParams>,
) -> Response {
    let plan = SubscriptionPlan::from_header(headers.get(PLAN_HEADER).and_then(|v| v.to_str().ok()));
    info!("Odds request ({} plan): {:?}", plan, params);

    let request = match OddsRequest::parse(params, plan) {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    match state.odds_service.get_odds(request).await {
        Ok(response) => {
            let count = response.games.len();
            info!("Returning {} games", count);
            (
                StatusCode::OK,
                Json(OddsListResponse {
                    games: response.games,
                    counts: response.counts,
                    count,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

fn error_response(err: OddsError) -> Response {
    let (status, message) = match &err {
        OddsError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        OddsError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        ),
    };

    if status.is_server_error() {
        error!("Odds request failed: {}", err);
    } else {
        warn!("Rejected odds request: {}", err);
    }

    (status, Json(ErrorResponse { error: message })).into_response()
}
