//! Island Rewards Server
//!
//! HTTP endpoints for challenge issuance, reward claims and diagnostics.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::claims::{ChallengeRequest, ClaimError, ClaimRequest, RewardService};
use crate::lnurl::decode_lnurl;
use crate::pow::{estimate_solve_time, CHALLENGE_VALIDITY_MS, MAX_DIFFICULTY};
use crate::rewards::REWARD_TIERS;
use crate::withdrawal::{is_pull_payment_configured, WithdrawalMode};

const SERVICE_NAME: &str = "island-rewards";

pub struct AppState {
    pub rewards: Arc<RewardService>,
    pub started_at: std::time::Instant,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config", get(config_handler))
        .route("/rewards/tiers", get(tiers_handler))
        .route("/challenge", post(challenge_handler))
        .route("/claim", post(claim_handler))
        .route("/status/:pubkey", get(status_handler))
        .route("/lnurl/decode", get(decode_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub uptime_secs: u64,
    pub version: String,
    pub service: String,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        uptime_secs: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

async fn config_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let withdrawals = state.rewards.withdrawals();
    let mode = withdrawals.mode();
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "withdrawals_enabled": mode != WithdrawalMode::Disabled,
        "mode": mode,
        "static_pull_payment_configured": is_pull_payment_configured(withdrawals.config()),
        "max_difficulty": MAX_DIFFICULTY,
        "challenge_validity_ms": CHALLENGE_VALIDITY_MS,
        "max_claims_per_hour": state.rewards.ledger().max_claims_per_hour(),
    }))
}

async fn tiers_handler() -> Json<serde_json::Value> {
    Json(json!({ "tiers": REWARD_TIERS }))
}

/// HTTP status for a rejected claim or challenge request
pub fn claim_error_status(err: &ClaimError) -> StatusCode {
    match err {
        ClaimError::InvalidPubkey | ClaimError::ChallengeMismatch => StatusCode::BAD_REQUEST,
        ClaimError::UnknownChallenge => StatusCode::NOT_FOUND,
        ClaimError::AlreadyClaimed => StatusCode::CONFLICT,
        ClaimError::ChallengeExpired => StatusCode::GONE,
        ClaimError::BelowMinimumScore(_) | ClaimError::Verification(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ClaimError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ClaimError::TooManyPendingChallenges => StatusCode::SERVICE_UNAVAILABLE,
        ClaimError::PayoutFailed(_) => StatusCode::BAD_GATEWAY,
        ClaimError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ClaimError) -> (StatusCode, Json<serde_json::Value>) {
    let status = claim_error_status(&err);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    (status, Json(json!({ "error": err.to_string() })))
}

async fn challenge_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChallengeRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state
        .rewards
        .issue_challenge(&request.pubkey, request.score, request.level)
    {
        Ok(challenge) => {
            let estimate = estimate_solve_time(challenge.difficulty);
            (
                StatusCode::OK,
                Json(json!({
                    "challenge": challenge,
                    "estimated_solve_time": estimate,
                })),
            )
        }
        Err(e) => error_response(e),
    }
}

async fn claim_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClaimRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.rewards.claim_reward(request).await {
        Ok(receipt) => match serde_json::to_value(&receipt) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => {
                error!("Failed to serialize claim receipt: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to serialize receipt" })),
                )
            }
        },
        Err(e) => error_response(e),
    }
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(pubkey): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.rewards.status(&pubkey) {
        Ok(status) => (StatusCode::OK, Json(json!(status))),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct DecodeQuery {
    pub lnurl: String,
}

async fn decode_handler(Query(query): Query<DecodeQuery>) -> (StatusCode, Json<serde_json::Value>) {
    match decode_lnurl(&query.lnurl) {
        Ok(url) => (StatusCode::OK, Json(json!({ "url": url }))),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

/// Run the server
pub async fn run_server(host: &str, port: u16, rewards: Arc<RewardService>) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        rewards,
        started_at: std::time::Instant::now(),
    });

    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting Island Rewards server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
