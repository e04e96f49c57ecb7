use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::models::*;
use crate::{
    api::websocket::LiveFeedBroadcaster,
    auth::{
        extract::BearerToken, AuthService, AuthSession, AuthUser, LoginRequest, RegisterRequest, UserProfile,
    },
    betting::{BetHistory, BettingService, PlaceBetRequest, UserStats},
    error::AppResult,
    fixtures::{FixtureQuery, FixtureService},
    funding::{BonusClaim, DepositRequest, FundingService, WithdrawalRequest},
    ledger::models::{BetWithFixture, Deposit, Fixture, Withdrawal},
    middleware::ValidatedJson,
    settlement::SettlementScheduler,
};

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub betting: Arc<BettingService>,
    pub funding: Arc<FundingService>,
    pub fixtures: Arc<FixtureService>,
    pub scheduler: Arc<SettlementScheduler>,
    pub live_feed: LiveFeedBroadcaster,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        scheduler_running: state.scheduler.is_running(),
        live_subscribers: state.live_feed.subscriber_count(),
    })
}

// ========== FIXTURES ==========

/// GET /api/fixtures?sport=&league=&limit=
pub async fn list_fixtures(
    State(state): State<AppState>,
    Query(query): Query<FixtureQuery>,
) -> AppResult<Json<Vec<Fixture>>> {
    Ok(Json(state.fixtures.list(&query).await?))
}

/// GET /api/fixtures/live
pub async fn live_fixtures(State(state): State<AppState>) -> AppResult<Json<Vec<Fixture>>> {
    Ok(Json(state.fixtures.live().await?))
}

// ========== AUTH ==========

/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthSession>)> {
    let session = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> AppResult<Json<AuthSession>> {
    Ok(Json(state.auth.login(request).await?))
}

/// POST /api/logout
pub async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> AppResult<Json<MessageResponse>> {
    state.auth.logout(&token).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// GET /api/user
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.auth.profile(user).await?))
}

// ========== BETS ==========

/// POST /api/bets
pub async fn place_bet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<PlaceBetRequest>,
) -> AppResult<(StatusCode, Json<PlaceBetResponse>)> {
    let (bet, new_balance) = state.betting.place_bet(user.id, request).await?;
    info!("🎫 Bet {} placed by {}", bet.id, user.id);
    Ok((StatusCode::CREATED, Json(PlaceBetResponse { bet, new_balance })))
}

/// GET /api/bets
pub async fn user_bets(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<BetWithFixture>>> {
    Ok(Json(state.betting.user_bets(user.id).await?))
}

/// GET /api/bets/history
pub async fn bet_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<BetHistory>> {
    Ok(Json(state.betting.history(user.id).await?))
}

/// GET /api/user/stats
pub async fn user_stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<UserStats>> {
    Ok(Json(state.betting.user_stats(user.id).await?))
}

// ========== FUNDING ==========

/// POST /api/deposits
pub async fn create_deposit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(request): ValidatedJson<DepositRequest>,
) -> AppResult<(StatusCode, Json<Deposit>)> {
    let deposit = state.funding.request_deposit(user.id, request).await?;
    Ok((StatusCode::CREATED, Json(deposit)))
}

/// GET /api/deposits/user
pub async fn user_deposits(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Deposit>>> {
    Ok(Json(state.funding.user_deposits(user.id).await?))
}

/// POST /api/withdrawals
pub async fn create_withdrawal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(request): ValidatedJson<WithdrawalRequest>,
) -> AppResult<(StatusCode, Json<Withdrawal>)> {
    let withdrawal = state.funding.request_withdrawal(user.id, request).await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

/// GET /api/withdrawals/user
pub async fn user_withdrawals(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Withdrawal>>> {
    Ok(Json(state.funding.user_withdrawals(user.id).await?))
}

/// POST /api/bonus/claim-welcome
pub async fn claim_welcome_bonus(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<BonusClaim>> {
    Ok(Json(state.funding.claim_welcome_bonus(user.id).await?))
}
