// Admin console endpoints. Every handler takes `AdminUser`, which requires an
// active privilege grant.
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use super::handler::AppState;
use super::models::*;
use crate::{
    auth::{AdminUser, UserProfile},
    betting::AdminBetRequest,
    error::AppResult,
    fixtures::{import::ImportReport, FixtureQuery, OddsPatch},
    funding::{BalanceAdjustment, DepositRequest, SystemStats, WalletSettings, WithdrawalRequest},
    ledger::models::*,
    middleware::ValidatedJson,
    settlement::ReconcileReport,
};

// ========== USERS ==========

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<Vec<UserProfile>>> {
    Ok(Json(state.auth.list_profiles().await?))
}

/// PATCH /api/admin/users/:id/active
pub async fn set_user_active(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SetActiveRequest>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(
        state
            .auth
            .set_user_active(admin.id, user_id, request.is_active)
            .await?,
    ))
}

/// POST /api/admin/users/:id/balance
pub async fn adjust_balance(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<AdjustBalanceRequest>,
) -> AppResult<Json<BalanceAdjustment>> {
    Ok(Json(
        state
            .funding
            .adjust_balance(admin.id, user_id, request.amount, request.note)
            .await?,
    ))
}

/// GET /api/admin/users/:key/stats (key = id, account number or email)
pub async fn user_overview(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(key): Path<String>,
) -> AppResult<Json<UserOverview>> {
    let user = state.auth.find_user(&key).await?;
    let betting = state.betting.user_stats(user.id).await?;
    let deposits = state.funding.user_deposits(user.id).await?;
    let withdrawals = state.funding.user_withdrawals(user.id).await?;

    Ok(Json(UserOverview {
        user_id: user.id,
        account_id: user.account_id,
        email: user.email,
        balance: user.balance,
        betting,
        deposits,
        withdrawals,
    }))
}

/// GET /api/admin/users/:key/bets
pub async fn user_bets(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(key): Path<String>,
) -> AppResult<Json<Vec<BetWithFixture>>> {
    let user = state.auth.find_user(&key).await?;
    Ok(Json(state.betting.user_bets(user.id).await?))
}

// ========== PRIVILEGES ==========

/// GET /api/admin/privileges
pub async fn list_privileges(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<Vec<PrivilegeGrant>>> {
    Ok(Json(state.auth.list_grants().await?))
}

/// POST /api/admin/privileges
pub async fn grant_privilege(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(request): ValidatedJson<GrantPrivilegeRequest>,
) -> AppResult<(StatusCode, Json<PrivilegeGrant>)> {
    let grant = state
        .auth
        .grant_admin(admin.id, request.user_id, &request.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

/// DELETE /api/admin/privileges/:id
pub async fn revoke_privilege(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(grant_id): Path<Uuid>,
) -> AppResult<Json<PrivilegeGrant>> {
    Ok(Json(state.auth.revoke_grant(admin.id, grant_id).await?))
}

// ========== FUNDING ==========

/// GET /api/admin/deposits
pub async fn list_deposits(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<Vec<Deposit>>> {
    Ok(Json(state.funding.all_deposits().await?))
}

/// PATCH /api/admin/deposits/:id
pub async fn review_deposit(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(deposit_id): Path<Uuid>,
    Json(request): Json<ReviewDepositRequest>,
) -> AppResult<Json<Deposit>> {
    Ok(Json(
        state
            .funding
            .review_deposit(admin.id, deposit_id, request.status)
            .await?,
    ))
}

/// GET /api/admin/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<Vec<Withdrawal>>> {
    Ok(Json(state.funding.all_withdrawals().await?))
}

/// PATCH /api/admin/withdrawals/:id
pub async fn review_withdrawal(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(withdrawal_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<ReviewWithdrawalRequest>,
) -> AppResult<Json<Withdrawal>> {
    Ok(Json(
        state
            .funding
            .review_withdrawal(admin.id, withdrawal_id, request.status, request.admin_note)
            .await?,
    ))
}

/// POST /api/admin/user-deposits
pub async fn record_deposit(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(request): ValidatedJson<AdminFundingRequest>,
) -> AppResult<(StatusCode, Json<Deposit>)> {
    let deposit = state
        .funding
        .record_admin_deposit(
            admin.id,
            request.user_id,
            DepositRequest {
                amount: request.amount,
                method: request.method,
                tx_id: request.reference,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(deposit)))
}

/// POST /api/admin/user-withdrawals
pub async fn record_withdrawal(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(request): ValidatedJson<AdminFundingRequest>,
) -> AppResult<(StatusCode, Json<Withdrawal>)> {
    let withdrawal = state
        .funding
        .record_admin_withdrawal(
            admin.id,
            request.user_id,
            WithdrawalRequest {
                amount: request.amount,
                method: request.method,
                address: request.reference,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

/// GET /api/admin/wallets
pub async fn wallet_settings(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<WalletSettings>> {
    Ok(Json(state.funding.wallet_settings().await?))
}

/// POST /api/admin/wallets
pub async fn update_wallet_settings(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(settings): Json<WalletSettings>,
) -> AppResult<Json<WalletSettings>> {
    info!("👛 Admin {} updating wallet settings", admin.id);
    Ok(Json(state.funding.update_wallet_settings(&settings).await?))
}

/// GET /api/admin/stats
pub async fn system_stats(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<SystemStats>> {
    Ok(Json(state.funding.system_stats().await?))
}

// ========== FIXTURES ==========

/// GET /api/admin/fixtures
pub async fn list_fixtures(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<FixtureQuery>,
) -> AppResult<Json<Vec<Fixture>>> {
    Ok(Json(state.fixtures.list(&query).await?))
}

/// POST /api/admin/fixtures
pub async fn create_fixture(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Json(fixture): Json<NewFixture>,
) -> AppResult<(StatusCode, Json<Fixture>)> {
    let fixture = state.fixtures.create(fixture).await?;
    Ok((StatusCode::CREATED, Json(fixture)))
}

/// PATCH /api/admin/fixtures/:id
pub async fn update_fixture(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(fixture_id): Path<Uuid>,
    Json(patch): Json<FixturePatch>,
) -> AppResult<Json<Fixture>> {
    Ok(Json(state.fixtures.update(fixture_id, &patch).await?))
}

/// PATCH /api/admin/fixtures/:id/odds
pub async fn update_odds(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(fixture_id): Path<Uuid>,
    Json(odds): Json<OddsPatch>,
) -> AppResult<Json<Fixture>> {
    Ok(Json(state.fixtures.update_odds(fixture_id, odds).await?))
}

/// DELETE /api/admin/fixtures/:id
pub async fn delete_fixture(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(fixture_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.fixtures.delete(fixture_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/matches - bulk text import
pub async fn import_fixtures(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(request): ValidatedJson<ImportFixturesRequest>,
) -> AppResult<Json<ImportReport>> {
    info!("📥 Admin {} importing fixtures", admin.id);
    Ok(Json(state.fixtures.import(&request.matches_text).await?))
}

// ========== BETS ==========

/// GET /api/admin/bets
pub async fn list_bets(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<Vec<BetWithFixture>>> {
    Ok(Json(state.betting.all_bets().await?))
}

/// GET /api/admin/bets/flagged
pub async fn flagged_bets(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<Vec<BetWithFixture>>> {
    Ok(Json(state.betting.flagged_bets().await?))
}

/// POST /api/admin/bets
pub async fn place_admin_bet(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(request): Json<AdminBetRequest>,
) -> AppResult<(StatusCode, Json<Bet>)> {
    let bet = state.betting.place_admin_bet(admin.id, request).await?;
    Ok((StatusCode::CREATED, Json(bet)))
}

/// PUT /api/admin/bets/:id
pub async fn force_bet_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(bet_id): Path<Uuid>,
    Json(request): Json<ForceStatusRequest>,
) -> AppResult<Json<Bet>> {
    Ok(Json(
        state
            .betting
            .force_status(admin.id, bet_id, request.status)
            .await?,
    ))
}

/// POST /api/admin/settlement/run
pub async fn run_settlement(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<ReconcileReport>> {
    info!("⏰ Admin {} triggered a settlement run", admin.id);
    Ok(Json(state.scheduler.run_once().await?))
}
