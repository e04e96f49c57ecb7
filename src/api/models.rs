use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::betting::UserStats;
use crate::ledger::models::*;
use crate::ledger::money::Money;

// ========== REQUEST MODELS ==========

#[derive(Debug, Deserialize)]
pub struct ReviewDepositRequest {
    pub status: DepositStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewWithdrawalRequest {
    pub status: WithdrawalStatus,
    #[serde(default)]
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub admin_note: Option<String>,
}

/// Admin-entered deposit or payout on behalf of a player
#[derive(Debug, Deserialize, Validate)]
pub struct AdminFundingRequest {
    pub user_id: Uuid,
    pub amount: Money,
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub method: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub reference: Option<String>,
}

/// Signed delta applied to a balance
#[derive(Debug, Deserialize, Validate)]
pub struct AdjustBalanceRequest {
    pub amount: Money,
    #[serde(default)]
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForceStatusRequest {
    pub status: BetStatus,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GrantPrivilegeRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 500, message = "must be 1-500 characters"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImportFixturesRequest {
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub matches_text: String,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub scheduler_running: bool,
    pub live_subscribers: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlaceBetResponse {
    pub bet: Bet,
    pub new_balance: Money,
}

/// Everything the admin console shows for one player
#[derive(Debug, Serialize)]
pub struct UserOverview {
    pub user_id: Uuid,
    pub account_id: String,
    pub email: String,
    pub balance: Money,
    pub betting: UserStats,
    pub deposits: Vec<Deposit>,
    pub withdrawals: Vec<Withdrawal>,
}
