use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::models::BetStatus;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bet error: {0}")]
    Bet(#[from] BetError),

    #[error("Balance error: {0}")]
    Balance(#[from] BalanceError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Unauthorized")]
    Unauthorized,
}

/// Wager lifecycle errors
#[derive(Error, Debug)]
pub enum BetError {
    #[error("Bet not found: {0}")]
    NotFound(Uuid),

    #[error("Bet {id} already settled as {status}")]
    AlreadySettled { id: Uuid, status: BetStatus },

    #[error("Fixture {0} is not open for betting")]
    FixtureClosed(Uuid),

    #[error("Market {market} has no quoted odds on fixture {fixture_id}")]
    MarketUnavailable { fixture_id: Uuid, market: String },

    #[error("Invalid terminal status: {0}")]
    InvalidTerminalStatus(BetStatus),

    #[error("Bet must reference a fixture or a custom match")]
    MissingTarget,
}

/// Balance discipline violations
#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("Account {0} not found")]
    AccountNotFound(Uuid),

    #[error("Amount must be positive: {0}")]
    NonPositiveAmount(String),

    #[error("Welcome bonus already claimed")]
    BonusAlreadyClaimed,

    #[error("Welcome bonus requires a confirmed deposit")]
    BonusRequiresDeposit,

    #[error("Invalid status transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Errors raised while evaluating a single wager for settlement
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    #[error("Market '{0}' cannot be evaluated automatically")]
    UnresolvableMarket(String),

    #[error("Malformed score {home}-{away}")]
    MalformedScore { home: i32, away: i32 },

    #[error("Fixture {0} referenced by bet is missing")]
    FixtureMissing(Uuid),

    #[error("Invalid total line: {0}")]
    InvalidLine(String),
}

/// Authentication / session errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already exists")]
    EmailTaken,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Session expired")]
    SessionExpired,

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::Bet(BetError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "BET_NOT_FOUND",
                format!("Bet not found: {}", id),
                None,
            ),
            AppError::Bet(BetError::AlreadySettled { id, status }) => (
                StatusCode::CONFLICT,
                "BET_ALREADY_SETTLED",
                format!("Bet {} is already {}", id, status),
                Some(serde_json::json!({"bet_id": id, "status": status})),
            ),
            AppError::Bet(BetError::FixtureClosed(fixture_id)) => (
                StatusCode::BAD_REQUEST,
                "FIXTURE_CLOSED",
                "Fixture is not open for betting".to_string(),
                Some(serde_json::json!({"fixture_id": fixture_id})),
            ),
            AppError::Bet(BetError::MarketUnavailable { fixture_id, market }) => (
                StatusCode::BAD_REQUEST,
                "MARKET_UNAVAILABLE",
                format!("Market {} is not available", market),
                Some(serde_json::json!({"fixture_id": fixture_id, "market": market})),
            ),
            AppError::Bet(e @ (BetError::InvalidTerminalStatus(_) | BetError::MissingTarget)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_BET",
                e.to_string(),
                None,
            ),
            AppError::Balance(BalanceError::InsufficientFunds { required, available }) => (
                StatusCode::BAD_REQUEST,
                "INSUFFICIENT_BALANCE",
                "Insufficient balance".to_string(),
                Some(serde_json::json!({
                    "required": required,
                    "available": available,
                })),
            ),
            AppError::Balance(BalanceError::AccountNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "ACCOUNT_NOT_FOUND",
                format!("Account {} not found", id),
                None,
            ),
            AppError::Balance(BalanceError::InvalidTransition { from, to }) => (
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                format!("Cannot move from {} to {}", from, to),
                None,
            ),
            AppError::Balance(e) => (
                StatusCode::BAD_REQUEST,
                "BALANCE_REJECTED",
                e.to_string(),
                None,
            ),
            AppError::Settlement(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "SETTLEMENT_UNRESOLVED",
                e.to_string(),
                None,
            ),
            AppError::Auth(AuthError::EmailTaken) => (
                StatusCode::BAD_REQUEST,
                "EMAIL_TAKEN",
                "Email already exists".to_string(),
                None,
            ),
            AppError::Auth(AuthError::Hashing(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
            AppError::Auth(e) => (
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_FAILED",
                e.to_string(),
                None,
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_REQUIRED",
                "Authentication required".to_string(),
                None,
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "ADMIN_REQUIRED",
                "Admin access required".to_string(),
                None,
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
                None,
            ),
            AppError::InvalidInput(message) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                message,
                None,
            ),
            AppError::Conflict(message) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                message,
                None,
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (
                BalanceError::InsufficientFunds {
                    required: "10.00".into(),
                    available: "5.00".into(),
                }
                .into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                BetError::AlreadySettled { id: Uuid::nil(), status: BetStatus::Won }.into(),
                StatusCode::CONFLICT,
            ),
            (AppError::NotFound("user".into()), StatusCode::NOT_FOUND),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
