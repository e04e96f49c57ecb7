use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::*;
use super::money::Money;
use crate::error::AppResult;

/// Read access to tracked fixtures
#[async_trait]
pub trait FixtureSource: Send + Sync {
    async fn get_fixture(&self, id: Uuid) -> AppResult<Option<Fixture>>;
}

/// Record store for accounts, fixtures, wagers and funding requests.
///
/// Every balance-changing operation is a single atomic unit against the
/// store: the guarded state transition, the conditional balance update and
/// the `balance_mutations` entry commit together or not at all. Balances are
/// never cached outside the store.
#[async_trait]
pub trait LedgerStore: FixtureSource {
    // ========== USERS ==========

    /// Fails with `AuthError::EmailTaken` if the email is registered
    async fn create_user(&self, user: NewUser) -> AppResult<User>;

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn list_users(&self) -> AppResult<Vec<User>>;

    async fn set_user_active(&self, id: Uuid, active: bool) -> AppResult<User>;

    // ========== PRIVILEGES ==========

    async fn grant_privilege(
        &self,
        user_id: Uuid,
        role: Role,
        granted_by: Option<Uuid>,
        reason: &str,
    ) -> AppResult<PrivilegeGrant>;

    async fn revoke_privilege(&self, grant_id: Uuid, revoked_by: Uuid) -> AppResult<PrivilegeGrant>;

    async fn has_role(&self, user_id: Uuid, role: Role) -> AppResult<bool>;

    async fn list_privilege_grants(&self) -> AppResult<Vec<PrivilegeGrant>>;

    // ========== SESSIONS ==========

    async fn create_session(&self, token_hash: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<()>;

    /// User owning an unexpired session
    async fn session_user(&self, token_hash: &str) -> AppResult<Option<User>>;

    async fn delete_session(&self, token_hash: &str) -> AppResult<()>;

    // ========== FIXTURES ==========

    async fn create_fixture(&self, fixture: NewFixture) -> AppResult<Fixture>;

    async fn list_fixtures(&self, filter: &FixtureFilter) -> AppResult<Vec<Fixture>>;

    async fn update_fixture(&self, id: Uuid, patch: &FixturePatch) -> AppResult<Fixture>;

    /// Rejected while pending wagers still reference the fixture
    async fn delete_fixture(&self, id: Uuid) -> AppResult<()>;

    /// Increment the match minute of every live fixture, returning how many moved
    async fn advance_live_minutes(&self) -> AppResult<u64>;

    // ========== WAGERS ==========

    /// Debit the stake and insert the wager. Returns the new balance.
    async fn place_bet(&self, bet: NewBet) -> AppResult<(Bet, Money)>;

    /// Insert an admin-entered wager without touching the balance
    async fn record_admin_bet(&self, bet: NewBet) -> AppResult<Bet>;

    async fn get_bet(&self, id: Uuid) -> AppResult<Option<Bet>>;

    async fn list_user_bets(&self, user_id: Uuid) -> AppResult<Vec<BetWithFixture>>;

    async fn list_bets(&self) -> AppResult<Vec<BetWithFixture>>;

    /// Pending wagers joined with their fixture
    async fn pending_bets(&self) -> AppResult<Vec<BetWithFixture>>;

    /// Pending wagers carrying a review note
    async fn flagged_bets(&self) -> AppResult<Vec<BetWithFixture>>;

    /// Move a pending wager to its terminal status and apply the credit.
    /// A wager that is no longer pending yields `AlreadySettled` untouched.
    async fn settle_bet(&self, command: &SettleCommand) -> AppResult<SettleOutcome>;

    async fn flag_bet_for_review(&self, id: Uuid, reason: &str) -> AppResult<()>;

    // ========== DEPOSITS ==========

    async fn create_deposit(&self, deposit: NewDeposit) -> AppResult<Deposit>;

    async fn list_user_deposits(&self, user_id: Uuid) -> AppResult<Vec<Deposit>>;

    async fn list_deposits(&self) -> AppResult<Vec<Deposit>>;

    /// Review a pending deposit; confirming credits the account once
    async fn update_deposit_status(&self, id: Uuid, status: DepositStatus, admin_id: Uuid) -> AppResult<Deposit>;

    // ========== WITHDRAWALS ==========

    async fn create_withdrawal(&self, withdrawal: NewWithdrawal) -> AppResult<Withdrawal>;

    async fn list_user_withdrawals(&self, user_id: Uuid) -> AppResult<Vec<Withdrawal>>;

    async fn list_withdrawals(&self) -> AppResult<Vec<Withdrawal>>;

    /// Review a pending withdrawal; processing debits the account and is
    /// rejected with the status unchanged if the balance would go negative
    async fn update_withdrawal_status(
        &self,
        id: Uuid,
        status: WithdrawalStatus,
        note: Option<String>,
        admin_id: Uuid,
    ) -> AppResult<Withdrawal>;

    // ========== BALANCE ==========

    /// Conditional update of the account balance. Returns the new balance.
    async fn adjust_balance(&self, change: &BalanceChange) -> AppResult<Money>;

    /// Credit the one-time welcome bonus. Returns the new balance.
    async fn claim_welcome_bonus(&self, user_id: Uuid, amount: Money) -> AppResult<Money>;

    async fn list_mutations(&self, user_id: Uuid) -> AppResult<Vec<BalanceMutation>>;

    // ========== SETTINGS ==========

    async fn get_setting(&self, key: &str) -> AppResult<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> AppResult<()>;
}
