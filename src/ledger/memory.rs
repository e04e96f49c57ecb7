use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::*;
use super::money::Money;
use super::store::{FixtureSource, LedgerStore};
use crate::error::{AppError, AppResult, AuthError, BalanceError, BetError};

/// In-memory ledger used by tests and by local runs without `DATABASE_URL`.
///
/// All state sits behind one lock so each operation is a single atomic unit,
/// mirroring the transaction boundaries of `LedgerRepository`.
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    users: HashMap<Uuid, User>,
    grants: Vec<PrivilegeGrant>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    fixtures: HashMap<Uuid, Fixture>,
    bets: HashMap<Uuid, Bet>,
    deposits: HashMap<Uuid, Deposit>,
    withdrawals: HashMap<Uuid, Withdrawal>,
    mutations: Vec<BalanceMutation>,
    mutation_keys: HashSet<(MutationCause, Uuid)>,
    settings: HashMap<String, String>,
}

impl LedgerState {
    /// Validates fully before writing, so a rejected change leaves no trace
    fn apply_change(&mut self, change: &BalanceChange) -> AppResult<Money> {
        if self.mutation_keys.contains(&(change.cause, change.reference_id)) {
            return Err(AppError::Conflict(format!(
                "{} already recorded for {}",
                change.cause.as_str(),
                change.reference_id
            )));
        }

        let user = self
            .users
            .get_mut(&change.user_id)
            .ok_or(BalanceError::AccountNotFound(change.user_id))?;

        let new_balance = user.balance.apply(change.delta)?;
        if new_balance.is_negative() {
            return Err(BalanceError::InsufficientFunds {
                required: (-change.delta).to_string(),
                available: user.balance.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        user.balance = new_balance;
        user.updated_at = now;

        self.mutation_keys.insert((change.cause, change.reference_id));
        self.mutations.push(BalanceMutation {
            id: Uuid::new_v4(),
            user_id: change.user_id,
            delta: change.delta,
            balance_after: new_balance,
            cause: change.cause,
            reference_id: change.reference_id,
            actor_id: change.actor_id,
            note: change.note.clone(),
            created_at: now,
        });

        Ok(new_balance)
    }

    fn with_fixture(&self, bet: &Bet) -> BetWithFixture {
        BetWithFixture {
            bet: bet.clone(),
            fixture: bet.fixture_id.and_then(|id| self.fixtures.get(&id).cloned()),
        }
    }

    fn collect_bets<F>(&self, predicate: F) -> Vec<BetWithFixture>
    where
        F: Fn(&Bet) -> bool,
    {
        let mut bets: Vec<BetWithFixture> = self
            .bets
            .values()
            .filter(|&bet| predicate(bet))
            .map(|bet| self.with_fixture(bet))
            .collect();
        bets.sort_by(|a, b| b.bet.placed_at.cmp(&a.bet.placed_at));
        bets
    }

    fn insert_bet(&mut self, bet: NewBet) -> AppResult<Bet> {
        if !self.users.contains_key(&bet.user_id) {
            return Err(BalanceError::AccountNotFound(bet.user_id).into());
        }
        if let Some(fixture_id) = bet.fixture_id {
            if !self.fixtures.contains_key(&fixture_id) {
                return Err(AppError::NotFound(format!("Fixture {}", fixture_id)));
            }
        }
        let bet = bet.into_bet(Uuid::new_v4(), Utc::now());
        self.bets.insert(bet.id, bet.clone());
        Ok(bet)
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items
}

#[async_trait]
impl FixtureSource for MemoryLedger {
    async fn get_fixture(&self, id: Uuid) -> AppResult<Option<Fixture>> {
        Ok(self.state.read().await.fixtures.get(&id).cloned())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    // ========== USERS ==========

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let mut state = self.state.write().await;
        let email = user.email.to_lowercase();
        if state.users.values().any(|u| u.email == email) {
            return Err(AuthError::EmailTaken.into());
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash: user.password_hash,
            account_id: user.account_id,
            balance: Money::ZERO,
            bonus_balance: Money::ZERO,
            total_bonus_received: Money::ZERO,
            has_claimed_welcome_bonus: false,
            language: user.language,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = email.to_lowercase();
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let users = self.state.read().await.users.values().cloned().collect();
        Ok(newest_first(users, |u: &User| u.created_at))
    }

    async fn set_user_active(&self, id: Uuid, active: bool) -> AppResult<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&id)
            .ok_or(BalanceError::AccountNotFound(id))?;
        user.is_active = active;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    // ========== PRIVILEGES ==========

    async fn grant_privilege(
        &self,
        user_id: Uuid,
        role: Role,
        granted_by: Option<Uuid>,
        reason: &str,
    ) -> AppResult<PrivilegeGrant> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(BalanceError::AccountNotFound(user_id).into());
        }
        if state
            .grants
            .iter()
            .any(|g| g.user_id == user_id && g.role == role && g.is_active())
        {
            return Err(AppError::Conflict(format!("User already holds {}", role.as_str())));
        }

        let grant = PrivilegeGrant {
            id: Uuid::new_v4(),
            user_id,
            role,
            granted_by,
            reason: reason.to_string(),
            granted_at: Utc::now(),
            revoked_at: None,
            revoked_by: None,
        };
        state.grants.push(grant.clone());
        Ok(grant)
    }

    async fn revoke_privilege(&self, grant_id: Uuid, revoked_by: Uuid) -> AppResult<PrivilegeGrant> {
        let mut state = self.state.write().await;
        let grant = state
            .grants
            .iter_mut()
            .find(|g| g.id == grant_id && g.is_active())
            .ok_or_else(|| AppError::NotFound(format!("Active grant {}", grant_id)))?;
        grant.revoked_at = Some(Utc::now());
        grant.revoked_by = Some(revoked_by);
        Ok(grant.clone())
    }

    async fn has_role(&self, user_id: Uuid, role: Role) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .grants
            .iter()
            .any(|g| g.user_id == user_id && g.role == role && g.is_active()))
    }

    async fn list_privilege_grants(&self) -> AppResult<Vec<PrivilegeGrant>> {
        let grants = self.state.read().await.grants.clone();
        Ok(newest_first(grants, |g: &PrivilegeGrant| g.granted_at))
    }

    // ========== SESSIONS ==========

    async fn create_session(&self, token_hash: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.sessions.insert(token_hash.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn session_user(&self, token_hash: &str) -> AppResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .get(token_hash)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .and_then(|(user_id, _)| state.users.get(user_id).cloned()))
    }

    async fn delete_session(&self, token_hash: &str) -> AppResult<()> {
        self.state.write().await.sessions.remove(token_hash);
        Ok(())
    }

    // ========== FIXTURES ==========

    async fn create_fixture(&self, fixture: NewFixture) -> AppResult<Fixture> {
        fixture.validate()?;
        let now = Utc::now();
        let fixture = Fixture {
            id: Uuid::new_v4(),
            sport: fixture.sport,
            league: fixture.league,
            home_team: fixture.home_team,
            away_team: fixture.away_team,
            start_time: fixture.start_time,
            status: fixture.status,
            home_score: fixture.home_score,
            away_score: fixture.away_score,
            current_minute: fixture.current_minute,
            home_odds: fixture.home_odds,
            draw_odds: fixture.draw_odds,
            away_odds: fixture.away_odds,
            total_line: fixture.total_line,
            over_odds: fixture.over_odds,
            under_odds: fixture.under_odds,
            created_at: now,
            updated_at: now,
        };
        self.state.write().await.fixtures.insert(fixture.id, fixture.clone());
        Ok(fixture)
    }

    async fn list_fixtures(&self, filter: &FixtureFilter) -> AppResult<Vec<Fixture>> {
        let state = self.state.read().await;
        let mut fixtures: Vec<Fixture> = state
            .fixtures
            .values()
            .filter(|f| filter.sport.as_ref().map_or(true, |sport| &f.sport == sport))
            .filter(|f| !filter.live_only || f.status == FixtureStatus::Live)
            .cloned()
            .collect();
        fixtures.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        if let Some(limit) = filter.limit {
            fixtures.truncate(limit.max(0) as usize);
        }
        Ok(fixtures)
    }

    async fn update_fixture(&self, id: Uuid, patch: &FixturePatch) -> AppResult<Fixture> {
        let mut state = self.state.write().await;
        let fixture = state
            .fixtures
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Fixture {}", id)))?;

        let mut updated = fixture.clone();
        patch.apply_to(&mut updated)?;
        *fixture = updated.clone();
        Ok(updated)
    }

    async fn delete_fixture(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        if !state.fixtures.contains_key(&id) {
            return Err(AppError::NotFound(format!("Fixture {}", id)));
        }
        if state
            .bets
            .values()
            .any(|b| b.fixture_id == Some(id) && b.status == BetStatus::Pending)
        {
            return Err(AppError::Conflict(format!("Fixture {} has pending bets", id)));
        }
        state.fixtures.remove(&id);
        Ok(())
    }

    async fn advance_live_minutes(&self) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut advanced = 0;
        for fixture in state.fixtures.values_mut() {
            if fixture.status == FixtureStatus::Live {
                fixture.current_minute += 1;
                fixture.updated_at = now;
                advanced += 1;
            }
        }
        Ok(advanced)
    }

    // ========== WAGERS ==========

    async fn place_bet(&self, bet: NewBet) -> AppResult<(Bet, Money)> {
        let mut state = self.state.write().await;
        let available = state
            .users
            .get(&bet.user_id)
            .map(|u| u.balance)
            .ok_or(BalanceError::AccountNotFound(bet.user_id))?;
        if available < bet.stake {
            return Err(BalanceError::InsufficientFunds {
                required: bet.stake.to_string(),
                available: available.to_string(),
            }
            .into());
        }

        let stake = bet.stake;
        let bet = state.insert_bet(bet)?;
        let change = BalanceChange {
            user_id: bet.user_id,
            delta: -stake,
            cause: MutationCause::BetPlacement,
            reference_id: bet.id,
            actor_id: Some(bet.user_id),
            note: Some(format!("stake on {}", bet.market)),
        };
        match state.apply_change(&change) {
            Ok(balance) => Ok((bet, balance)),
            Err(e) => {
                state.bets.remove(&bet.id);
                Err(e)
            }
        }
    }

    async fn record_admin_bet(&self, bet: NewBet) -> AppResult<Bet> {
        self.state.write().await.insert_bet(bet)
    }

    async fn get_bet(&self, id: Uuid) -> AppResult<Option<Bet>> {
        Ok(self.state.read().await.bets.get(&id).cloned())
    }

    async fn list_user_bets(&self, user_id: Uuid) -> AppResult<Vec<BetWithFixture>> {
        Ok(self.state.read().await.collect_bets(|b| b.user_id == user_id))
    }

    async fn list_bets(&self) -> AppResult<Vec<BetWithFixture>> {
        Ok(self.state.read().await.collect_bets(|_| true))
    }

    async fn pending_bets(&self) -> AppResult<Vec<BetWithFixture>> {
        let mut pending = self
            .state
            .read()
            .await
            .collect_bets(|b| b.status == BetStatus::Pending);
        pending.reverse();
        Ok(pending)
    }

    async fn flagged_bets(&self) -> AppResult<Vec<BetWithFixture>> {
        Ok(self
            .state
            .read()
            .await
            .collect_bets(|b| b.status == BetStatus::Pending && b.review_note.is_some()))
    }

    async fn settle_bet(&self, command: &SettleCommand) -> AppResult<SettleOutcome> {
        if !command.status.is_terminal() {
            return Err(BetError::InvalidTerminalStatus(command.status).into());
        }

        let mut state = self.state.write().await;
        let bet = state
            .bets
            .get(&command.bet_id)
            .ok_or(BetError::NotFound(command.bet_id))?;
        if bet.status != BetStatus::Pending {
            return Ok(SettleOutcome::AlreadySettled(bet.status));
        }

        let user_id = bet.user_id;
        let new_balance = match command.credit {
            Some(amount) => Some(state.apply_change(&BalanceChange {
                user_id,
                delta: amount,
                cause: MutationCause::BetSettlement,
                reference_id: command.bet_id,
                actor_id: command.source.actor(),
                note: Some(command.note()),
            })?),
            None => None,
        };

        let bet = state
            .bets
            .get_mut(&command.bet_id)
            .ok_or(BetError::NotFound(command.bet_id))?;
        bet.status = command.status;
        bet.settled_at = Some(Utc::now());

        Ok(SettleOutcome::Settled {
            bet: bet.clone(),
            new_balance,
        })
    }

    async fn flag_bet_for_review(&self, id: Uuid, reason: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        let bet = state.bets.get_mut(&id).ok_or(BetError::NotFound(id))?;
        if bet.status == BetStatus::Pending {
            bet.review_note = Some(reason.to_string());
        }
        Ok(())
    }

    // ========== DEPOSITS ==========

    async fn create_deposit(&self, deposit: NewDeposit) -> AppResult<Deposit> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&deposit.user_id) {
            return Err(BalanceError::AccountNotFound(deposit.user_id).into());
        }
        let now = Utc::now();
        let deposit = Deposit {
            id: Uuid::new_v4(),
            user_id: deposit.user_id,
            amount: deposit.amount,
            method: deposit.method,
            tx_id: deposit.tx_id,
            status: DepositStatus::Pending,
            reviewed_by: None,
            created_at: now,
            updated_at: now,
        };
        state.deposits.insert(deposit.id, deposit.clone());
        Ok(deposit)
    }

    async fn list_user_deposits(&self, user_id: Uuid) -> AppResult<Vec<Deposit>> {
        let state = self.state.read().await;
        let deposits = state
            .deposits
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(deposits, |d: &Deposit| d.created_at))
    }

    async fn list_deposits(&self) -> AppResult<Vec<Deposit>> {
        let deposits = self.state.read().await.deposits.values().cloned().collect();
        Ok(newest_first(deposits, |d: &Deposit| d.created_at))
    }

    async fn update_deposit_status(&self, id: Uuid, status: DepositStatus, admin_id: Uuid) -> AppResult<Deposit> {
        let mut state = self.state.write().await;
        let deposit = state
            .deposits
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Deposit {}", id)))?;

        if !deposit.status.can_transition_to(status) {
            return Err(BalanceError::InvalidTransition {
                from: deposit.status.as_str().to_string(),
                to: status.as_str().to_string(),
            }
            .into());
        }

        if status == DepositStatus::Confirmed {
            state.apply_change(&BalanceChange {
                user_id: deposit.user_id,
                delta: deposit.amount,
                cause: MutationCause::DepositConfirmation,
                reference_id: deposit.id,
                actor_id: Some(admin_id),
                note: Some(format!("deposit via {}", deposit.method)),
            })?;
        }

        let deposit = state
            .deposits
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Deposit {}", id)))?;
        deposit.status = status;
        deposit.reviewed_by = Some(admin_id);
        deposit.updated_at = Utc::now();
        Ok(deposit.clone())
    }

    // ========== WITHDRAWALS ==========

    async fn create_withdrawal(&self, withdrawal: NewWithdrawal) -> AppResult<Withdrawal> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&withdrawal.user_id) {
            return Err(BalanceError::AccountNotFound(withdrawal.user_id).into());
        }
        let now = Utc::now();
        let withdrawal = Withdrawal {
            id: Uuid::new_v4(),
            user_id: withdrawal.user_id,
            amount: withdrawal.amount,
            method: withdrawal.method,
            address: withdrawal.address,
            status: WithdrawalStatus::Pending,
            admin_note: None,
            reviewed_by: None,
            created_at: now,
            updated_at: now,
        };
        state.withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok(withdrawal)
    }

    async fn list_user_withdrawals(&self, user_id: Uuid) -> AppResult<Vec<Withdrawal>> {
        let state = self.state.read().await;
        let withdrawals = state
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(withdrawals, |w: &Withdrawal| w.created_at))
    }

    async fn list_withdrawals(&self) -> AppResult<Vec<Withdrawal>> {
        let withdrawals = self.state.read().await.withdrawals.values().cloned().collect();
        Ok(newest_first(withdrawals, |w: &Withdrawal| w.created_at))
    }

    async fn update_withdrawal_status(
        &self,
        id: Uuid,
        status: WithdrawalStatus,
        note: Option<String>,
        admin_id: Uuid,
    ) -> AppResult<Withdrawal> {
        let mut state = self.state.write().await;
        let withdrawal = state
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Withdrawal {}", id)))?;

        if !withdrawal.status.can_transition_to(status) {
            return Err(BalanceError::InvalidTransition {
                from: withdrawal.status.as_str().to_string(),
                to: status.as_str().to_string(),
            }
            .into());
        }

        if status == WithdrawalStatus::Processed {
            state.apply_change(&BalanceChange {
                user_id: withdrawal.user_id,
                delta: -withdrawal.amount,
                cause: MutationCause::WithdrawalProcessing,
                reference_id: withdrawal.id,
                actor_id: Some(admin_id),
                note: note.clone(),
            })?;
        }

        let withdrawal = state
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Withdrawal {}", id)))?;
        withdrawal.status = status;
        withdrawal.admin_note = note;
        withdrawal.reviewed_by = Some(admin_id);
        withdrawal.updated_at = Utc::now();
        Ok(withdrawal.clone())
    }

    // ========== BALANCE ==========

    async fn adjust_balance(&self, change: &BalanceChange) -> AppResult<Money> {
        self.state.write().await.apply_change(change)
    }

    async fn claim_welcome_bonus(&self, user_id: Uuid, amount: Money) -> AppResult<Money> {
        let mut state = self.state.write().await;
        let claimed = state
            .users
            .get(&user_id)
            .map(|u| u.has_claimed_welcome_bonus)
            .ok_or(BalanceError::AccountNotFound(user_id))?;
        if claimed {
            return Err(BalanceError::BonusAlreadyClaimed.into());
        }

        let balance = state.apply_change(&BalanceChange {
            user_id,
            delta: amount,
            cause: MutationCause::WelcomeBonus,
            reference_id: user_id,
            actor_id: Some(user_id),
            note: Some("welcome bonus".to_string()),
        })?;

        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(BalanceError::AccountNotFound(user_id))?;
        user.bonus_balance = user.bonus_balance.apply(amount)?;
        user.total_bonus_received = user.total_bonus_received.apply(amount)?;
        user.has_claimed_welcome_bonus = true;
        Ok(balance)
    }

    async fn list_mutations(&self, user_id: Uuid) -> AppResult<Vec<BalanceMutation>> {
        let state = self.state.read().await;
        let mutations = state
            .mutations
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(mutations, |m: &BalanceMutation| m.created_at))
    }

    // ========== SETTINGS ==========

    async fn get_setting(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.state.read().await.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> AppResult<()> {
        self.state
            .write()
            .await
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
