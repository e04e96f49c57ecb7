use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::*;
use super::money::{Money, Odds};
use super::store::{FixtureSource, LedgerStore};
use crate::error::{AppError, AppResult, AuthError, BalanceError, BetError};

const USER_COLUMNS: &str = "id, email, password_hash, account_id, balance, bonus_balance, \
     total_bonus_received, has_claimed_welcome_bonus, language, is_active, created_at, updated_at";

const FIXTURE_COLUMNS: &str = "id, sport, league, home_team, away_team, start_time, status, \
     home_score, away_score, current_minute, home_odds, draw_odds, away_odds, total_line, \
     over_odds, under_odds, created_at, updated_at";

const BET_COLUMNS: &str = "id, user_id, fixture_id, custom_home_team, custom_away_team, \
     custom_league, custom_home_score, custom_away_score, market, line, stake, odds, \
     potential_win, status, placed_by, review_note, placed_at, settled_at";

const GRANT_COLUMNS: &str = "id, user_id, role, granted_by, reason, granted_at, revoked_at, revoked_by";

const DEPOSIT_COLUMNS: &str = "id, user_id, amount, method, tx_id, status, reviewed_by, created_at, updated_at";

const WITHDRAWAL_COLUMNS: &str =
    "id, user_id, amount, method, address, status, admin_note, reviewed_by, created_at, updated_at";

const MUTATION_COLUMNS: &str =
    "id, user_id, delta, balance_after, cause, reference_id, actor_id, note, created_at";

/// Ledger repository - the source of truth for balances and wager state
pub struct LedgerRepository {
    pub pool: PgPool,
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn odds_value(odds: Option<Odds>) -> Option<Decimal> {
    odds.map(|o| o.value())
}

fn map_rows<T>(rows: Vec<PgRow>, from_row: fn(&PgRow) -> AppResult<T>) -> AppResult<Vec<T>> {
    rows.iter().map(from_row).collect()
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin_tx(&self) -> AppResult<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    // ========== BALANCE PRIMITIVE ==========

    /// Conditional balance update plus ledger entry inside the caller's transaction.
    /// The balance never drops below zero; a repeated (cause, reference) is a conflict.
    async fn apply_change(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        change: &BalanceChange,
    ) -> AppResult<Money> {
        let updated: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET balance = balance + $2, updated_at = NOW()
            WHERE id = $1 AND balance + $2 >= 0
            RETURNING balance
            "#,
        )
        .bind(change.user_id)
        .bind(change.delta.amount())
        .fetch_optional(&mut **tx)
        .await?;

        let new_balance = match updated {
            Some(balance) => Money::new(balance),
            None => {
                let current: Option<Decimal> = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
                    .bind(change.user_id)
                    .fetch_optional(&mut **tx)
                    .await?;
                return match current {
                    Some(available) => Err(BalanceError::InsufficientFunds {
                        required: (-change.delta).to_string(),
                        available: Money::new(available).to_string(),
                    }
                    .into()),
                    None => Err(BalanceError::AccountNotFound(change.user_id).into()),
                };
            }
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO balance_mutations
                (id, user_id, delta, balance_after, cause, reference_id, actor_id, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(change.user_id)
        .bind(change.delta.amount())
        .bind(new_balance.amount())
        .bind(change.cause.as_str())
        .bind(change.reference_id)
        .bind(change.actor_id)
        .bind(&change.note)
        .execute(&mut **tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict(format!(
                    "{} already recorded for {}",
                    change.cause.as_str(),
                    change.reference_id
                )))
            }
            Err(e) => return Err(e.into()),
        }

        debug!(
            "Balance mutation {} {} for user {} (ref {}), balance now {}",
            change.cause.as_str(),
            change.delta,
            change.user_id,
            change.reference_id,
            new_balance
        );

        Ok(new_balance)
    }

    async fn insert_bet(&self, tx: &mut Transaction<'_, Postgres>, bet: &NewBet) -> AppResult<Bet> {
        let custom = bet.custom_match.as_ref();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO bets
                (id, user_id, fixture_id, custom_home_team, custom_away_team, custom_league,
                 custom_home_score, custom_away_score, market, line, stake, odds,
                 potential_win, status, placed_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'pending', $14)
            RETURNING {}
            "#,
            BET_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(bet.user_id)
        .bind(bet.fixture_id)
        .bind(custom.map(|c| c.home_team.clone()))
        .bind(custom.map(|c| c.away_team.clone()))
        .bind(custom.and_then(|c| c.league.clone()))
        .bind(custom.and_then(|c| c.home_score))
        .bind(custom.and_then(|c| c.away_score))
        .bind(bet.market.as_str())
        .bind(bet.line)
        .bind(bet.stake.amount())
        .bind(bet.odds.value())
        .bind(bet.potential_win.amount())
        .bind(bet.placed_by)
        .fetch_one(&mut **tx)
        .await?;

        Bet::from_row(&row)
    }

    /// Attach fixtures to a batch of bets with one extra query
    async fn join_fixtures(&self, bets: Vec<Bet>) -> AppResult<Vec<BetWithFixture>> {
        let ids: Vec<Uuid> = bets.iter().filter_map(|b| b.fixture_id).collect();
        let fixtures: HashMap<Uuid, Fixture> = if ids.is_empty() {
            HashMap::new()
        } else {
            let rows = sqlx::query(&format!(
                "SELECT {} FROM fixtures WHERE id = ANY($1)",
                FIXTURE_COLUMNS
            ))
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
            map_rows(rows, Fixture::from_row)?
                .into_iter()
                .map(|f| (f.id, f))
                .collect()
        };

        Ok(bets
            .into_iter()
            .map(|bet| {
                let fixture = bet.fixture_id.and_then(|id| fixtures.get(&id).cloned());
                BetWithFixture { bet, fixture }
            })
            .collect())
    }

    async fn query_bets(&self, filter: &str, user_id: Option<Uuid>) -> AppResult<Vec<BetWithFixture>> {
        let sql = format!("SELECT {} FROM bets {}", BET_COLUMNS, filter);
        let mut query = sqlx::query(&sql);
        if let Some(user_id) = user_id {
            query = query.bind(user_id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let bets = map_rows(rows, Bet::from_row)?;
        self.join_fixtures(bets).await
    }

    async fn get_deposit_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> AppResult<Deposit> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM deposits WHERE id = $1 FOR UPDATE",
            DEPOSIT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Deposit {}", id)))?;
        Deposit::from_row(&row)
    }

    async fn get_withdrawal_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> AppResult<Withdrawal> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM withdrawals WHERE id = $1 FOR UPDATE",
            WITHDRAWAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Withdrawal {}", id)))?;
        Withdrawal::from_row(&row)
    }
}

#[async_trait]
impl FixtureSource for LedgerRepository {
    async fn get_fixture(&self, id: Uuid) -> AppResult<Option<Fixture>> {
        let row = sqlx::query(&format!("SELECT {} FROM fixtures WHERE id = $1", FIXTURE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Fixture::from_row).transpose()
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    // ========== USER OPERATIONS ==========

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, account_id, language)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user.email.to_lowercase())
        .bind(&user.password_hash)
        .bind(&user.account_id)
        .bind(&user.language)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => User::from_row(&row),
            Err(e) if is_unique_violation(&e) => Err(AuthError::EmailTaken.into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(User::from_row).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(User::from_row).transpose()
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, User::from_row)
    }

    async fn set_user_active(&self, id: Uuid, active: bool) -> AppResult<User> {
        let row = sqlx::query(&format!(
            "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BalanceError::AccountNotFound(id))?;
        User::from_row(&row)
    }

    // ========== PRIVILEGE OPERATIONS ==========

    async fn grant_privilege(
        &self,
        user_id: Uuid,
        role: Role,
        granted_by: Option<Uuid>,
        reason: &str,
    ) -> AppResult<PrivilegeGrant> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO privilege_grants (id, user_id, role, granted_by, reason)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            GRANT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(role.as_str())
        .bind(granted_by)
        .bind(reason)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => {
                let grant = PrivilegeGrant::from_row(&row)?;
                info!("🔐 Granted {} to user {} ({})", role.as_str(), user_id, reason);
                Ok(grant)
            }
            Err(e) if is_unique_violation(&e) => {
                Err(AppError::Conflict(format!("User already holds {}", role.as_str())))
            }
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(BalanceError::AccountNotFound(user_id).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn revoke_privilege(&self, grant_id: Uuid, revoked_by: Uuid) -> AppResult<PrivilegeGrant> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE privilege_grants
            SET revoked_at = NOW(), revoked_by = $2
            WHERE id = $1 AND revoked_at IS NULL
            RETURNING {}
            "#,
            GRANT_COLUMNS
        ))
        .bind(grant_id)
        .bind(revoked_by)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Active grant {}", grant_id)))?;
        PrivilegeGrant::from_row(&row)
    }

    async fn has_role(&self, user_id: Uuid, role: Role) -> AppResult<bool> {
        let held: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM privilege_grants
                WHERE user_id = $1 AND role = $2 AND revoked_at IS NULL
            )
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(held)
    }

    async fn list_privilege_grants(&self) -> AppResult<Vec<PrivilegeGrant>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM privilege_grants ORDER BY granted_at DESC",
            GRANT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, PrivilegeGrant::from_row)
    }

    // ========== SESSION OPERATIONS ==========

    async fn create_session(&self, token_hash: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("INSERT INTO sessions (token_hash, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token_hash)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn session_user(&self, token_hash: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM users
            WHERE id = (SELECT user_id FROM sessions WHERE token_hash = $1 AND expires_at > NOW())
            "#,
            USER_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(User::from_row).transpose()
    }

    async fn delete_session(&self, token_hash: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1 OR expires_at <= NOW()")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========== FIXTURE OPERATIONS ==========

    async fn create_fixture(&self, fixture: NewFixture) -> AppResult<Fixture> {
        fixture.validate()?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO fixtures
                (id, sport, league, home_team, away_team, start_time, status, home_score,
                 away_score, current_minute, home_odds, draw_odds, away_odds, total_line,
                 over_odds, under_odds)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {}
            "#,
            FIXTURE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&fixture.sport)
        .bind(&fixture.league)
        .bind(&fixture.home_team)
        .bind(&fixture.away_team)
        .bind(fixture.start_time)
        .bind(fixture.status.as_str())
        .bind(fixture.home_score)
        .bind(fixture.away_score)
        .bind(fixture.current_minute)
        .bind(odds_value(fixture.home_odds))
        .bind(odds_value(fixture.draw_odds))
        .bind(odds_value(fixture.away_odds))
        .bind(fixture.total_line)
        .bind(odds_value(fixture.over_odds))
        .bind(odds_value(fixture.under_odds))
        .fetch_one(&self.pool)
        .await?;
        Fixture::from_row(&row)
    }

    async fn list_fixtures(&self, filter: &FixtureFilter) -> AppResult<Vec<Fixture>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM fixtures
            WHERE ($1::TEXT IS NULL OR sport = $1)
              AND (NOT $2 OR status = 'live')
            ORDER BY start_time ASC
            LIMIT $3
            "#,
            FIXTURE_COLUMNS
        ))
        .bind(&filter.sport)
        .bind(filter.live_only)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, Fixture::from_row)
    }

    async fn update_fixture(&self, id: Uuid, patch: &FixturePatch) -> AppResult<Fixture> {
        let mut tx = self.begin_tx().await?;
        let row = sqlx::query(&format!(
            "SELECT {} FROM fixtures WHERE id = $1 FOR UPDATE",
            FIXTURE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Fixture {}", id)))?;

        let mut fixture = Fixture::from_row(&row)?;
        patch.apply_to(&mut fixture)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE fixtures
            SET status = $2, home_score = $3, away_score = $4, current_minute = $5,
                home_odds = $6, draw_odds = $7, away_odds = $8, total_line = $9,
                over_odds = $10, under_odds = $11, league = $12, start_time = $13,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            FIXTURE_COLUMNS
        ))
        .bind(id)
        .bind(fixture.status.as_str())
        .bind(fixture.home_score)
        .bind(fixture.away_score)
        .bind(fixture.current_minute)
        .bind(odds_value(fixture.home_odds))
        .bind(odds_value(fixture.draw_odds))
        .bind(odds_value(fixture.away_odds))
        .bind(fixture.total_line)
        .bind(odds_value(fixture.over_odds))
        .bind(odds_value(fixture.under_odds))
        .bind(&fixture.league)
        .bind(fixture.start_time)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Fixture::from_row(&row)
    }

    async fn delete_fixture(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.begin_tx().await?;
        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bets WHERE fixture_id = $1 AND status = 'pending'",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if pending > 0 {
            return Err(AppError::Conflict(format!("Fixture {} has pending bets", id)));
        }

        let result = sqlx::query("DELETE FROM fixtures WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await;
        match result {
            Ok(done) if done.rows_affected() == 0 => {
                return Err(AppError::NotFound(format!("Fixture {}", id)))
            }
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                return Err(AppError::Conflict(format!("Fixture {} is referenced by settled bets", id)))
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(())
    }

    async fn advance_live_minutes(&self) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE fixtures SET current_minute = current_minute + 1, updated_at = NOW() WHERE status = 'live'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ========== WAGER OPERATIONS ==========

    async fn place_bet(&self, bet: NewBet) -> AppResult<(Bet, Money)> {
        let mut tx = self.begin_tx().await?;
        let stored = self.insert_bet(&mut tx, &bet).await?;
        let balance = self
            .apply_change(
                &mut tx,
                &BalanceChange {
                    user_id: stored.user_id,
                    delta: -stored.stake,
                    cause: MutationCause::BetPlacement,
                    reference_id: stored.id,
                    actor_id: Some(stored.user_id),
                    note: Some(format!("stake on {}", stored.market)),
                },
            )
            .await?;
        tx.commit().await?;

        info!(
            "🎫 Bet {} placed by {}: {} @ {} on {}",
            stored.id, stored.user_id, stored.stake, stored.odds, stored.market
        );
        Ok((stored, balance))
    }

    async fn record_admin_bet(&self, bet: NewBet) -> AppResult<Bet> {
        let mut tx = self.begin_tx().await?;
        let stored = self.insert_bet(&mut tx, &bet).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn get_bet(&self, id: Uuid) -> AppResult<Option<Bet>> {
        let row = sqlx::query(&format!("SELECT {} FROM bets WHERE id = $1", BET_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Bet::from_row).transpose()
    }

    async fn list_user_bets(&self, user_id: Uuid) -> AppResult<Vec<BetWithFixture>> {
        self.query_bets("WHERE user_id = $1 ORDER BY placed_at DESC", Some(user_id))
            .await
    }

    async fn list_bets(&self) -> AppResult<Vec<BetWithFixture>> {
        self.query_bets("ORDER BY placed_at DESC", None).await
    }

    async fn pending_bets(&self) -> AppResult<Vec<BetWithFixture>> {
        self.query_bets("WHERE status = 'pending' ORDER BY placed_at ASC", None)
            .await
    }

    async fn flagged_bets(&self) -> AppResult<Vec<BetWithFixture>> {
        self.query_bets(
            "WHERE status = 'pending' AND review_note IS NOT NULL ORDER BY placed_at DESC",
            None,
        )
        .await
    }

    async fn settle_bet(&self, command: &SettleCommand) -> AppResult<SettleOutcome> {
        if !command.status.is_terminal() {
            return Err(BetError::InvalidTerminalStatus(command.status).into());
        }

        let mut tx = self.begin_tx().await?;

        // Guarded transition: only a pending row can move
        let row = sqlx::query(&format!(
            r#"
            UPDATE bets
            SET status = $2, settled_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            BET_COLUMNS
        ))
        .bind(command.bet_id)
        .bind(command.status.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let bet = match row {
            Some(row) => Bet::from_row(&row)?,
            None => {
                let current: Option<String> = sqlx::query_scalar("SELECT status FROM bets WHERE id = $1")
                    .bind(command.bet_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                return match current {
                    Some(status) => Ok(SettleOutcome::AlreadySettled(status.parse()?)),
                    None => Err(BetError::NotFound(command.bet_id).into()),
                };
            }
        };

        let new_balance = match command.credit {
            Some(amount) => Some(
                self.apply_change(
                    &mut tx,
                    &BalanceChange {
                        user_id: bet.user_id,
                        delta: amount,
                        cause: MutationCause::BetSettlement,
                        reference_id: bet.id,
                        actor_id: command.source.actor(),
                        note: Some(command.note()),
                    },
                )
                .await?,
            ),
            None => None,
        };

        tx.commit().await?;
        Ok(SettleOutcome::Settled { bet, new_balance })
    }

    async fn flag_bet_for_review(&self, id: Uuid, reason: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE bets SET review_note = $2 WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .bind(reason)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 && self.get_bet(id).await?.is_none() {
            return Err(BetError::NotFound(id).into());
        }
        Ok(())
    }

    // ========== DEPOSIT OPERATIONS ==========

    async fn create_deposit(&self, deposit: NewDeposit) -> AppResult<Deposit> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO deposits (id, user_id, amount, method, tx_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            DEPOSIT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(deposit.user_id)
        .bind(deposit.amount.amount())
        .bind(&deposit.method)
        .bind(&deposit.tx_id)
        .fetch_one(&self.pool)
        .await?;
        Deposit::from_row(&row)
    }

    async fn list_user_deposits(&self, user_id: Uuid) -> AppResult<Vec<Deposit>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM deposits WHERE user_id = $1 ORDER BY created_at DESC",
            DEPOSIT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, Deposit::from_row)
    }

    async fn list_deposits(&self) -> AppResult<Vec<Deposit>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM deposits ORDER BY created_at DESC",
            DEPOSIT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, Deposit::from_row)
    }

    async fn update_deposit_status(&self, id: Uuid, status: DepositStatus, admin_id: Uuid) -> AppResult<Deposit> {
        let mut tx = self.begin_tx().await?;
        let deposit = self.get_deposit_for_update(&mut tx, id).await?;

        if !deposit.status.can_transition_to(status) {
            return Err(BalanceError::InvalidTransition {
                from: deposit.status.as_str().to_string(),
                to: status.as_str().to_string(),
            }
            .into());
        }

        if status == DepositStatus::Confirmed {
            self.apply_change(
                &mut tx,
                &BalanceChange {
                    user_id: deposit.user_id,
                    delta: deposit.amount,
                    cause: MutationCause::DepositConfirmation,
                    reference_id: deposit.id,
                    actor_id: Some(admin_id),
                    note: Some(format!("deposit via {}", deposit.method)),
                },
            )
            .await?;
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE deposits
            SET status = $2, reviewed_by = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            DEPOSIT_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(admin_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Deposit::from_row(&row)
    }

    // ========== WITHDRAWAL OPERATIONS ==========

    async fn create_withdrawal(&self, withdrawal: NewWithdrawal) -> AppResult<Withdrawal> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO withdrawals (id, user_id, amount, method, address)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(withdrawal.user_id)
        .bind(withdrawal.amount.amount())
        .bind(&withdrawal.method)
        .bind(&withdrawal.address)
        .fetch_one(&self.pool)
        .await?;
        Withdrawal::from_row(&row)
    }

    async fn list_user_withdrawals(&self, user_id: Uuid) -> AppResult<Vec<Withdrawal>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM withdrawals WHERE user_id = $1 ORDER BY created_at DESC",
            WITHDRAWAL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, Withdrawal::from_row)
    }

    async fn list_withdrawals(&self) -> AppResult<Vec<Withdrawal>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM withdrawals ORDER BY created_at DESC",
            WITHDRAWAL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, Withdrawal::from_row)
    }

    async fn update_withdrawal_status(
        &self,
        id: Uuid,
        status: WithdrawalStatus,
        note: Option<String>,
        admin_id: Uuid,
    ) -> AppResult<Withdrawal> {
        let mut tx = self.begin_tx().await?;
        let withdrawal = self.get_withdrawal_for_update(&mut tx, id).await?;

        if !withdrawal.status.can_transition_to(status) {
            return Err(BalanceError::InvalidTransition {
                from: withdrawal.status.as_str().to_string(),
                to: status.as_str().to_string(),
            }
            .into());
        }

        if status == WithdrawalStatus::Processed {
            self.apply_change(
                &mut tx,
                &BalanceChange {
                    user_id: withdrawal.user_id,
                    delta: -withdrawal.amount,
                    cause: MutationCause::WithdrawalProcessing,
                    reference_id: withdrawal.id,
                    actor_id: Some(admin_id),
                    note: note.clone(),
                },
            )
            .await?;
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE withdrawals
            SET status = $2, admin_note = $3, reviewed_by = $4, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(&note)
        .bind(admin_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Withdrawal::from_row(&row)
    }

    // ========== BALANCE OPERATIONS ==========

    async fn adjust_balance(&self, change: &BalanceChange) -> AppResult<Money> {
        let mut tx = self.begin_tx().await?;
        let balance = self.apply_change(&mut tx, change).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn claim_welcome_bonus(&self, user_id: Uuid, amount: Money) -> AppResult<Money> {
        let mut tx = self.begin_tx().await?;

        let flagged = sqlx::query(
            r#"
            UPDATE users
            SET has_claimed_welcome_bonus = TRUE,
                bonus_balance = bonus_balance + $2,
                total_bonus_received = total_bonus_received + $2
            WHERE id = $1 AND has_claimed_welcome_bonus = FALSE
            "#,
        )
        .bind(user_id)
        .bind(amount.amount())
        .execute(&mut *tx)
        .await?;

        if flagged.rows_affected() == 0 {
            return match self.get_user(user_id).await? {
                Some(_) => Err(BalanceError::BonusAlreadyClaimed.into()),
                None => Err(BalanceError::AccountNotFound(user_id).into()),
            };
        }

        let balance = self
            .apply_change(
                &mut tx,
                &BalanceChange {
                    user_id,
                    delta: amount,
                    cause: MutationCause::WelcomeBonus,
                    reference_id: user_id,
                    actor_id: Some(user_id),
                    note: Some("welcome bonus".to_string()),
                },
            )
            .await?;

        tx.commit().await?;
        Ok(balance)
    }

    async fn list_mutations(&self, user_id: Uuid) -> AppResult<Vec<BalanceMutation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM balance_mutations WHERE user_id = $1 ORDER BY created_at DESC",
            MUTATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, BalanceMutation::from_row)
    }

    // ========== SETTINGS ==========

    async fn get_setting(&self, key: &str) -> AppResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_setting(&self, key: &str, value: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
