// Deposits, withdrawals, bonuses and admin balance adjustments
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult, BalanceError};
use crate::ledger::models::*;
use crate::ledger::money::Money;
use crate::ledger::store::LedgerStore;

/// Welcome bonus matches the first confirmed deposit up to this cap
pub const WELCOME_BONUS_CAP: Money = Money::from_cents(500_000);

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DepositRequest {
    pub amount: Money,
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub method: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub tx_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WithdrawalRequest {
    pub amount: Money,
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub method: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BonusClaim {
    pub bonus_amount: Money,
    pub new_balance: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceAdjustment {
    pub user_id: Uuid,
    pub delta: Money,
    pub new_balance: Money,
    pub reference_id: Uuid,
}

/// Deposit addresses shown to players; empty when unset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletSettings {
    #[serde(default)]
    pub usdt_trc20: String,
    #[serde(default)]
    pub usdt_bep20: String,
    #[serde(default)]
    pub sol: String,
}

const WALLET_KEYS: [&str; 3] = ["wallet_usdt_trc20", "wallet_usdt_bep20", "wallet_sol"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemStats {
    pub total_users: usize,
    pub confirmed_deposits_total: Money,
    pub processed_withdrawals_total: Money,
    pub pending_deposits: usize,
    pub pending_withdrawals: usize,
    pub pending_bets: usize,
    pub won_bets: usize,
    pub lost_bets: usize,
    pub void_bets: usize,
}

fn require_positive(amount: Money) -> AppResult<()> {
    if !amount.is_positive() {
        return Err(BalanceError::NonPositiveAmount(amount.to_string()).into());
    }
    Ok(())
}

fn sum<'a>(mut amounts: impl Iterator<Item = &'a Money>) -> AppResult<Money> {
    amounts.try_fold(Money::ZERO, |total, amount| total.apply(*amount))
}

pub struct FundingService {
    store: Arc<dyn LedgerStore>,
}

impl FundingService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    async fn require_user(&self, user_id: Uuid) -> AppResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| BalanceError::AccountNotFound(user_id).into())
    }

    // ========== USER REQUESTS ==========

    pub async fn request_deposit(&self, user_id: Uuid, request: DepositRequest) -> AppResult<Deposit> {
        require_positive(request.amount)?;
        let deposit = self
            .store
            .create_deposit(NewDeposit {
                user_id,
                amount: request.amount,
                method: request.method,
                tx_id: request.tx_id,
            })
            .await?;
        info!("💰 Deposit {} requested by {}: {}", deposit.id, user_id, deposit.amount);
        Ok(deposit)
    }

    /// Balance is checked here and again atomically when the withdrawal is processed
    pub async fn request_withdrawal(&self, user_id: Uuid, request: WithdrawalRequest) -> AppResult<Withdrawal> {
        require_positive(request.amount)?;
        let user = self.require_user(user_id).await?;
        if user.balance < request.amount {
            return Err(BalanceError::InsufficientFunds {
                required: request.amount.to_string(),
                available: user.balance.to_string(),
            }
            .into());
        }

        let withdrawal = self
            .store
            .create_withdrawal(NewWithdrawal {
                user_id,
                amount: request.amount,
                method: request.method,
                address: request.address,
            })
            .await?;
        info!("🏧 Withdrawal {} requested by {}: {}", withdrawal.id, user_id, withdrawal.amount);
        Ok(withdrawal)
    }

    /// Bonus equal to the first confirmed deposit, capped, once per account
    pub async fn claim_welcome_bonus(&self, user_id: Uuid) -> AppResult<BonusClaim> {
        let user = self.require_user(user_id).await?;
        if user.has_claimed_welcome_bonus {
            return Err(BalanceError::BonusAlreadyClaimed.into());
        }

        let first_deposit = self
            .store
            .list_user_deposits(user_id)
            .await?
            .into_iter()
            .filter(|d| d.status == DepositStatus::Confirmed)
            .min_by_key(|d| d.created_at)
            .ok_or(BalanceError::BonusRequiresDeposit)?;

        let bonus_amount = first_deposit.amount.min(WELCOME_BONUS_CAP);
        let new_balance = self.store.claim_welcome_bonus(user_id, bonus_amount).await?;

        info!("🎁 Welcome bonus {} credited to {}", bonus_amount, user_id);
        Ok(BonusClaim {
            bonus_amount,
            new_balance,
        })
    }

    pub async fn user_deposits(&self, user_id: Uuid) -> AppResult<Vec<Deposit>> {
        self.store.list_user_deposits(user_id).await
    }

    pub async fn user_withdrawals(&self, user_id: Uuid) -> AppResult<Vec<Withdrawal>> {
        self.store.list_user_withdrawals(user_id).await
    }

    // ========== ADMIN REVIEW ==========

    pub async fn review_deposit(&self, admin_id: Uuid, deposit_id: Uuid, status: DepositStatus) -> AppResult<Deposit> {
        let deposit = self
            .store
            .update_deposit_status(deposit_id, status, admin_id)
            .await?;
        info!(
            "💰 Deposit {} {} by admin {} ({} for {})",
            deposit.id,
            deposit.status.as_str(),
            admin_id,
            deposit.amount,
            deposit.user_id
        );
        Ok(deposit)
    }

    pub async fn review_withdrawal(
        &self,
        admin_id: Uuid,
        withdrawal_id: Uuid,
        status: WithdrawalStatus,
        note: Option<String>,
    ) -> AppResult<Withdrawal> {
        let withdrawal = self
            .store
            .update_withdrawal_status(withdrawal_id, status, note, admin_id)
            .await?;
        info!(
            "🏧 Withdrawal {} {} by admin {} ({} for {})",
            withdrawal.id,
            withdrawal.status.as_str(),
            admin_id,
            withdrawal.amount,
            withdrawal.user_id
        );
        Ok(withdrawal)
    }

    /// Deposit entered by an admin, confirmed and credited immediately
    pub async fn record_admin_deposit(&self, admin_id: Uuid, user_id: Uuid, request: DepositRequest) -> AppResult<Deposit> {
        let deposit = self.request_deposit(user_id, request).await?;
        self.review_deposit(admin_id, deposit.id, DepositStatus::Confirmed).await
    }

    /// Payout entered by an admin, processed immediately
    pub async fn record_admin_withdrawal(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        request: WithdrawalRequest,
    ) -> AppResult<Withdrawal> {
        let withdrawal = self.request_withdrawal(user_id, request).await?;
        self.review_withdrawal(admin_id, withdrawal.id, WithdrawalStatus::Processed, None)
            .await
    }

    pub async fn adjust_balance(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        delta: Money,
        note: Option<String>,
    ) -> AppResult<BalanceAdjustment> {
        if delta == Money::ZERO {
            return Err(AppError::InvalidInput("Adjustment cannot be zero".into()));
        }

        let reference_id = Uuid::new_v4();
        let new_balance = self
            .store
            .adjust_balance(&BalanceChange {
                user_id,
                delta,
                cause: MutationCause::AdminAdjustment,
                reference_id,
                actor_id: Some(admin_id),
                note,
            })
            .await?;

        info!(
            "🛠️ Admin {} adjusted balance of {} by {} (now {})",
            admin_id, user_id, delta, new_balance
        );
        Ok(BalanceAdjustment {
            user_id,
            delta,
            new_balance,
            reference_id,
        })
    }

    pub async fn all_deposits(&self) -> AppResult<Vec<Deposit>> {
        self.store.list_deposits().await
    }

    pub async fn all_withdrawals(&self) -> AppResult<Vec<Withdrawal>> {
        self.store.list_withdrawals().await
    }

    pub async fn wallet_settings(&self) -> AppResult<WalletSettings> {
        let [trc20, bep20, sol] = WALLET_KEYS;
        Ok(WalletSettings {
            usdt_trc20: self.store.get_setting(trc20).await?.unwrap_or_default(),
            usdt_bep20: self.store.get_setting(bep20).await?.unwrap_or_default(),
            sol: self.store.get_setting(sol).await?.unwrap_or_default(),
        })
    }

    /// Blank fields leave the stored address untouched
    pub async fn update_wallet_settings(&self, settings: &WalletSettings) -> AppResult<WalletSettings> {
        let values = [&settings.usdt_trc20, &settings.usdt_bep20, &settings.sol];
        for (key, value) in WALLET_KEYS.iter().zip(values) {
            let value = value.trim();
            if !value.is_empty() {
                self.store.set_setting(key, value).await?;
            }
        }
        info!("👛 Wallet settings updated");
        self.wallet_settings().await
    }

    pub async fn system_stats(&self) -> AppResult<SystemStats> {
        let users = self.store.list_users().await?;
        let deposits = self.store.list_deposits().await?;
        let withdrawals = self.store.list_withdrawals().await?;
        let bets = self.store.list_bets().await?;

        let count_bets = |status: BetStatus| bets.iter().filter(|b| b.bet.status == status).count();

        Ok(SystemStats {
            total_users: users.len(),
            confirmed_deposits_total: sum(deposits
                .iter()
                .filter(|d| d.status == DepositStatus::Confirmed)
                .map(|d| &d.amount))?,
            processed_withdrawals_total: sum(withdrawals
                .iter()
                .filter(|w| w.status == WithdrawalStatus::Processed)
                .map(|w| &w.amount))?,
            pending_deposits: deposits.iter().filter(|d| d.status == DepositStatus::Pending).count(),
            pending_withdrawals: withdrawals
                .iter()
                .filter(|w| w.status == WithdrawalStatus::Pending)
                .count(),
            pending_bets: count_bets(BetStatus::Pending),
            won_bets: count_bets(BetStatus::Won),
            lost_bets: count_bets(BetStatus::Lost),
            void_bets: count_bets(BetStatus::Void),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    async fn setup() -> (Arc<MemoryLedger>, FundingService, User) {
        let ledger = Arc::new(MemoryLedger::new());
        let user = ledger
            .create_user(NewUser {
                email: "funds@example.com".into(),
                password_hash: "x".into(),
                account_id: "9990001111".into(),
                language: "th".into(),
            })
            .await
            .unwrap();
        let service = FundingService::new(ledger.clone());
        (ledger, service, user)
    }

    fn deposit(cents: i64) -> DepositRequest {
        DepositRequest {
            amount: Money::from_cents(cents),
            method: "promptpay".into(),
            tx_id: None,
        }
    }

    #[tokio::test]
    async fn test_deposit_review_flow() {
        let (ledger, service, user) = setup().await;
        let admin = Uuid::new_v4();

        let pending = service.request_deposit(user.id, deposit(10_000)).await.unwrap();
        assert_eq!(pending.status, DepositStatus::Pending);
        assert_eq!(ledger.get_user(user.id).await.unwrap().unwrap().balance, Money::ZERO);

        service
            .review_deposit(admin, pending.id, DepositStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(
            ledger.get_user(user.id).await.unwrap().unwrap().balance,
            Money::from_cents(10_000)
        );

        let rejected = service.request_deposit(user.id, deposit(5_000)).await.unwrap();
        service
            .review_deposit(admin, rejected.id, DepositStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(
            ledger.get_user(user.id).await.unwrap().unwrap().balance,
            Money::from_cents(10_000)
        );
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let (_, service, user) = setup().await;
        assert!(service.request_deposit(user.id, deposit(0)).await.is_err());
        assert!(service.request_deposit(user.id, deposit(-100)).await.is_err());
    }

    #[tokio::test]
    async fn test_withdrawal_request_checks_balance() {
        let (_, service, user) = setup().await;
        let admin = Uuid::new_v4();
        service.record_admin_deposit(admin, user.id, deposit(3_000)).await.unwrap();

        let too_much = WithdrawalRequest {
            amount: Money::from_cents(3_001),
            method: "bank".into(),
            address: None,
        };
        assert!(matches!(
            service.request_withdrawal(user.id, too_much).await,
            Err(AppError::Balance(BalanceError::InsufficientFunds { .. }))
        ));

        let ok = WithdrawalRequest {
            amount: Money::from_cents(3_000),
            method: "bank".into(),
            address: Some("123-4-56789-0".into()),
        };
        let withdrawal = service.request_withdrawal(user.id, ok).await.unwrap();
        let processed = service
            .review_withdrawal(admin, withdrawal.id, WithdrawalStatus::Processed, Some("paid".into()))
            .await
            .unwrap();
        assert_eq!(processed.status, WithdrawalStatus::Processed);
        assert_eq!(processed.admin_note.as_deref(), Some("paid"));
    }

    #[tokio::test]
    async fn test_admin_withdrawal_debits_immediately() {
        let (ledger, service, user) = setup().await;
        let admin = Uuid::new_v4();
        service.record_admin_deposit(admin, user.id, deposit(10_000)).await.unwrap();

        let withdrawal = service
            .record_admin_withdrawal(
                admin,
                user.id,
                WithdrawalRequest {
                    amount: Money::from_cents(4_000),
                    method: "bank".into(),
                    address: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(withdrawal.status, WithdrawalStatus::Processed);
        assert_eq!(
            ledger.get_user(user.id).await.unwrap().unwrap().balance,
            Money::from_cents(6_000)
        );
    }

    #[tokio::test]
    async fn test_welcome_bonus_requires_confirmed_deposit() {
        let (_, service, user) = setup().await;
        let admin = Uuid::new_v4();

        service.request_deposit(user.id, deposit(1_000)).await.unwrap();
        assert!(matches!(
            service.claim_welcome_bonus(user.id).await,
            Err(AppError::Balance(BalanceError::BonusRequiresDeposit))
        ));

        service.record_admin_deposit(admin, user.id, deposit(800_000)).await.unwrap();
        let claim = service.claim_welcome_bonus(user.id).await.unwrap();
        assert_eq!(claim.bonus_amount, WELCOME_BONUS_CAP);
        assert_eq!(claim.new_balance, Money::from_cents(1_300_000));

        assert!(matches!(
            service.claim_welcome_bonus(user.id).await,
            Err(AppError::Balance(BalanceError::BonusAlreadyClaimed))
        ));
    }

    #[tokio::test]
    async fn test_admin_adjustment_cannot_overdraw() {
        let (ledger, service, user) = setup().await;
        let admin = Uuid::new_v4();

        let credit = service
            .adjust_balance(admin, user.id, Money::from_cents(2_000), Some("goodwill".into()))
            .await
            .unwrap();
        assert_eq!(credit.new_balance, Money::from_cents(2_000));
        assert!(service
            .adjust_balance(admin, user.id, -Money::from_cents(2_001), None)
            .await
            .is_err());

        let mutations = ledger.list_mutations(user.id).await.unwrap();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].actor_id, Some(admin));
        assert_eq!(mutations[0].note.as_deref(), Some("goodwill"));
    }

    #[tokio::test]
    async fn test_wallet_settings_keep_blank_fields() {
        let (_, service, _) = setup().await;
        assert_eq!(service.wallet_settings().await.unwrap(), WalletSettings::default());

        service
            .update_wallet_settings(&WalletSettings {
                usdt_trc20: "TXyz".into(),
                sol: "So1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let updated = service
            .update_wallet_settings(&WalletSettings {
                sol: "So2".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(updated.usdt_trc20, "TXyz");
        assert_eq!(updated.usdt_bep20, "");
        assert_eq!(updated.sol, "So2");
    }

    #[tokio::test]
    async fn test_system_stats() {
        let (_, service, user) = setup().await;
        let admin = Uuid::new_v4();
        service.record_admin_deposit(admin, user.id, deposit(5_000)).await.unwrap();
        service.request_deposit(user.id, deposit(1_000)).await.unwrap();
        let withdrawal = service
            .request_withdrawal(
                user.id,
                WithdrawalRequest {
                    amount: Money::from_cents(2_000),
                    method: "bank".into(),
                    address: None,
                },
            )
            .await
            .unwrap();
        service
            .review_withdrawal(admin, withdrawal.id, WithdrawalStatus::Processed, None)
            .await
            .unwrap();

        let stats = service.system_stats().await.unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.confirmed_deposits_total, Money::from_cents(5_000));
        assert_eq!(stats.processed_withdrawals_total, Money::from_cents(2_000));
        assert_eq!(stats.pending_deposits, 1);
        assert_eq!(stats.pending_withdrawals, 0);
    }
}
