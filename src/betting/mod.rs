// Wager placement, admin overrides and per-user betting statistics
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api::websocket::LiveFeedBroadcaster;
use crate::error::{AppError, AppResult, BetError};
use crate::ledger::models::*;
use crate::ledger::money::{Money, Odds};
use crate::ledger::store::LedgerStore;

/// Bettor-submitted wager on a tracked fixture
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceBetRequest {
    pub fixture_id: Uuid,
    pub market: Market,
    pub stake: Money,
    /// Falls back to the fixture's quoted price for the market
    #[serde(default)]
    pub odds: Option<Odds>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub line: Option<Decimal>,
}

/// Admin-entered wager, on a fixture or an inline custom match
#[derive(Debug, Clone, Deserialize)]
pub struct AdminBetRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub fixture_id: Option<Uuid>,
    #[serde(default)]
    pub custom_match: Option<CustomMatch>,
    pub market: Market,
    pub stake: Money,
    pub odds: Odds,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub line: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub total_bets: usize,
    pub won: usize,
    pub lost: usize,
    pub pending: usize,
    pub void: usize,
    /// Percentage of all bets that won, one decimal
    pub win_rate: Decimal,
    pub total_staked: Money,
    pub total_profit: Money,
}

impl UserStats {
    pub fn from_bets<'a>(bets: impl IntoIterator<Item = &'a Bet>) -> AppResult<Self> {
        let mut stats = UserStats {
            total_bets: 0,
            won: 0,
            lost: 0,
            pending: 0,
            void: 0,
            win_rate: Decimal::ZERO,
            total_staked: Money::ZERO,
            total_profit: Money::ZERO,
        };

        for bet in bets {
            stats.total_bets += 1;
            stats.total_staked = stats.total_staked.apply(bet.stake)?;
            match bet.status {
                BetStatus::Won => {
                    stats.won += 1;
                    let profit = bet
                        .potential_win
                        .checked_sub(bet.stake)
                        .ok_or_else(|| AppError::Internal("Profit overflow".into()))?;
                    stats.total_profit = stats.total_profit.apply(profit)?;
                }
                BetStatus::Lost => {
                    stats.lost += 1;
                    stats.total_profit = stats.total_profit.apply(-bet.stake)?;
                }
                BetStatus::Pending => stats.pending += 1,
                BetStatus::Void => stats.void += 1,
            }
        }

        if stats.total_bets > 0 {
            stats.win_rate = (Decimal::from(stats.won as u64) * Decimal::ONE_HUNDRED
                / Decimal::from(stats.total_bets as u64))
            .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
        }

        Ok(stats)
    }
}

/// Settled wagers and the credits they produced
#[derive(Debug, Serialize)]
pub struct BetHistory {
    pub bets: Vec<BetWithFixture>,
    pub settlements: Vec<BalanceMutation>,
}

pub struct BettingService {
    store: Arc<dyn LedgerStore>,
    live_feed: LiveFeedBroadcaster,
}

impl BettingService {
    pub fn new(store: Arc<dyn LedgerStore>, live_feed: LiveFeedBroadcaster) -> Self {
        Self { store, live_feed }
    }

    /// Place a wager for the user, debiting the stake. Returns the new balance.
    pub async fn place_bet(&self, user_id: Uuid, request: PlaceBetRequest) -> AppResult<(Bet, Money)> {
        let fixture = self
            .store
            .get_fixture(request.fixture_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Fixture {}", request.fixture_id)))?;

        if !fixture.is_open_for_betting() {
            return Err(BetError::FixtureClosed(fixture.id).into());
        }

        let odds = request
            .odds
            .or_else(|| fixture.odds_for(&request.market))
            .filter(|_| !matches!(request.market, Market::Other(_)))
            .ok_or_else(|| BetError::MarketUnavailable {
                fixture_id: fixture.id,
                market: request.market.to_string(),
            })?;

        let line = if request.market.is_totals() {
            request.line.or(fixture.total_line)
        } else {
            None
        };

        let bet = NewBet::new(
            user_id,
            Some(fixture.id),
            None,
            request.market,
            line,
            request.stake,
            odds,
            None,
        )?;
        self.store.place_bet(bet).await
    }

    /// Enter a wager on a user's behalf without touching their balance
    pub async fn place_admin_bet(&self, admin_id: Uuid, request: AdminBetRequest) -> AppResult<Bet> {
        if let Some(fixture_id) = request.fixture_id {
            if self.store.get_fixture(fixture_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Fixture {}", fixture_id)));
            }
        }

        let bet = NewBet::new(
            request.user_id,
            request.fixture_id,
            request.custom_match,
            request.market,
            request.line,
            request.stake,
            request.odds,
            Some(admin_id),
        )?;
        let bet = self.store.record_admin_bet(bet).await?;

        info!(
            "🛠️ Admin {} entered bet {} for user {}: {} @ {} on {}",
            admin_id, bet.id, bet.user_id, bet.stake, bet.odds, bet.market
        );
        Ok(bet)
    }

    /// Admin override of a pending wager. Terminal wagers are never changed.
    pub async fn force_status(&self, admin_id: Uuid, bet_id: Uuid, status: BetStatus) -> AppResult<Bet> {
        let bet = self
            .store
            .get_bet(bet_id)
            .await?
            .ok_or(BetError::NotFound(bet_id))?;

        let command = SettleCommand::for_bet(&bet, status, SettlementSource::Admin(admin_id))?;
        match self.store.settle_bet(&command).await? {
            SettleOutcome::Settled { bet, new_balance } => {
                info!(
                    "🛠️ Admin {} set bet {} to {} (credit {:?}, balance {:?})",
                    admin_id, bet.id, bet.status, command.credit, new_balance
                );
                self.live_feed
                    .bet_settled(bet.id, bet.user_id, bet.status, command.credit);
                Ok(bet)
            }
            SettleOutcome::AlreadySettled(current) => Err(BetError::AlreadySettled {
                id: bet_id,
                status: current,
            }
            .into()),
        }
    }

    pub async fn user_bets(&self, user_id: Uuid) -> AppResult<Vec<BetWithFixture>> {
        self.store.list_user_bets(user_id).await
    }

    pub async fn all_bets(&self) -> AppResult<Vec<BetWithFixture>> {
        self.store.list_bets().await
    }

    /// Pending wagers the reconciler could not decide on its own
    pub async fn flagged_bets(&self) -> AppResult<Vec<BetWithFixture>> {
        self.store.flagged_bets().await
    }

    pub async fn user_stats(&self, user_id: Uuid) -> AppResult<UserStats> {
        let bets = self.store.list_user_bets(user_id).await?;
        UserStats::from_bets(bets.iter().map(|b| &b.bet))
    }

    pub async fn history(&self, user_id: Uuid) -> AppResult<BetHistory> {
        let bets = self
            .store
            .list_user_bets(user_id)
            .await?
            .into_iter()
            .filter(|b| b.bet.status.is_terminal())
            .collect();
        let settlements = self
            .store
            .list_mutations(user_id)
            .await?
            .into_iter()
            .filter(|m| m.cause == MutationCause::BetSettlement)
            .collect();
        Ok(BetHistory { bets, settlements })
    }
}
