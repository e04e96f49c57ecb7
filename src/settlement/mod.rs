// Settlement reconciliation: pending wagers against finalized results
pub mod outcome;
pub mod scheduler;

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::websocket::LiveFeedBroadcaster;
use crate::error::{AppResult, SettlementError};
use crate::ledger::models::{Bet, BetStatus, BetWithFixture, Fixture, SettleCommand, SettleOutcome, SettlementSource};
use crate::ledger::store::LedgerStore;

pub use scheduler::SettlementScheduler;

/// Counts from one reconciliation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub examined: usize,
    pub won: usize,
    pub lost: usize,
    pub not_ready: usize,
    pub flagged: usize,
    pub failed: usize,
}

impl ReconcileReport {
    pub fn settled(&self) -> usize {
        self.won + self.lost
    }
}

/// What the result data says about one pending wager
#[derive(Debug, PartialEq)]
enum Decision {
    NotReady,
    Resolved(BetStatus),
}

/// Resolve a wager against its fixture or inline custom score
fn decide(bet: &Bet, fixture: Option<&Fixture>) -> Result<Decision, SettlementError> {
    if let Some(custom) = &bet.custom_match {
        return match (custom.home_score, custom.away_score) {
            (Some(home), Some(away)) => {
                let line = outcome::resolve_line(bet.line, None);
                outcome::evaluate(&bet.market, line, home, away).map(Decision::Resolved)
            }
            _ => Ok(Decision::NotReady),
        };
    }

    let fixture = match (bet.fixture_id, fixture) {
        (_, Some(fixture)) => fixture,
        (Some(id), None) => return Err(SettlementError::FixtureMissing(id)),
        (None, None) => return Ok(Decision::NotReady),
    };

    match (fixture.is_finalized(), fixture.home_score, fixture.away_score) {
        (true, Some(home), Some(away)) => {
            let line = outcome::resolve_line(bet.line, fixture.total_line);
            outcome::evaluate(&bet.market, line, home, away).map(Decision::Resolved)
        }
        _ => Ok(Decision::NotReady),
    }
}

pub struct SettlementReconciler {
    store: Arc<dyn LedgerStore>,
    live_feed: LiveFeedBroadcaster,
}

impl SettlementReconciler {
    pub fn new(store: Arc<dyn LedgerStore>, live_feed: LiveFeedBroadcaster) -> Self {
        Self { store, live_feed }
    }

    /// Settle every pending wager whose result is final.
    ///
    /// Each wager is settled in its own atomic unit; a failure on one wager
    /// is logged and leaves it pending for the next pass.
    pub async fn reconcile_pending(&self) -> AppResult<ReconcileReport> {
        let pending = self.store.pending_bets().await?;
        let mut report = ReconcileReport::default();

        for BetWithFixture { bet, fixture } in pending {
            report.examined += 1;

            let status = match decide(&bet, fixture.as_ref()) {
                Ok(Decision::NotReady) => {
                    report.not_ready += 1;
                    continue;
                }
                Ok(Decision::Resolved(status)) => status,
                Err(e @ (SettlementError::UnresolvableMarket(_) | SettlementError::InvalidLine(_))) => {
                    report.flagged += 1;
                    self.flag(&bet, &e).await;
                    continue;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("⚠️ Bet {} skipped this cycle: {}", bet.id, e);
                    continue;
                }
            };

            match self.settle(&bet, status).await {
                Ok(true) if status == BetStatus::Won => report.won += 1,
                Ok(true) => report.lost += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    error!("❌ Failed to settle bet {}: {}", bet.id, e);
                }
            }
        }

        if report.examined > 0 {
            info!(
                "✓ Settlement pass: {} examined, {} won, {} lost, {} not ready, {} flagged, {} failed",
                report.examined, report.won, report.lost, report.not_ready, report.flagged, report.failed
            );
        }

        Ok(report)
    }

    /// Returns false when the wager was already terminal
    async fn settle(&self, bet: &Bet, status: BetStatus) -> AppResult<bool> {
        let command = SettleCommand::for_bet(bet, status, SettlementSource::Reconciler)?;

        match self.store.settle_bet(&command).await? {
            SettleOutcome::Settled { bet, new_balance } => {
                info!(
                    "🏁 Bet {} settled {} for user {} (credit {:?}, balance {:?})",
                    bet.id, bet.status, bet.user_id, command.credit, new_balance
                );
                self.live_feed
                    .bet_settled(bet.id, bet.user_id, bet.status, command.credit);
                Ok(true)
            }
            SettleOutcome::AlreadySettled(current) => {
                debug!("Bet {} already {}, skipping", bet.id, current);
                Ok(false)
            }
        }
    }

    async fn flag(&self, bet: &Bet, reason: &SettlementError) {
        if bet.review_note.is_some() {
            return;
        }
        warn!("🚩 Bet {} needs manual review: {}", bet.id, reason);
        if let Err(e) = self.store.flag_bet_for_review(bet.id, &reason.to_string()).await {
            error!("❌ Failed to flag bet {}: {}", bet.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::*;
    use crate::ledger::money::{Money, Odds};
    use crate::ledger::MemoryLedger;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct Harness {
        ledger: Arc<MemoryLedger>,
        reconciler: SettlementReconciler,
        user: User,
    }

    async fn harness() -> Harness {
        harness_with(LiveFeedBroadcaster::new()).await
    }

    async fn harness_with(live_feed: LiveFeedBroadcaster) -> Harness {
        let ledger = Arc::new(MemoryLedger::new());
        let user = ledger
            .create_user(NewUser {
                email: "bettor@example.com".into(),
                password_hash: "x".into(),
                account_id: "0000000001".into(),
                language: "th".into(),
            })
            .await
            .unwrap();
        ledger
            .adjust_balance(&BalanceChange {
                user_id: user.id,
                delta: Money::from_cents(100_000),
                cause: MutationCause::AdminAdjustment,
                reference_id: Uuid::new_v4(),
                actor_id: None,
                note: None,
            })
            .await
            .unwrap();
        let reconciler = SettlementReconciler::new(ledger.clone(), live_feed);
        Harness { ledger, reconciler, user }
    }

    impl Harness {
        async fn fixture(&self) -> Fixture {
            self.ledger
                .create_fixture(NewFixture {
                    sport: "football".into(),
                    league: "Thai League 1".into(),
                    home_team: "Buriram".into(),
                    away_team: "Port FC".into(),
                    start_time: Utc::now(),
                    status: FixtureStatus::Scheduled,
                    home_score: None,
                    away_score: None,
                    current_minute: 0,
                    home_odds: None,
                    draw_odds: None,
                    away_odds: None,
                    total_line: None,
                    over_odds: None,
                    under_odds: None,
                })
                .await
                .unwrap()
        }

        async fn bet(&self, fixture: &Fixture, market: Market, line: Option<Decimal>) -> Bet {
            let bet = NewBet::new(
                self.user.id,
                Some(fixture.id),
                None,
                market,
                line,
                Money::from_cents(1_000),
                Odds::new(dec!(2.5)).unwrap(),
                None,
            )
            .unwrap();
            self.ledger.place_bet(bet).await.unwrap().0
        }

        async fn score(&self, fixture: &Fixture, status: FixtureStatus, home: i32, away: i32) {
            self.ledger
                .update_fixture(
                    fixture.id,
                    &FixturePatch {
                        status: Some(status),
                        home_score: Some(home),
                        away_score: Some(away),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        async fn status_of(&self, bet: &Bet) -> BetStatus {
            self.ledger.get_bet(bet.id).await.unwrap().unwrap().status
        }

        async fn balance(&self) -> Money {
            self.ledger.get_user(self.user.id).await.unwrap().unwrap().balance
        }
    }

    #[tokio::test]
    async fn test_home_win_settles_moneyline() {
        let h = harness().await;
        let fixture = h.fixture().await;
        let home = h.bet(&fixture, Market::Home, None).await;
        let draw = h.bet(&fixture, Market::Draw, None).await;
        let away = h.bet(&fixture, Market::Away, None).await;
        let before = h.balance().await;

        h.score(&fixture, FixtureStatus::Finished, 2, 1).await;
        let report = h.reconciler.reconcile_pending().await.unwrap();

        assert_eq!(report.won, 1);
        assert_eq!(report.lost, 2);
        assert_eq!(h.status_of(&home).await, BetStatus::Won);
        assert_eq!(h.status_of(&draw).await, BetStatus::Lost);
        assert_eq!(h.status_of(&away).await, BetStatus::Lost);
        assert_eq!(h.balance().await, before.apply(home.potential_win).unwrap());
    }

    #[tokio::test]
    async fn test_totals_on_one_all() {
        let h = harness().await;
        let fixture = h.fixture().await;
        let over = h.bet(&fixture, Market::Over, Some(dec!(2.5))).await;
        let under = h.bet(&fixture, Market::Under, Some(dec!(2.5))).await;

        h.score(&fixture, FixtureStatus::Finished, 1, 1).await;
        h.reconciler.reconcile_pending().await.unwrap();

        assert_eq!(h.status_of(&over).await, BetStatus::Lost);
        assert_eq!(h.status_of(&under).await, BetStatus::Won);
    }

    #[tokio::test]
    async fn test_bet_line_takes_precedence_over_fixture_line() {
        let h = harness().await;
        let fixture = h.fixture().await;
        let over = h.bet(&fixture, Market::Over, Some(dec!(3.5))).await;
        h.ledger
            .update_fixture(
                fixture.id,
                &FixturePatch {
                    total_line: Some(dec!(1.5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        h.score(&fixture, FixtureStatus::Finished, 2, 1).await;
        h.reconciler.reconcile_pending().await.unwrap();

        assert_eq!(h.status_of(&over).await, BetStatus::Lost);
    }

    #[tokio::test]
    async fn test_live_fixture_is_not_settled() {
        let h = harness().await;
        let fixture = h.fixture().await;
        let bet = h.bet(&fixture, Market::Home, None).await;

        h.score(&fixture, FixtureStatus::Live, 3, 0).await;
        let report = h.reconciler.reconcile_pending().await.unwrap();

        assert_eq!(report.not_ready, 1);
        assert_eq!(report.settled(), 0);
        assert_eq!(h.status_of(&bet).await, BetStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_pass_changes_nothing() {
        let h = harness().await;
        let fixture = h.fixture().await;
        h.bet(&fixture, Market::Home, None).await;
        h.bet(&fixture, Market::Away, None).await;
        h.score(&fixture, FixtureStatus::Finished, 2, 0).await;

        h.reconciler.reconcile_pending().await.unwrap();
        let balance = h.balance().await;
        let mutations = h.ledger.list_mutations(h.user.id).await.unwrap().len();

        let second = h.reconciler.reconcile_pending().await.unwrap();
        assert_eq!(second, ReconcileReport::default());
        assert_eq!(h.balance().await, balance);
        assert_eq!(h.ledger.list_mutations(h.user.id).await.unwrap().len(), mutations);
    }

    #[tokio::test]
    async fn test_won_credit_is_potential_win_once() {
        let h = harness().await;
        let fixture = h.fixture().await;
        let bet = h.bet(&fixture, Market::Draw, None).await;
        h.score(&fixture, FixtureStatus::Finished, 0, 0).await;

        h.reconciler.reconcile_pending().await.unwrap();
        h.reconciler.reconcile_pending().await.unwrap();

        let credits: Vec<_> = h
            .ledger
            .list_mutations(h.user.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.cause == MutationCause::BetSettlement)
            .collect();
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].delta, bet.potential_win);
        assert_eq!(credits[0].reference_id, bet.id);
    }

    #[tokio::test]
    async fn test_unknown_market_is_flagged_not_lost() {
        let h = harness().await;
        let custom = CustomMatch {
            home_team: "Chonburi".into(),
            away_team: "Ratchaburi".into(),
            league: None,
            home_score: Some(2),
            away_score: Some(2),
        };
        let bet = NewBet::new(
            h.user.id,
            None,
            Some(custom),
            Market::Other("first scorer".into()),
            None,
            Money::from_cents(500),
            Odds::new(dec!(4)).unwrap(),
            Some(Uuid::new_v4()),
        )
        .unwrap();
        let bet = h.ledger.record_admin_bet(bet).await.unwrap();

        let report = h.reconciler.reconcile_pending().await.unwrap();
        assert_eq!(report.flagged, 1);
        assert_eq!(h.status_of(&bet).await, BetStatus::Pending);

        let flagged = h.ledger.flagged_bets().await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert!(flagged[0].bet.review_note.is_some());
    }

    #[tokio::test]
    async fn test_custom_match_waits_for_both_scores() {
        let h = harness().await;
        let custom = CustomMatch {
            home_team: "Chonburi".into(),
            away_team: "Ratchaburi".into(),
            league: Some("Thai League 2".into()),
            home_score: Some(1),
            away_score: None,
        };
        let bet = NewBet::new(
            h.user.id,
            None,
            Some(custom),
            Market::Home,
            None,
            Money::from_cents(500),
            Odds::new(dec!(2)).unwrap(),
            None,
        )
        .unwrap();
        let bet = h.ledger.record_admin_bet(bet).await.unwrap();

        let report = h.reconciler.reconcile_pending().await.unwrap();
        assert_eq!(report.not_ready, 1);
        assert_eq!(h.status_of(&bet).await, BetStatus::Pending);
    }

    #[tokio::test]
    async fn test_settlement_is_broadcast() {
        let live_feed = LiveFeedBroadcaster::new();
        let mut rx = live_feed.subscribe();
        let h = harness_with(live_feed).await;
        let fixture = h.fixture().await;
        let bet = h.bet(&fixture, Market::Away, None).await;
        h.score(&fixture, FixtureStatus::Finished, 0, 1).await;

        h.reconciler.reconcile_pending().await.unwrap();

        match rx.try_recv().unwrap() {
            crate::api::websocket::LiveEvent::BetSettled { bet_id, status, payout, .. } => {
                assert_eq!(bet_id, bet.id);
                assert_eq!(status, BetStatus::Won);
                assert_eq!(payout, Some(bet.potential_win));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decide_missing_fixture_is_failure() {
        let bet = NewBet::new(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            None,
            Market::Home,
            None,
            Money::from_cents(100),
            Odds::new(dec!(2)).unwrap(),
            None,
        )
        .unwrap()
        .into_bet(Uuid::new_v4(), Utc::now());

        assert!(matches!(decide(&bet, None), Err(SettlementError::FixtureMissing(_))));
    }
}
