// Settlement Scheduler - periodic live-minute tick plus reconciliation
//
// One cycle at a time: the background loop and on-demand runs share a cycle
// lock, and stop() waits for an in-flight cycle before returning.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{ReconcileReport, SettlementReconciler};
use crate::error::AppResult;
use crate::ledger::store::LedgerStore;

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Settlement scheduler with an explicit start/stop lifecycle
pub struct SettlementScheduler {
    store: Arc<dyn LedgerStore>,
    reconciler: Arc<SettlementReconciler>,
    period: Duration,
    cycle_lock: Arc<tokio::sync::Mutex<()>>,
    running: Mutex<Option<Running>>,
}

impl SettlementScheduler {
    pub fn new(store: Arc<dyn LedgerStore>, reconciler: Arc<SettlementReconciler>, period: Duration) -> Self {
        Self {
            store,
            reconciler,
            period,
            cycle_lock: Arc::new(tokio::sync::Mutex::new(())),
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Start the background loop. A second call while running is a no-op.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("⚠️ Settlement scheduler already running");
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let store = self.store.clone();
        let reconciler = self.reconciler.clone();
        let cycle_lock = self.cycle_lock.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the immediate first tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let _guard = cycle_lock.lock().await;
                        if let Err(e) = run_cycle(store.as_ref(), &reconciler).await {
                            error!("❌ Settlement cycle failed: {}", e);
                        }
                    }
                }
            }

            info!("🛑 Settlement scheduler stopped");
        });

        info!("⏰ Settlement scheduler started (every {}s)", period.as_secs());
        *running = Some(Running { shutdown, handle });
    }

    /// Signal the loop to exit and wait for any in-flight cycle
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(Running { shutdown, handle }) = running else {
            return;
        };

        let _ = shutdown.send(true);
        if let Err(e) = handle.await {
            error!("❌ Settlement scheduler task ended abnormally: {}", e);
        }
    }

    /// Run one cycle now, serialized with the background loop
    pub async fn run_once(&self) -> AppResult<ReconcileReport> {
        let _guard = self.cycle_lock.lock().await;
        run_cycle(self.store.as_ref(), &self.reconciler).await
    }
}

async fn run_cycle(store: &dyn LedgerStore, reconciler: &SettlementReconciler) -> AppResult<ReconcileReport> {
    let advanced = store.advance_live_minutes().await?;
    if advanced > 0 {
        debug!("Advanced match minute on {} live fixtures", advanced);
    }
    reconciler.reconcile_pending().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::websocket::LiveFeedBroadcaster;
    use crate::ledger::models::*;
    use crate::ledger::money::{Money, Odds};
    use crate::ledger::store::FixtureSource;
    use crate::ledger::MemoryLedger;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn scheduler(ledger: Arc<MemoryLedger>, period: Duration) -> SettlementScheduler {
        let reconciler = Arc::new(SettlementReconciler::new(ledger.clone(), LiveFeedBroadcaster::new()));
        SettlementScheduler::new(ledger, reconciler, period)
    }

    async fn finished_fixture_with_bet(ledger: &MemoryLedger) -> Bet {
        let user = ledger
            .create_user(NewUser {
                email: "sched@example.com".into(),
                password_hash: "x".into(),
                account_id: "0000000003".into(),
                language: "th".into(),
            })
            .await
            .unwrap();
        let fixture = ledger
            .create_fixture(NewFixture {
                sport: "football".into(),
                league: "Thai League 1".into(),
                home_team: "Muangthong".into(),
                away_team: "Bangkok United".into(),
                start_time: Utc::now(),
                status: FixtureStatus::Finished,
                home_score: Some(1),
                away_score: Some(0),
                current_minute: 90,
                home_odds: None,
                draw_odds: None,
                away_odds: None,
                total_line: None,
                over_odds: None,
                under_odds: None,
            })
            .await
            .unwrap();
        let bet = NewBet::new(
            user.id,
            Some(fixture.id),
            None,
            Market::Home,
            None,
            Money::from_cents(100),
            Odds::new(dec!(2)).unwrap(),
            Some(Uuid::new_v4()),
        )
        .unwrap();
        ledger.record_admin_bet(bet).await.unwrap()
    }

    #[tokio::test]
    async fn test_run_once_without_timer() {
        let ledger = Arc::new(MemoryLedger::new());
        let bet = finished_fixture_with_bet(&ledger).await;
        let scheduler = scheduler(ledger.clone(), Duration::from_secs(3600));

        let report = scheduler.run_once().await.unwrap();

        assert_eq!(report.won, 1);
        assert!(!scheduler.is_running());
        assert_eq!(ledger.get_bet(bet.id).await.unwrap().unwrap().status, BetStatus::Won);
    }

    #[tokio::test]
    async fn test_run_once_advances_live_minutes() {
        let ledger = Arc::new(MemoryLedger::new());
        let fixture = ledger
            .create_fixture(NewFixture {
                sport: "football".into(),
                league: "Thai League 1".into(),
                home_team: "Chiangrai".into(),
                away_team: "Lamphun".into(),
                start_time: Utc::now(),
                status: FixtureStatus::Live,
                home_score: Some(0),
                away_score: Some(0),
                current_minute: 10,
                home_odds: None,
                draw_odds: None,
                away_odds: None,
                total_line: None,
                over_odds: None,
                under_odds: None,
            })
            .await
            .unwrap();
        let scheduler = scheduler(ledger.clone(), Duration::from_secs(3600));

        scheduler.run_once().await.unwrap();

        let fixture = ledger.get_fixture(fixture.id).await.unwrap().unwrap();
        assert_eq!(fixture.current_minute, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop() {
        let ledger = Arc::new(MemoryLedger::new());
        let bet = finished_fixture_with_bet(&ledger).await;
        let scheduler = scheduler(ledger.clone(), Duration::from_secs(60));

        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(61)).await;
        scheduler.stop().await;

        assert!(!scheduler.is_running());
        assert_eq!(ledger.get_bet(bet.id).await.unwrap().unwrap().status, BetStatus::Won);
    }
}
