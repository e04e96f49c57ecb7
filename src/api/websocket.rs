use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

use crate::ledger::models::BetStatus;
use crate::ledger::money::Money;

/// Event pushed to every connected `/ws` client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// Periodic nudge telling clients to refresh fixtures and odds
    OddsUpdate { timestamp: i64 },
    BetSettled {
        bet_id: Uuid,
        user_id: Uuid,
        status: BetStatus,
        payout: Option<Money>,
        timestamp: i64,
    },
}

/// WebSocket broadcast channel capacity
const BROADCAST_CAPACITY: usize = 1000;

/// Fan-out of live events to WebSocket subscribers
#[derive(Clone)]
pub struct LiveFeedBroadcaster {
    tx: broadcast::Sender<LiveEvent>,
}

impl LiveFeedBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn broadcast(&self, event: LiveEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    pub fn odds_update(&self) {
        self.broadcast(LiveEvent::OddsUpdate {
            timestamp: Utc::now().timestamp_millis(),
        });
        debug!("📡 Broadcast odds_update to {} clients", self.subscriber_count());
    }

    pub fn bet_settled(&self, bet_id: Uuid, user_id: Uuid, status: BetStatus, payout: Option<Money>) {
        self.broadcast(LiveEvent::BetSettled {
            bet_id,
            user_id,
            status,
            payout,
            timestamp: Utc::now().timestamp_millis(),
        });
        debug!("📡 Broadcast bet_settled {} ({})", bet_id, status);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Emit `odds_update` on a fixed period until the handle is aborted
    pub fn spawn_ticker(&self, period: Duration) -> JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                broadcaster.odds_update();
            }
        })
    }
}

impl Default for LiveFeedBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bet_settled_broadcast() {
        let broadcaster = LiveFeedBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        let bet_id = Uuid::new_v4();
        broadcaster.bet_settled(bet_id, Uuid::new_v4(), BetStatus::Won, Some(Money::from_cents(500)));

        match rx.recv().await.unwrap() {
            LiveEvent::BetSettled { bet_id: id, status, payout, .. } => {
                assert_eq!(id, bet_id);
                assert_eq!(status, BetStatus::Won);
                assert_eq!(payout, Some(Money::from_cents(500)));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let broadcaster = LiveFeedBroadcaster::new();
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        broadcaster.odds_update();

        assert!(matches!(rx1.recv().await.unwrap(), LiveEvent::OddsUpdate { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), LiveEvent::OddsUpdate { .. }));
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(LiveEvent::OddsUpdate { timestamp: 42 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "odds_update", "timestamp": 42}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_emits_periodically() {
        let broadcaster = LiveFeedBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        let handle = broadcaster.spawn_ticker(Duration::from_secs(30));

        // Paused clock auto-advances to the next timer while idle
        let event = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(matches!(event, Ok(Ok(LiveEvent::OddsUpdate { .. }))));

        handle.abort();
    }
}
