use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    api::{handler::AppState, websocket::LiveFeedBroadcaster},
    auth::AuthService,
    betting::BettingService,
    config::Config,
    error::AppResult,
    fixtures::FixtureService,
    funding::FundingService,
    ledger::{store::LedgerStore, LedgerRepository, MemoryLedger},
    settlement::{SettlementReconciler, SettlementScheduler},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(database_url) => {
            let pool = initialize_database(database_url, config.db_max_connections).await?;
            info!("✅ Postgres ledger ready");
            Arc::new(LedgerRepository::new(pool))
        }
        None => {
            warn!("⚠️  DATABASE_URL not set - running on the in-memory ledger, data is lost on exit");
            Arc::new(MemoryLedger::new())
        }
    };

    let state = build_state(store, config);

    if let Some(email) = &config.bootstrap_admin_email {
        state.auth.bootstrap_admin(email).await?;
    }

    Ok(state)
}

/// Wire services over a store. Background tasks are started by the server.
pub fn build_state(store: Arc<dyn LedgerStore>, config: &Config) -> AppState {
    let live_feed = LiveFeedBroadcaster::new();

    let auth = Arc::new(AuthService::new(store.clone(), config.session_ttl()));
    let betting = Arc::new(BettingService::new(store.clone(), live_feed.clone()));
    let funding = Arc::new(FundingService::new(store.clone()));
    let fixtures = Arc::new(FixtureService::new(store.clone()));
    info!("✅ Account, betting, funding and fixture services initialized");

    let reconciler = Arc::new(SettlementReconciler::new(store.clone(), live_feed.clone()));
    let scheduler = Arc::new(SettlementScheduler::new(
        store,
        reconciler,
        config.settlement_interval(),
    ));
    info!(
        "✅ Settlement scheduler configured (every {}s)",
        config.settlement_interval_secs
    );

    AppState {
        auth,
        betting,
        funding,
        fixtures,
        scheduler,
        live_feed,
    }
}

async fn initialize_database(database_url: &str, max_connections: u32) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: {} max connections", max_connections);

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
