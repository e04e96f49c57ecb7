use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    api::{admin, handler::*, streaming::live_updates},
    config::Config,
    middleware::{create_cors_layer, rate_limit_middleware, AuthRateLimiter},
};

pub fn create_app(state: AppState, config: &Config) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let limiter = AuthRateLimiter::per_minute(config.auth_rate_limit_per_minute);
    let auth_routes = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route_layer(from_fn_with_state(limiter, rate_limit_middleware));

    let admin_routes = Router::new()
        // Users and privileges
        .route("/users", get(admin::list_users))
        .route("/users/:id/active", patch(admin::set_user_active))
        .route("/users/:id/balance", post(admin::adjust_balance))
        .route("/users/:id/stats", get(admin::user_overview))
        .route("/users/:id/bets", get(admin::user_bets))
        .route("/privileges", get(admin::list_privileges).post(admin::grant_privilege))
        .route("/privileges/:id", delete(admin::revoke_privilege))

        // Funding review
        .route("/deposits", get(admin::list_deposits))
        .route("/deposits/:id", patch(admin::review_deposit))
        .route("/withdrawals", get(admin::list_withdrawals))
        .route("/withdrawals/:id", patch(admin::review_withdrawal))
        .route("/user-deposits", post(admin::record_deposit))
        .route("/user-withdrawals", post(admin::record_withdrawal))
        .route("/wallets", get(admin::wallet_settings).post(admin::update_wallet_settings))
        .route("/stats", get(admin::system_stats))

        // Fixtures
        .route("/fixtures", get(admin::list_fixtures).post(admin::create_fixture))
        .route("/fixtures/:id", patch(admin::update_fixture).delete(admin::delete_fixture))
        .route("/fixtures/:id/odds", patch(admin::update_odds))
        .route("/matches", post(admin::import_fixtures))

        // Bets and settlement
        .route("/bets", get(admin::list_bets).post(admin::place_admin_bet))
        .route("/bets/flagged", get(admin::flagged_bets))
        .route("/bets/:id", axum::routing::put(admin::force_bet_status))
        .route("/settlement/run", post(admin::run_settlement));

    let api_routes = Router::new()
        .merge(auth_routes)
        .route("/logout", post(logout))
        .route("/user", get(current_user))
        .route("/user/stats", get(user_stats))

        // Fixtures
        .route("/fixtures", get(list_fixtures))
        .route("/fixtures/live", get(live_fixtures))

        // Bets
        .route("/bets", get(user_bets).post(place_bet))
        .route("/bets/history", get(bet_history))

        // Funding
        .route("/deposits", post(create_deposit))
        .route("/deposits/user", get(user_deposits))
        .route("/withdrawals", post(create_withdrawal))
        .route("/withdrawals/user", get(user_withdrawals))
        .route("/bonus/claim-welcome", post(claim_welcome_bonus))
        .nest("/admin", admin_routes);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(live_updates))
        .nest("/api", api_routes)
        .layer(CompressionLayer::new())
        .layer(create_cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

/// Serve until Ctrl-C, running the settlement scheduler and live ticker alongside
pub async fn run_server(app: Router, state: AppState, config: &Config) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.bind_address).await?;
    info!("🌐 Server listening on: {}", config.bind_address);

    state.scheduler.start();
    let ticker = state.live_feed.spawn_ticker(config.live_broadcast_interval());
    info!(
        "📡 Live odds ticker started (every {}s)",
        config.live_broadcast_interval_secs
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("🛑 Shutting down background tasks...");
    state.scheduler.stop().await;
    ticker.abort();

    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown signal received");
}
