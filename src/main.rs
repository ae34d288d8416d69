mod api;
mod config;
mod context;
mod error;
mod lock;
mod provider;
mod store;
mod tasks;
mod types;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::context::AppContext;
use crate::error::Result;
use crate::provider::{BalldontlieClient, XClient};
use crate::store::PgStore;
use crate::tasks::team_sync::sync_teams;
use crate::tasks::{
    AnnouncementDispatcher, Component, GameFetcher, GameUpdater, PollingTask, ScorhegamiDetector,
    Supervisor, SupervisorExit,
};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    match run(cfg).await {
        Ok(SupervisorExit::Shutdown) => info!("Shut down cleanly"),
        Ok(exit) => {
            error!(?exit, "Supervisor gave up");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Fatal error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(cfg: Config) -> Result<SupervisorExit> {
    // --- Database setup ---
    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .connect(&cfg.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready");

    // --- Providers and shared context ---
    let games = Arc::new(BalldontlieClient::from_config(&cfg)?);
    let announcer = Arc::new(XClient::from_config(&cfg)?);
    if cfg.disable_announcements {
        warn!("DISABLE_ANNOUNCEMENTS is set; pending announcements will be marked skipped");
    }
    let api_port = cfg.api_port;
    let ctx = AppContext::new(cfg, Arc::new(PgStore::new(pool.clone())), games, announcer);

    // --- Team registry ---
    match sync_teams(&ctx).await {
        Ok(inserted) => info!("Team sync complete: {inserted} new teams"),
        Err(e) => error!("Failed to sync teams: {e}"),
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    // --- HTTP API server ---
    let app = router(ApiState {
        pool: pool.clone(),
        health: Arc::clone(&ctx.health),
    });
    let bind_addr = format!("0.0.0.0:{api_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    // --- Polling tasks, in pipeline order ---
    let components: Vec<Box<dyn Component>> = vec![
        Box::new(PollingTask::new(&ctx, GameFetcher::new(&ctx))),
        Box::new(PollingTask::new(&ctx, GameUpdater::new(&ctx))),
        Box::new(PollingTask::new(&ctx, ScorhegamiDetector::new(&ctx))),
        Box::new(PollingTask::new(&ctx, AnnouncementDispatcher::new(&ctx))),
    ];
    let exit = Supervisor::new(components).run(shutdown.clone()).await;

    shutdown.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("HTTP API exited with error: {e}"),
        Err(e) => warn!("HTTP API task failed: {e}"),
    }
    pool.close().await;

    Ok(exit)
}

/// First signal requests a graceful stop; a second one exits immediately.
async fn watch_signals(shutdown: CancellationToken) {
    wait_for_signal().await;
    info!("Received shutdown signal, stopping");
    shutdown.cancel();

    wait_for_signal().await;
    warn!("Received second shutdown signal, exiting now");
    std::process::exit(1);
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
