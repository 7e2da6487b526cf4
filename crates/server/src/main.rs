mod api;
mod bootstrap;
mod health;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use procura_core::clock::SystemClock;
use procura_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use procura_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let clock = Arc::new(SystemClock);

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        app.config.scheduler.enabled,
    )
    .await?;

    scheduler::spawn(&app.config.scheduler, app.db_pool.clone(), clock.clone());

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "procura-server started"
    );

    let shutdown_grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, api::router_with_clock(app.db_pool.clone(), clock))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    tracing::info!(event_name = "system.server.stopping", "procura-server stopping");
    tokio::time::timeout(shutdown_grace, app.db_pool.close()).await.ok();

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
