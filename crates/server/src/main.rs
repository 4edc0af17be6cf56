mod bootstrap;
mod health;
mod notify;
mod render;
mod service;
mod templates;

use std::time::Duration;

use anyhow::Result;
use altura_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

const DRAIN_POLL: Duration = Duration::from_millis(100);

fn init_logging(config: &AppConfig) {
    use altura_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        company = %app.config.company.name,
        "altura-server started; polling telegram"
    );

    tokio::select! {
        outcome = app.runner.start() => {
            outcome?;
            tracing::warn!(
                event_name = "system.server.updates_ended",
                correlation_id = "shutdown",
                "telegram update loop ended; shutting down"
            );
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                "shutdown signal received; no longer accepting updates"
            );
        }
    }

    drain(&app.runtime, Duration::from_secs(app.config.server.graceful_shutdown_secs)).await;
    app.db_pool.close().await;
    tracing::info!(event_name = "system.server.stopped", correlation_id = "shutdown", "altura-server stopped");

    Ok(())
}

/// Gives in-flight turns until `grace` to finish writing their state.
async fn drain(runtime: &altura_agent::AgentRuntime, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    while runtime.active_users() > 0 {
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                active_users = runtime.active_users(),
                "graceful shutdown window elapsed with turns still running"
            );
            return;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
}
