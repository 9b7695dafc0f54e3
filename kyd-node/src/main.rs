mod adapters;
mod cli;
mod config;
mod notifications;
mod sweep;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::Args;
use config::Config;
use kyd_payments::PaymentOrchestrator;
use kyd_risk::RiskGate;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        eprintln!("CRASH at {location}: {info}");
    }));

    let file_appender = tracing_appender::rolling::daily("logs", "kyd-node-audit.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let audit_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target().starts_with("kyd_ledger") || metadata.target().starts_with("kyd_payments")
        }));

    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    );

    tracing_subscriber::registry().with(audit_layer).with(stdout_layer).init();

    let args = Args::parse();
    tracing::info!(config = %args.config, "starting kyd-node");

    let config = match Config::load_from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, path = %args.config, "no usable config file, falling back to defaults");
            Config::default()
        }
    };

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL must be set (not read from the config file or a .env file)")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&database_url)
        .await?;

    sqlx::migrate!("../migrations").run(&pool).await?;

    let risk_gate = RiskGate::new(config.risk_policy.clone().into_policy());

    let (notification_tx, notification_rx) =
        tokio::sync::mpsc::channel(config.notification_channel_capacity);
    tokio::spawn(notifications::run(notification_rx));

    // Request transport (HTTP/gRPC) is out of scope (§1) — the orchestrator
    // is wired and held here ready for an embedding transport to drive it.
    let _orchestrator = Arc::new(PaymentOrchestrator::new(
        pool.clone(),
        risk_gate,
        Arc::new(adapters::IdentityForexProvider),
        Arc::new(adapters::ChannelNotificationSink::new(notification_tx)),
        Arc::new(adapters::NoopSecuritySink),
        Arc::new(adapters::AllVerifiedUserLookup),
    ));

    tokio::spawn(sweep::run(
        pool.clone(),
        Duration::from_secs(config.sweep_interval_secs),
        config.stuck_pending_after_secs,
    ));

    tracing::info!("kyd-node started, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    Ok(())
}
