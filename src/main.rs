//! Uptiq daemon entry point
//!
//! Run with: cargo run -- --config ./config.yml
//!
//! The config file declares the monitored services, the worker pool, and
//! the alerting channels/routes; see the `config` module. `RUST_LOG`
//! overrides the `--log-level` flag.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uptiq::alerting::Engine;
use uptiq::config::{self, load_config};
use uptiq::metrics::Bundle;
use uptiq::scheduler::{ResultHandler, Scheduler};

#[derive(Parser)]
#[command(name = "uptiq", about = "Uptime monitor daemon", version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./config.yml")]
    config: PathBuf,

    /// Override the bind address for /healthz and /metrics
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("uptiq={},tower_http=info", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = load_config(&args.config).context("load configuration")?;
    let bind = args
        .listen
        .clone()
        .unwrap_or_else(|| cfg.global.scrape_bind.clone());

    let bundle = Bundle::new();
    let engine = Arc::new(Engine::new(&cfg.alerting).context("build alert engine")?);
    let scheduler = Arc::new(
        Scheduler::new(
            &cfg,
            Some(Arc::clone(&bundle.collector)),
            Some(Arc::clone(&engine) as Arc<dyn ResultHandler>),
        )
        .context("build scheduler")?,
    );

    let cancel = CancellationToken::new();

    let server = tokio::spawn({
        let registry = bundle.registry.clone();
        let cancel = cancel.clone();
        async move {
            if let Err(e) = uptiq::api::run_server(&bind, registry, cancel.clone()).await {
                tracing::error!(error = %e, "scrape server failed");
                cancel.cancel();
            }
        }
    });

    let watcher = tokio::spawn(config::watch::run(
        args.config.clone(),
        Arc::clone(&scheduler),
        Arc::clone(&bundle.collector),
        cancel.clone(),
    ));

    tokio::spawn(shutdown_signal(cancel.clone()));

    tracing::info!(
        services = cfg.services.len(),
        config = %args.config.display(),
        "uptiq starting"
    );
    scheduler.run(cancel, cfg.services.clone()).await;

    let _ = watcher.await;
    let _ = server.await;
    tracing::info!("uptiq stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
    cancel.cancel();
}
