//! Uptiq: Uptime Monitoring Daemon
//!
//! A single-process daemon that periodically probes a declaratively
//! configured set of HTTP and TCP services, records health metrics, and
//! dispatches alerts to Discord, Slack, and email when services flip
//! between healthy and unhealthy.
//!
//! # Features
//!
//! - **HTTP and TCP probes**: status/body assertions for HTTP, connect
//!   checks for TCP, each under a per-service timeout
//! - **Heap-driven scheduler**: one logical timer per service, probes run
//!   on a bounded worker pool with optional jitter
//! - **Live reconfiguration**: the service set swaps atomically on config
//!   reload without losing in-flight work
//! - **Alert engine**: per-service state machine with failure thresholds,
//!   cooldown throttling, still-down reminders and recovery alerts
//! - **Prometheus metrics**: per-service gauges, counters, and latency
//!   histograms exposed on `/metrics`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use uptiq::alerting::Engine;
//! use uptiq::config::load_config;
//! use uptiq::metrics::Bundle;
//! use uptiq::scheduler::{ResultHandler, Scheduler};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let cfg = load_config("./config.yml")?;
//! let bundle = Bundle::new();
//! let engine = Arc::new(Engine::new(&cfg.alerting)?);
//!
//! let scheduler = Arc::new(Scheduler::new(
//!     &cfg,
//!     Some(Arc::clone(&bundle.collector)),
//!     Some(engine as Arc<dyn ResultHandler>),
//! )?);
//!
//! scheduler.run(CancellationToken::new(), cfg.services).await;
//! # Ok(())
//! # }
//! ```

pub mod alerting;
pub mod api;
pub mod checks;
pub mod config;
pub mod metrics;
pub mod scheduler;

// Re-export commonly used types
pub use checks::CheckResult;
pub use config::{Config, Service, ServiceKind};
pub use scheduler::{ResultHandler, Scheduler};
