//! Probe scheduler
//!
//! One coordinator task owns a time-ordered heap with a single logical
//! timer per service and hands due probes to a fixed worker pool. The
//! service set can be swapped live through `update_services` without
//! touching in-flight work: unchanged services keep their pending slot,
//! new or changed ones are probed soon after the swap.
//!
//! Rescheduling happens at dispatch time, not completion time, so a probe
//! slower than its interval is immediately due again when it finishes;
//! probes are never self-chained. If every worker is busy and the queue is
//! full the tick is dropped with a warning and the service simply waits
//! for its next scheduled run.

mod heap;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checks::{CheckResult, Checkers};
use crate::config::{Config, Service};
use crate::metrics::Collector;

use heap::{ScheduleHeap, ScheduledItem};

/// Fallback interval for services whose interval string does not parse.
pub(crate) const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
/// Fallback timeout for services whose timeout string does not parse.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const MIN_WORKERS: usize = 1;
const MAX_WORKERS: usize = 1000;

/// Consumer of check results, fed from the worker pool. The alert engine
/// implements this; tests substitute their own.
#[async_trait]
pub trait ResultHandler: Send + Sync {
    async fn handle_result(&self, svc: &Service, res: &CheckResult);
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid jitter {value:?}: {source}")]
    InvalidJitter {
        value: String,
        source: humantime::DurationError,
    },
    #[error("build probe client: {0}")]
    Client(#[from] reqwest::Error),
}

/// The scheduler. Construct once, share behind an `Arc`, drive with
/// [`Scheduler::run`], reconfigure with [`Scheduler::update_services`].
pub struct Scheduler {
    worker_count: usize,
    jitter: Duration,
    checkers: Checkers,
    observer: Option<Arc<Collector>>,
    handler: Option<Arc<dyn ResultHandler>>,
    /// Latest-wins slot for pending reconfiguration; successive updates
    /// coalesce to the last one written.
    pending: Mutex<Option<Vec<Service>>>,
    update_notify: Notify,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("worker_count", &self.worker_count)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        cfg: &Config,
        observer: Option<Arc<Collector>>,
        handler: Option<Arc<dyn ResultHandler>>,
    ) -> Result<Self, SchedulerError> {
        let jitter = humantime::parse_duration(&cfg.global.jitter).map_err(|source| {
            SchedulerError::InvalidJitter {
                value: cfg.global.jitter.clone(),
                source,
            }
        })?;

        Ok(Self {
            worker_count: cfg.global.worker_count.clamp(MIN_WORKERS, MAX_WORKERS),
            jitter,
            checkers: Checkers::new()?,
            observer,
            handler,
            pending: Mutex::new(None),
            update_notify: Notify::new(),
        })
    }

    /// Replace the monitored service set. Non-blocking and safe to call
    /// from any task while [`Scheduler::run`] is live.
    pub fn update_services(&self, services: Vec<Service>) {
        *self.pending.lock() = Some(services);
        self.update_notify.notify_one();
    }

    /// Run until `cancel` fires. Blocks the calling task; returns after
    /// every worker has drained.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken, initial: Vec<Service>) {
        let (tx, rx) = mpsc::channel::<Service>(self.worker_count);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            workers.push(tokio::spawn(Arc::clone(&self).worker_loop(
                worker_id,
                Arc::clone(&rx),
                cancel.clone(),
            )));
        }
        info!(workers = self.worker_count, jitter = ?self.jitter, "scheduler started");

        let mut queue = ScheduleHeap::new();
        self.rebuild(&mut queue, initial);

        loop {
            // With an empty queue there is nothing to time against; park
            // until an update or shutdown arrives.
            if queue.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.update_notify.notified() => self.drain_pending(&mut queue),
                }
                continue;
            }
            let Some(next_run) = queue.peek().map(|item| item.next_run) else {
                continue;
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.update_notify.notified() => self.drain_pending(&mut queue),
                _ = tokio::time::sleep_until(next_run) => {
                    let Some(mut item) = queue.pop() else { continue };
                    let svc = item.service.clone();

                    // Reschedule from dispatch time before handing the job off.
                    let interval = parse_interval_or_default(&item.service.interval);
                    item.next_run = Instant::now() + interval + self.random_jitter();
                    queue.push(item);

                    match tx.try_send(svc) {
                        Ok(()) => {}
                        Err(TrySendError::Full(svc)) => {
                            warn!(service_id = %svc.id, "worker queue full, dropping tick");
                        }
                        Err(TrySendError::Closed(_)) => break,
                    }
                }
            }
        }

        // Closing the channel lets workers finish what they hold and exit.
        drop(tx);
        for worker in workers {
            let _ = worker.await;
        }
        info!("scheduler stopped");
    }

    async fn worker_loop(
        self: Arc<Self>,
        worker_id: usize,
        rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Service>>>,
        cancel: CancellationToken,
    ) {
        loop {
            let job = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    job = rx.recv() => job,
                }
            };
            let Some(svc) = job else { break };

            // A panicking probe must not take the worker with it.
            if let Err(panic) = std::panic::AssertUnwindSafe(self.run_job(svc))
                .catch_unwind()
                .await
            {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(worker_id, reason, "probe job panicked");
            }
        }
        debug!(worker_id, "worker stopped");
    }

    async fn run_job(&self, svc: Service) {
        let timeout = parse_timeout_or_default(&svc.timeout);
        let res = self.checkers.run(&svc, timeout).await;

        debug!(
            service_id = %svc.id,
            success = res.success,
            status = res.status_code,
            latency_ms = res.latency.as_millis() as u64,
            "check finished"
        );

        if let Some(observer) = &self.observer {
            observer.observe(&svc, &res);
        }
        if let Some(handler) = &self.handler {
            handler.handle_result(&svc, &res).await;
        }
    }

    fn drain_pending(&self, queue: &mut ScheduleHeap) {
        let Some(services) = self.pending.lock().take() else {
            return;
        };
        self.rebuild(queue, services);
    }

    /// Swap the queue for one built from `services`. Entries whose service
    /// is semantically unchanged keep their pending `next_run`; new or
    /// changed services are scheduled at now plus jitter. Removed services
    /// are dropped with the old queue.
    fn rebuild(&self, queue: &mut ScheduleHeap, services: Vec<Service>) {
        let mut existing: HashMap<String, ScheduledItem> = queue
            .drain()
            .map(|item| (item.service.id.clone(), item))
            .collect();

        for svc in &services {
            let next_run = match existing.remove(&svc.id) {
                Some(prev) if services_equal(&prev.service, svc) => prev.next_run,
                _ => Instant::now() + self.random_jitter(),
            };
            queue.push(ScheduledItem {
                service: svc.clone(),
                next_run,
            });
        }

        if let Some(observer) = &self.observer {
            observer.ensure_services(&services);
        }
        info!(services = queue.len(), "schedule rebuilt");
    }

    /// Uniform random duration in `[0, jitter)`; exactly zero when jitter
    /// is zero.
    fn random_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let bound = self.jitter.as_nanos().min(u64::MAX as u128) as u64;
        Duration::from_nanos(rand::thread_rng().gen_range(0..bound))
    }
}

/// Parse a probe interval, falling back to 30s on anything empty,
/// unparseable, zero or negative.
pub(crate) fn parse_interval_or_default(s: &str) -> Duration {
    parse_positive_duration(s).unwrap_or(DEFAULT_INTERVAL)
}

/// Parse a probe timeout, falling back to 5s on anything empty,
/// unparseable, zero or negative.
pub(crate) fn parse_timeout_or_default(s: &str) -> Duration {
    parse_positive_duration(s).unwrap_or(DEFAULT_TIMEOUT)
}

fn parse_positive_duration(s: &str) -> Option<Duration> {
    humantime::parse_duration(s.trim())
        .ok()
        .filter(|d| !d.is_zero())
}

/// Whether two configurations of the same service are interchangeable for
/// scheduling purposes. The name is cosmetic and deliberately excluded.
pub(crate) fn services_equal(a: &Service, b: &Service) -> bool {
    a.id == b.id
        && a.kind == b.kind
        && a.url == b.url
        && a.method == b.method
        && a.expected_status == b.expected_status
        && a.contains == b.contains
        && a.headers == b.headers
        && a.host == b.host
        && a.port == b.port
        && a.interval == b.interval
        && a.timeout == b.timeout
}
