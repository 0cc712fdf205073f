//! Prometheus metrics
//!
//! One `Bundle` owns a private registry plus the collector handed to the
//! scheduler. Per-service series are materialized up front by
//! `ensure_services` so the active set is visible before any probe has run;
//! series for removed services are left behind (stale label retention is
//! acceptable for a scrape target of this size).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::{
    GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

use crate::checks::CheckResult;
use crate::config::Service;

pub const LABEL_SERVICE_ID: &str = "service_id";
pub const LABEL_SERVICE_NAME: &str = "service_name";
pub const LABEL_TYPE: &str = "type";
pub const LABEL_RESULT: &str = "result";

pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_FAILURE: &str = "failure";

const SERVICE_LABELS: &[&str] = &[LABEL_SERVICE_ID, LABEL_SERVICE_NAME, LABEL_TYPE];

/// Registry plus collector, created together so every metric is registered
/// exactly once per bundle. Bundles are independent; tests create as many
/// as they like.
pub struct Bundle {
    pub registry: Registry,
    pub collector: Arc<Collector>,
}

impl Bundle {
    pub fn new() -> Self {
        let registry = Registry::new();
        let collector = Arc::new(Collector::new());

        for metric in [
            Box::new(collector.check_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(collector.check_latency_seconds.clone()),
            Box::new(collector.up.clone()),
            Box::new(collector.last_success_timestamp.clone()),
            Box::new(collector.build_info.clone()),
            Box::new(collector.config_reload_success.clone()),
        ] {
            registry
                .register(metric)
                .expect("metric registered twice in a fresh registry");
        }

        collector
            .build_info
            .with_label_values(&[
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH,
            ])
            .set(1);
        collector.config_reload_success.set(1);

        Self {
            registry,
            collector,
        }
    }
}

impl Default for Bundle {
    fn default() -> Self {
        Self::new()
    }
}

/// The observer the scheduler feeds. All vectors are internally
/// synchronized; the `initialized` id set keeps `ensure_services`
/// idempotent without touching live series.
pub struct Collector {
    pub check_total: IntCounterVec,
    pub check_latency_seconds: HistogramVec,
    pub up: IntGaugeVec,
    pub last_success_timestamp: GaugeVec,
    pub build_info: IntGaugeVec,
    pub config_reload_success: IntGauge,
    initialized: Mutex<HashSet<String>>,
}

impl Collector {
    fn new() -> Self {
        let check_total = IntCounterVec::new(
            Opts::new("uptiq_check_total", "Total number of checks by outcome"),
            &[LABEL_SERVICE_ID, LABEL_SERVICE_NAME, LABEL_TYPE, LABEL_RESULT],
        )
        .expect("valid counter opts");

        let check_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "uptiq_check_latency_seconds",
                "Observed check latency in seconds",
            ),
            SERVICE_LABELS,
        )
        .expect("valid histogram opts");

        let up = IntGaugeVec::new(
            Opts::new("uptiq_up", "Whether the last check succeeded (1) or failed (0)"),
            SERVICE_LABELS,
        )
        .expect("valid gauge opts");

        let last_success_timestamp = GaugeVec::new(
            Opts::new(
                "uptiq_last_success_timestamp",
                "Unix timestamp of the last successful check",
            ),
            SERVICE_LABELS,
        )
        .expect("valid gauge opts");

        let build_info = IntGaugeVec::new(
            Opts::new("uptiq_build_info", "Build information, always 1"),
            &["version", "os", "arch"],
        )
        .expect("valid gauge opts");

        let config_reload_success = IntGauge::new(
            "uptiq_config_reload_success",
            "Whether the most recent config reload succeeded (1) or failed (0)",
        )
        .expect("valid gauge opts");

        Self {
            check_total,
            check_latency_seconds,
            up,
            last_success_timestamp,
            build_info,
            config_reload_success,
            initialized: Mutex::new(HashSet::new()),
        }
    }

    /// Materialize the gauge and last-success series for every service in
    /// the active set. Safe to call repeatedly with the same list.
    pub fn ensure_services(&self, services: &[Service]) {
        let mut initialized = self.initialized.lock();
        for svc in services {
            if !initialized.insert(svc.id.clone()) {
                continue;
            }
            let labels = [svc.id.as_str(), svc.name.as_str(), svc.kind.as_str()];
            self.up.with_label_values(&labels);
            self.last_success_timestamp.with_label_values(&labels);
        }
    }

    /// Record one check outcome for a service.
    pub fn observe(&self, svc: &Service, res: &CheckResult) {
        let labels = [svc.id.as_str(), svc.name.as_str(), svc.kind.as_str()];
        let outcome = if res.success {
            RESULT_SUCCESS
        } else {
            RESULT_FAILURE
        };

        self.check_total
            .with_label_values(&[svc.id.as_str(), svc.name.as_str(), svc.kind.as_str(), outcome])
            .inc();
        self.up
            .with_label_values(&labels)
            .set(if res.success { 1 } else { 0 });
        self.check_latency_seconds
            .with_label_values(&labels)
            .observe(res.latency.as_secs_f64());

        if res.success {
            self.last_success_timestamp
                .with_label_values(&labels)
                .set(chrono::Utc::now().timestamp() as f64);
        }
    }

    /// Flip the reload gauge after a config reload attempt.
    pub fn set_config_reload(&self, ok: bool) {
        self.config_reload_success.set(if ok { 1 } else { 0 });
    }
}
