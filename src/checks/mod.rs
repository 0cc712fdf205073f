//! Probe executors
//!
//! One probe is a single HTTP request or TCP connect against a service,
//! bounded by the service's timeout. Outcomes are always values; a failed
//! probe is a `CheckResult` with `success == false` and a reason, never an
//! error the caller has to unwrap.

mod http;
mod tcp;

pub use http::HttpChecker;
pub use tcp::TcpChecker;

use std::time::Duration;

use crate::config::{Service, ServiceKind};

/// Outcome of a single probe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckResult {
    pub success: bool,
    /// Observed HTTP status, 0 when not applicable (TCP, transport error).
    pub status_code: u16,
    /// Wall time from probe entry until the outcome was determined.
    pub latency: Duration,
    /// Human-readable reason, empty iff `success`.
    pub error: String,
}

impl CheckResult {
    pub(crate) fn passed(status_code: u16, latency: Duration) -> Self {
        Self {
            success: true,
            status_code,
            latency,
            error: String::new(),
        }
    }

    pub(crate) fn failed(
        status_code: u16,
        latency: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            status_code,
            latency,
            error: error.into(),
        }
    }
}

/// The probe executors, one per service kind, behind a single entry point.
pub struct Checkers {
    http: HttpChecker,
    tcp: TcpChecker,
}

impl Checkers {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: HttpChecker::new()?,
            tcp: TcpChecker::new(),
        })
    }

    /// Run the probe appropriate for the service's kind under `timeout`.
    pub async fn run(&self, svc: &Service, timeout: Duration) -> CheckResult {
        match svc.kind {
            ServiceKind::Http => self.http.check(svc, timeout).await,
            ServiceKind::Tcp => self.tcp.check(svc, timeout).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_constructors_uphold_error_invariant() {
        let ok = CheckResult::passed(200, Duration::from_millis(12));
        assert!(ok.success);
        assert!(ok.error.is_empty());

        let bad = CheckResult::failed(500, Duration::from_millis(40), "unexpected status 500");
        assert!(!bad.success);
        assert!(!bad.error.is_empty());
        assert_eq!(bad.status_code, 500);
    }
}
