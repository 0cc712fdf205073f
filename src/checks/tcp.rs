use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use super::CheckResult;
use crate::config::Service;

/// TCP prober: a successful connect is a healthy service.
pub struct TcpChecker;

impl TcpChecker {
    pub fn new() -> Self {
        Self
    }

    /// Connect to `host:port` under `timeout`, then drop the connection.
    /// Status code is always 0 for TCP probes.
    pub async fn check(&self, svc: &Service, timeout: Duration) -> CheckResult {
        let start = Instant::now();
        let addr = format!("{}:{}", svc.host, svc.port);

        match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(conn)) => {
                drop(conn);
                CheckResult::passed(0, start.elapsed())
            }
            Ok(Err(e)) => CheckResult::failed(0, start.elapsed(), format!("dial {addr}: {e}")),
            Err(_) => CheckResult::failed(
                0,
                start.elapsed(),
                format!("dial {addr}: deadline exceeded"),
            ),
        }
    }
}

impl Default for TcpChecker {
    fn default() -> Self {
        Self::new()
    }
}
