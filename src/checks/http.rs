use std::time::{Duration, Instant};

use reqwest::Method;

use super::CheckResult;
use crate::config::Service;

/// Largest number of response-body bytes inspected for a `contains` match.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// HTTP prober backed by a pooling client with TLS >= 1.2.
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(100)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client })
    }

    /// Issue one request and judge the response.
    ///
    /// Success requires the status to be in `expected_status` when that list
    /// is non-empty, otherwise to fall in 200..400, and the body to contain
    /// `contains` when it is set. The observed status is recorded even on
    /// failure; latency covers entry to outcome.
    pub async fn check(&self, svc: &Service, timeout: Duration) -> CheckResult {
        let start = Instant::now();

        let method = match Method::from_bytes(svc.method.to_uppercase().as_bytes()) {
            Ok(m) => m,
            Err(e) => {
                return CheckResult::failed(0, start.elapsed(), format!("build request: {e}"))
            }
        };

        let mut req = self.client.request(method, &svc.url).timeout(timeout);
        for (k, v) in &svc.headers {
            req = req.header(k, v);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => return CheckResult::failed(0, start.elapsed(), e.to_string()),
        };

        let status = resp.status().as_u16();
        let allowed = if svc.expected_status.is_empty() {
            (200..400).contains(&status)
        } else {
            svc.expected_status.contains(&status)
        };
        if !allowed {
            return CheckResult::failed(
                status,
                start.elapsed(),
                format!("unexpected status {status}"),
            );
        }

        let needle = svc.contains.trim();
        if !needle.is_empty() {
            let body = match read_body_capped(resp, MAX_BODY_BYTES).await {
                Ok(b) => b,
                Err(e) => {
                    return CheckResult::failed(
                        status,
                        start.elapsed(),
                        format!("read body: {e}"),
                    )
                }
            };
            if !String::from_utf8_lossy(&body).contains(needle) {
                return CheckResult::failed(
                    status,
                    start.elapsed(),
                    "response does not contain expected content",
                );
            }
        }

        CheckResult::passed(status, start.elapsed())
    }
}

/// Stream at most `cap` bytes of the response body.
async fn read_body_capped(
    mut resp: reqwest::Response,
    cap: usize,
) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let remaining = cap - body.len();
        if chunk.len() >= remaining {
            body.extend_from_slice(&chunk[..remaining]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
