use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default bind address for the `/healthz` and `/metrics` endpoints.
pub const DEFAULT_SCRAPE_BIND: &str = "0.0.0.0:8080";
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Default per-probe timeout applied to services that do not set one.
pub const DEFAULT_TIMEOUT: &str = "5s";
/// Default probe interval applied to services that do not set one.
pub const DEFAULT_INTERVAL: &str = "30s";
/// Default worker pool size.
pub const DEFAULT_WORKER_COUNT: usize = 10;
/// Default scheduling jitter.
pub const DEFAULT_JITTER: &str = "0s";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub alerting: AlertingConfig,
}

/// Global daemon settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Bind address for the scrape endpoints, `host:port`.
    #[serde(default)]
    pub scrape_bind: String,
    #[serde(default)]
    pub log_level: String,
    /// Fallback probe timeout for services without an explicit one.
    #[serde(default)]
    pub default_timeout: String,
    /// Fallback probe interval for services without an explicit one.
    #[serde(default)]
    pub default_interval: String,
    /// Size of the probe worker pool.
    #[serde(default)]
    pub worker_count: usize,
    /// Upper bound of the random delay added to each reschedule.
    #[serde(default)]
    pub jitter: String,
}

/// Kind of probe a service is checked with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[default]
    Http,
    Tcp,
}

impl ServiceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::Http => "http",
            ServiceKind::Tcp => "tcp",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One monitored service.
///
/// The struct is kept flat (HTTP and TCP fields side by side) so it maps
/// directly onto the YAML document; validation enforces that the fields
/// required by the selected kind are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    /// Stable identifier, unique across the active set.
    #[serde(default)]
    pub id: String,
    /// Human-readable name used in alerts and metric labels.
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ServiceKind,

    // HTTP probe parameters
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
    /// Response codes considered healthy; empty means 200..400.
    #[serde(default)]
    pub expected_status: Vec<u16>,
    /// Substring the response body must contain, if non-empty.
    #[serde(default)]
    pub contains: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,

    // TCP probe parameters
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,

    /// Probe interval as a duration string, e.g. `30s`.
    #[serde(default)]
    pub interval: String,
    /// Per-probe timeout as a duration string, e.g. `5s`.
    #[serde(default)]
    pub timeout: String,
}

/// Alerting channels and routes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertingConfig {
    #[serde(default)]
    pub channels: HashMap<String, Channel>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

/// Kind of alert delivery channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Discord,
    Slack,
    Email,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Discord => "discord",
            ChannelKind::Slack => "slack",
            ChannelKind::Email => "email",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named alert destination. Carries the superset of fields across kinds;
/// validation checks the ones the selected kind requires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "type", default)]
    pub kind: ChannelKind,
    // discord / slack
    #[serde(default)]
    pub webhook_url: String,
    // email
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default)]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
}

/// Declarative binding of services to channels under a policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub r#match: RouteMatch,
    #[serde(default)]
    pub policy: RoutePolicy,
    #[serde(default)]
    pub notify: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteMatch {
    #[serde(default)]
    pub service_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutePolicy {
    /// Consecutive failures before a service counts as down; 0 means 1.
    #[serde(default)]
    pub failure_threshold: u32,
    /// Minimum spacing between two down alerts, as a duration string.
    #[serde(default)]
    pub cooldown: String,
    /// Whether to alert when the service comes back up.
    #[serde(default)]
    pub recovery_alert: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_kind_round_trip() {
        assert_eq!(ServiceKind::Http.as_str(), "http");
        assert_eq!(ServiceKind::Tcp.as_str(), "tcp");
        assert_eq!(ServiceKind::Http.to_string(), "http");
    }

    #[test]
    fn service_deserializes_from_yaml() {
        let yaml = r#"
id: api-1
name: API Server
type: http
url: https://api.example.com/health
method: GET
expected_status: [200, 204]
headers:
  Authorization: Bearer token
interval: 30s
timeout: 5s
"#;
        let svc: Service = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(svc.id, "api-1");
        assert_eq!(svc.kind, ServiceKind::Http);
        assert_eq!(svc.expected_status, vec![200, 204]);
        assert_eq!(
            svc.headers.get("Authorization").map(String::as_str),
            Some("Bearer token")
        );
    }

    #[test]
    fn channel_deserializes_email_fields() {
        let yaml = r#"
type: email
smtp_host: smtp.example.com
smtp_port: 587
from: uptiq@example.com
to: [ops@example.com]
"#;
        let ch: Channel = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(ch.kind, ChannelKind::Email);
        assert_eq!(ch.smtp_port, 587);
        assert_eq!(ch.to, vec!["ops@example.com".to_string()]);
    }

    #[test]
    fn route_deserializes_with_match_keyword() {
        let yaml = r#"
match:
  service_ids: [api-1]
policy:
  failure_threshold: 3
  cooldown: 5m
  recovery_alert: true
notify: [discord]
"#;
        let route: Route = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(route.r#match.service_ids, vec!["api-1".to_string()]);
        assert_eq!(route.policy.failure_threshold, 3);
        assert!(route.policy.recovery_alert);
    }
}
