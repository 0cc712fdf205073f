use chrono::{SecondsFormat, Utc};

use crate::checks::CheckResult;
use crate::config::{Service, ServiceKind};

/// Longest error excerpt carried in a webhook message.
const MAX_ERROR_LEN: usize = 180;

/// What a payload announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Down,
    Recovery,
}

impl PayloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadKind::Down => "down",
            PayloadKind::Recovery => "recovery",
        }
    }
}

/// One outbound alert, pre-rendered for every transport: the short webhook
/// line for Discord/Slack and the subject/body pair for email.
#[derive(Debug, Clone)]
pub struct AlertPayload {
    pub kind: PayloadKind,
    pub webhook_message: String,
    pub email_subject: String,
    pub email_body: String,
}

/// Renders the three payload kinds. Stateless; formatting only.
pub struct MessageBuilder;

impl MessageBuilder {
    pub fn new() -> Self {
        Self
    }

    /// First down alert of an outage episode.
    pub fn down_alert(
        &self,
        svc: &Service,
        res: &CheckResult,
        failures: u32,
        threshold: u32,
    ) -> AlertPayload {
        AlertPayload {
            kind: PayloadKind::Down,
            webhook_message: format_down_message(svc, res, failures, threshold, false),
            email_subject: email_subject_down(svc),
            email_body: email_body_down(svc, res, failures, threshold),
        }
    }

    /// Reminder while the outage persists.
    pub fn still_down_alert(
        &self,
        svc: &Service,
        res: &CheckResult,
        failures: u32,
        threshold: u32,
    ) -> AlertPayload {
        AlertPayload {
            kind: PayloadKind::Down,
            webhook_message: format_down_message(svc, res, failures, threshold, true),
            email_subject: format!("{} (still down)", email_subject_down(svc)),
            email_body: email_body_down(svc, res, failures, threshold),
        }
    }

    pub fn recovery_alert(&self, svc: &Service, res: &CheckResult) -> AlertPayload {
        AlertPayload {
            kind: PayloadKind::Recovery,
            webhook_message: format_recovery_message(svc, res),
            email_subject: email_subject_recovery(svc),
            email_body: email_body_recovery(svc, res),
        }
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The probe target as shown to humans: URL for HTTP, `host:port` for TCP.
pub(crate) fn target_for_service(svc: &Service) -> String {
    match svc.kind {
        ServiceKind::Http => svc.url.clone(),
        ServiceKind::Tcp => format!("{}:{}", svc.host, svc.port),
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn format_down_message(
    svc: &Service,
    res: &CheckResult,
    failures: u32,
    threshold: u32,
    reminder: bool,
) -> String {
    let prefix = if reminder { "🚨 STILL DOWN" } else { "🚨 DOWN" };
    let target = target_for_service(svc);

    let thr_part = if threshold > 1 {
        format!(" (failure={failures}/{threshold})")
    } else {
        String::new()
    };
    let status_part = if res.status_code != 0 {
        format!(" status={}", res.status_code)
    } else {
        String::new()
    };
    let err_part = if res.error.trim().is_empty() {
        String::new()
    } else {
        format!(" err={:?}", truncate(&res.error, MAX_ERROR_LEN))
    };

    format!(
        "{prefix}: {} ({}) [{}]{thr_part}\ntarget={target}{status_part} latency={}ms at={}{err_part}",
        svc.name,
        svc.id,
        svc.kind,
        res.latency.as_millis(),
        timestamp(),
    )
}

fn format_recovery_message(svc: &Service, res: &CheckResult) -> String {
    let target = target_for_service(svc);
    let status_part = if res.status_code != 0 {
        format!(" status={}", res.status_code)
    } else {
        String::new()
    };

    format!(
        "✅ UP: {} ({}) [{}]\ntarget={target}{status_part} latency={}ms at={}",
        svc.name,
        svc.id,
        svc.kind,
        res.latency.as_millis(),
        timestamp(),
    )
}

fn email_subject_down(svc: &Service) -> String {
    format!("[DOWN] {} ({})", svc.name, svc.id)
}

fn email_subject_recovery(svc: &Service) -> String {
    format!("[UP] {} ({})", svc.name, svc.id)
}

fn email_body_down(svc: &Service, res: &CheckResult, failures: u32, threshold: u32) -> String {
    let mut body = String::from("ALERT: SERVICE DOWN\n\n");
    body.push_str(&format!("Service: {}\n", svc.name));
    body.push_str(&format!("ID: {}\n", svc.id));
    body.push_str(&format!("Type: {}\n", svc.kind));
    body.push_str(&format!("Target: {}\n", target_for_service(svc)));
    if res.status_code != 0 {
        body.push_str(&format!("HTTP Status: {}\n", res.status_code));
    }
    body.push_str(&format!("Latency: {}ms\n", res.latency.as_millis()));
    if threshold > 1 {
        body.push_str(&format!("Consecutive failures: {failures}/{threshold}\n"));
    }
    if !res.error.trim().is_empty() {
        body.push_str(&format!("Error: {}\n", res.error));
    }
    body.push_str(&format!("\nTime: {}\n\n", timestamp()));
    body.push_str("Next steps:\n");
    body.push_str("- Check service health and recent deploys\n");
    body.push_str("- Verify DNS/network reachability\n");
    body.push_str("- Review logs / monitoring dashboards\n");
    body
}

fn email_body_recovery(svc: &Service, res: &CheckResult) -> String {
    let mut body = String::from("RECOVERY: SERVICE UP\n\n");
    body.push_str(&format!("Service: {}\n", svc.name));
    body.push_str(&format!("ID: {}\n", svc.id));
    body.push_str(&format!("Type: {}\n", svc.kind));
    body.push_str(&format!("Target: {}\n", target_for_service(svc)));
    if res.status_code != 0 {
        body.push_str(&format!("HTTP Status: {}\n", res.status_code));
    }
    body.push_str(&format!("Latency: {}ms\n", res.latency.as_millis()));
    body.push_str(&format!("\nTime: {}\n", timestamp()));
    body
}

/// Cap a message at `max_len` characters, marking the cut with an
/// ellipsis.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return s.chars().take(max_len).collect();
    }
    let mut out: String = s.chars().take(max_len - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn http_service() -> Service {
        Service {
            id: "api-1".to_string(),
            name: "API Server".to_string(),
            kind: ServiceKind::Http,
            url: "https://api.example.com/health".to_string(),
            ..Service::default()
        }
    }

    fn tcp_service() -> Service {
        Service {
            id: "postgres".to_string(),
            name: "PostgreSQL".to_string(),
            kind: ServiceKind::Tcp,
            host: "db.internal".to_string(),
            port: 5432,
            ..Service::default()
        }
    }

    #[test]
    fn down_alert_contains_required_fields() {
        let svc = http_service();
        let res = CheckResult::failed(
            500,
            Duration::from_millis(150),
            "internal server error",
        );
        let payload = MessageBuilder::new().down_alert(&svc, &res, 3, 3);

        assert_eq!(payload.kind, PayloadKind::Down);
        assert!(payload.webhook_message.contains("🚨 DOWN"));
        assert!(payload.webhook_message.contains(&svc.name));
        assert!(payload.webhook_message.contains(&svc.id));
        assert!(payload.webhook_message.contains(&svc.url));
        assert!(payload.webhook_message.contains("[http]"));
        assert!(payload.webhook_message.contains("failure=3/3"));
        assert!(payload.webhook_message.contains("status=500"));
        assert!(payload.webhook_message.contains("latency=150ms"));

        assert!(payload.email_subject.contains("[DOWN]"));
        assert!(payload.email_body.contains("SERVICE DOWN"));
        assert!(payload.email_body.contains("internal server error"));
        assert!(payload.email_body.contains("Next steps:"));
    }

    #[test]
    fn still_down_alert_is_marked_as_reminder() {
        let svc = tcp_service();
        let res = CheckResult::failed(0, Duration::from_secs(5), "connection refused");
        let payload = MessageBuilder::new().still_down_alert(&svc, &res, 10, 3);

        assert_eq!(payload.kind, PayloadKind::Down);
        assert!(payload.webhook_message.contains("STILL DOWN"));
        assert!(payload.email_subject.ends_with("(still down)"));
    }

    #[test]
    fn recovery_alert_content() {
        let svc = http_service();
        let res = CheckResult::passed(200, Duration::from_millis(50));
        let payload = MessageBuilder::new().recovery_alert(&svc, &res);

        assert_eq!(payload.kind, PayloadKind::Recovery);
        assert!(payload.webhook_message.contains("✅ UP"));
        assert!(payload.webhook_message.contains("status=200"));
        assert!(payload.email_subject.contains("[UP]"));
        assert!(payload.email_body.contains("RECOVERY"));
        assert!(!payload.email_body.contains("Next steps"));
    }

    #[test]
    fn tcp_target_rendered_as_host_port() {
        let svc = tcp_service();
        let res = CheckResult::failed(0, Duration::from_millis(100), "connection refused");
        let payload = MessageBuilder::new().down_alert(&svc, &res, 1, 1);

        assert!(payload.webhook_message.contains("db.internal:5432"));
        assert!(payload.email_body.contains("db.internal:5432"));
    }

    #[test]
    fn threshold_of_one_omits_failure_counter() {
        let svc = http_service();
        let res = CheckResult::failed(503, Duration::from_millis(10), "unexpected status 503");
        let payload = MessageBuilder::new().down_alert(&svc, &res, 1, 1);

        assert!(!payload.webhook_message.contains("failure="));
        assert!(!payload.email_body.contains("Consecutive failures"));
    }

    #[test]
    fn zero_status_code_is_omitted() {
        let svc = tcp_service();
        let res = CheckResult::failed(0, Duration::from_millis(5), "refused");
        let payload = MessageBuilder::new().down_alert(&svc, &res, 1, 1);

        assert!(!payload.webhook_message.contains("status="));
        assert!(!payload.email_body.contains("HTTP Status"));
    }

    #[test]
    fn long_errors_are_truncated_in_webhook() {
        let svc = http_service();
        let long_error = "x".repeat(500);
        let res = CheckResult::failed(0, Duration::from_millis(5), long_error);
        let payload = MessageBuilder::new().down_alert(&svc, &res, 1, 1);

        assert!(payload.webhook_message.contains("..."));
        assert!(!payload.webhook_message.contains(&"x".repeat(200)));
    }

    #[test]
    fn target_for_service_by_kind() {
        assert_eq!(
            target_for_service(&http_service()),
            "https://api.example.com/health"
        );
        assert_eq!(target_for_service(&tcp_service()), "db.internal:5432");
    }

    #[test]
    fn truncate_behavior() {
        assert_eq!(truncate("short", 180), "short");
        assert_eq!(truncate("  padded  ", 180), "padded");
        assert_eq!(truncate("abcdef", 5), "ab...");
        assert_eq!(truncate("abcdef", 3), "abc");
        let out = truncate(&"y".repeat(200), 180);
        assert_eq!(out.chars().count(), 180);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn webhook_message_has_timestamp() {
        let svc = http_service();
        let res = CheckResult::passed(200, Duration::from_millis(1));
        let payload = MessageBuilder::new().recovery_alert(&svc, &res);
        // RFC 3339 timestamps carry a T separator and a Z suffix in UTC.
        assert!(payload.webhook_message.contains("at=20"));
        assert!(payload.webhook_message.contains('T'));
    }
}
