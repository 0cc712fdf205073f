use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::engine::NotifyError;
use crate::config::Channel;

/// Overall deadline for one SMTP delivery, connect included.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Port that implies implicit TLS (SMTPS).
const SMTPS_PORT: u16 = 465;

/// Deliver one plain-text message through the channel's SMTP relay.
///
/// TLS policy: port 465 wraps the connection from the first byte; when
/// credentials are configured on any other port, STARTTLS is required so
/// credentials never travel in the clear; otherwise STARTTLS is used
/// opportunistically when the server advertises it.
pub(crate) async fn send(ch: &Channel, subject: &str, body: &str) -> Result<(), NotifyError> {
    if ch.smtp_host.trim().is_empty() {
        return Err(NotifyError::EmailConfig("smtp_host is empty".to_string()));
    }
    if ch.smtp_port == 0 {
        return Err(NotifyError::EmailConfig("smtp_port is empty".to_string()));
    }
    if ch.from.trim().is_empty() {
        return Err(NotifyError::EmailConfig("from is empty".to_string()));
    }
    if ch.to.is_empty() {
        return Err(NotifyError::EmailConfig("to list is empty".to_string()));
    }

    let from: Mailbox = ch
        .from
        .trim()
        .parse()
        .map_err(|e| NotifyError::Address(ch.from.clone(), e))?;

    let mut builder = Message::builder()
        .from(from)
        .subject(sanitize_header(subject))
        .header(ContentType::TEXT_PLAIN);

    let mut recipients = 0usize;
    for to in &ch.to {
        let to = to.trim();
        if to.is_empty() {
            continue;
        }
        let mailbox: Mailbox = to
            .parse()
            .map_err(|e| NotifyError::Address(to.to_string(), e))?;
        builder = builder.to(mailbox);
        recipients += 1;
    }
    if recipients == 0 {
        return Err(NotifyError::EmailConfig(
            "no valid recipients in to list".to_string(),
        ));
    }

    let message = builder.body(body.to_string())?;
    let mailer = build_transport(ch)?;

    match tokio::time::timeout(SEND_TIMEOUT, mailer.send(message)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(NotifyError::EmailTimeout),
    }
}

fn build_transport(
    ch: &Channel,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
    let host = ch.smtp_host.trim();
    let auth_configured = !ch.username.trim().is_empty() || !ch.password.trim().is_empty();

    let mut builder = if ch.smtp_port == SMTPS_PORT {
        AsyncSmtpTransport::<Tokio1Executor>::relay(host)?.port(ch.smtp_port)
    } else if auth_configured {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(ch.smtp_port)
    } else {
        let tls = TlsParameters::new(host.to_string())?;
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(ch.smtp_port)
            .tls(Tls::Opportunistic(tls))
    };

    if !ch.username.trim().is_empty() {
        builder = builder
            .credentials(Credentials::new(
                ch.username.trim().to_string(),
                ch.password.clone(),
            ))
            .authentication(vec![Mechanism::Plain]);
    }

    Ok(builder.build())
}

/// Strip CR/LF from header values so alert text cannot inject headers.
pub(crate) fn sanitize_header(value: &str) -> String {
    value.replace(['\r', '\n'], " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelKind;

    fn email_channel() -> Channel {
        Channel {
            kind: ChannelKind::Email,
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            from: "uptiq@example.com".to_string(),
            to: vec!["ops@example.com".to_string()],
            ..Channel::default()
        }
    }

    #[tokio::test]
    async fn rejects_missing_host() {
        let mut ch = email_channel();
        ch.smtp_host = String::new();
        let err = send(&ch, "s", "b").await.unwrap_err();
        assert!(matches!(err, NotifyError::EmailConfig(_)));
        assert!(err.to_string().contains("smtp_host"));
    }

    #[tokio::test]
    async fn rejects_missing_port() {
        let mut ch = email_channel();
        ch.smtp_port = 0;
        let err = send(&ch, "s", "b").await.unwrap_err();
        assert!(err.to_string().contains("smtp_port"));
    }

    #[tokio::test]
    async fn rejects_missing_from_and_to() {
        let mut ch = email_channel();
        ch.from = String::new();
        assert!(send(&ch, "s", "b").await.is_err());

        let mut ch = email_channel();
        ch.to.clear();
        assert!(send(&ch, "s", "b").await.is_err());
    }

    #[tokio::test]
    async fn rejects_invalid_addresses() {
        let mut ch = email_channel();
        ch.from = "not-an-email".to_string();
        let err = send(&ch, "s", "b").await.unwrap_err();
        assert!(matches!(err, NotifyError::Address(_, _)));

        let mut ch = email_channel();
        ch.to = vec!["also not an email".to_string()];
        let err = send(&ch, "s", "b").await.unwrap_err();
        assert!(matches!(err, NotifyError::Address(_, _)));
    }

    #[tokio::test]
    async fn rejects_whitespace_only_recipients() {
        let mut ch = email_channel();
        ch.to = vec!["  ".to_string(), String::new()];
        let err = send(&ch, "s", "b").await.unwrap_err();
        assert!(err.to_string().contains("no valid recipients"));
    }

    #[test]
    fn sanitize_header_strips_line_breaks() {
        assert_eq!(
            sanitize_header("Subject\r\nBcc: attacker@evil.test"),
            "Subject  Bcc: attacker@evil.test"
        );
        assert_eq!(sanitize_header("  plain  "), "plain");
    }

    #[test]
    fn transport_policy_by_port_and_credentials() {
        // Implicit TLS port and STARTTLS-with-credentials both build.
        let mut ch = email_channel();
        ch.smtp_port = 465;
        assert!(build_transport(&ch).is_ok());

        let mut ch = email_channel();
        ch.username = "user".to_string();
        ch.password = "pass".to_string();
        assert!(build_transport(&ch).is_ok());

        // No credentials on a plain port is allowed (opportunistic TLS).
        assert!(build_transport(&email_channel()).is_ok());
    }
}
