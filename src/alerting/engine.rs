use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use super::email;
use super::message::{AlertPayload, MessageBuilder};
use super::routing::{ResolvedPolicy, Router};
use super::state::{AlertState, StateManager};
use crate::checks::CheckResult;
use crate::config::{AlertingConfig, Channel, ChannelKind, Service};
use crate::scheduler::ResultHandler;

/// Deadline for one webhook POST.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(7);

/// Alert delivery errors. Logged at the dispatch site with service and
/// channel context; never retried, never propagated into engine state.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("empty webhook_url")]
    EmptyWebhook,
    #[error("webhook request failed: {0}")]
    Webhook(#[from] reqwest::Error),
    #[error("webhook returned status {0}")]
    WebhookStatus(u16),
    #[error("invalid email channel: {0}")]
    EmailConfig(String),
    #[error("invalid address {0:?}: {1}")]
    Address(String, lettre::address::AddressError),
    #[error("build email: {0}")]
    Email(#[from] lettre::error::Error),
    #[error("smtp: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("email send timed out")]
    EmailTimeout,
}

/// The alert engine: turns the stream of check results into deduplicated,
/// cooldown-throttled alerts and pushes them out through the configured
/// channels.
pub struct Engine {
    client: reqwest::Client,
    channels: HashMap<String, Channel>,
    router: Router,
    state: StateManager,
    messages: MessageBuilder,
}

impl Engine {
    pub fn new(cfg: &AlertingConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            channels: cfg.channels.clone(),
            router: Router::new(cfg),
            state: StateManager::new(),
            messages: MessageBuilder::new(),
        })
    }

    /// Run the state machine for one result and return the payload to
    /// dispatch, if any. State is mutated under the engine lock; no I/O
    /// happens here.
    fn transition(
        &self,
        svc: &Service,
        res: &CheckResult,
        policy: &ResolvedPolicy,
    ) -> Option<AlertPayload> {
        let now = Instant::now();

        self.state.with_state(&svc.id, |st| {
            st.last_result_at = Some(now);

            if res.success {
                st.consecutive_failures = 0;

                let mut payload = None;
                if st.state == AlertState::Down {
                    if policy.recovery_alert && st.down_notified {
                        payload = Some(self.messages.recovery_alert(svc, res));
                    }
                    // A new episode begins; the flag resets either way.
                    st.down_notified = false;
                }
                st.state = AlertState::Up;
                return payload;
            }

            st.consecutive_failures += 1;

            if st.consecutive_failures < policy.failure_threshold {
                if st.state == AlertState::Unknown {
                    st.state = AlertState::Up;
                }
                return None;
            }

            let was_down = st.state == AlertState::Down;
            st.state = AlertState::Down;

            let can_send = policy.cooldown.is_zero()
                || st
                    .last_down_alert_at
                    .map_or(true, |at| now.duration_since(at) >= policy.cooldown);

            if !st.down_notified && can_send {
                st.down_notified = true;
                st.last_down_alert_at = Some(now);
                Some(self.messages.down_alert(
                    svc,
                    res,
                    st.consecutive_failures,
                    policy.failure_threshold,
                ))
            } else if was_down && st.down_notified && can_send {
                st.last_down_alert_at = Some(now);
                Some(self.messages.still_down_alert(
                    svc,
                    res,
                    st.consecutive_failures,
                    policy.failure_threshold,
                ))
            } else {
                None
            }
        })
    }

    async fn dispatch(&self, channel_names: &[String], svc: &Service, payload: &AlertPayload) {
        for name in channel_names {
            let Some(ch) = self.channels.get(name) else {
                warn!(
                    channel = %name,
                    service_id = %svc.id,
                    service_name = %svc.name,
                    "alert channel missing"
                );
                continue;
            };

            let outcome = match ch.kind {
                ChannelKind::Discord => {
                    self.post_json(
                        &ch.webhook_url,
                        &serde_json::json!({ "content": payload.webhook_message }),
                    )
                    .await
                }
                ChannelKind::Slack => {
                    self.post_json(
                        &ch.webhook_url,
                        &serde_json::json!({ "text": payload.webhook_message }),
                    )
                    .await
                }
                ChannelKind::Email => {
                    email::send(ch, &payload.email_subject, &payload.email_body).await
                }
            };

            match outcome {
                Ok(()) => info!(
                    channel = %name,
                    kind = %ch.kind,
                    service_id = %svc.id,
                    service_name = %svc.name,
                    payload = payload.kind.as_str(),
                    "alert sent"
                ),
                Err(e) => warn!(
                    channel = %name,
                    kind = %ch.kind,
                    service_id = %svc.id,
                    service_name = %svc.name,
                    payload = payload.kind.as_str(),
                    error = %e,
                    "alert send failed"
                ),
            }
        }
    }

    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        if url.trim().is_empty() {
            return Err(NotifyError::EmptyWebhook);
        }
        let resp = self.client.post(url).json(payload).send().await?;
        if !resp.status().is_success() {
            return Err(NotifyError::WebhookStatus(resp.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultHandler for Engine {
    async fn handle_result(&self, svc: &Service, res: &CheckResult) {
        let route = self.router.resolve(&svc.id);
        if !route.valid {
            // No routing configured for this service.
            return;
        }

        if let Some(payload) = self.transition(svc, res, &route.policy) {
            self.dispatch(&route.channels, svc, &payload).await;
        }
    }
}
