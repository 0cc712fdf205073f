//! Alerting
//!
//! A per-service state machine turns the stream of check results into
//! deduplicated down/recovery alerts. Routes bind services to channels and
//! are compiled once per configuration; payloads are rendered once and
//! fanned out to Discord/Slack webhooks and SMTP. The engine lock covers
//! state inspection and mutation only; all delivery I/O happens outside it.

mod email;
mod engine;
mod message;
mod routing;
mod state;

pub use engine::{Engine, NotifyError};
pub use message::{AlertPayload, MessageBuilder, PayloadKind};
pub use routing::{ResolvedPolicy, ResolvedRoute, Router};
pub use state::{AlertState, ServiceState, StateManager};
