//! Declarative daemon configuration
//!
//! A single YAML file describes the monitored services, global scheduler
//! settings, and the alerting channels/routes. Loading expands `$VAR`
//! references from the environment, fills in defaults, and validates the
//! whole document before anything starts.

mod load;
mod types;
pub mod watch;

pub use load::{load_config, ConfigError};
pub use types::{
    AlertingConfig, Channel, ChannelKind, Config, GlobalConfig, Route, RouteMatch, RoutePolicy,
    Service, ServiceKind,
};
