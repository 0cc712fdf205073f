use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::types::{
    Channel, ChannelKind, Config, GlobalConfig, ServiceKind, DEFAULT_INTERVAL, DEFAULT_JITTER,
    DEFAULT_LOG_LEVEL, DEFAULT_SCRAPE_BIND, DEFAULT_TIMEOUT, DEFAULT_WORKER_COUNT,
};

static ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new("^[A-Za-z0-9_-]+$").unwrap());

/// Configuration loading and validation errors. All of these are fatal at
/// boot; during a hot reload the caller keeps the previous configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("config validation failed:\n- {}", .0.join("\n- "))]
    Validation(Vec<String>),
}

/// Load a configuration file, expand environment references, apply
/// defaults, and validate the result.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let expanded = expand_env(&raw);

    let mut cfg: Config =
        serde_yaml::from_str(&expanded).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    apply_defaults(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

/// Expand `$VAR` and `${VAR}` references from the process environment.
/// Unset variables expand to the empty string.
pub(crate) fn expand_env(input: &str) -> String {
    static VAR_REGEX: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap());

    VAR_REGEX
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            std::env::var(name).unwrap_or_default()
        })
        .into_owned()
}

pub(crate) fn apply_defaults(cfg: &mut Config) {
    apply_global_defaults(&mut cfg.global);

    for svc in &mut cfg.services {
        if svc.timeout.is_empty() {
            svc.timeout = cfg.global.default_timeout.clone();
        }
        if svc.interval.is_empty() {
            svc.interval = cfg.global.default_interval.clone();
        }
        if svc.method.is_empty() && svc.kind == ServiceKind::Http {
            svc.method = "GET".to_string();
        }
    }
}

pub(crate) fn apply_global_defaults(global: &mut GlobalConfig) {
    if global.scrape_bind.is_empty() {
        global.scrape_bind = DEFAULT_SCRAPE_BIND.to_string();
    }
    if global.log_level.is_empty() {
        global.log_level = DEFAULT_LOG_LEVEL.to_string();
    }
    if global.default_timeout.is_empty() {
        global.default_timeout = DEFAULT_TIMEOUT.to_string();
    }
    if global.default_interval.is_empty() {
        global.default_interval = DEFAULT_INTERVAL.to_string();
    }
    if global.worker_count == 0 {
        global.worker_count = DEFAULT_WORKER_COUNT;
    }
    if global.jitter.is_empty() {
        global.jitter = DEFAULT_JITTER.to_string();
    }
}

/// Validate the whole document, collecting every problem instead of
/// stopping at the first. Errors are sorted for stable output.
pub(crate) fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let mut errs = validate_global(&cfg.global);

    let mut seen_ids = std::collections::HashSet::new();
    for (i, s) in cfg.services.iter().enumerate() {
        let p = format!("services[{i}]");

        if s.id.is_empty() {
            errs.push(format!("{p}.id is required"));
        } else {
            if !ID_REGEX.is_match(&s.id) {
                errs.push(format!(
                    "{p}.id {:?} contains invalid characters (use letters, numbers, _, -)",
                    s.id
                ));
            }
            if !seen_ids.insert(s.id.clone()) {
                errs.push(format!("{p}.id {:?} is duplicated", s.id));
            }
        }

        if s.name.is_empty() {
            errs.push(format!("{p}.name is required"));
        }

        match s.kind {
            ServiceKind::Http => {
                if s.url.is_empty() {
                    errs.push(format!("{p}.url is required for type=http"));
                }
            }
            ServiceKind::Tcp => {
                if s.host.is_empty() {
                    errs.push(format!("{p}.host is required for type=tcp"));
                }
                if s.port == 0 {
                    errs.push(format!(
                        "{p}.port must be between 1 and 65535 for type=tcp (got {})",
                        s.port
                    ));
                }
            }
        }

        if let Err(e) = humantime::parse_duration(&s.interval) {
            errs.push(format!(
                "{p}.interval must be a valid duration {:?}: {e}",
                s.interval
            ));
        }
        if let Err(e) = humantime::parse_duration(&s.timeout) {
            errs.push(format!(
                "{p}.timeout must be a valid duration {:?}: {e}",
                s.timeout
            ));
        }
    }

    for (name, ch) in &cfg.alerting.channels {
        if name.is_empty() {
            errs.push("alerting.channels contains an empty name".to_string());
            continue;
        }
        errs.extend(validate_channel(name, ch));
    }

    if !cfg.alerting.routes.is_empty() && cfg.alerting.channels.is_empty() {
        errs.push("alerting.routes defined but no alerting.channels present".to_string());
    }
    for (i, r) in cfg.alerting.routes.iter().enumerate() {
        let p = format!("alerting.routes[{i}]");
        for ch_name in &r.notify {
            if !cfg.alerting.channels.contains_key(ch_name) {
                errs.push(format!("{p}.notify references undefined channel {ch_name:?}"));
            }
        }
        if !r.policy.cooldown.is_empty() {
            if let Err(e) = humantime::parse_duration(&r.policy.cooldown) {
                errs.push(format!(
                    "{p}.policy.cooldown must be a valid duration {:?}: {e}",
                    r.policy.cooldown
                ));
            }
        }
    }

    if errs.is_empty() {
        Ok(())
    } else {
        errs.sort();
        Err(ConfigError::Validation(errs))
    }
}

fn validate_global(global: &GlobalConfig) -> Vec<String> {
    let mut errs = Vec::new();
    if !is_host_port(&global.scrape_bind) {
        errs.push(format!(
            "global.scrape_bind must be a valid host:port (got {:?})",
            global.scrape_bind
        ));
    }
    if let Err(e) = humantime::parse_duration(&global.default_timeout) {
        errs.push(format!(
            "global.default_timeout must be a valid duration {:?}: {e}",
            global.default_timeout
        ));
    }
    if let Err(e) = humantime::parse_duration(&global.default_interval) {
        errs.push(format!(
            "global.default_interval must be a valid duration {:?}: {e}",
            global.default_interval
        ));
    }
    if let Err(e) = humantime::parse_duration(&global.jitter) {
        errs.push(format!(
            "global.jitter must be a valid duration {:?}: {e}",
            global.jitter
        ));
    }
    if global.worker_count < 1 || global.worker_count > 1000 {
        errs.push(format!(
            "global.worker_count must be between 1 and 1000 (got {})",
            global.worker_count
        ));
    }
    errs
}

fn validate_channel(name: &str, ch: &Channel) -> Vec<String> {
    let mut errs = Vec::new();
    match ch.kind {
        ChannelKind::Discord | ChannelKind::Slack => {
            if ch.webhook_url.trim().is_empty() {
                errs.push(format!(
                    "alerting.channels[{name:?}].webhook_url is required for type={}",
                    ch.kind
                ));
            }
        }
        ChannelKind::Email => {
            if ch.smtp_host.trim().is_empty() {
                errs.push(format!(
                    "alerting.channels[{name:?}].smtp_host is required for type=email"
                ));
            }
            if ch.smtp_port == 0 {
                errs.push(format!(
                    "alerting.channels[{name:?}].smtp_port is required for type=email"
                ));
            }
            if ch.from.trim().is_empty() {
                errs.push(format!(
                    "alerting.channels[{name:?}].from is required for type=email"
                ));
            }
            if ch.to.is_empty() {
                errs.push(format!(
                    "alerting.channels[{name:?}].to is required for type=email"
                ));
            }
        }
    }
    errs
}

/// `host:port` with a non-empty host and a numeric port. `SocketAddr`
/// parsing alone is too strict here since the host may be a DNS name.
fn is_host_port(s: &str) -> bool {
    match s.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
