use std::collections::HashMap;
use std::time::Duration;

use crate::config::{AlertingConfig, RoutePolicy};

/// Policy with defaults applied and the cooldown parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedPolicy {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub recovery_alert: bool,
}

/// Per-service projection of every matching route: channels unioned,
/// policy merged conservatively.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRoute {
    pub channels: Vec<String>,
    pub policy: ResolvedPolicy,
    /// True iff at least one route matched and the channel union is
    /// non-empty.
    pub valid: bool,
}

struct CompiledRoute {
    notify: Vec<String>,
    policy: ResolvedPolicy,
}

/// Routes compiled once per configuration, with a service-id index for
/// constant-time resolution on the probe path.
pub struct Router {
    routes: Vec<CompiledRoute>,
    index: HashMap<String, Vec<usize>>,
}

impl Router {
    pub fn new(cfg: &AlertingConfig) -> Self {
        let mut routes = Vec::with_capacity(cfg.routes.len());
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();

        for (i, raw) in cfg.routes.iter().enumerate() {
            for id in clean_strings(&raw.r#match.service_ids) {
                index.entry(id).or_default().push(i);
            }
            routes.push(CompiledRoute {
                notify: clean_strings(&raw.notify),
                policy: compile_policy(&raw.policy),
            });
        }

        Self { routes, index }
    }

    /// Union channels across matching routes (deduplicated, first-seen
    /// order) and merge policies: threshold = max, cooldown = max,
    /// recovery = any.
    pub fn resolve(&self, service_id: &str) -> ResolvedRoute {
        let Some(idxs) = self.index.get(service_id) else {
            return ResolvedRoute::default();
        };

        let mut channels: Vec<String> = Vec::new();
        let mut policy = ResolvedPolicy {
            failure_threshold: 1,
            ..ResolvedPolicy::default()
        };

        for (n, &idx) in idxs.iter().enumerate() {
            let route = &self.routes[idx];
            for ch in &route.notify {
                if !channels.contains(ch) {
                    channels.push(ch.clone());
                }
            }
            policy = if n == 0 {
                route.policy
            } else {
                merge_policy(policy, route.policy)
            };
        }

        if channels.is_empty() {
            return ResolvedRoute::default();
        }

        ResolvedRoute {
            channels,
            policy,
            valid: true,
        }
    }
}

/// Apply defaults and parse the cooldown: threshold 0 becomes 1, an empty
/// or unparseable or non-positive cooldown becomes 0.
pub(crate) fn compile_policy(p: &RoutePolicy) -> ResolvedPolicy {
    let failure_threshold = if p.failure_threshold > 0 {
        p.failure_threshold
    } else {
        1
    };
    let cooldown = humantime::parse_duration(p.cooldown.trim())
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(Duration::ZERO);

    ResolvedPolicy {
        failure_threshold,
        cooldown,
        recovery_alert: p.recovery_alert,
    }
}

pub(crate) fn merge_policy(base: ResolvedPolicy, other: ResolvedPolicy) -> ResolvedPolicy {
    ResolvedPolicy {
        failure_threshold: base.failure_threshold.max(other.failure_threshold),
        cooldown: base.cooldown.max(other.cooldown),
        recovery_alert: base.recovery_alert || other.recovery_alert,
    }
}

/// Trim entries and drop the empty ones.
pub(crate) fn clean_strings(input: &[String]) -> Vec<String> {
    input
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
