use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

/// Health state of a service as seen by the alert engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlertState {
    #[default]
    Unknown,
    Up,
    Down,
}

/// Per-service alerting state. An outage episode starts on the Up -> Down
/// transition and ends on Down -> Up.
#[derive(Debug, Clone, Default)]
pub struct ServiceState {
    pub state: AlertState,
    pub consecutive_failures: u32,
    /// Whether a down alert went out for the current outage episode.
    pub down_notified: bool,
    /// When the last down alert (first or reminder) was dispatched.
    pub last_down_alert_at: Option<Instant>,
    pub last_result_at: Option<Instant>,
}

/// Owner of the per-service state map. One mutex guards the whole map;
/// holders never perform I/O under it.
pub struct StateManager {
    state: Mutex<HashMap<String, ServiceState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of a service's state, creating the default entry if the
    /// service has not been seen yet.
    pub fn get(&self, service_id: &str) -> ServiceState {
        let mut state = self.state.lock();
        state.entry(service_id.to_string()).or_default().clone()
    }

    /// Fetch-or-create the entry and mutate it under the lock.
    pub fn with_state<R>(&self, service_id: &str, f: impl FnOnce(&mut ServiceState) -> R) -> R {
        let mut state = self.state.lock();
        f(state.entry(service_id.to_string()).or_default())
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn get_creates_default_state() {
        let sm = StateManager::new();
        let state = sm.get("svc-1");

        assert_eq!(state.state, AlertState::Unknown);
        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.down_notified);
        assert!(state.last_down_alert_at.is_none());
    }

    #[test]
    fn mutations_persist() {
        let sm = StateManager::new();
        sm.with_state("svc-1", |st| {
            st.state = AlertState::Up;
            st.consecutive_failures = 5;
        });

        let state = sm.get("svc-1");
        assert_eq!(state.state, AlertState::Up);
        assert_eq!(state.consecutive_failures, 5);
    }

    #[test]
    fn services_are_independent() {
        let sm = StateManager::new();
        sm.with_state("svc-1", |st| st.state = AlertState::Up);
        sm.with_state("svc-2", |st| st.state = AlertState::Down);

        assert_eq!(sm.get("svc-1").state, AlertState::Up);
        assert_eq!(sm.get("svc-2").state, AlertState::Down);
    }

    #[test]
    fn with_state_returns_closure_value() {
        let sm = StateManager::new();
        let failures = sm.with_state("svc-1", |st| {
            st.consecutive_failures += 1;
            st.consecutive_failures
        });
        assert_eq!(failures, 1);
    }

    #[test]
    fn transition_sequence() {
        let sm = StateManager::new();
        assert_eq!(sm.get("svc").state, AlertState::Unknown);

        sm.with_state("svc", |st| st.state = AlertState::Up);
        assert_eq!(sm.get("svc").state, AlertState::Up);

        sm.with_state("svc", |st| st.state = AlertState::Down);
        assert_eq!(sm.get("svc").state, AlertState::Down);

        sm.with_state("svc", |st| st.state = AlertState::Up);
        assert_eq!(sm.get("svc").state, AlertState::Up);
    }

    #[test]
    fn failure_tracking_resets_on_success() {
        let sm = StateManager::new();
        for i in 1..=5 {
            sm.with_state("svc", |st| st.consecutive_failures += 1);
            assert_eq!(sm.get("svc").consecutive_failures, i);
        }
        sm.with_state("svc", |st| st.consecutive_failures = 0);
        assert_eq!(sm.get("svc").consecutive_failures, 0);
    }

    #[test]
    fn notification_flags_follow_episode() {
        let sm = StateManager::new();
        let now = Instant::now();

        sm.with_state("svc", |st| {
            st.state = AlertState::Down;
            st.down_notified = true;
            st.last_down_alert_at = Some(now);
        });
        let state = sm.get("svc");
        assert!(state.down_notified);
        assert_eq!(state.last_down_alert_at, Some(now));

        sm.with_state("svc", |st| {
            st.state = AlertState::Up;
            st.down_notified = false;
        });
        assert!(!sm.get("svc").down_notified);
    }

    #[test]
    fn concurrent_increments_are_serialized() {
        let sm = Arc::new(StateManager::new());
        let threads: u32 = 100;
        let iterations: u32 = 100;

        std::thread::scope(|scope| {
            for _ in 0..threads {
                let sm = Arc::clone(&sm);
                scope.spawn(move || {
                    for _ in 0..iterations {
                        sm.with_state("svc-1", |st| st.consecutive_failures += 1);
                    }
                });
            }
        });

        assert_eq!(
            sm.get("svc-1").consecutive_failures,
            threads * iterations
        );
    }

    #[test]
    fn concurrent_access_across_services() {
        let sm = Arc::new(StateManager::new());
        let per_service: u32 = 10;
        let iterations: u32 = 100;

        std::thread::scope(|scope| {
            for s in 0..10 {
                for _ in 0..per_service {
                    let sm = Arc::clone(&sm);
                    scope.spawn(move || {
                        let id = format!("svc-{s}");
                        for _ in 0..iterations {
                            sm.with_state(&id, |st| st.consecutive_failures += 1);
                        }
                    });
                }
            }
        });

        for s in 0..10 {
            assert_eq!(
                sm.get(&format!("svc-{s}")).consecutive_failures,
                per_service * iterations
            );
        }
    }
}
