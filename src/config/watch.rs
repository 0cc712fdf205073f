//! Config hot-reload
//!
//! A small polling loop that re-reads the config file when its
//! modification time changes. A reload that parses and validates swaps the
//! scheduler's service set and sets the reload gauge to 1; a broken file
//! leaves the running set untouched and drops the gauge to 0 until a later
//! reload succeeds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::load_config;
use crate::metrics::Collector;
use crate::scheduler::Scheduler;

/// How often the file's mtime is checked.
const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Watch `path` until `cancel` fires, pushing each changed, valid service
/// list into the scheduler.
pub async fn run(
    path: PathBuf,
    scheduler: Arc<Scheduler>,
    collector: Arc<Collector>,
    cancel: CancellationToken,
) {
    let mut last_mtime = mtime(&path);
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(path = %path.display(), "config watcher started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let current = mtime(&path);
                if current == last_mtime {
                    continue;
                }
                last_mtime = current;
                debug!(path = %path.display(), "config file changed");

                match load_config(&path) {
                    Ok(cfg) => {
                        collector.set_config_reload(true);
                        scheduler.update_services(cfg.services);
                        info!(path = %path.display(), "config reloaded");
                    }
                    Err(e) => {
                        collector.set_config_reload(false);
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "config reload failed, keeping previous configuration"
                        );
                    }
                }
            }
        }
    }

    info!("config watcher stopped");
}

fn mtime(path: &PathBuf) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GlobalConfig};
    use crate::metrics::Bundle;

    fn scheduler() -> Arc<Scheduler> {
        let cfg = Config {
            global: GlobalConfig {
                worker_count: 1,
                jitter: "0s".to_string(),
                ..GlobalConfig::default()
            },
            ..Config::default()
        };
        Arc::new(Scheduler::new(&cfg, None, None).unwrap())
    }

    #[tokio::test]
    async fn watcher_stops_on_cancel() {
        let bundle = Bundle::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            PathBuf::from("/nonexistent/config.yml"),
            scheduler(),
            Arc::clone(&bundle.collector),
            cancel.clone(),
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher must stop promptly")
            .unwrap();
    }

    #[test]
    fn mtime_of_missing_file_is_none() {
        assert!(mtime(&PathBuf::from("/definitely/not/here.yml")).is_none());
    }
}
