// Scheduler module for periodic port scans
pub mod config;

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::network::{PortSource, ScanEngine, ScanOutcome};

pub use config::{ConfigError, ScanConfig};

/// Triggers `ScanEngine::scan` on a recurring schedule.
///
/// Periodic scans share the engine's single-flight guard with manual ones, so a
/// tick that lands on a running scan is simply skipped. An interval of zero
/// pauses the schedule until a non-zero interval is set.
pub struct ScanScheduler {
    interval: watch::Sender<u64>,
    handle: JoinHandle<()>,
}

impl ScanScheduler {
    /// Spawns the schedule on the current tokio runtime.
    pub fn start<S: PortSource>(engine: ScanEngine<S>, interval_secs: u64) -> Self {
        let (interval, rx) = watch::channel(interval_secs);
        let handle = tokio::spawn(run_schedule(engine, rx));
        info!(interval_secs, "periodic scanning started");
        Self { interval, handle }
    }

    /// Applies a new interval from the next cycle on; a pending wait is dropped.
    pub fn set_interval(&self, interval_secs: u64) {
        let changed = self.interval.send_if_modified(|current| {
            if *current == interval_secs {
                false
            } else {
                *current = interval_secs;
                true
            }
        });
        if changed {
            info!(interval_secs, "refresh interval changed");
        }
    }

    pub fn interval_secs(&self) -> u64 {
        *self.interval.borrow()
    }

    pub fn is_paused(&self) -> bool {
        self.interval_secs() == 0
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_schedule<S: PortSource>(engine: ScanEngine<S>, mut interval: watch::Receiver<u64>) {
    loop {
        let secs = *interval.borrow_and_update();

        if secs == 0 {
            debug!("periodic scanning paused");
            if interval.changed().await.is_err() {
                break;
            }
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                match engine.scan().await {
                    Ok(ScanOutcome::Published(snapshot)) => {
                        debug!(processes = snapshot.processes.len(), "periodic scan published");
                    }
                    Ok(ScanOutcome::AlreadyRunning) => debug!("periodic scan skipped, one is running"),
                    Err(e) => warn!("periodic scan failed: {}", e),
                }
            }
            changed = interval.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("periodic scanning stopped");
}
