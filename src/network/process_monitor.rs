use chrono::Local;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::grouping::{group_records, OrderTable};
use super::lsof::parse_lsof_output;
use super::ScanSnapshot;
use crate::services::command_runner::{run_command, CommandError};

const DEFAULT_LSOF_PROGRAM: &str = "lsof";
// IP sockets only, numeric ports, no host name resolution.
const LSOF_ARGS: [&str; 3] = ["-i", "-P", "-n"];

/// Where raw socket listings come from.
pub trait PortSource: Send + Sync + 'static {
    /// Returns the full text output of one enumeration run.
    fn fetch(&self) -> impl Future<Output = Result<String, CommandError>> + Send;
}

/// Runs `lsof -i -P -n`.
#[derive(Debug, Clone)]
pub struct LsofSource {
    program: PathBuf,
}

impl LsofSource {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for LsofSource {
    fn default() -> Self {
        Self::new(DEFAULT_LSOF_PROGRAM)
    }
}

impl PortSource for LsofSource {
    fn fetch(&self) -> impl Future<Output = Result<String, CommandError>> + Send {
        run_command(&self.program, LSOF_ARGS)
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    /// The enumeration tool could not be started or exited non-zero.
    #[error("port scan failed: {0}")]
    ToolInvocation(#[from] CommandError),
}

#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Published(Arc<ScanSnapshot>),
    /// Another scan was in flight; this request was dropped.
    AlreadyRunning,
}

/// Everything a presentation layer may read.
#[derive(Debug, Clone, Default)]
pub struct PublishedState {
    pub snapshot: Arc<ScanSnapshot>,
    pub is_scanning: bool,
    /// Message of the last failed scan, cleared by the next successful one.
    pub error: Option<String>,
}

struct EngineInner<S> {
    source: S,
    scanning: AtomicBool,
    order: Mutex<OrderTable>,
    state: watch::Sender<PublishedState>,
}

/// Runs scans, keeps the order table and publishes snapshots.
///
/// Cloning is cheap and every clone shares the same state, including the
/// single-flight guard.
pub struct ScanEngine<S = LsofSource> {
    inner: Arc<EngineInner<S>>,
}

impl<S> Clone for ScanEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ScanEngine<LsofSource> {
    pub fn with_lsof(program: impl Into<PathBuf>) -> Self {
        Self::new(LsofSource::new(program))
    }
}

impl<S: PortSource> ScanEngine<S> {
    pub fn new(source: S) -> Self {
        let (state, _) = watch::channel(PublishedState::default());
        Self {
            inner: Arc::new(EngineInner {
                source,
                scanning: AtomicBool::new(false),
                order: Mutex::new(OrderTable::new()),
                state,
            }),
        }
    }

    /// Runs one scan cycle and publishes its result.
    ///
    /// Returns [`ScanOutcome::AlreadyRunning`] without doing anything when a scan
    /// is already in flight. On failure the previous snapshot stays published
    /// alongside the error message.
    pub async fn scan(&self) -> Result<ScanOutcome, ScanError> {
        let Some(guard) = ScanGuard::acquire(&self.inner.scanning, &self.inner.state) else {
            debug!("scan already in progress, request dropped");
            return Ok(ScanOutcome::AlreadyRunning);
        };

        let output = match self.inner.source.fetch().await {
            Ok(output) => output,
            Err(source) => {
                let error = ScanError::from(source);
                warn!(error = %error, "port scan failed");
                let message = error.to_string();
                guard.finish(|state| state.error = Some(message));
                return Err(error);
            }
        };

        let mut ports = parse_lsof_output(&output);
        let processes = {
            let mut table = self
                .inner
                .order
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            group_records(&ports, &mut table)
        };
        ports.sort_by_key(|p| p.port);

        debug!(ports = ports.len(), processes = processes.len(), "scan complete");

        let snapshot = Arc::new(ScanSnapshot {
            processes,
            ports,
            scanned_at: Some(Local::now()),
        });
        let published = Arc::clone(&snapshot);
        guard.finish(move |state| {
            state.snapshot = published;
            state.error = None;
        });

        Ok(ScanOutcome::Published(snapshot))
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanning.load(Ordering::Acquire)
    }

    /// Current published state.
    pub fn latest(&self) -> PublishedState {
        self.inner.state.borrow().clone()
    }

    pub fn latest_snapshot(&self) -> Arc<ScanSnapshot> {
        Arc::clone(&self.inner.state.borrow().snapshot)
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    /// Receives every published state change.
    pub fn subscribe(&self) -> watch::Receiver<PublishedState> {
        self.inner.state.subscribe()
    }

    /// Order slot assigned to `(process_name, pid)`, if it was ever seen.
    pub fn order_index(&self, process_name: &str, pid: u32) -> Option<u64> {
        self.inner
            .order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&super::unique_key(process_name, pid))
    }
}

/// Holds the single-flight flag for the duration of one scan.
///
/// The flag is released inside the same watch update that publishes
/// `is_scanning: false`, so a subscriber woken by that update can start the next
/// scan right away. Dropping an unfinished guard (an early return or a cancelled
/// scan) does the same without touching the snapshot.
struct ScanGuard<'a> {
    flag: &'a AtomicBool,
    state: &'a watch::Sender<PublishedState>,
    finished: bool,
}

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool, state: &'a watch::Sender<PublishedState>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        state.send_modify(|s| s.is_scanning = true);
        info!("scanning ports");
        Some(Self {
            flag,
            state,
            finished: false,
        })
    }

    /// Publishes the final state of this scan and releases the flag.
    fn finish(mut self, update: impl FnOnce(&mut PublishedState)) {
        self.finished = true;
        let flag = self.flag;
        self.state.send_modify(|s| {
            update(s);
            s.is_scanning = false;
            flag.store(false, Ordering::Release);
        });
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let flag = self.flag;
        self.state.send_if_modified(|s| {
            flag.store(false, Ordering::Release);
            std::mem::replace(&mut s.is_scanning, false)
        });
    }
}
