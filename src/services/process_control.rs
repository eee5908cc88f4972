//! Sends termination signals to processes through the system `kill` command.
//!
//! Escalation is left to the caller: [`ProcessTerminator::terminate`] sends
//! `SIGTERM` once, and [`ProcessTerminator::force_terminate`] is a separate call
//! that sends `SIGKILL`. Nothing is retried automatically.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessStatus, System};
use thiserror::Error;
use tracing::{info, warn};

use super::command_runner::{run_command, CommandError};
use crate::utils::is_protected;

const DEFAULT_KILL_PROGRAM: &str = "kill";
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// Graceful termination, `SIGTERM`.
    Term,
    /// Unconditional kill, `SIGKILL`.
    Kill,
}

impl Signal {
    /// Flag passed to the `kill` command.
    pub fn flag(&self) -> &'static str {
        match self {
            Signal::Term => "-15",
            Signal::Kill => "-9",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Term => f.write_str("SIGTERM"),
            Signal::Kill => f.write_str("SIGKILL"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TerminationError {
    #[error("Refusing to terminate system process {name} (PID: {pid}).")]
    Protected { name: String, pid: u32 },
    #[error("Failed to send {signal} to process {name} (PID: {pid}). You may not have sufficient permissions: {source}")]
    Signal {
        name: String,
        pid: u32,
        signal: Signal,
        #[source]
        source: CommandError,
    },
}

impl TerminationError {
    pub fn pid(&self) -> u32 {
        match self {
            TerminationError::Protected { pid, .. } | TerminationError::Signal { pid, .. } => *pid,
        }
    }
}

/// Delivers termination signals to a PID.
#[derive(Debug, Clone)]
pub struct ProcessTerminator {
    kill_program: PathBuf,
}

impl Default for ProcessTerminator {
    fn default() -> Self {
        Self::new(DEFAULT_KILL_PROGRAM)
    }
}

impl ProcessTerminator {
    pub fn new(kill_program: impl Into<PathBuf>) -> Self {
        Self {
            kill_program: kill_program.into(),
        }
    }

    /// Requests graceful termination (`SIGTERM`).
    pub async fn terminate(&self, name: &str, pid: u32) -> Result<(), TerminationError> {
        self.send(name, pid, Signal::Term).await
    }

    /// Escalates with `SIGKILL`.
    pub async fn force_terminate(&self, name: &str, pid: u32) -> Result<(), TerminationError> {
        self.send(name, pid, Signal::Kill).await
    }

    /// Sends `signal` to `pid`. Protected processes are refused before anything
    /// is spawned.
    pub async fn send(&self, name: &str, pid: u32, signal: Signal) -> Result<(), TerminationError> {
        if is_protected(name, pid) {
            warn!(name, pid, "refusing to signal protected process");
            return Err(TerminationError::Protected {
                name: name.to_string(),
                pid,
            });
        }

        let pid_arg = pid.to_string();
        match run_command(&self.kill_program, [signal.flag(), pid_arg.as_str()]).await {
            Ok(_) => {
                info!(name, pid, %signal, "signal delivered");
                Ok(())
            }
            Err(source) => {
                warn!(name, pid, %signal, error = %source, "signal delivery failed");
                Err(TerminationError::Signal {
                    name: name.to_string(),
                    pid,
                    signal,
                    source,
                })
            }
        }
    }
}

/// Waits until `pid` has left the process table, or `timeout` elapses.
///
/// Zombies count as exited. Returns `true` when the process is gone.
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let target = Pid::from_u32(pid);
    let mut system = System::new();

    loop {
        let alive = system.refresh_process(target)
            && system
                .process(target)
                .map_or(false, |p| p.status() != ProcessStatus::Zombie);
        if !alive {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}
