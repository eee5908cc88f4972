// Process control services
pub mod command_runner;
pub mod process_control;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub use command_runner::{run_command, CommandError};
pub use process_control::{wait_for_exit, ProcessTerminator, Signal, TerminationError};

/// Outcome of one termination request, as reported back to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationReport {
    pub process_name: String,
    pub pid: u32,
    pub signal: Signal,
    pub timestamp: DateTime<Local>,
    pub success: bool,
    /// Whether the process had left the process table within the grace period.
    pub exited: bool,
    /// Ports the PID still held on the rescan after the grace period.
    pub remaining_ports: Vec<u16>,
    pub error_message: Option<String>,
}

impl TerminationReport {
    pub fn new(process_name: &str, pid: u32, signal: Signal) -> Self {
        Self {
            process_name: process_name.to_string(),
            pid,
            signal,
            timestamp: Local::now(),
            success: false,
            exited: false,
            remaining_ports: Vec::new(),
            error_message: None,
        }
    }

    pub fn fail(&mut self, error: &TerminationError) {
        self.success = false;
        self.error_message = Some(error.to_string());
    }

    pub fn summary(&self) -> String {
        if let Some(error) = &self.error_message {
            return error.clone();
        }
        if self.remaining_ports.is_empty() {
            format!(
                "{} (PID: {}) stopped by {}; all its ports are free.",
                self.process_name, self.pid, self.signal
            )
        } else {
            let ports = self
                .remaining_ports
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{} sent to {} (PID: {}), but it still holds: {}.",
                self.signal, self.process_name, self.pid, ports
            )
        }
    }
}
