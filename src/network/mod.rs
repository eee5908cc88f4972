//! # Network Module
//!
//! This module turns the output of the system socket listing tool into a model of
//! which process owns which port. Raw lines are parsed into [`PortRecord`]s,
//! folded into [`ProcessGroup`]s with a display order that survives rescans, and
//! published as an immutable [`ScanSnapshot`] by the [`ScanEngine`].

pub mod filter;
pub mod grouping;
pub mod lsof;
pub mod process_monitor;
pub mod process_name;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub use filter::ProcessFilter;
pub use grouping::{group_records, OrderTable};
pub use lsof::parse_lsof_output;
pub use process_monitor::{
    LsofSource, PortSource, PublishedState, ScanEngine, ScanError, ScanOutcome,
};
pub use process_name::sanitize_process_name;

/// Transport protocol of an observed socket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("tcp") {
            Ok(Protocol::Tcp)
        } else if s.eq_ignore_ascii_case("udp") {
            Ok(Protocol::Udp)
        } else {
            Err(format!("unknown protocol `{}` (expected tcp or udp)", s))
        }
    }
}

/// One (port, protocol, owning process) observation from a single scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PortRecord {
    pub port: u16,
    pub protocol: Protocol,
    /// Cleaned display name, may be empty.
    pub process_name: String,
    pub pid: u32,
    /// Command token exactly as the tool reported it.
    pub command: String,
    /// Connection state such as `LISTEN`, absent for UDP.
    pub state: Option<String>,
}

impl PortRecord {
    /// `"8080 (TCP)"`
    pub fn display_text(&self) -> String {
        format!("{} ({})", self.port, self.protocol)
    }

    /// `"Chrome (PID: 1234)"`
    pub fn process_info(&self) -> String {
        format!("{} (PID: {})", self.process_name, self.pid)
    }
}

/// All ports currently held by one (process name, PID) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessGroup {
    pub process_name: String,
    pub pid: u32,
    pub command: String,
    pub ports: Vec<PortRecord>,
    pub order_index: u64,
}

impl ProcessGroup {
    /// Grouping key shared with the engine's order table.
    pub fn unique_key(&self) -> String {
        unique_key(&self.process_name, self.pid)
    }

    pub fn sorted_ports(&self) -> Vec<&PortRecord> {
        let mut ports: Vec<&PortRecord> = self.ports.iter().collect();
        ports.sort_by_key(|p| (p.port, p.protocol));
        ports
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Up to three ascending ports, with `...` when more are held.
    pub fn port_summary(&self) -> String {
        let sorted = self.sorted_ports();
        let main_ports = sorted
            .iter()
            .take(3)
            .map(|p| p.port.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        if sorted.len() > 3 {
            format!("{}...", main_ports)
        } else {
            main_ports
        }
    }

    pub fn protocols(&self) -> BTreeSet<Protocol> {
        self.ports.iter().map(|p| p.protocol).collect()
    }

    pub fn has_tcp_ports(&self) -> bool {
        self.ports.iter().any(|p| p.protocol == Protocol::Tcp)
    }

    pub fn has_udp_ports(&self) -> bool {
        self.ports.iter().any(|p| p.protocol == Protocol::Udp)
    }

    pub fn display_text(&self) -> String {
        format!("{} (PID: {})", self.process_name, self.pid)
    }

    /// Whether the UI should refuse to offer termination for this process.
    pub fn is_protected(&self) -> bool {
        crate::utils::is_protected(&self.process_name, self.pid)
    }
}

pub(crate) fn unique_key(process_name: &str, pid: u32) -> String {
    format!("{}-{}", process_name, pid)
}

/// The published result of one scan cycle. Never mutated once built.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanSnapshot {
    /// Ordered by the engine's order table.
    pub processes: Vec<ProcessGroup>,
    /// Every record of the scan, ascending by port.
    pub ports: Vec<PortRecord>,
    /// `None` until the first successful scan.
    pub scanned_at: Option<DateTime<Local>>,
}

impl ScanSnapshot {
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn find_pid(&self, pid: u32) -> Option<&ProcessGroup> {
        self.processes.iter().find(|g| g.pid == pid)
    }
}
