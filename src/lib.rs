//! # Port Keeper
//!
//! Finds out which process owns which network port by parsing `lsof` output, and
//! stops those processes on request.
//!
//! - [`network`]: parsing, grouping and the [`ScanEngine`](network::ScanEngine).
//! - [`services`]: external commands and process termination.
//! - [`scheduler`]: periodic scans and configuration.

pub mod network;
pub mod scheduler;
pub mod services;
pub mod utils;

pub use network::{
    PortRecord, ProcessFilter, ProcessGroup, Protocol, PublishedState, ScanEngine, ScanError,
    ScanOutcome, ScanSnapshot,
};
pub use scheduler::{ScanConfig, ScanScheduler};
pub use services::{ProcessTerminator, Signal, TerminationError, TerminationReport};
