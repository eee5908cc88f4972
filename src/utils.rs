//! # Utilities
//!
//! A module for shared utility functions.

/// Critical OS processes that must never be offered for termination.
pub const SYSTEM_PROCESSES: &[&str] = &[
    "kernel_task",
    "launchd",
    "syslogd",
    "mDNSResponder",
    "configd",
    "distnoted",
    "loginwindow",
    "WindowServer",
    "UserEventAgent",
    "taskgated",
    "init",
    "systemd",
    "kthreadd",
];

/// PIDs below this are treated as reserved for the system.
pub const MIN_USER_PID: u32 = 100;

/// Width `lsof` cuts the COMMAND column to unless run with `+c`.
pub const LSOF_COMMAND_WIDTH: usize = 9;

/// Checks if the current process is running as root.
///
/// Without root, `lsof` only reports sockets owned by the current user.
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Whether `process_name`/`pid` identifies a process that must not be terminated.
///
/// The name comparison ignores case. A name of at least [`LSOF_COMMAND_WIDTH`]
/// characters also matches the system names it is a prefix of, since `lsof`
/// reports `mDNSResponder` as `mDNSRespo`.
pub fn is_protected(process_name: &str, pid: u32) -> bool {
    pid < MIN_USER_PID
        || SYSTEM_PROCESSES
            .iter()
            .any(|&sys_proc| matches_system_name(sys_proc, process_name))
}

fn matches_system_name(sys_proc: &str, name: &str) -> bool {
    if sys_proc.eq_ignore_ascii_case(name) {
        return true;
    }
    name.len() >= LSOF_COMMAND_WIDTH
        && sys_proc
            .get(..name.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(name))
}
