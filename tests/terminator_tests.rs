//! Process termination against real processes (Unix only) and the
//! protection rules.

use std::time::Duration;

use portkeeper::services::{wait_for_exit, CommandError, ProcessTerminator, TerminationError};
use portkeeper::utils::is_protected;

#[test]
fn protection_rules() {
    assert!(is_protected("anything", 1));
    assert!(is_protected("KERNEL_TASK", 5000));
    assert!(is_protected("systemd", 5000));
    assert!(!is_protected("my-dev-server", 100));
    assert!(!is_protected("Chrome", 31337));
}

#[cfg(unix)]
fn kill_program() -> Option<&'static str> {
    ["/bin/kill", "/usr/bin/kill"]
        .into_iter()
        .find(|p| std::path::Path::new(p).exists())
}

#[cfg(unix)]
fn spawn_sleeper() -> std::process::Child {
    std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("sleep should be available")
}

#[cfg(unix)]
#[tokio::test]
async fn terminate_sends_sigterm() {
    use std::os::unix::process::ExitStatusExt;

    let Some(kill) = kill_program() else {
        return;
    };
    let mut child = spawn_sleeper();
    let pid = child.id();
    if is_protected("sleep", pid) {
        let _ = child.kill();
        return;
    }

    ProcessTerminator::new(kill).terminate("sleep", pid).await.unwrap();
    let status = child.wait().unwrap();
    assert_eq!(status.signal(), Some(libc::SIGTERM));
    assert!(wait_for_exit(pid, Duration::from_secs(1)).await);
}

#[cfg(unix)]
#[tokio::test]
async fn force_terminate_sends_sigkill() {
    use std::os::unix::process::ExitStatusExt;

    let Some(kill) = kill_program() else {
        return;
    };
    let mut child = spawn_sleeper();
    let pid = child.id();
    if is_protected("sleep", pid) {
        let _ = child.kill();
        return;
    }

    ProcessTerminator::new(kill)
        .force_terminate("sleep", pid)
        .await
        .unwrap();
    let status = child.wait().unwrap();
    assert_eq!(status.signal(), Some(libc::SIGKILL));
}

#[cfg(unix)]
#[tokio::test]
async fn non_zero_exit_is_reported_once_with_name_and_pid() {
    // `false` accepts any arguments and always exits 1.
    let terminator = ProcessTerminator::new("false");
    let err = terminator.terminate("node", 424242).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("node"), "{}", message);
    assert!(message.contains("PID: 424242"), "{}", message);
    assert_eq!(err.pid(), 424242);
    assert!(matches!(
        err,
        TerminationError::Signal {
            source: CommandError::Failed { code: 1, .. },
            ..
        }
    ));
}

#[tokio::test]
async fn wait_for_exit_on_missing_pid_returns_immediately() {
    // Above the largest PID Linux can hand out.
    assert!(wait_for_exit(4_194_305, Duration::from_millis(10)).await);
}

#[tokio::test]
async fn wait_for_exit_times_out_on_live_process() {
    assert!(!wait_for_exit(std::process::id(), Duration::from_millis(100)).await);
}
