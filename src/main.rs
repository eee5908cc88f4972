use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use portkeeper::network::{ProcessFilter, Protocol, ScanOutcome, ScanSnapshot};
use portkeeper::services::{
    wait_for_exit, ProcessTerminator, Signal, TerminationError, TerminationReport,
};
use portkeeper::{utils, ScanConfig, ScanEngine, ScanScheduler};

const LOG_FILE_PREFIX: &str = "portkeeper.log";

#[derive(Parser, Debug)]
#[command(
    name = "portkeeper",
    version,
    about = "See which process owns which network port, and stop it."
)]
struct Args {
    /// Config file (defaults to the platform config directory).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Also write logs to a daily-rotated file in this directory.
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan once and print the processes holding ports.
    List {
        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,
        /// Only show processes whose name, command or port contains this text.
        #[arg(long, short)]
        query: Option<String>,
        /// Only show processes with at least one port of this protocol.
        #[arg(long, short)]
        protocol: Option<Protocol>,
    },
    /// Rescan periodically and print every new snapshot (SIGHUP reloads the config).
    Watch {
        /// Seconds between scans, 0 to pause; overrides the config file.
        #[arg(long, short)]
        interval: Option<u64>,
    },
    /// Terminate the process with this PID.
    Kill {
        pid: u32,
        /// Send SIGKILL instead of SIGTERM.
        #[arg(long, short)]
        force: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_dir.as_deref())?;

    if !utils::is_elevated() {
        warn!("Not running as root: only sockets owned by the current user will be listed.");
    }

    let config_path = args.config.clone().or_else(ScanConfig::default_path);
    let config = match &config_path {
        Some(path) => ScanConfig::load_from_file(path)?,
        None => ScanConfig::default(),
    };

    match args.command.unwrap_or(Command::List {
        json: false,
        query: None,
        protocol: None,
    }) {
        Command::List {
            json,
            query,
            protocol,
        } => list(&config, json, ProcessFilter::new(query, protocol)).await?,
        Command::Watch { interval } => watch(config, config_path, interval).await?,
        Command::Kill { pid, force, json } => {
            if !kill(&config, pid, force, json).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("portkeeper=info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

async fn scan_once(engine: &ScanEngine) -> Result<std::sync::Arc<ScanSnapshot>> {
    match engine.scan().await.context("unable to list open ports")? {
        ScanOutcome::Published(snapshot) => Ok(snapshot),
        // Nothing else shares this engine.
        ScanOutcome::AlreadyRunning => Ok(engine.latest_snapshot()),
    }
}

async fn list(config: &ScanConfig, json: bool, filter: ProcessFilter) -> Result<()> {
    let engine = ScanEngine::with_lsof(&config.lsof_path);
    let snapshot = scan_once(&engine).await?;

    if json {
        if filter.is_empty() {
            println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
        } else {
            println!("{}", serde_json::to_string_pretty(&filter.apply(&snapshot.processes))?);
        }
    } else {
        print_snapshot(&snapshot, &filter);
    }
    Ok(())
}

async fn watch(mut config: ScanConfig, config_path: Option<PathBuf>, interval: Option<u64>) -> Result<()> {
    if let Some(secs) = interval {
        config.refresh_interval_secs = secs;
    }

    let engine = ScanEngine::with_lsof(&config.lsof_path);
    let mut updates = engine.subscribe();
    let scheduler = ScanScheduler::start(engine.clone(), config.refresh_interval_secs);

    if let Err(e) = engine.scan().await {
        debug!("initial scan failed: {}", e);
    }

    #[cfg(unix)]
    let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        .context("cannot install SIGHUP handler")?;

    let filter = ProcessFilter::default();
    let mut last_printed = None;
    let mut last_error: Option<String> = None;

    loop {
        #[cfg(unix)]
        let reload = hangup.recv();
        #[cfg(not(unix))]
        let reload = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping.");
                break;
            }
            _ = reload => {
                if let Some(path) = &config_path {
                    match ScanConfig::load_from_file(path) {
                        Ok(reloaded) => {
                            let secs = interval.unwrap_or(reloaded.refresh_interval_secs);
                            scheduler.set_interval(secs);
                        }
                        Err(e) => warn!("config reload failed: {}", e),
                    }
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if !state.is_scanning {
                    if state.error != last_error {
                        if let Some(error) = &state.error {
                            warn!("{}", error);
                        }
                        last_error = state.error.clone();
                    }
                    if last_printed != state.snapshot.scanned_at {
                        last_printed = state.snapshot.scanned_at;
                        print_snapshot(&state.snapshot, &filter);
                    }
                }
            }
        }
    }

    scheduler.stop();
    Ok(())
}

/// Returns whether the signal was delivered.
async fn kill(config: &ScanConfig, pid: u32, force: bool, json: bool) -> Result<bool> {
    let engine = ScanEngine::with_lsof(&config.lsof_path);
    let snapshot = scan_once(&engine).await?;

    let Some(group) = snapshot.find_pid(pid) else {
        bail!("No process with PID {} is holding a port.", pid);
    };
    if group.is_protected() {
        bail!(
            "{} is a system process and cannot be terminated.",
            group.display_text()
        );
    }

    let terminator = ProcessTerminator::new(&config.kill_path);
    let signal = if force { Signal::Kill } else { Signal::Term };
    let mut report = TerminationReport::new(&group.process_name, pid, signal);

    let outcome = terminator.send(&group.process_name, pid, signal).await;
    match &outcome {
        Ok(()) => {
            report.success = true;
            report.exited = wait_for_exit(pid, config.kill_grace_period()).await;
            let after = scan_once(&engine).await?;
            report.remaining_ports = after
                .find_pid(pid)
                .map(|g| g.sorted_ports().iter().map(|p| p.port).collect())
                .unwrap_or_default();
        }
        Err(e) => report.fail(e),
    }

    print_report(&report, outcome, json)
}

/// A failed send is reported once: inside the JSON report, or as the returned error.
fn print_report(
    report: &TerminationReport,
    outcome: Result<(), TerminationError>,
    json: bool,
) -> Result<bool> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(report.success);
    }
    outcome?;
    println!("{}", report.summary());
    Ok(true)
}

fn print_snapshot(snapshot: &ScanSnapshot, filter: &ProcessFilter) {
    let groups = filter.apply(&snapshot.processes);
    if groups.is_empty() {
        println!("No processes are holding ports.");
        return;
    }

    for group in &groups {
        let marker = if group.is_protected() { " [system]" } else { "" };
        println!("{}{}", group.display_text(), marker);
        for port in group.sorted_ports() {
            match &port.state {
                Some(state) => println!("    {:<12} {}", port.display_text(), state),
                None => println!("    {}", port.display_text()),
            }
        }
    }
    println!("{} processes, {} ports", groups.len(), snapshot.ports.len());
}
