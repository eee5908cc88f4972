// External command runner
// Runs helper tools (lsof, kill) in the background and captures their output

use async_process::{Command, Stdio};
use std::ffi::OsStr;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with status {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },
}

impl CommandError {
    pub fn program(&self) -> &str {
        match self {
            CommandError::Spawn { program, .. } | CommandError::Failed { program, .. } => program,
        }
    }
}

/// Runs `program` with `args` asynchronously and returns its stdout.
///
/// A non-zero exit status is an error. Output is decoded as UTF-8, with invalid
/// bytes replaced rather than rejected.
pub async fn run_command<P, I, S>(program: P, args: I) -> Result<String, CommandError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let program_name = program.display().to_string();

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            program: program_name.clone(),
            source,
        })?;

    debug!(program = %program_name, status = ?output.status, bytes = output.stdout.len(), "command finished");

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Err(CommandError::Failed {
            program: program_name,
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
