// src/system/executor.rs

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, #[source] std::io::Error),
    #[error("The process pool is shut down; '{0}' was not started.")]
    PoolShutDown(String),
}

/// Observes child processes as they are spawned and reaped.
///
/// This is a test seam: production code never installs a tracker, and a
/// tracker cannot change how a command runs.
pub trait ChildProcessTracker: Send + Sync {
    fn on_spawn(&self, pid: Option<u32>, command: &str, args: &[String]);
    fn on_exit(&self, pid: Option<u32>, command: &str, exit_code: i32);
}

/// How a single command should be run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Capture stdout/stderr instead of inheriting the terminal.
    pub capture_output: bool,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

/// Result of a finished child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    /// Captured standard output (empty when output was inherited).
    pub stdout: String,
    /// Captured standard error (empty when output was inherited).
    pub stderr: String,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs one command to completion.
///
/// On Windows, a program that cannot be found directly (e.g. `npx`, which is
/// really `npx.cmd`) is retried through `cmd /C`.
pub async fn execute(
    program: &str,
    args: &[String],
    options: &ExecutionOptions,
    tracker: Option<&dyn ChildProcessTracker>,
) -> Result<ExecutionResult, ExecutionError> {
    if program.trim().is_empty() {
        return Err(ExecutionError::EmptyCommand);
    }
    let display = display_command(program, args);
    let start = Instant::now();

    let child = match build_command(program, args, options).spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
            log::debug!("Command '{}' not found. Retrying with cmd /C.", program);
            let mut cmd_args = vec!["/C".to_string(), program.to_string()];
            cmd_args.extend(args.iter().cloned());
            build_command("cmd", &cmd_args, options)
                .spawn()
                .map_err(|e| ExecutionError::CommandFailed(display.clone(), e))?
        }
        Err(e) => return Err(ExecutionError::CommandFailed(display, e)),
    };

    let pid = child.id();
    log::debug!("Spawned (PID: {:?}): {}", pid, display);
    if let Some(tracker) = tracker {
        tracker.on_spawn(pid, program, args);
    }

    let (status, stdout, stderr) = wait_for(child, options.capture_output)
        .await
        .map_err(|e| ExecutionError::CommandFailed(display.clone(), e))?;

    let exit_code = exit_code_of(status);
    if let Some(tracker) = tracker {
        tracker.on_exit(pid, program, exit_code);
    }
    log::debug!("Exited with code {} after {:?}: {}", exit_code, start.elapsed(), display);

    Ok(ExecutionResult {
        exit_code,
        stdout,
        stderr,
        duration: start.elapsed(),
    })
}

fn build_command(program: &str, args: &[String], options: &ExecutionOptions) -> Command {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(cwd) = &options.cwd {
        command.current_dir(dunce::simplified(cwd));
    }
    command.envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    if options.capture_output {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
    } else {
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
    }
    command
}

async fn wait_for(
    child: Child,
    capture_output: bool,
) -> std::io::Result<(ExitStatus, String, String)> {
    if capture_output {
        let output = child.wait_with_output().await?;
        Ok((
            output.status,
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    } else {
        let mut child = child;
        let status = child.wait().await?;
        Ok((status, String::new(), String::new()))
    }
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// A shell-quoted rendering of a command, for logs and echo output.
pub fn display_command(program: &str, args: &[String]) -> String {
    let parts = std::iter::once(program).chain(args.iter().map(String::as_str));
    shlex::try_join(parts).unwrap_or_else(|_| {
        let mut joined = program.to_string();
        for arg in args {
            joined.push(' ');
            joined.push_str(arg);
        }
        joined
    })
}
