//! Interface to the Android Debug Bridge (`adb`) command-line tool.
//!
//! Every interaction with a device goes through a [`CommandRunner`]. The
//! bundled [`AdbRunner`] spawns the bridge as a subprocess, bounds it with a
//! timeout and classifies failures into a [`BridgeError`]. Nothing at this
//! layer retries; retry policy belongs to callers such as
//! [`HierarchyFetcher`](crate::hierarchy::HierarchyFetcher).
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use uiscope_core::bridge::{AdbRunner, CommandRunner};
//!
//! # async fn example() -> Result<(), uiscope_core::bridge::BridgeError> {
//! let runner = AdbRunner::new(Some("emulator-5554".to_string()));
//! let model = runner
//!     .run(&["shell", "getprop", "ro.product.model"], Duration::from_secs(10))
//!     .await?;
//! println!("{}", model);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Timeout applied to bridge commands that do not specify their own.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit code reported by the shell when a process was killed with SIGKILL.
const KILLED_EXIT_CODE: i32 = 137;

/// Maximum number of stderr bytes kept in an error.
const STDERR_EXCERPT_LIMIT: usize = 512;

/// Errors produced while executing a bridge command.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The bridge could not be launched or its output could not be collected.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The bridge exited with a non-zero status.
    #[error("Command `{command}` failed with exit code {exit_code}: {stderr}")]
    Failed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The bridge was killed, either by a signal or with exit code 137.
    #[error("Command `{command}` was killed (possibly due to timeout or permissions)")]
    Killed {
        command: String,
        exit_code: Option<i32>,
        signal: Option<i32>,
        stderr: String,
    },

    /// The bridge did not finish within its timeout and was killed.
    #[error("Command `{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

impl BridgeError {
    /// The process exit code, when the process exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            BridgeError::Failed { exit_code, .. } => Some(*exit_code),
            BridgeError::Killed { exit_code, .. } => *exit_code,
            BridgeError::Io(_) | BridgeError::Timeout { .. } => None,
        }
    }

    /// The terminating signal, when the process was killed by one.
    pub fn signal(&self) -> Option<i32> {
        match self {
            BridgeError::Killed { signal, .. } => *signal,
            _ => None,
        }
    }

    /// A bounded excerpt of the process's stderr, empty when unavailable.
    pub fn stderr_excerpt(&self) -> &str {
        match self {
            BridgeError::Failed { stderr, .. } | BridgeError::Killed { stderr, .. } => stderr,
            BridgeError::Io(_) | BridgeError::Timeout { .. } => "",
        }
    }

    /// Returns true if the bridge binary itself could not be found.
    pub fn is_not_installed(&self) -> bool {
        matches!(self, BridgeError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Captured output of a successful bridge command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Raw stdout bytes, untouched.
    pub stdout: Vec<u8>,
    /// Stderr excerpt (bridges sometimes write warnings here on success).
    pub stderr: String,
}

impl CommandOutput {
    /// Stdout decoded as UTF-8 (lossily) and trimmed.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// Capability for executing device bridge commands.
///
/// Implementors must bound every call by `timeout` and report failures as
/// [`BridgeError`]. The provided [`run`](CommandRunner::run) is the text
/// flavour used by almost every caller; binary payloads such as screenshots
/// must go through [`run_raw`](CommandRunner::run_raw) so that no trimming
/// touches the bytes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a bridge command and return its raw output.
    ///
    /// # Arguments
    ///
    /// * `args` - Arguments passed to the bridge (after any device selector)
    /// * `timeout` - Upper bound on the command's wall-clock time
    async fn run_raw(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput, BridgeError>;

    /// Run a bridge command and return its trimmed stdout as text.
    async fn run(&self, args: &[&str], timeout: Duration) -> Result<String, BridgeError> {
        let output = self.run_raw(args, timeout).await?;
        Ok(output.text())
    }
}

/// [`CommandRunner`] backed by the `adb` executable.
#[derive(Debug, Clone)]
pub struct AdbRunner {
    program: PathBuf,
    serial: Option<String>,
}

impl AdbRunner {
    /// Create a runner using `adb` from `PATH`.
    ///
    /// When `serial` is set, every command is addressed to that device with
    /// `-s <serial>`.
    pub fn new(serial: Option<String>) -> Self {
        Self::with_program("adb", serial)
    }

    /// Create a runner using an explicit bridge executable.
    pub fn with_program(program: impl Into<PathBuf>, serial: Option<String>) -> Self {
        Self {
            program: program.into(),
            serial,
        }
    }

    /// Human-readable command line, used in logs and errors.
    fn command_line(&self, args: &[&str]) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        if let Some(serial) = &self.serial {
            parts.push("-s".to_string());
            parts.push(serial.clone());
        }
        parts.extend(args.iter().map(|a| a.to_string()));
        parts.join(" ")
    }
}

#[async_trait]
impl CommandRunner for AdbRunner {
    async fn run_raw(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput, BridgeError> {
        let command = self.command_line(args);
        debug!(%command, ?timeout, "Running bridge command");

        let mut cmd = Command::new(&self.program);
        if let Some(serial) = &self.serial {
            cmd.args(["-s", serial.as_str()]);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;

        // Dropping the wait future drops the child, and kill_on_drop reaps it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(%command, ?timeout, "Bridge command timed out");
                return Err(BridgeError::Timeout { command, timeout });
            }
        };

        classify(command, output)
    }
}

/// Turns a finished process into either its output or a classified error.
fn classify(command: String, output: Output) -> Result<CommandOutput, BridgeError> {
    let stderr = excerpt(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        return Ok(CommandOutput {
            stdout: output.stdout,
            stderr,
        });
    }

    let exit_code = output.status.code();
    let signal = termination_signal(&output.status);
    warn!(%command, ?exit_code, ?signal, %stderr, "Bridge command failed");

    match exit_code {
        Some(code) if code != KILLED_EXIT_CODE && signal.is_none() => Err(BridgeError::Failed {
            command,
            exit_code: code,
            stderr,
        }),
        _ => Err(BridgeError::Killed {
            command,
            exit_code,
            signal,
            stderr,
        }),
    }
}

#[cfg(unix)]
fn termination_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Trims `text` and cuts it to at most [`STDERR_EXCERPT_LIMIT`] bytes.
fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.len() <= STDERR_EXCERPT_LIMIT {
        return text.to_string();
    }
    let mut end = STDERR_EXCERPT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
