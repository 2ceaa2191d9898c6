//! Centralized command execution with consistent error handling.
//!
//! This module provides a unified API for running external commands,
//! ensuring all commands capture stderr and provide useful error messages.
//! Commands can be dropped to an unprivileged identity, spawned with a piped
//! end for streaming, or supervised in the foreground with signal forwarding.

use anyhow::{bail, Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use tokio::signal::unix::{signal, SignalKind};

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Which standard stream of a spawned child is connected to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipe {
    /// We read the child's stdout.
    Stdout,
    /// We write the child's stdin.
    Stdin,
}

/// Builder for configuring command execution.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    /// (uid, gid) to switch to before exec.
    identity: Option<(u32, u32)>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
    /// Custom error message prefix.
    error_prefix: Option<String>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            identity: None,
            allow_fail: false,
            error_prefix: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.envs
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    /// Run the child as `uid:gid`.
    ///
    /// Supplementary groups are cleared when the parent is root.
    pub fn as_identity(mut self, uid: u32, gid: u32) -> Self {
        self.identity = Some((uid, gid));
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// Human-readable command line for diagnostics.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some((uid, gid)) = self.identity {
            cmd.gid(gid);
            cmd.uid(uid);
        }
        cmd
    }

    fn prefix(&self) -> String {
        self.error_prefix
            .clone()
            .unwrap_or_else(|| format!("'{}' failed", self.program))
    }

    /// Run the command and capture output.
    pub fn run(self) -> Result<CommandResult> {
        let output = self.command().output().with_context(|| {
            format!(
                "Failed to execute '{}'. Is it installed?",
                self.program
            )
        })?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            let prefix = self.prefix();
            let stderr = result.stderr_trimmed();
            if stderr.is_empty() {
                bail!("{} (exit code {})", prefix, result.code());
            } else {
                bail!("{} (exit code {}):\n{}", prefix, result.code(), stderr);
            }
        }

        Ok(result)
    }

    /// Spawn the command with one end piped to us.
    ///
    /// The other standard streams are inherited so the child's own
    /// diagnostics reach the terminal. The caller waits on the child.
    pub fn spawn_piped(self, pipe: Pipe) -> Result<tokio::process::Child> {
        let mut cmd = tokio::process::Command::from(self.command());
        match pipe {
            Pipe::Stdout => {
                cmd.stdin(Stdio::null());
                cmd.stdout(Stdio::piped());
            }
            Pipe::Stdin => {
                cmd.stdin(Stdio::piped());
                cmd.stdout(Stdio::inherit());
            }
        }
        cmd.stderr(Stdio::inherit());

        cmd.spawn().with_context(|| {
            format!(
                "Failed to execute '{}'. Is it installed?",
                self.program
            )
        })
    }

    /// Run the command in the foreground with inherited stdio.
    ///
    /// Termination signals delivered to this process are forwarded to the
    /// child while it runs. Returns the child's status unchanged; callers
    /// decide what a failure means.
    pub async fn run_foreground(self) -> Result<ExitStatus> {
        // Handlers go in before the spawn so no signal slips through unrelayed.
        let mut streams = Vec::new();
        for (kind, sig) in forwarded_signals() {
            let stream = signal(kind)
                .with_context(|| format!("Failed to install {} handler", sig.as_str()))?;
            streams.push((stream, sig));
        }

        let mut cmd = tokio::process::Command::from(self.command());
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "Failed to execute '{}'. Is it installed?",
                self.program
            )
        })?;
        let pid = child
            .id()
            .with_context(|| format!("'{}' exited before it could be supervised", self.program))?;
        let pid = Pid::from_raw(pid as i32);

        let mut forwarders = Vec::new();
        for (mut stream, sig) in streams {
            forwarders.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    // The child may already be gone; nothing to forward to then.
                    let _ = kill(pid, sig);
                }
            }));
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for '{}'", self.program));

        for forwarder in forwarders {
            forwarder.abort();
        }

        status
    }
}

/// Signals relayed from the entrypoint to a foreground child.
fn forwarded_signals() -> Vec<(SignalKind, Signal)> {
    vec![
        (SignalKind::interrupt(), Signal::SIGINT),
        (SignalKind::terminate(), Signal::SIGTERM),
        (SignalKind::hangup(), Signal::SIGHUP),
        (SignalKind::quit(), Signal::SIGQUIT),
        (SignalKind::user_defined1(), Signal::SIGUSR1),
        (SignalKind::user_defined2(), Signal::SIGUSR2),
    ]
}

/// Convert a child's status into the status this process should exit with.
///
/// A child killed by signal N maps to 128 + N, the shell convention.
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => 1,
    }
}

/// Check an awaited child's status, failing with a uniform message.
pub fn check_status(program: &str, status: ExitStatus) -> Result<()> {
    if !status.success() {
        bail!("'{}' failed (exit code {})", program, exit_code(status));
    }
    Ok(())
}

// =============================================================================
// Convenience functions
// =============================================================================

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<String> {
    which::which(program)
        .ok()
        .map(|path| path.to_string_lossy().into_owned())
}

/// Check if a program exists in PATH (bool version).
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}

/// Fail early with an install hint when a required program is missing.
pub fn require(program: &str) -> Result<()> {
    if !exists(program) {
        bail!("'{}' not found in PATH, it is required by this mode", program);
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
