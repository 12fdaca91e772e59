//! External command execution.
//!
//! Every tool the pipeline drives (git, make, curl, conda, the package
//! managers) is described as a [`CommandSpec`] and handed to a
//! [`CommandRunner`]. Long builds inherit the terminal; probes and the smoke
//! test are captured with a timeout and bounded output.

use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// An external command exited unsuccessfully.
#[derive(Debug, Error)]
#[error("`{command}` failed ({})", describe_exit(.code))]
pub struct CommandFailed {
    /// Rendered command line.
    pub command: String,
    /// Exit code, or `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Description of one external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(OsString, OsString)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program name without leading directories (`/opt/x/bin/conda` -> `conda`).
    pub fn program_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program_name())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured child process output.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal or on timeout.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stdout followed by stderr, the way `cmd > file 2>&1` would record it.
    pub fn combined_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        if self.stdout_truncated > 0 || self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[output truncated: stdout {} bytes, stderr {} bytes]\n",
                self.stdout_truncated, self.stderr_truncated
            ));
        }
        text
    }
}

/// Abstraction over external command execution.
pub trait CommandRunner {
    /// Run with the terminal attached and return the exit code.
    fn status(&self, spec: &CommandSpec) -> Result<Option<i32>>;

    /// Run with stdout/stderr captured. Non-zero exit is not an error here.
    fn capture(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run with the terminal attached; any non-zero exit is a [`CommandFailed`].
    fn run(&self, spec: &CommandSpec) -> Result<()> {
        let code = self.status(spec)?;
        if code != Some(0) {
            return Err(CommandFailed {
                command: spec.to_string(),
                code,
            }
            .into());
        }
        Ok(())
    }

    /// Capture output and fail on non-zero exit. Stderr of a failure is logged.
    fn capture_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.capture(spec)?;
        ensure_success(spec, &output)?;
        Ok(output)
    }
}

/// Turn a timed-out or non-zero captured run into an error. Stderr of a
/// failure is logged.
pub fn ensure_success(spec: &CommandSpec, output: &CommandOutput) -> Result<()> {
    if output.timed_out {
        return Err(anyhow!("`{spec}` timed out"));
    }
    if !output.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(command = %spec, stderr = %stderr.trim(), "command failed");
        return Err(CommandFailed {
            command: spec.to_string(),
            code: output.code,
        }
        .into());
    }
    Ok(())
}

/// Runner that spawns real processes.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    capture_timeout: Duration,
    output_limit_bytes: usize,
}

impl SystemRunner {
    pub fn new(capture_timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            capture_timeout,
            output_limit_bytes,
        }
    }
}

impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(program = %spec.program_name()))]
    fn status(&self, spec: &CommandSpec) -> Result<Option<i32>> {
        debug!(command = %spec, "running");
        let status = spec
            .to_command()
            .stdin(Stdio::inherit())
            .status()
            .with_context(|| format!("spawn {spec}"))?;
        debug!(exit_code = ?status.code(), "command finished");
        Ok(status.code())
    }

    fn capture(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %spec, "running (captured)");
        run_command_with_timeout(
            spec.to_command(),
            self.capture_timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run {spec}"))
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        code: if timed_out { None } else { status.code() },
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
