//! External tool execution
//!
//! Runs one external command as an argument vector (never through a shell),
//! with a hard timeout. Captured output is decoded permissively, so a tool
//! that prints invalid UTF-8 never turns into a runner failure.
//!
//! A stage only ever sees three terminal failure kinds from here:
//! [`ToolError::ExecutionFailed`], [`ToolError::TimedOut`] and
//! [`ToolError::OutputMissing`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// How long the startup version probe may take
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tool failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    /// Nonzero exit, or the process could not be started (`code` is None)
    #[error("{program} failed (exit code {code:?}): {stderr}")]
    ExecutionFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Process exceeded its timeout and was killed
    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    /// Process reported success but its output file does not exist
    #[error("{program} reported success but {} is missing", path.display())]
    OutputMissing { program: String, path: PathBuf },
}

/// One invocation of an external program
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    expected_output: Option<PathBuf>,
    partial_output: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            expected_output: None,
            partial_output: None,
        }
    }

    /// Build from a configured argument vector (program first)
    ///
    /// Returns None for an empty vector.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, leading) = argv.split_first()?;
        Some(Self::new(program.clone()).args(leading))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// File whose existence defines success
    pub fn expects_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.expected_output = Some(path.into());
        self
    }

    /// File or directory removed if the tool fails or times out
    pub fn removes_on_failure(mut self, path: impl Into<PathBuf>) -> Self {
        self.partial_output = Some(path.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Human-readable command line for logs
    pub fn rendered(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Captured output of a finished process
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Replace invalid UTF-8 rather than failing
pub fn safe_decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Debug, Clone, Default)]
pub struct ToolRunner;

impl ToolRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a command that produces a file
    ///
    /// Success means exit 0 and the expected output exists. On failure or
    /// timeout, the command's partial output is removed.
    pub async fn run(&self, command: &ToolCommand, timeout: Duration) -> Result<PathBuf, ToolError> {
        let result = self.execute(command, timeout).await;

        if result.is_err() {
            if let Some(partial) = &command.partial_output {
                remove_partial_output(partial).await;
            }
        }
        result?;

        match &command.expected_output {
            Some(path) if tokio::fs::metadata(path).await.is_ok() => Ok(path.clone()),
            Some(path) => {
                tracing::error!(
                    program = %command.program,
                    path = %path.display(),
                    "Tool exited successfully but produced no output"
                );
                Err(ToolError::OutputMissing {
                    program: command.program.clone(),
                    path: path.clone(),
                })
            }
            None => Ok(PathBuf::new()),
        }
    }

    /// Run a command whose result is its standard output
    pub async fn run_capture(&self, command: &ToolCommand, timeout: Duration) -> Result<String, ToolError> {
        self.execute(command, timeout).await.map(|output| output.stdout)
    }

    /// Spawn, wait under `timeout`, and map the exit status
    pub async fn execute(&self, command: &ToolCommand, timeout: Duration) -> Result<ToolOutput, ToolError> {
        tracing::debug!(command = %command.rendered(), timeout_secs = timeout.as_secs(), "Running tool");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!(program = %command.program, error = %e, "Failed to start tool");
                ToolError::ExecutionFailed {
                    program: command.program.clone(),
                    code: None,
                    stderr: e.to_string(),
                }
            })?;

        let stdout_reader = tokio::spawn(read_all(child.stdout.take()));
        let stderr_reader = tokio::spawn(read_all(child.stderr.take()));

        let status: ExitStatus = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                stdout_reader.abort();
                stderr_reader.abort();
                return Err(ToolError::ExecutionFailed {
                    program: command.program.clone(),
                    code: None,
                    stderr: format!("failed waiting for process: {}", e),
                });
            }
            Err(_) => {
                // kill() also reaps the process
                if let Err(e) = child.kill().await {
                    tracing::warn!(program = %command.program, error = %e, "Failed to kill timed out tool");
                }
                stdout_reader.abort();
                stderr_reader.abort();
                tracing::error!(
                    program = %command.program,
                    timeout_secs = timeout.as_secs(),
                    "Tool timed out and was killed"
                );
                return Err(ToolError::TimedOut {
                    program: command.program.clone(),
                    timeout,
                });
            }
        };

        let stdout = safe_decode(&stdout_reader.await.unwrap_or_default());
        let stderr = safe_decode(&stderr_reader.await.unwrap_or_default());

        if !status.success() {
            tracing::error!(
                program = %command.program,
                code = ?status.code(),
                stderr = %stderr.trim(),
                "Tool exited with failure"
            );
            return Err(ToolError::ExecutionFailed {
                program: command.program.clone(),
                code: status.code(),
                stderr,
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }

    /// Log the first line of `<command> -version`
    ///
    /// Diagnostic only: failures are logged and yield None.
    pub async fn probe_version(&self, command: ToolCommand) -> Option<String> {
        let command = command.arg("-version");
        match self.execute(&command, VERSION_PROBE_TIMEOUT).await {
            Ok(output) => {
                let line = output.stdout.lines().next().unwrap_or("").trim().to_string();
                tracing::info!(program = %command.program, version = %line, "Tool available");
                Some(line)
            }
            Err(e) => {
                tracing::warn!(program = %command.program, error = %e, "Tool version probe failed");
                None
            }
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buffer).await;
    }
    buffer
}

async fn remove_partial_output(path: &Path) {
    let target = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || songcheck_common::fs::remove_path(&target)).await;
    match result {
        Ok(Ok(())) => tracing::debug!(path = %path.display(), "Removed partial tool output"),
        Ok(Err(e)) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Partial output cleanup task failed"),
    }
}
