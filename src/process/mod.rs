//! External process execution for `git` and `gh`.
//!
//! Every subprocess the workflow starts goes through a
//! [`CommandRunner`](crate::testing::CommandRunner). The real implementation,
//! [`TokioCommandRunner`], captures stdout/stderr, enforces a timeout and
//! turns a nonzero exit into a structured [`CommandError`]. Callers never look
//! at stderr text directly; they ask [`classify_failure`] what kind of failure
//! they are looking at.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::testing::CommandRunner;

/// Default timeout for git/gh invocations.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Command Specification
// ============================================================================

/// A fully described subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute (`git`, `gh`, ...).
    pub program: String,
    /// Arguments, passed verbatim without shell interpretation.
    pub args: Vec<String>,
    /// Data written to the child's stdin, if any.
    pub stdin: Option<String>,
    /// Working directory; inherits the parent's when `None`.
    pub current_dir: Option<PathBuf>,
    /// Per-invocation timeout; the runner default applies when `None`.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Create a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            current_dir: None,
            timeout: None,
        }
    }

    /// Shorthand for a `git` invocation.
    pub fn git<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("git").args(args)
    }

    /// Shorthand for a `gh` invocation.
    pub fn gh<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("gh").args(args)
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Provide stdin content.
    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Run in a specific directory.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Override the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check whether `flag` appears among the arguments.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// The first `n` arguments joined with spaces, e.g. `"issue create"`.
    pub fn subcommand(&self, n: usize) -> String {
        self.args
            .iter()
            .take(n)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Output and Errors
// ============================================================================

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// A successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// First non-empty stdout line, trimmed.
    pub fn first_line(&self) -> &str {
        self.stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}

/// Failure of a subprocess invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The process could not be started at all.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        program: String,
        message: String,
        not_found: bool,
    },

    /// The process did not finish within its timeout and was killed.
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// The process exited with a nonzero status.
    #[error("{program} exited with code {exit_code}: {stderr}")]
    NonZeroExit {
        program: String,
        exit_code: i32,
        /// Untrimmed; test runners report failures here.
        stdout: String,
        stderr: String,
    },
}

impl CommandError {
    /// Build a nonzero-exit error; mainly for mocks and tests.
    pub fn exit(program: impl Into<String>, exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::NonZeroExit {
            program: program.into(),
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Attach captured stdout to a nonzero-exit error.
    #[must_use]
    pub fn with_stdout(self, output: impl Into<String>) -> Self {
        match self {
            Self::NonZeroExit {
                program,
                exit_code,
                stderr,
                ..
            } => Self::NonZeroExit {
                program,
                exit_code,
                stdout: output.into(),
                stderr,
            },
            other => other,
        }
    }

    /// Captured stdout, empty for spawn failures and timeouts.
    pub fn stdout(&self) -> &str {
        match self {
            Self::NonZeroExit { stdout, .. } => stdout,
            _ => "",
        }
    }

    /// Captured stderr, empty for spawn failures and timeouts.
    pub fn stderr(&self) -> &str {
        match self {
            Self::NonZeroExit { stderr, .. } => stderr,
            _ => "",
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        classify_failure(self) == FailureKind::Transient
    }
}

/// What a failed invocation means for the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// `gh issue create` rejected one of the requested labels.
    LabelNotFound,
    /// The resource (branch, tag, label, PR) already exists.
    AlreadyExists,
    /// Timeout, network hiccup or other failure that may pass on retry.
    Transient,
    /// Retrying will not help (tool missing, bad arguments, auth).
    Permanent,
}

const PERMANENT_MARKERS: &[&str] = &[
    "authentication",
    "not logged in",
    "permission denied",
    "unknown flag",
    "unknown command",
    "not a git repository",
];

/// Classify a command failure.
///
/// This is the only place where stderr text is inspected.
pub fn classify_failure(err: &CommandError) -> FailureKind {
    match err {
        CommandError::Timeout { .. } => FailureKind::Transient,
        CommandError::Spawn { not_found, .. } => {
            if *not_found {
                FailureKind::Permanent
            } else {
                FailureKind::Transient
            }
        }
        CommandError::NonZeroExit { stderr, .. } => {
            let lower = stderr.to_lowercase();
            if lower.contains("label") && (lower.contains("not found") || lower.contains("could not add")) {
                FailureKind::LabelNotFound
            } else if lower.contains("already exists") {
                FailureKind::AlreadyExists
            } else if PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
                FailureKind::Permanent
            } else {
                FailureKind::Transient
            }
        }
    }
}

// ============================================================================
// Real Runner
// ============================================================================

/// Runs commands with `tokio::process`, killing them on timeout.
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    default_timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
            working_dir: None,
        }
    }
}

impl TokioCommandRunner {
    /// Create a runner with the default 30s timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the default timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Run commands in `dir` unless a spec names its own directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let timeout = spec.timeout.unwrap_or(self.default_timeout);
        debug!("Running: {}", spec);

        let mut command = AsyncCommand::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = spec.current_dir.as_ref().or(self.working_dir.as_ref()) {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| CommandError::Spawn {
            program: spec.program.clone(),
            message: e.to_string(),
            not_found: e.kind() == std::io::ErrorKind::NotFound,
        })?;

        if let (Some(input), Some(mut stdin)) = (spec.stdin.as_ref(), child.stdin.take()) {
            let write = async {
                stdin.write_all(input.as_bytes()).await?;
                stdin.flush().await
            };
            write.await.map_err(|e| CommandError::Spawn {
                program: spec.program.clone(),
                message: format!("failed to write stdin: {}", e),
                not_found: false,
            })?;
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CommandError::Spawn {
                    program: spec.program.clone(),
                    message: format!("failed to read output: {}", e),
                    not_found: false,
                });
            }
            Err(_) => {
                return Err(CommandError::Timeout {
                    program: spec.program.clone(),
                    timeout,
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(CommandOutput {
                stdout,
                stderr,
                exit_code,
            })
        } else {
            Err(CommandError::NonZeroExit {
                program: spec.program.clone(),
                exit_code,
                stdout,
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

/// Check that a CLI tool is on `PATH`.
pub fn tool_available(tool: &str) -> bool {
    which::which(tool).is_ok()
}
