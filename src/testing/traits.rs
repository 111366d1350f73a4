//! Trait definitions for testable abstractions.
//!
//! These traits abstract external dependencies so that the workflow state
//! machine and the TDD driver can be unit tested without a real `gh`, a git
//! repository, a model server or a project test suite.

use async_trait::async_trait;
use std::path::Path;

use crate::ai::AiError;
use crate::process::{CommandError, CommandOutput, CommandSpec};

/// Abstraction over subprocess execution.
///
/// All `git` and `gh` calls go through this trait.
///
/// # Example
///
/// ```rust,ignore
/// use autodev::process::CommandSpec;
/// use autodev::testing::CommandRunner;
///
/// async fn current_branch(runner: &dyn CommandRunner) -> Option<String> {
///     let spec = CommandSpec::git(["branch", "--show-current"]);
///     runner.run(&spec).await.ok().map(|o| o.stdout.trim().to_string())
/// }
/// ```
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when the process cannot be spawned, exceeds
    /// its timeout, or exits with a nonzero status.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Abstraction for the chat-completion model backend.
///
/// The backend's replies are treated as opaque text.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Send a system + user prompt pair and return the reply text.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] for transport failures, timeouts, non-success HTTP
    /// statuses, or a reply with no choices.
    async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, AiError>;

    /// Human-readable model identifier.
    fn model_name(&self) -> &str;
}

/// Result of running the project's test suite once.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRunReport {
    /// Whether the suite exited successfully.
    pub passed: bool,
    /// Exit code of the test command (-1 when unknown).
    pub exit_code: i32,
    /// Captured stdout.
    pub output: String,
    /// Captured stderr.
    pub errors: String,
    /// Line coverage in percent, 0.0 when not reported.
    pub coverage: f64,
}

impl TestRunReport {
    /// Create a passing report.
    #[must_use]
    pub fn pass(coverage: f64) -> Self {
        Self {
            passed: true,
            exit_code: 0,
            output: String::new(),
            errors: String::new(),
            coverage,
        }
    }

    /// Create a failing report.
    #[must_use]
    pub fn fail(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            passed: false,
            exit_code,
            output: output.into(),
            errors: String::new(),
            coverage: 0.0,
        }
    }
}

/// Abstraction over the project's test suite.
#[async_trait]
pub trait TestSuite: Send + Sync {
    /// Run the whole suite and report the outcome.
    ///
    /// A failing suite is an `Ok` report with `passed == false`; `Err` means
    /// the suite could not be run at all.
    async fn run(&self) -> Result<TestRunReport, CommandError>;
}

/// Abstraction for file system writes performed by the TDD driver.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file relative to the workspace root.
    async fn read_file(&self, path: &Path) -> std::io::Result<String>;

    /// Write a file, creating parent directories.
    ///
    /// Must not return until the data has been flushed, so that a test run
    /// started afterwards observes the new content.
    async fn write_file(&self, path: &Path, content: &str) -> std::io::Result<()>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> bool;
}
