//! autodev - GitHub issue to pull request automation with a TDD core
//!
//! Turns improvement proposals (or human-filed issues) into tracked GitHub
//! issues, develops them test-first with an AI backend, and pushes the
//! result back as a branch, a pull request and, optionally, a release.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`process`] - `git` / `gh` subprocess execution with timeouts
//! - [`github`] - The issue → branch → PR → merge → release state machine and pull mode
//! - [`tdd`] - The RED / GREEN / REFACTOR cycle driver
//! - [`tracker`] - Task status register
//! - [`pipeline`] - End-to-end flows wiring the above together
//! - [`ai`] - LM Studio chat-completion backend
//! - [`mcp`] - JSON-RPC client for MCP tool servers
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Injectable seams and mocks
//!
//! # Example
//!
//! ```rust,ignore
//! use autodev::config::ProjectConfig;
//! use autodev::github::{GitHubSyncAgent, Improvement, ImprovementType, Priority};
//! use autodev::process::TokioCommandRunner;
//! use autodev::workspace::WorkspaceLock;
//! use std::sync::Arc;
//!
//! let config = ProjectConfig::load(".")?;
//! let agent = GitHubSyncAgent::from_config(Arc::new(TokioCommandRunner::new()), &config);
//!
//! let improvement = Improvement::new(ImprovementType::BugFix, Priority::High)
//!     .with_pattern("NullPointer in parser");
//! let workspace = WorkspaceLock::new().acquire().await;
//! let report = agent.sync_improvement_to_github(&improvement, &workspace).await;
//! println!("issue #{} on {:?}", report.issue_number, report.branch);
//! ```

pub mod ai;
pub mod config;
pub mod error;
pub mod github;
pub mod mcp;
pub mod pipeline;
pub mod process;
pub mod retry;
pub mod tdd;
pub mod testing;
pub mod tracker;
pub mod workspace;

// Re-export commonly used types
pub use error::{AutodevError, IntoAutodevError, Result};

// Re-export config types
pub use config::{
    verify_git_environment, ConfigValidator, GitEnvironmentCheck, ProjectConfig, ValidationReport,
};

// Re-export workflow types
pub use github::{
    CompletionReport, GitHubSyncAgent, Improvement, ImprovementType, MergeOutcome, SyncReport,
    TrackedIssue,
};
pub use pipeline::{ImprovementRun, Pipeline, PullModeRun};
pub use tdd::{TddCycleDriver, TddDependencies, TddOutcome, TddPhase};
pub use tracker::{Task, TaskId, TaskStatus, TaskStatusTracker};
pub use workspace::{RealFileSystem, WorkspaceGuard, WorkspaceLock};

// Re-export testing types for convenience
pub use testing::{AiBackend, CommandRunner, FileSystem, TestSuite};
