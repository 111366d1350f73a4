//! Custom error types for autodev.
//!
//! This module provides the crate-wide error type. Subsystems that talk to
//! the outside world (process runner, AI backend, MCP servers) have their own
//! narrower error enums which convert into [`AutodevError`].

use std::path::PathBuf;
use thiserror::Error;

use crate::ai::AiError;
use crate::mcp::McpError;
use crate::process::CommandError;

/// Main error type for autodev operations
#[derive(Error, Debug)]
pub enum AutodevError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Missing required file
    #[error("Missing required file: {path}")]
    MissingFile { path: PathBuf },

    // =========================================================================
    // Workflow Errors
    // =========================================================================
    /// Operation referenced an issue the agent is not tracking
    #[error("Issue #{issue_number} is not tracked")]
    IssueNotTracked { issue_number: u64 },

    /// A git or gh step failed in a way the workflow cannot recover from
    #[error("Workflow step '{step}' failed: {message}")]
    Workflow { step: String, message: String },

    /// Tests failed where the TDD cycle requires them to pass
    #[error("Tests failing after {phase} phase")]
    TestsFailing { phase: String },

    /// Missing required tool
    #[error("Missing required tool: {tool}")]
    MissingTool { tool: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// External command failure
    #[error(transparent)]
    Command(#[from] CommandError),

    /// AI backend failure
    #[error(transparent)]
    Ai(#[from] AiError),

    /// MCP server failure
    #[error(transparent)]
    Mcp(#[from] McpError),

    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AutodevError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a workflow step error
    pub fn workflow(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Workflow {
            step: step.into(),
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is worth retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Command(e) => e.is_transient(),
            Self::Ai(e) => e.is_retryable(),
            Self::Mcp(e) => e.is_recoverable(),
            Self::Workflow { .. } | Self::Io(_) => true,
            _ => false,
        }
    }

    /// Check if this error is fatal (should abort the whole run)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::InvalidConfig { .. }
                | Self::MissingFile { .. }
                | Self::MissingTool { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::IssueNotTracked { .. } => 3,
            Self::TestsFailing { .. } => 4,
            Self::MissingFile { .. } | Self::MissingTool { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for autodev results
pub type Result<T> = std::result::Result<T, AutodevError>;

/// Extension trait for converting foreign errors to [`AutodevError`]
pub trait IntoAutodevError<T> {
    fn into_autodev_config(self) -> Result<T>;
    fn into_autodev_step(self, step: &str) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoAutodevError<T> for std::result::Result<T, E> {
    fn into_autodev_config(self) -> Result<T> {
        self.map_err(|e| AutodevError::config(e.into().to_string()))
    }

    fn into_autodev_step(self, step: &str) -> Result<T> {
        self.map_err(|e| AutodevError::workflow(step, e.into().to_string()))
    }
}
