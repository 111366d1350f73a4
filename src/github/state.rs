//! Workflow state for tracked issues and the structured results returned by
//! the sync agent's top-level operations.
//!
//! # Per-issue stages
//!
//! ```text
//! IssueCreated -> BoardTodo -> BranchReady -> InProgress -> PrOpen -> Testing
//!     -> Merged -> Done -> Closed
//! ```
//!
//! A pending or failing check rollup leaves the issue in `Testing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::improvement::Improvement;
use super::version::SemVer;

/// Issue number used when issue creation fails outright. Issues carrying
/// it are simulated: no branch, board or PR operation is attempted for them.
pub const FALLBACK_ISSUE_NUMBER: u64 = 999;

// ============================================================================
// Issue status and stage
// ============================================================================

/// Coarse status of a tracked issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    InProgress,
    Testing,
    Done,
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Testing => "testing",
            IssueStatus::Done => "done",
        };
        write!(f, "{}", s)
    }
}

/// Fine-grained position of a tracked issue in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    IssueCreated,
    BoardTodo,
    BranchReady,
    InProgress,
    PrOpen,
    Testing,
    Merged,
    Done,
    Closed,
}

impl WorkflowStage {
    /// Coarse status implied by this stage.
    #[must_use]
    pub fn status(&self) -> IssueStatus {
        match self {
            WorkflowStage::IssueCreated
            | WorkflowStage::BoardTodo
            | WorkflowStage::BranchReady
            | WorkflowStage::InProgress => IssueStatus::InProgress,
            WorkflowStage::PrOpen | WorkflowStage::Testing => IssueStatus::Testing,
            WorkflowStage::Merged | WorkflowStage::Done | WorkflowStage::Closed => {
                IssueStatus::Done
            }
        }
    }
}

/// Project board columns the agent moves cards between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardColumn {
    Todo,
    InProgress,
    Testing,
    Done,
}

impl BoardColumn {
    /// Option name sent to the board's `Status` field. The board has no
    /// Testing column, so Testing maps to "In Progress".
    #[must_use]
    pub fn board_option(&self) -> &'static str {
        match self {
            BoardColumn::Todo => "Todo",
            BoardColumn::InProgress | BoardColumn::Testing => "In Progress",
            BoardColumn::Done => "Done",
        }
    }
}

impl fmt::Display for BoardColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BoardColumn::Todo => "Todo",
            BoardColumn::InProgress => "In Progress",
            BoardColumn::Testing => "Testing",
            BoardColumn::Done => "Done",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Tracked issue and pull request
// ============================================================================

/// The agent's view of a GitHub issue it created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedIssue {
    pub issue_number: u64,
    pub url: String,
    pub title: String,
    /// Empty until the feature branch exists.
    pub branch_name: String,
    pub status: IssueStatus,
    pub stage: WorkflowStage,
    pub created_at: DateTime<Utc>,
    pub improvement: Improvement,
}

impl TrackedIssue {
    pub fn new(issue_number: u64, url: String, title: String, improvement: Improvement) -> Self {
        Self {
            issue_number,
            url,
            title,
            branch_name: String::new(),
            status: IssueStatus::InProgress,
            stage: WorkflowStage::IssueCreated,
            created_at: Utc::now(),
            improvement,
        }
    }

    /// Whether this is the fallback record for a failed creation.
    #[must_use]
    pub fn is_simulated(&self) -> bool {
        self.issue_number == FALLBACK_ISSUE_NUMBER
    }

    /// Move to `stage`, keeping `status` consistent.
    pub fn advance(&mut self, stage: WorkflowStage) {
        self.stage = stage;
        self.status = stage.status();
    }
}

/// A pull request opened for a tracked issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub url: String,
    /// `None` for the fallback URL returned when `gh pr create` failed.
    pub number: Option<u64>,
    pub issue_number: u64,
    pub branch: String,
}

impl PullRequest {
    /// Whether GitHub actually returned this PR.
    #[must_use]
    pub fn is_real(&self) -> bool {
        self.number.is_some()
    }
}

/// Trailing numeric path segment of a GitHub URL.
#[must_use]
pub fn number_from_url(url: &str) -> Option<u64> {
    url.trim().trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

// ============================================================================
// Operation results
// ============================================================================

/// Why an auto-merge did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// At least one check is not SUCCESS/NEUTRAL.
    ChecksPending,
    /// No real PR number to merge.
    PrUnavailable,
    /// The check rollup could not be fetched or parsed.
    CheckStatusUnavailable,
    /// Checks passed but `gh pr merge` failed.
    MergeFailed,
    /// Auto-merge is switched off.
    Disabled,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::ChecksPending => "checks_pending",
            SkipReason::PrUnavailable => "pr_unavailable",
            SkipReason::CheckStatusUnavailable => "check_status_unavailable",
            SkipReason::MergeFailed => "merge_failed",
            SkipReason::Disabled => "auto_merge_disabled",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an auto-merge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged { pr_number: u64 },
    Skipped { reason: SkipReason, detail: Option<String> },
}

impl MergeOutcome {
    pub(crate) fn skipped(reason: SkipReason) -> Self {
        MergeOutcome::Skipped {
            reason,
            detail: None,
        }
    }

    pub(crate) fn skipped_with(reason: SkipReason, detail: impl Into<String>) -> Self {
        MergeOutcome::Skipped {
            reason,
            detail: Some(detail.into()),
        }
    }

    #[must_use]
    pub fn merged(&self) -> bool {
        matches!(self, MergeOutcome::Merged { .. })
    }

    #[must_use]
    pub fn reason(&self) -> Option<&SkipReason> {
        match self {
            MergeOutcome::Merged { .. } => None,
            MergeOutcome::Skipped { reason, .. } => Some(reason),
        }
    }
}

/// Overall state of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncWorkflowStatus {
    /// Issue, board and branch are set up.
    Initiated,
    /// Issue creation fell back to the simulated issue.
    Simulated,
    Failed,
}

/// Result of `sync_improvement_to_github`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub issue_number: u64,
    pub branch: Option<String>,
    pub board_updated: bool,
    pub workflow_status: SyncWorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncReport {
    #[must_use]
    pub fn is_initiated(&self) -> bool {
        self.workflow_status == SyncWorkflowStatus::Initiated
    }
}

/// Result of `complete_improvement_workflow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub issue_number: u64,
    pub committed: bool,
    pub pr: Option<PullRequest>,
    pub merge: Option<MergeOutcome>,
    pub closed: bool,
    pub release: Option<SemVer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionReport {
    pub(crate) fn failed(issue_number: u64, error: impl Into<String>) -> Self {
        Self {
            issue_number,
            committed: false,
            pr: None,
            merge: None,
            closed: false,
            release: None,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Snapshot returned by `get_sync_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub repo: String,
    pub project_id: String,
    pub current_version: SemVer,
    pub active_issues: Vec<u64>,
    pub pending_prs: usize,
    pub pull_mode_enabled: bool,
    pub processed_issues: usize,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{}: {} active issue(s), {} pending PR(s)",
            self.repo,
            self.current_version,
            self.active_issues.len(),
            self.pending_prs
        )?;
        if self.pull_mode_enabled {
            write!(f, ", {} processed in pull mode", self.processed_issues)?;
        }
        Ok(())
    }
}
