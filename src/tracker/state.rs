//! Task status types and transitions.
//!
//! - [`TaskStatus`] - Lifecycle position of a task in the TDD cycle
//! - [`TaskPriority`] - Scheduling priority
//! - [`TaskTransition`] - Record of a status change

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Task Status
// ============================================================================

/// Lifecycle status of a task.
///
/// # State Transitions
///
/// ```text
/// Pending ──> TddRed ──> TddGreen ──> TddRefactor ──> Completed
///    │           │           │             │
///    └───────────┴───────────┴─────────────┴──> Blocked
/// ```
///
/// Moves are forward-only (skipping ahead is allowed). `Completed` and
/// `Blocked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    TddRed,
    TddGreen,
    TddRefactor,
    Completed,
    Blocked,
}

/// Labels owned by the status mapping; anything else on an issue is kept.
pub const STATUS_LABELS: &[&str] = &[
    "todo",
    "in-progress",
    "tdd-red",
    "tdd-green",
    "tdd-refactor",
    "completed",
    "blocked",
];

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::TddRed => "tdd_red",
            TaskStatus::TddGreen => "tdd_green",
            TaskStatus::TddRefactor => "tdd_refactor",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        };
        write!(f, "{}", s)
    }
}

impl TaskStatus {
    /// Position along the forward path; `None` for `Blocked`.
    fn rank(&self) -> Option<u8> {
        match self {
            TaskStatus::Pending => Some(0),
            TaskStatus::TddRed => Some(1),
            TaskStatus::TddGreen => Some(2),
            TaskStatus::TddRefactor => Some(3),
            TaskStatus::Completed => Some(4),
            TaskStatus::Blocked => None,
        }
    }

    /// Check if this status can transition to the target status.
    ///
    /// # Example
    ///
    /// ```
    /// use autodev::tracker::TaskStatus;
    ///
    /// assert!(TaskStatus::TddRed.can_transition_to(TaskStatus::TddGreen));
    /// assert!(TaskStatus::TddGreen.can_transition_to(TaskStatus::Blocked));
    /// assert!(!TaskStatus::TddGreen.can_transition_to(TaskStatus::TddRed));
    /// assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Blocked));
    /// ```
    #[must_use]
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), target.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }

    /// Check if this status represents active TDD work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::TddRed | TaskStatus::TddGreen | TaskStatus::TddRefactor
        )
    }

    /// Check if this status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Blocked)
    }

    /// GitHub labels that mirror this status on the task's issue.
    #[must_use]
    pub fn github_labels(&self) -> &'static [&'static str] {
        match self {
            TaskStatus::Pending => &["todo"],
            TaskStatus::TddRed => &["tdd-red", "in-progress"],
            TaskStatus::TddGreen => &["tdd-green", "in-progress"],
            TaskStatus::TddRefactor => &["tdd-refactor", "in-progress"],
            TaskStatus::Completed => &["completed"],
            TaskStatus::Blocked => &["blocked"],
        }
    }

    /// Infer a status from issue labels (most advanced phase wins).
    #[must_use]
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let has = |name: &str| labels.iter().any(|l| l.as_ref() == name);
        if has("completed") {
            TaskStatus::Completed
        } else if has("blocked") {
            TaskStatus::Blocked
        } else if has("tdd-refactor") {
            TaskStatus::TddRefactor
        } else if has("tdd-green") {
            TaskStatus::TddGreen
        } else if has("tdd-red") {
            TaskStatus::TddRed
        } else {
            TaskStatus::Pending
        }
    }
}

// ============================================================================
// Task Priority
// ============================================================================

/// Scheduling priority of a task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Low => "low",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Task Transition
// ============================================================================

/// Record of a status change for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTransition {
    /// Status before the transition
    pub from: TaskStatus,
    /// Status after the transition
    pub to: TaskStatus,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
    /// Optional reason for the transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TaskTransition {
    /// Create a new transition record.
    #[must_use]
    pub fn new(from: TaskStatus, to: TaskStatus) -> Self {
        Self {
            from,
            to,
            timestamp: Utc::now(),
            reason: None,
        }
    }

    /// Create a transition with a reason.
    #[must_use]
    pub fn with_reason(from: TaskStatus, to: TaskStatus, reason: &str) -> Self {
        Self {
            reason: Some(reason.to_string()),
            ..Self::new(from, to)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
