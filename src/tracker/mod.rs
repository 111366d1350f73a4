//! Task status register for the TDD loop.
//!
//! # Architecture
//!
//! ```text
//! TaskStatusTracker
//!   ├── tasks: Vec<Task>            (creation order, persisted)
//!   └── index: HashMap<TaskId, usize>
//!
//! Task
//!   ├── id: TaskId
//!   ├── status: TaskStatus
//!   ├── priority: TaskPriority
//!   ├── dependencies: Vec<TaskId>
//!   └── history: Vec<TaskTransition>
//! ```
//!
//! Updates for unknown ids are ignored with a warning: callers may refer to
//! tasks from a previous run.

mod metrics;
mod state;

pub use metrics::LoopStatistics;
pub use state::{TaskPriority, TaskStatus, TaskTransition, STATUS_LABELS};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ============================================================================
// Task Identifier
// ============================================================================

/// Unique identifier of a task within a run.
///
/// Accepts both JSON numbers and strings so issue numbers can be used as ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => TaskId(n.to_string()),
            Raw::Text(s) => TaskId(s),
        })
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(n: u64) -> Self {
        TaskId(n.to_string())
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

// ============================================================================
// Task
// ============================================================================

/// One work item flowing through the TDD cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Issue the task reports progress to.
    #[serde(default)]
    pub issue_number: Option<u64>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Tasks that must be completed first.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub test_files: Vec<PathBuf>,
    #[serde(default)]
    pub implementation_files: Vec<PathBuf>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<TaskTransition>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            issue_number: None,
            labels: Vec::new(),
            dependencies: Vec::new(),
            test_files: Vec::new(),
            implementation_files: Vec::new(),
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_issue(mut self, issue_number: u64) -> Self {
        self.issue_number = Some(issue_number);
        self
    }

    #[must_use]
    pub fn with_dependency(mut self, dependency: impl Into<TaskId>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Issue labels after applying the current status: status labels are
    /// replaced, every other label is preserved.
    #[must_use]
    pub fn labels_for_status(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .labels
            .iter()
            .filter(|l| !STATUS_LABELS.contains(&l.as_str()))
            .cloned()
            .collect();
        labels.extend(self.status.github_labels().iter().map(|l| l.to_string()));
        labels
    }
}

/// Outcome of [`TaskStatusTracker::update_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Transition recorded.
    Applied { from: TaskStatus, to: TaskStatus },
    /// Task already had that status.
    Unchanged,
    /// No task with that id; nothing happened.
    UnknownTask,
    /// Transition not allowed by the lifecycle.
    Rejected { from: TaskStatus, to: TaskStatus },
}

impl StatusUpdate {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, StatusUpdate::Applied { .. })
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// In-memory task register with optional JSON persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStatusTracker {
    tasks: Vec<Task>,
    #[serde(skip)]
    index: HashMap<TaskId, usize>,
}

impl TaskStatusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a register from a task list; later duplicates are dropped.
    #[must_use]
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut tracker = Self::new();
        for task in tasks {
            tracker.register(task);
        }
        tracker
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
    }

    /// Add a task. Returns `false` if the id is already registered.
    pub fn register(&mut self, task: Task) -> bool {
        if self.index.contains_key(&task.id) {
            warn!("Task {} already registered, ignoring duplicate", task.id);
            return false;
        }
        self.index.insert(task.id.clone(), self.tasks.len());
        self.tasks.push(task);
        true
    }

    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// All tasks in registration order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Move a task to a new status, recording the transition.
    pub fn update_status(&mut self, id: &TaskId, status: TaskStatus) -> StatusUpdate {
        self.transition(id, status, None)
    }

    /// Mark a task blocked with a reason.
    pub fn block(&mut self, id: &TaskId, reason: &str) -> StatusUpdate {
        self.transition(id, TaskStatus::Blocked, Some(reason))
    }

    fn transition(&mut self, id: &TaskId, to: TaskStatus, reason: Option<&str>) -> StatusUpdate {
        let Some(&i) = self.index.get(id) else {
            warn!("Task {} not found, status update to {} ignored", id, to);
            return StatusUpdate::UnknownTask;
        };
        let task = &mut self.tasks[i];
        let from = task.status;
        if from == to {
            return StatusUpdate::Unchanged;
        }
        if !from.can_transition_to(to) {
            warn!("Task {}: transition {} -> {} rejected", id, from, to);
            return StatusUpdate::Rejected { from, to };
        }

        task.status = to;
        task.updated_at = Utc::now();
        task.history.push(match reason {
            Some(reason) => TaskTransition::with_reason(from, to, reason),
            None => TaskTransition::new(from, to),
        });
        debug!("Task {}: {} -> {}", id, from, to);
        StatusUpdate::Applied { from, to }
    }

    /// Record files written for a task.
    pub fn record_files(&mut self, id: &TaskId, test_files: &[PathBuf], implementation_files: &[PathBuf]) {
        if let Some(&i) = self.index.get(id) {
            let task = &mut self.tasks[i];
            for path in test_files {
                if !task.test_files.contains(path) {
                    task.test_files.push(path.clone());
                }
            }
            for path in implementation_files {
                if !task.implementation_files.contains(path) {
                    task.implementation_files.push(path.clone());
                }
            }
        }
    }

    /// Counts partitioned into completed / in progress / blocked / pending.
    #[must_use]
    pub fn get_loop_statistics(&self) -> LoopStatistics {
        let mut stats = LoopStatistics::default();
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::TddRed | TaskStatus::TddGreen | TaskStatus::TddRefactor => {
                    stats.in_progress += 1
                }
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Blocked => stats.blocked += 1,
            }
        }
        stats
    }

    /// Human-readable one-line progress summary.
    #[must_use]
    pub fn generate_progress_report(&self) -> String {
        let stats = self.get_loop_statistics();
        let mut report = format!("{}/{} tasks done", stats.completed, stats.total());
        if stats.total() > 0 {
            report.push_str(&format!(
                " ({} in progress, {} blocked, {} pending)",
                stats.in_progress, stats.blocked, stats.pending
            ));
        }
        report
    }

    fn dependencies_satisfied(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|dep| {
            self.get(dep)
                .is_some_and(|d| d.status == TaskStatus::Completed)
        })
    }

    /// Up to `limit` runnable tasks, highest priority first, then by
    /// creation order. Terminal tasks and tasks with unfinished or unknown
    /// dependencies are skipped.
    #[must_use]
    pub fn next_tasks(&self, limit: usize) -> Vec<&Task> {
        let mut candidates: Vec<(usize, &Task)> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.status.is_terminal())
            .collect();
        candidates.sort_by_key(|(i, t)| (t.priority, t.created_at, *i));
        candidates
            .into_iter()
            .map(|(_, t)| t)
            .filter(|t| self.dependencies_satisfied(t))
            .take(limit)
            .collect()
    }

    /// Save the register as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize task register")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write task register: {}", path.display()))?;
        Ok(())
    }

    /// Load a register saved by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task register: {}", path.display()))?;
        let mut tracker: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse task register: {}", path.display()))?;
        tracker.rebuild_index();
        Ok(tracker)
    }

    /// Load a register, or start empty if the file does not exist.
    pub fn load_or_new(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Parse a task list file: either a bare JSON array of tasks or a saved
    /// register.
    pub fn load_task_list(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task list: {}", path.display()))?;
        if let Ok(tasks) = serde_json::from_str::<Vec<Task>>(&content) {
            return Ok(Self::from_tasks(tasks));
        }
        let mut tracker: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse task list: {}", path.display()))?;
        tracker.rebuild_index();
        Ok(tracker)
    }
}
