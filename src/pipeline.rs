//! End-to-end flows: improvement to merged PR, and pull mode.
//!
//! The working tree is held from branch checkout through the TDD cycle and
//! the commit, so two tasks never interleave on one checkout.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::github::{
    CompletionReport, GitHubSyncAgent, Improvement, Opportunity, Priority, PullWorkflowReport,
    SyncReport,
};
use crate::tdd::{TddCycleDriver, TddOutcome};
use crate::tracker::{Task, TaskId, TaskPriority};
use crate::workspace::WorkspaceGuard;

/// What happened to one improvement or pulled issue.
#[derive(Debug, Clone, Serialize)]
pub struct ImprovementRun {
    pub sync: SyncReport,
    /// `None` when the sync did not produce a real issue on its branch, or
    /// the task was already registered.
    pub tdd: Option<TddOutcome>,
    /// `None` when the TDD cycle did not complete.
    pub completion: Option<CompletionReport>,
}

impl ImprovementRun {
    fn not_started(sync: SyncReport) -> Self {
        Self {
            sync,
            tdd: None,
            completion: None,
        }
    }

    /// Whether the issue went all the way through to a completion attempt
    /// without errors.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completion.as_ref().is_some_and(CompletionReport::is_ok)
    }
}

/// Result of [`Pipeline::run_pull_mode`].
#[derive(Debug, Clone, Serialize)]
pub struct PullModeRun {
    pub pull: PullWorkflowReport,
    pub runs: Vec<ImprovementRun>,
    /// Opportunities already in the task register.
    pub skipped: Vec<u64>,
}

/// Sync agent and TDD driver wired together.
#[derive(Debug)]
pub struct Pipeline {
    github: Arc<GitHubSyncAgent>,
    driver: TddCycleDriver,
}

impl Pipeline {
    pub fn new(github: Arc<GitHubSyncAgent>, driver: TddCycleDriver) -> Self {
        Self { github, driver }
    }

    pub fn github(&self) -> &GitHubSyncAgent {
        &self.github
    }

    pub fn driver(&self) -> &TddCycleDriver {
        &self.driver
    }

    pub fn into_driver(self) -> TddCycleDriver {
        self.driver
    }

    /// Sync an improvement, develop it test-first and complete the workflow.
    pub async fn run_improvement(&mut self, improvement: &Improvement) -> ImprovementRun {
        let lock = self.driver.workspace().clone();
        let workspace = lock.acquire().await;

        let sync = self
            .github
            .sync_improvement_to_github(improvement, &workspace)
            .await;
        if !sync.is_initiated() {
            warn!("No issue branch for {} improvement, skipping development", improvement.kind);
            return ImprovementRun::not_started(sync);
        }

        let title = self
            .github
            .tracked_issue(sync.issue_number)
            .map(|i| i.title)
            .unwrap_or_else(|| improvement.kind.title());
        let task = Task::new(sync.issue_number, title)
            .with_description(improvement.details().join("\n"))
            .with_priority(task_priority(improvement.priority))
            .with_issue(sync.issue_number);
        self.develop(sync, task, &workspace).await
    }

    /// Pull eligible issues from GitHub and develop each in turn.
    pub async fn run_pull_mode(&mut self) -> PullModeRun {
        let pull = self.github.execute_pull_workflow().await;
        let mut runs = Vec::with_capacity(pull.opportunities.len());
        let mut skipped = Vec::new();

        for opportunity in &pull.opportunities {
            let number = opportunity.issue_number;
            if self.driver.tracker().get(&TaskId::from(number)).is_some() {
                info!("Issue #{} is already a tracked task, skipping", number);
                skipped.push(number);
                continue;
            }

            let lock = self.driver.workspace().clone();
            let workspace = lock.acquire().await;
            let sync = self.github.adopt_opportunity(opportunity, &workspace).await;
            if !sync.is_initiated() {
                warn!("Issue #{} has no branch, skipping development", number);
                runs.push(ImprovementRun::not_started(sync));
                continue;
            }
            let task = task_from_opportunity(opportunity);
            runs.push(self.develop(sync, task, &workspace).await);
        }

        info!(
            "Pull mode processed {} issue(s): {}",
            runs.len(),
            self.driver.tracker().generate_progress_report()
        );
        PullModeRun { pull, runs, skipped }
    }

    async fn develop(&mut self, sync: SyncReport, task: Task, workspace: &WorkspaceGuard) -> ImprovementRun {
        let id: TaskId = task.id.clone();
        let issue_number = sync.issue_number;

        if !self.driver.register(task) {
            warn!("Task {} is already registered, not developing it again", id);
            return ImprovementRun::not_started(sync);
        }
        let outcome = self.driver.run_task(&id, workspace).await;

        let completion = if outcome.completed {
            Some(
                self.github
                    .complete_improvement_workflow(issue_number, &outcome.files(), workspace)
                    .await,
            )
        } else {
            warn!("Issue #{} not completed: TDD cycle failed", issue_number);
            None
        };

        ImprovementRun {
            sync,
            tdd: Some(outcome),
            completion,
        }
    }
}

fn task_priority(priority: Priority) -> TaskPriority {
    match priority {
        Priority::High => TaskPriority::High,
        Priority::Medium => TaskPriority::Medium,
        Priority::Low => TaskPriority::Low,
    }
}

fn task_from_opportunity(opportunity: &Opportunity) -> Task {
    let mut task = Task::new(opportunity.issue_number, opportunity.title.clone())
        .with_description(opportunity.description.clone())
        .with_priority(task_priority(opportunity.priority))
        .with_issue(opportunity.issue_number);
    task.labels = opportunity.labels.clone();
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GitHubConfig, TddConfig, WorkflowConfig};
    use crate::github::{ImprovementType, SkipReason};
    use crate::tdd::TddDependencies;
    use crate::testing::{
        MockAiBackend, MockCommandRunner, MockFileSystem, MockTestSuite, TestRunReport,
    };
    use crate::tracker::{TaskStatus, TaskStatusTracker};
    use std::time::Duration;

    const ISSUE_URL: &str = "https://github.com/acme/widgets/issues/42\n";
    const PR_URL: &str = "https://github.com/acme/widgets/pull/43\n";

    fn pipeline(runner: &Arc<MockCommandRunner>, suite: MockTestSuite, auto_merge: bool) -> Pipeline {
        pipeline_with_tasks(runner, suite, auto_merge, Vec::new())
    }

    fn pipeline_with_tasks(
        runner: &Arc<MockCommandRunner>,
        suite: MockTestSuite,
        auto_merge: bool,
        tasks: Vec<Task>,
    ) -> Pipeline {
        let github = Arc::new(GitHubSyncAgent::new(
            runner.clone(),
            GitHubConfig {
                owner: "acme".into(),
                repo: "widgets".into(),
                project_id: String::new(),
            },
            WorkflowConfig {
                auto_merge,
                retry_delay_ms: 0,
                ..Default::default()
            },
        ));
        let driver = TddCycleDriver::new(
            TddDependencies {
                ai: Arc::new(MockAiBackend::new().with_default_response("```python\nx = 1\n```")),
                tests: Arc::new(suite),
                fs: Arc::new(MockFileSystem::new()),
                github: Some(github.clone()),
            },
            TaskStatusTracker::from_tasks(tasks),
            TddConfig::default(),
        );
        Pipeline::new(github, driver)
    }

    fn bug() -> Improvement {
        Improvement::new(ImprovementType::BugFix, Priority::High).with_pattern("NullPointer in parser")
    }

    #[tokio::test]
    async fn test_run_improvement_end_to_end() {
        let runner = Arc::new(
            MockCommandRunner::new()
                .succeed("gh", &["issue", "create"], ISSUE_URL)
                .succeed("gh", &["pr", "create"], PR_URL)
                .succeed("gh", &["pr", "view"], r#"{"statusCheckRollup": []}"#),
        );
        let mut pipeline = pipeline(&runner, MockTestSuite::new(), true);

        let run = pipeline.run_improvement(&bug()).await;

        assert!(run.is_complete(), "{:?}", run.completion);
        let outcome = run.tdd.unwrap();
        assert!(outcome.completed);
        let completion = run.completion.unwrap();
        assert!(completion.merge.unwrap().merged());
        assert!(completion.closed);

        let added: Vec<String> = runner
            .calls_matching("git", &["add"])
            .iter()
            .map(|c| c.args[1].clone())
            .collect();
        assert_eq!(
            added,
            vec![
                "tests/test_bug_auto_fix_nullpointer_in_parser.py",
                "src/bug_auto_fix_nullpointer_in_parser.py"
            ]
        );
        let task = pipeline.driver().tracker().get(&TaskId::from(42u64)).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.priority, TaskPriority::High);
        assert!(!pipeline.github().is_tracked(42));
    }

    #[tokio::test]
    async fn test_run_improvement_stops_on_simulated_issue() {
        let runner = Arc::new(MockCommandRunner::new().fail("gh", &["issue", "create"], 1, "HTTP 502"));
        let mut pipeline = pipeline(&runner, MockTestSuite::new(), true);

        let run = pipeline.run_improvement(&bug()).await;

        assert!(run.tdd.is_none());
        assert!(run.completion.is_none());
        assert!(pipeline.driver().tracker().is_empty());
        assert!(runner.calls_matching("git", &[]).is_empty());
    }

    #[tokio::test]
    async fn test_failed_cycle_leaves_issue_open() {
        let runner = Arc::new(MockCommandRunner::new().succeed("gh", &["issue", "create"], ISSUE_URL));
        let suite = MockTestSuite::new().with_reports(vec![TestRunReport::fail(1, "red"), TestRunReport::fail(1, "red")]);
        let mut pipeline = pipeline(&runner, suite, true);

        let run = pipeline.run_improvement(&bug()).await;

        assert!(!run.tdd.unwrap().completed);
        assert!(run.completion.is_none());
        assert!(runner.calls_matching("git", &["commit"]).is_empty());
        assert!(pipeline.github().is_tracked(42));
    }

    #[tokio::test]
    async fn test_pending_checks_keep_issue_in_testing() {
        let rollup = r#"{"statusCheckRollup": [{"name": "ci", "status": "IN_PROGRESS", "conclusion": ""}]}"#;
        let runner = Arc::new(
            MockCommandRunner::new()
                .succeed("gh", &["issue", "create"], ISSUE_URL)
                .succeed("gh", &["pr", "create"], PR_URL)
                .succeed("gh", &["pr", "view"], rollup),
        );
        let mut pipeline = pipeline(&runner, MockTestSuite::new(), true);

        let run = pipeline.run_improvement(&bug()).await;

        let merge = run.completion.unwrap().merge.unwrap();
        assert_eq!(merge.reason(), Some(&SkipReason::ChecksPending));
        assert!(runner.calls_matching("gh", &["pr", "merge"]).is_empty());
        assert!(pipeline.github().pending_pr(42).is_some());
    }

    #[tokio::test]
    async fn test_run_pull_mode_develops_each_opportunity() {
        let issues = r#"[
            {"number": 5, "title": "Crash on empty input", "labels": [{"name": "bug"}], "body": "", "assignees": []},
            {"number": 6, "title": "Add CSV export", "labels": [{"name": "feature"}], "body": "", "assignees": []},
            {"number": 7, "title": "[AUTO] Auto-Improvement", "labels": [{"name": "auto-generated"}], "body": "", "assignees": []}
        ]"#;
        let runner = Arc::new(MockCommandRunner::new().succeed("gh", &["issue", "list"], issues));
        let mut pipeline = pipeline(&runner, MockTestSuite::new(), false);

        let result = pipeline.run_pull_mode().await;

        assert_eq!(result.runs.len(), 2);
        assert!(result.runs.iter().all(ImprovementRun::is_complete));
        let branches: Vec<String> = runner
            .calls_matching("git", &["checkout", "-b"])
            .iter()
            .map(|c| c.args[2].clone())
            .collect();
        assert_eq!(branches, vec!["auto/bug_fix/issue-5", "auto/feature/issue-6"]);
        assert!(pipeline.driver().tracker().get(&TaskId::from(7u64)).is_none());
        assert_eq!(pipeline.driver().tracker().get_loop_statistics().completed, 2);
    }

    #[tokio::test]
    async fn test_run_improvement_waits_for_the_working_tree() {
        let runner = Arc::new(MockCommandRunner::new().succeed("gh", &["issue", "create"], ISSUE_URL));
        let mut pipeline = pipeline(&runner, MockTestSuite::new(), false);
        let held = pipeline.driver().workspace().try_acquire().unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), pipeline.run_improvement(&bug())).await;
        assert!(blocked.is_err());
        assert_eq!(runner.call_count(), 0);

        drop(held);
        let run = pipeline.run_improvement(&bug()).await;
        assert!(run.is_complete(), "{:?}", run.completion);
        assert_eq!(runner.calls_matching("git", &["checkout", "-b"]).len(), 1);
    }

    #[tokio::test]
    async fn test_run_improvement_stops_when_branch_fails() {
        let runner = Arc::new(
            MockCommandRunner::new()
                .succeed("gh", &["issue", "create"], ISSUE_URL)
                .fail("git", &["checkout", "-b"], 128, "fatal: not a git repository"),
        );
        let mut pipeline = pipeline(&runner, MockTestSuite::new(), true);

        let run = pipeline.run_improvement(&bug()).await;

        assert!(!run.sync.is_initiated());
        assert!(run.tdd.is_none());
        assert!(pipeline.driver().tracker().is_empty());
        assert!(runner.calls_matching("git", &["commit"]).is_empty());
    }

    #[tokio::test]
    async fn test_run_pull_mode_skips_registered_tasks() {
        let issues = r#"[
            {"number": 5, "title": "Crash on empty input", "labels": [{"name": "bug"}], "body": "", "assignees": []},
            {"number": 6, "title": "Add CSV export", "labels": [{"name": "feature"}], "body": "", "assignees": []}
        ]"#;
        let runner = Arc::new(MockCommandRunner::new().succeed("gh", &["issue", "list"], issues));
        let mut done = Task::new(5u64, "Crash on empty input").with_issue(5);
        done.status = TaskStatus::Completed;
        let mut pipeline = pipeline_with_tasks(&runner, MockTestSuite::new(), false, vec![done]);

        let result = pipeline.run_pull_mode().await;

        assert_eq!(result.skipped, vec![5]);
        assert_eq!(result.runs.len(), 1);
        assert_eq!(result.runs[0].sync.issue_number, 6);
        let branches: Vec<String> = runner
            .calls_matching("git", &["checkout"])
            .iter()
            .map(|c| c.args.last().cloned().unwrap_or_default())
            .collect();
        assert_eq!(branches, vec!["auto/feature/issue-6"]);
        assert!(runner.calls_matching("gh", &["issue", "comment", "5"]).is_empty());
    }
}
