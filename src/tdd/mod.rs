//! TDD cycle driver.
//!
//! # Architecture
//!
//! ```text
//! TddCycleDriver
//!   ├── ai: AiBackend          (analysis, tests, implementation, refactor)
//!   ├── tests: TestSuite       (one run per phase)
//!   ├── fs: FileSystem         (flushed before every test run)
//!   ├── github: GitHubSyncAgent (optional: comments + status labels)
//!   └── tracker: TaskStatusTracker
//! ```
//!
//! Each task runs `ANALYSIS -> RED -> GREEN -> REFACTOR -> DONE` to completion
//! or failure before the next one starts. A failure blocks the task and the
//! run moves on.
//!
//! - RED: tests that pass immediately are a warning, not a failure.
//! - GREEN: tests must pass. Coverage below the minimum is a warning.
//! - REFACTOR: if the rewrite breaks the tests, the GREEN implementation is
//!   restored and the task is blocked. An AI failure skips the refactor.

pub mod phase;
pub mod prompts;
pub mod test_runner;

pub use phase::TddPhase;
pub use test_runner::{extract_coverage, CommandTestSuite};

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::ai::extract_code_block;
use crate::config::TddConfig;
use crate::error::{AutodevError, Result};
use crate::github::{sanitize, GitHubSyncAgent};
use crate::testing::{AiBackend, FileSystem, TestRunReport, TestSuite};
use crate::tracker::{LoopStatistics, Task, TaskId, TaskStatus, TaskStatusTracker};
use crate::workspace::{WorkspaceGuard, WorkspaceLock};

/// Longest module name derived from a task title.
const MAX_MODULE_NAME_LEN: usize = 48;

/// External collaborators of the driver.
pub struct TddDependencies {
    pub ai: Arc<dyn AiBackend>,
    pub tests: Arc<dyn TestSuite>,
    pub fs: Arc<dyn FileSystem>,
    /// Progress is mirrored to the task's issue when present.
    pub github: Option<Arc<GitHubSyncAgent>>,
}

impl std::fmt::Debug for TddDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TddDependencies")
            .field("ai", &self.ai.model_name())
            .field("tests", &"<dyn TestSuite>")
            .field("fs", &"<dyn FileSystem>")
            .field("github", &self.github.is_some())
            .finish()
    }
}

/// Result of one task's cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TddOutcome {
    pub task_id: TaskId,
    pub completed: bool,
    /// Phase the task was in when it failed.
    pub failed_phase: Option<TddPhase>,
    pub error: Option<String>,
    pub test_file: Option<PathBuf>,
    pub implementation_file: Option<PathBuf>,
    pub coverage: f64,
    pub coverage_warning: bool,
    pub tests_passed_in_red: bool,
    pub refactor_skipped: bool,
    /// The GREEN implementation was restored after a failed refactor.
    pub rolled_back: bool,
    /// The task was already finished or blocked; no cycle ran.
    pub skipped: bool,
}

impl TddOutcome {
    fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            completed: false,
            failed_phase: None,
            error: None,
            test_file: None,
            implementation_file: None,
            coverage: 0.0,
            coverage_warning: false,
            tests_passed_in_red: false,
            refactor_skipped: false,
            rolled_back: false,
            skipped: false,
        }
    }

    /// Files written for the task, tests first.
    #[must_use]
    pub fn files(&self) -> Vec<PathBuf> {
        self.test_file
            .iter()
            .chain(self.implementation_file.iter())
            .cloned()
            .collect()
    }
}

/// Result of [`TddCycleDriver::run_all`].
#[derive(Debug, Clone, Serialize)]
pub struct TddRunSummary {
    pub outcomes: Vec<TddOutcome>,
    pub statistics: LoopStatistics,
    pub report: String,
}

/// Drives tasks through RED, GREEN and REFACTOR.
#[derive(Debug)]
pub struct TddCycleDriver {
    deps: TddDependencies,
    tracker: TaskStatusTracker,
    config: TddConfig,
    workspace: WorkspaceLock,
}

impl TddCycleDriver {
    pub fn new(deps: TddDependencies, tracker: TaskStatusTracker, config: TddConfig) -> Self {
        Self::with_workspace(deps, tracker, config, WorkspaceLock::new())
    }

    /// Share the working-tree lock with other components.
    pub fn with_workspace(
        deps: TddDependencies,
        tracker: TaskStatusTracker,
        config: TddConfig,
        workspace: WorkspaceLock,
    ) -> Self {
        Self {
            deps,
            tracker,
            config,
            workspace,
        }
    }

    pub fn tracker(&self) -> &TaskStatusTracker {
        &self.tracker
    }

    pub fn into_tracker(self) -> TaskStatusTracker {
        self.tracker
    }

    pub fn workspace(&self) -> &WorkspaceLock {
        &self.workspace
    }

    /// Add a task to the register. Returns `false` for a duplicate id.
    pub fn register(&mut self, task: Task) -> bool {
        self.tracker.register(task)
    }

    /// Test and implementation paths for a task.
    #[must_use]
    pub fn paths_for(&self, task: &Task) -> (PathBuf, PathBuf) {
        let name = module_name(task);
        let ext = &self.config.test_file_extension;
        (
            self.config.tests_dir.join(format!("test_{}.{}", name, ext)),
            self.config.source_dir.join(format!("{}.{}", name, ext)),
        )
    }

    /// Run every runnable task in priority order, one at a time.
    pub async fn run_all(&mut self) -> TddRunSummary {
        let mut outcomes = Vec::new();
        let mut attempted = HashSet::new();

        loop {
            let Some(id) = self.tracker.next_tasks(1).first().map(|t| t.id.clone()) else {
                break;
            };
            if !attempted.insert(id.clone()) {
                warn!("Task {} is still runnable after its cycle, stopping", id);
                break;
            }
            let guard = self.workspace.acquire().await;
            outcomes.push(self.run_task(&id, &guard).await);
        }

        let statistics = self.tracker.get_loop_statistics();
        let report = self.tracker.generate_progress_report();
        info!("TDD run finished: {}", report);
        TddRunSummary {
            outcomes,
            statistics,
            report,
        }
    }

    /// Run one task's full cycle while holding the working tree.
    pub async fn run_task(&mut self, id: &TaskId, _workspace: &WorkspaceGuard) -> TddOutcome {
        let mut outcome = TddOutcome::new(id.clone());
        let Some(task) = self.tracker.get(id).cloned() else {
            warn!("Task {} not found, nothing to run", id);
            outcome.error = Some(format!("task {} not found", id));
            return outcome;
        };
        if task.status.is_terminal() {
            warn!("Task {} is already {}, skipping", id, task.status);
            outcome.skipped = true;
            return outcome;
        }

        info!("Starting TDD cycle for task {}: {}", task.id, task.title);
        let mut phase = TddPhase::Analysis;
        match self.cycle(&task, &mut phase, &mut outcome).await {
            Ok(()) => {
                outcome.completed = true;
                info!("Task {} completed", task.id);
            }
            Err(e) => {
                outcome.failed_phase = Some(phase);
                outcome.error = Some(e.to_string());
                self.fail(&task, phase, &e).await;
            }
        }
        outcome
    }

    async fn cycle(&mut self, task: &Task, phase: &mut TddPhase, outcome: &mut TddOutcome) -> Result<()> {
        let (test_path, impl_path) = self.paths_for(task);

        // ANALYSIS
        self.comment(task, phase.start_comment()).await;
        let analysis = self
            .ask(&prompts::analysis(task, &self.config), prompts::ANALYSIS_MAX_TOKENS)
            .await?;
        debug!("Analysis for task {}: {} chars", task.id, analysis.len());

        // RED
        *phase = self.enter(task, phase.next()).await;
        let test_code = extract_code_block(
            &self
                .ask(
                    &prompts::red(task, &analysis, &test_path, &impl_path, &self.config),
                    prompts::CODE_MAX_TOKENS,
                )
                .await?,
        );
        self.persist(&test_path, &test_code).await?;
        outcome.test_file = Some(test_path.clone());
        self.tracker.record_files(&task.id, &[test_path.clone()], &[]);

        let red = self.deps.tests.run().await?;
        if red.passed {
            warn!(
                "Task {}: tests pass before any implementation, the task may be degenerate",
                task.id
            );
            outcome.tests_passed_in_red = true;
        } else {
            debug!("Task {}: tests fail as expected (exit {})", task.id, red.exit_code);
        }

        // GREEN
        *phase = self.enter(task, phase.next()).await;
        let implementation = extract_code_block(
            &self
                .ask(
                    &prompts::green(task, &test_code, &impl_path, &self.config),
                    prompts::CODE_MAX_TOKENS,
                )
                .await?,
        );
        self.persist(&impl_path, &implementation).await?;
        outcome.implementation_file = Some(impl_path.clone());
        self.tracker.record_files(&task.id, &[], &[impl_path.clone()]);

        let green = self.deps.tests.run().await?;
        if !green.passed {
            debug!("GREEN output for task {}:\n{}", task.id, green.output);
            return Err(AutodevError::TestsFailing {
                phase: TddPhase::Green.to_string(),
            });
        }
        outcome.coverage = green.coverage;
        if green.coverage < self.config.min_coverage {
            warn!(
                "Task {}: coverage {:.1}% is below the {:.1}% minimum",
                task.id, green.coverage, self.config.min_coverage
            );
            outcome.coverage_warning = true;
            let note = format!(
                "**Coverage warning**\n\nCoverage is {:.1}%, below the {:.1}% minimum.",
                green.coverage, self.config.min_coverage
            );
            self.comment(task, &note).await;
        }

        // REFACTOR
        *phase = self.enter(task, phase.next()).await;
        self.refactor(task, &impl_path, &implementation, &green, outcome)
            .await?;

        // DONE
        *phase = self.enter(task, phase.next()).await;
        let summary = completion_summary(outcome);
        self.comment(task, &summary).await;
        Ok(())
    }

    async fn refactor(
        &mut self,
        task: &Task,
        impl_path: &Path,
        green_code: &str,
        green: &TestRunReport,
        outcome: &mut TddOutcome,
    ) -> Result<()> {
        let reply = match self
            .ask(&prompts::refactor(task, green_code, &green.output), prompts::CODE_MAX_TOKENS)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Task {}: refactor skipped: {}", task.id, e);
                outcome.refactor_skipped = true;
                return Ok(());
            }
        };
        let refactored = extract_code_block(&reply);
        if refactored.is_empty() || refactored == green_code {
            debug!("Task {}: refactor produced no change", task.id);
            outcome.refactor_skipped = true;
            return Ok(());
        }

        self.persist(impl_path, &refactored).await?;
        let passed = match self.deps.tests.run().await {
            Ok(report) => {
                outcome.coverage = report.coverage.max(outcome.coverage);
                report.passed
            }
            Err(e) => {
                warn!("Task {}: test run after refactor failed: {}", task.id, e);
                false
            }
        };
        if passed {
            return Ok(());
        }

        warn!(
            "Task {}: refactor broke the tests, restoring {}",
            task.id,
            impl_path.display()
        );
        self.persist(impl_path, green_code).await?;
        outcome.rolled_back = true;
        match self.deps.tests.run().await {
            Ok(report) if report.passed => debug!("Task {}: GREEN state restored", task.id),
            Ok(report) => warn!(
                "Task {}: tests still failing after restore (exit {})",
                task.id, report.exit_code
            ),
            Err(e) => warn!("Task {}: could not confirm restore: {}", task.id, e),
        }
        Err(AutodevError::TestsFailing {
            phase: TddPhase::Refactor.to_string(),
        })
    }

    /// Record the phase's status and announce it on the issue.
    async fn enter(&mut self, task: &Task, phase: TddPhase) -> TddPhase {
        info!("Task {}: {} phase", task.id, phase);
        if let Some(status) = phase.task_status() {
            self.set_status(task, status).await;
        }
        if phase != TddPhase::Done {
            self.comment(task, phase.start_comment()).await;
        }
        phase
    }

    async fn set_status(&mut self, task: &Task, status: TaskStatus) {
        self.tracker.update_status(&task.id, status);
        if let (Some(github), Some(issue)) = (&self.deps.github, task.issue_number) {
            github.apply_status_labels(issue, status).await;
        }
    }

    async fn comment(&self, task: &Task, body: &str) {
        if let (Some(github), Some(issue)) = (&self.deps.github, task.issue_number) {
            github.comment_on_issue(issue, body).await;
        }
    }

    async fn ask(&self, user_prompt: &str, max_tokens: u32) -> Result<String> {
        Ok(self
            .deps
            .ai
            .chat(prompts::SYSTEM_PROMPT, user_prompt, max_tokens, prompts::TEMPERATURE)
            .await?)
    }

    async fn persist(&self, path: &Path, content: &str) -> Result<()> {
        self.deps.fs.write_file(path, content).await?;
        debug!("Persisted {}", path.display());
        Ok(())
    }

    async fn fail(&mut self, task: &Task, phase: TddPhase, err: &AutodevError) {
        error!("Task {} failed in {} phase: {}", task.id, phase, err);
        let reason = format!("{} phase: {}", phase, err);
        self.tracker.block(&task.id, &reason);
        if let (Some(github), Some(issue)) = (&self.deps.github, task.issue_number) {
            github.apply_status_labels(issue, TaskStatus::Blocked).await;
            let body = format!(
                "**Task blocked**\n\n**Phase:** {}\n**Reason:** {}",
                phase, err
            );
            github.comment_on_issue(issue, &body).await;
        }
    }
}

fn completion_summary(outcome: &TddOutcome) -> String {
    let mut body = String::from("**TDD cycle complete**\n\n");
    for (label, path) in [
        ("Tests", &outcome.test_file),
        ("Implementation", &outcome.implementation_file),
    ] {
        if let Some(path) = path {
            body.push_str(&format!("- {}: `{}`\n", label, path.display()));
        }
    }
    body.push_str(&format!("- Coverage: {:.1}%\n", outcome.coverage));
    if outcome.refactor_skipped {
        body.push_str("- Refactor: skipped\n");
    }
    body
}

/// File stem derived from the task title, falling back to the id.
fn module_name(task: &Task) -> String {
    let spaced: String = task
        .title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    let mut name = sanitize(&spaced);
    if name.len() > MAX_MODULE_NAME_LEN {
        name.truncate(MAX_MODULE_NAME_LEN);
        name = name.trim_end_matches('_').to_string();
    }
    if name.is_empty() {
        format!("task_{}", sanitize(task.id.as_str()))
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiError;
    use crate::config::{GitHubConfig, WorkflowConfig};
    use crate::testing::{MockAiBackend, MockCommandRunner, MockFileSystem, MockTestSuite};

    const TESTS_REPLY: &str = "```python\nfrom src.parse_dates import parse\n\ndef test_parse():\n    assert parse('2024-01-01')\n```";
    const IMPL_REPLY: &str = "```python\ndef parse(s):\n    return s\n```";
    const REFACTOR_REPLY: &str = "```python\ndef parse(value):\n    return value\n```";

    struct Harness {
        ai: Arc<MockAiBackend>,
        suite: Arc<MockTestSuite>,
        fs: Arc<MockFileSystem>,
        runner: Arc<MockCommandRunner>,
    }

    impl Harness {
        fn new(ai: MockAiBackend, suite: MockTestSuite) -> Self {
            Self {
                ai: Arc::new(ai),
                suite: Arc::new(suite),
                fs: Arc::new(MockFileSystem::new()),
                runner: Arc::new(MockCommandRunner::new()),
            }
        }

        fn driver(&self, tasks: Vec<Task>) -> TddCycleDriver {
            let github = GitHubSyncAgent::new(
                self.runner.clone(),
                GitHubConfig {
                    owner: "acme".into(),
                    repo: "widgets".into(),
                    project_id: String::new(),
                },
                WorkflowConfig::default(),
            );
            TddCycleDriver::new(
                TddDependencies {
                    ai: self.ai.clone(),
                    tests: self.suite.clone(),
                    fs: self.fs.clone(),
                    github: Some(Arc::new(github)),
                },
                TaskStatusTracker::from_tasks(tasks),
                TddConfig::default(),
            )
        }

        fn comments(&self) -> Vec<String> {
            self.runner
                .calls_matching("gh", &["issue", "comment"])
                .iter()
                .filter_map(|c| c.flag_value("--body").map(str::to_string))
                .collect()
        }

        fn label_sets(&self) -> Vec<String> {
            self.runner
                .calls_matching("gh", &["issue", "edit"])
                .iter()
                .filter_map(|c| c.flag_value("--add-label").map(str::to_string))
                .collect()
        }
    }

    fn happy_ai() -> MockAiBackend {
        MockAiBackend::new()
            .with_response("1. Parse ISO dates")
            .with_response(TESTS_REPLY)
            .with_response(IMPL_REPLY)
            .with_response(REFACTOR_REPLY)
    }

    fn task() -> Task {
        Task::new(1u64, "Parse dates").with_issue(42)
    }

    async fn run_one(driver: &mut TddCycleDriver, id: u64) -> TddOutcome {
        let lock = driver.workspace().clone();
        let guard = lock.acquire().await;
        driver.run_task(&TaskId::from(id), &guard).await
    }

    // =========================================================================
    // Happy path
    // =========================================================================

    #[tokio::test]
    async fn test_full_cycle_completes_task() {
        let h = Harness::new(
            happy_ai(),
            MockTestSuite::new().with_reports(vec![
                TestRunReport::fail(1, "ImportError"),
                TestRunReport::pass(92.0),
                TestRunReport::pass(93.0),
            ]),
        );
        let mut driver = h.driver(vec![task()]);

        let outcome = run_one(&mut driver, 1).await;

        assert!(outcome.completed, "{:?}", outcome.error);
        assert!(!outcome.tests_passed_in_red);
        assert!(!outcome.coverage_warning);
        assert_eq!(outcome.coverage, 93.0);
        assert_eq!(h.suite.call_count(), 3);
        assert_eq!(h.ai.call_count(), 4);

        let test_path = PathBuf::from("tests/test_parse_dates.py");
        let impl_path = PathBuf::from("src/parse_dates.py");
        assert_eq!(outcome.files(), vec![test_path.clone(), impl_path.clone()]);
        assert!(h.fs.content(&test_path).unwrap().starts_with("from src.parse_dates"));
        assert_eq!(h.fs.content(&impl_path).unwrap(), "def parse(value):\n    return value");

        let tracked = driver.tracker().get(&TaskId::from(1u64)).unwrap();
        assert_eq!(tracked.status, TaskStatus::Completed);
        let statuses: Vec<TaskStatus> = tracked.history.iter().map(|t| t.to).collect();
        assert_eq!(
            statuses,
            vec![
                TaskStatus::TddRed,
                TaskStatus::TddGreen,
                TaskStatus::TddRefactor,
                TaskStatus::Completed
            ]
        );
        assert_eq!(tracked.test_files, vec![test_path]);
        assert_eq!(tracked.implementation_files, vec![impl_path]);
    }

    #[tokio::test]
    async fn test_finished_task_is_skipped_not_completed() {
        let h = Harness::new(happy_ai(), MockTestSuite::new());
        let mut done = task();
        done.status = TaskStatus::Completed;
        let mut driver = h.driver(vec![done]);

        let outcome = run_one(&mut driver, 1).await;

        assert!(outcome.skipped);
        assert!(!outcome.completed);
        assert!(outcome.files().is_empty());
        assert_eq!(h.ai.call_count(), 0);
        assert_eq!(h.suite.call_count(), 0);
        assert!(h.comments().is_empty());
    }

    #[tokio::test]
    async fn test_each_phase_is_announced_on_the_issue() {
        let h = Harness::new(happy_ai(), MockTestSuite::new());
        let mut driver = h.driver(vec![task()]);
        run_one(&mut driver, 1).await;

        let comments = h.comments();
        assert_eq!(comments.len(), 5);
        assert!(comments[0].contains("Analysis"));
        assert!(comments[1].contains("RED"));
        assert!(comments[2].contains("GREEN"));
        assert!(comments[3].contains("REFACTOR"));
        assert!(comments[4].contains("TDD cycle complete"));
        assert!(comments[4].contains("src/parse_dates.py"));

        assert_eq!(
            h.label_sets(),
            vec!["tdd-red,in-progress", "tdd-green,in-progress", "tdd-refactor,in-progress", "completed"]
        );
    }

    #[tokio::test]
    async fn test_prompts_carry_previous_phase_output() {
        let h = Harness::new(happy_ai(), MockTestSuite::new());
        let mut driver = h.driver(vec![task()]);
        run_one(&mut driver, 1).await;

        let prompts = h.ai.prompts();
        assert!(prompts[1].1.contains("1. Parse ISO dates"));
        assert!(prompts[2].1.contains("def test_parse()"));
        assert!(prompts[3].1.contains("def parse(s):"));
        assert!(prompts.iter().all(|(system, _)| system == prompts::SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_task_without_issue_makes_no_cli_calls() {
        let h = Harness::new(happy_ai(), MockTestSuite::new());
        let mut driver = h.driver(vec![Task::new(1u64, "Parse dates")]);
        let outcome = run_one(&mut driver, 1).await;
        assert!(outcome.completed);
        assert_eq!(h.runner.call_count(), 0);
    }

    // =========================================================================
    // Soft gates
    // =========================================================================

    #[tokio::test]
    async fn test_tests_passing_in_red_is_a_warning() {
        let h = Harness::new(happy_ai(), MockTestSuite::new().with_reports(vec![TestRunReport::pass(100.0)]));
        let mut driver = h.driver(vec![task()]);
        let outcome = run_one(&mut driver, 1).await;
        assert!(outcome.completed);
        assert!(outcome.tests_passed_in_red);
    }

    #[tokio::test]
    async fn test_low_coverage_is_a_warning() {
        let h = Harness::new(
            happy_ai(),
            MockTestSuite::new().with_reports(vec![TestRunReport::fail(1, "x"), TestRunReport::pass(55.0)]),
        );
        let mut driver = h.driver(vec![task()]);
        let outcome = run_one(&mut driver, 1).await;

        assert!(outcome.completed);
        assert!(outcome.coverage_warning);
        assert!(h.comments().iter().any(|c| c.contains("55.0%")));
    }

    #[tokio::test]
    async fn test_refactor_ai_failure_skips_refactor() {
        let ai = MockAiBackend::new()
            .with_response("plan")
            .with_response(TESTS_REPLY)
            .with_response(IMPL_REPLY)
            .with_error(AiError::Timeout { timeout_secs: 300 });
        let h = Harness::new(ai, MockTestSuite::new());
        let mut driver = h.driver(vec![task()]);
        let outcome = run_one(&mut driver, 1).await;

        assert!(outcome.completed);
        assert!(outcome.refactor_skipped);
        assert_eq!(h.fs.content("src/parse_dates.py").unwrap(), "def parse(s):\n    return s");
        assert_eq!(h.suite.call_count(), 2);
    }

    // =========================================================================
    // Hard gates
    // =========================================================================

    #[tokio::test]
    async fn test_green_failure_blocks_task_before_refactor() {
        let h = Harness::new(
            happy_ai(),
            MockTestSuite::new().with_reports(vec![TestRunReport::fail(1, "red"), TestRunReport::fail(1, "still red")]),
        );
        let mut driver = h.driver(vec![task()]);
        let outcome = run_one(&mut driver, 1).await;

        assert!(!outcome.completed);
        assert_eq!(outcome.failed_phase, Some(TddPhase::Green));
        assert_eq!(h.ai.call_count(), 3);
        assert_eq!(h.suite.call_count(), 2);

        let tracked = driver.tracker().get(&TaskId::from(1u64)).unwrap();
        assert_eq!(tracked.status, TaskStatus::Blocked);
        assert!(tracked.history.iter().all(|t| t.to != TaskStatus::TddRefactor));
        assert!(h.comments().iter().any(|c| c.contains("Task blocked")));
        assert_eq!(h.label_sets().last().map(String::as_str), Some("blocked"));
    }

    #[tokio::test]
    async fn test_refactor_failure_restores_green_implementation() {
        let h = Harness::new(
            happy_ai(),
            MockTestSuite::new().with_reports(vec![
                TestRunReport::fail(1, "red"),
                TestRunReport::pass(90.0),
                TestRunReport::fail(1, "refactor broke it"),
                TestRunReport::pass(90.0),
            ]),
        );
        let mut driver = h.driver(vec![task()]);
        let outcome = run_one(&mut driver, 1).await;

        assert!(!outcome.completed);
        assert!(outcome.rolled_back);
        assert_eq!(outcome.failed_phase, Some(TddPhase::Refactor));
        assert_eq!(h.fs.content("src/parse_dates.py").unwrap(), "def parse(s):\n    return s");
        assert_eq!(h.suite.call_count(), 4);
        assert_eq!(
            driver.tracker().get(&TaskId::from(1u64)).unwrap().status,
            TaskStatus::Blocked
        );
    }

    #[tokio::test]
    async fn test_analysis_failure_blocks_task() {
        let ai = MockAiBackend::new().with_error(AiError::ServerUnavailable {
            base_url: "http://localhost:1234".into(),
            message: "connection refused".into(),
        });
        let h = Harness::new(ai, MockTestSuite::new());
        let mut driver = h.driver(vec![task()]);
        let outcome = run_one(&mut driver, 1).await;

        assert_eq!(outcome.failed_phase, Some(TddPhase::Analysis));
        assert!(h.fs.paths().is_empty());
        assert_eq!(h.suite.call_count(), 0);
    }

    // =========================================================================
    // Run loop
    // =========================================================================

    #[tokio::test]
    async fn test_run_all_continues_after_failure() {
        let ai = MockAiBackend::new()
            .with_error(AiError::EmptyResponse)
            .with_default_response("```python\npass\n```");
        let h = Harness::new(ai, MockTestSuite::new());
        let mut driver = h.driver(vec![
            Task::new(1u64, "First"),
            Task::new(2u64, "Second"),
            Task::new(3u64, "Third").with_dependency(1u64),
        ]);

        let summary = driver.run_all().await;

        assert_eq!(summary.outcomes.len(), 2);
        assert!(!summary.outcomes[0].completed);
        assert!(summary.outcomes[1].completed);
        assert_eq!(summary.statistics.blocked, 1);
        assert_eq!(summary.statistics.completed, 1);
        // Third depends on the blocked task and never becomes runnable.
        assert_eq!(summary.statistics.pending, 1);
        assert_eq!(summary.report, "1/3 tasks done (0 in progress, 1 blocked, 1 pending)");
    }

    #[tokio::test]
    async fn test_unknown_task_is_reported_not_run() {
        let h = Harness::new(happy_ai(), MockTestSuite::new());
        let mut driver = h.driver(vec![task()]);
        let outcome = run_one(&mut driver, 7).await;
        assert!(!outcome.completed);
        assert!(outcome.error.unwrap().contains("not found"));
        assert_eq!(h.ai.call_count(), 0);
    }

    #[test]
    fn test_module_name() {
        assert_eq!(module_name(&Task::new(1u64, "Parse dates (ISO-8601)")), "parse_dates_iso_8601");
        assert_eq!(module_name(&Task::new(9u64, "???")), "task_9");
        let long = Task::new(1u64, "a".repeat(80));
        assert_eq!(module_name(&long).len(), MAX_MODULE_NAME_LEN);
    }
}
