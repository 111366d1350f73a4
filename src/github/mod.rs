//! GitHub workflow state machine.
//!
//! [`GitHubSyncAgent`] turns an [`Improvement`] into a tracked chain of
//! GitHub artifacts (issue, board card, feature branch) and later completes
//! that chain once generated code exists (commit, pull request, optional
//! auto-merge, issue close and release).
//!
//! Every external call goes through a [`CommandRunner`]. Failures are handled
//! at the operation boundary: a label error triggers one retry without
//! labels, an existing branch is checked out instead of created, and a failed
//! issue creation yields the simulated issue [`FALLBACK_ISSUE_NUMBER`].
//! Top-level operations return report structs and never propagate a raw
//! command error.
//!
//! # Example
//!
//! ```rust,ignore
//! use autodev::github::{GitHubSyncAgent, Improvement, ImprovementType, Priority};
//! use autodev::workspace::WorkspaceLock;
//!
//! let agent = GitHubSyncAgent::from_config(runner, &config);
//! let improvement = Improvement::new(ImprovementType::BugFix, Priority::High)
//!     .with_pattern("NullPointer in parser");
//!
//! let workspace = WorkspaceLock::new().acquire().await;
//! let report = agent.sync_improvement_to_github(&improvement, &workspace).await;
//! // ... run the TDD cycle on report.branch ...
//! let done = agent
//!     .complete_improvement_workflow(report.issue_number, &files, &workspace)
//!     .await;
//! ```

pub mod branch;
pub mod checks;
pub mod content;
pub mod improvement;
pub mod pull;
pub mod state;
pub mod version;

pub use branch::{sanitize, BranchName};
pub use checks::{CheckEntry, CheckRollup};
pub use content::{IssueContent, IssueContentGenerator, AUTO_GENERATED_LABEL};
pub use improvement::{Improvement, ImprovementType, Priority};
pub use pull::{BoardSyncReport, GitHubIssue, Opportunity, ProjectCard, PullWorkflowReport};
pub use state::{
    BoardColumn, CompletionReport, IssueStatus, MergeOutcome, PullRequest, SkipReason,
    SyncReport, SyncStatus, SyncWorkflowStatus, TrackedIssue, WorkflowStage,
    FALLBACK_ISSUE_NUMBER,
};
pub use version::SemVer;

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::config::{GitHubConfig, ProjectConfig, WorkflowConfig};
use crate::error::AutodevError;
use crate::process::{classify_failure, CommandError, CommandOutput, CommandSpec, FailureKind};
use crate::retry::{retry_until, RetryPolicy};
use crate::testing::CommandRunner;
use crate::tracker::{TaskStatus, STATUS_LABELS};
use crate::workspace::WorkspaceGuard;
use state::number_from_url;

/// Mutable agent state. Guarded by a std mutex that is never held across an
/// await point.
#[derive(Debug, Default)]
struct AgentState {
    current_version: SemVer,
    active_issues: HashMap<u64, TrackedIssue>,
    processed_issues: HashSet<u64>,
    pending_prs: HashMap<u64, PullRequest>,
}

/// Drives issues, branches, PRs and releases through `gh` and `git`.
pub struct GitHubSyncAgent {
    runner: Arc<dyn CommandRunner>,
    github: GitHubConfig,
    workflow: WorkflowConfig,
    content: IssueContentGenerator,
    state: Mutex<AgentState>,
}

impl std::fmt::Debug for GitHubSyncAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSyncAgent")
            .field("runner", &"<dyn CommandRunner>")
            .field("github", &self.github)
            .field("workflow", &self.workflow)
            .finish()
    }
}

impl GitHubSyncAgent {
    /// Create an agent. The starting version comes from
    /// `workflow.initial_version`, falling back to `1.0.0` if unparseable.
    pub fn new(runner: Arc<dyn CommandRunner>, github: GitHubConfig, workflow: WorkflowConfig) -> Self {
        let current_version = SemVer::parse(&workflow.initial_version).unwrap_or_else(|| {
            warn!(
                "Invalid initial version '{}', starting from 1.0.0",
                workflow.initial_version
            );
            SemVer::default()
        });
        let content = IssueContentGenerator::new(github.repo_url());
        Self {
            runner,
            github,
            workflow,
            content,
            state: Mutex::new(AgentState {
                current_version,
                ..Default::default()
            }),
        }
    }

    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &ProjectConfig) -> Self {
        Self::new(runner, config.github.clone(), config.workflow.clone())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn github_config(&self) -> &GitHubConfig {
        &self.github
    }

    pub fn workflow_config(&self) -> &WorkflowConfig {
        &self.workflow
    }

    pub fn content(&self) -> &IssueContentGenerator {
        &self.content
    }

    pub fn current_version(&self) -> SemVer {
        self.state().current_version
    }

    /// Version the next release for `kind` would get.
    pub fn next_version(&self, kind: ImprovementType) -> SemVer {
        self.current_version().bump(kind)
    }

    pub fn is_tracked(&self, issue_number: u64) -> bool {
        self.state().active_issues.contains_key(&issue_number)
    }

    pub fn tracked_issue(&self, issue_number: u64) -> Option<TrackedIssue> {
        self.state().active_issues.get(&issue_number).cloned()
    }

    /// Active issues ordered by number.
    pub fn active_issues(&self) -> Vec<TrackedIssue> {
        let mut issues: Vec<TrackedIssue> = self.state().active_issues.values().cloned().collect();
        issues.sort_by_key(|i| i.issue_number);
        issues
    }

    pub fn pending_pr(&self, issue_number: u64) -> Option<PullRequest> {
        self.state().pending_prs.get(&issue_number).cloned()
    }

    /// Start tracking an issue created elsewhere (pull mode, resumed runs).
    pub fn track_issue(&self, issue: TrackedIssue) {
        self.state().active_issues.insert(issue.issue_number, issue);
    }

    pub fn get_sync_status(&self) -> SyncStatus {
        let state = self.state();
        let mut active: Vec<u64> = state.active_issues.keys().copied().collect();
        active.sort_unstable();
        SyncStatus {
            repo: self.github.repo_slug(),
            project_id: self.github.project_id.clone(),
            current_version: state.current_version,
            active_issues: active,
            pending_prs: state.pending_prs.len(),
            pull_mode_enabled: self.workflow.pull_mode_enabled,
            processed_issues: state.processed_issues.len(),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update_issue(&self, issue_number: u64, f: impl FnOnce(&mut TrackedIssue)) {
        if let Some(issue) = self.state().active_issues.get_mut(&issue_number) {
            f(issue);
        }
    }

    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput, CommandError> {
        let spec = spec.with_timeout(self.workflow.command_timeout());
        self.runner.run(&spec).await
    }

    async fn gh<I, S>(&self, args: I) -> Result<CommandOutput, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run(CommandSpec::gh(args)).await
    }

    async fn git<I, S>(&self, args: I) -> Result<CommandOutput, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run(CommandSpec::git(args)).await
    }

    fn fallback_issue(&self, title: String, improvement: &Improvement) -> TrackedIssue {
        TrackedIssue::new(
            FALLBACK_ISSUE_NUMBER,
            format!("{}/issues/{}", self.github.repo_url(), FALLBACK_ISSUE_NUMBER),
            title,
            improvement.clone(),
        )
    }

    // =========================================================================
    // Issue creation
    // =========================================================================

    /// Create a GitHub issue for an improvement.
    ///
    /// A label rejection is retried once without `--label`. Any other
    /// failure, or an unparseable URL, yields the simulated issue #999.
    /// Real issues are added to the active map; the simulated one is not.
    pub async fn create_issue(&self, improvement: &Improvement) -> TrackedIssue {
        let content = self.content.issue(improvement, Utc::now());
        let slug = self.github.repo_slug();
        let unlabelled = CommandSpec::gh(["issue", "create"]).args([
            "--repo",
            slug.as_str(),
            "--title",
            content.title.as_str(),
            "--body",
            content.body.as_str(),
        ]);
        let labelled = unlabelled
            .clone()
            .args(["--label".to_string(), content.labels.join(",")]);

        let result = match self.run(labelled).await {
            Err(e) if classify_failure(&e) == FailureKind::LabelNotFound => {
                warn!("Label rejected ({}), retrying issue creation without labels", e.stderr());
                self.run(unlabelled).await
            }
            other => other,
        };

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                error!("Issue creation failed, using simulated issue #{}: {}", FALLBACK_ISSUE_NUMBER, e);
                return self.fallback_issue(content.title, improvement);
            }
        };

        let url = output.first_line().to_string();
        let Some(number) = number_from_url(&url) else {
            error!("Could not read an issue number from '{}', using simulated issue", url);
            return self.fallback_issue(content.title, improvement);
        };

        info!("Created issue #{}: {}", number, content.title);
        let issue = TrackedIssue::new(number, url, content.title, improvement.clone());
        self.state().active_issues.insert(number, issue.clone());
        issue
    }

    /// Repeat [`create_issue`](Self::create_issue) while it returns the
    /// simulated issue, up to `max_retries` attempts `retry_delay` apart.
    pub async fn create_github_issue_with_retry(&self, improvement: &Improvement) -> TrackedIssue {
        let policy = RetryPolicy::fixed(self.workflow.max_retries, self.workflow.retry_delay());
        let agent = self;
        retry_until(
            &policy,
            "Issue creation",
            move || agent.create_issue(improvement),
            |issue| !issue.is_simulated(),
        )
        .await
    }

    // =========================================================================
    // Board, branch, comments, labels
    // =========================================================================

    /// Move an issue's card to `column`. Best-effort: returns false on any
    /// failure, when no project is configured, or for the simulated issue.
    pub async fn update_board_status(&self, issue_number: u64, column: BoardColumn) -> bool {
        if self.github.project_id.is_empty() {
            debug!("No project configured, skipping board update for #{}", issue_number);
            return false;
        }
        if issue_number == FALLBACK_ISSUE_NUMBER {
            return false;
        }

        let result = self
            .gh([
                "project".to_string(),
                "item-edit".to_string(),
                "--project-id".to_string(),
                self.github.project_id.clone(),
                "--field-id".to_string(),
                "Status".to_string(),
                "--single-select-option-id".to_string(),
                column.board_option().to_string(),
                format!("#{}", issue_number),
            ])
            .await;

        match result {
            Ok(_) => {
                info!("Board updated: #{} -> {}", issue_number, column);
                true
            }
            Err(e) => {
                warn!("Board update for #{} failed: {}", issue_number, e);
                false
            }
        }
    }

    /// Create and push `auto/{type}/issue-{n}`. If the branch already exists
    /// it is checked out instead. A failed push is only logged; any other
    /// failure means the tree is not on the branch and is returned.
    pub async fn create_feature_branch(
        &self,
        issue_number: u64,
        kind: &str,
        _workspace: &WorkspaceGuard,
    ) -> Result<String, CommandError> {
        let branch = BranchName::for_issue(kind, issue_number).into_string();

        match self.git(["checkout", "-b", branch.as_str()]).await {
            Ok(_) => match self.git(["push", "-u", "origin", branch.as_str()]).await {
                Ok(_) => info!("Created branch {}", branch),
                Err(e) => warn!("Branch {} created locally but push failed: {}", branch, e),
            },
            Err(e) if classify_failure(&e) == FailureKind::AlreadyExists => {
                warn!("Branch {} already exists, checking it out", branch);
                self.git(["checkout", branch.as_str()]).await?;
            }
            Err(e) => {
                error!("Branch creation for {} failed: {}", branch, e);
                return Err(e);
            }
        }

        Ok(branch)
    }

    /// Post a comment on an issue. Skipped for the simulated issue.
    pub async fn comment_on_issue(&self, issue_number: u64, body: &str) -> bool {
        if issue_number == FALLBACK_ISSUE_NUMBER {
            debug!("Not commenting on simulated issue");
            return false;
        }
        let slug = self.github.repo_slug();
        let number = issue_number.to_string();
        match self
            .gh(["issue", "comment", number.as_str(), "--repo", slug.as_str(), "--body", body])
            .await
        {
            Ok(_) => {
                debug!("Commented on #{}", issue_number);
                true
            }
            Err(e) => {
                warn!("Comment on #{} failed: {}", issue_number, e);
                false
            }
        }
    }

    /// Mirror a task status onto the issue's labels, replacing any other
    /// status label.
    pub async fn apply_status_labels(&self, issue_number: u64, status: TaskStatus) -> bool {
        if issue_number == FALLBACK_ISSUE_NUMBER {
            return false;
        }
        let add = status.github_labels();
        let remove: Vec<&str> = STATUS_LABELS
            .iter()
            .copied()
            .filter(|l| !add.contains(l))
            .collect();
        let slug = self.github.repo_slug();
        let number = issue_number.to_string();
        let add_arg = add.join(",");
        let remove_arg = remove.join(",");

        match self
            .gh([
                "issue",
                "edit",
                number.as_str(),
                "--repo",
                slug.as_str(),
                "--add-label",
                add_arg.as_str(),
                "--remove-label",
                remove_arg.as_str(),
            ])
            .await
        {
            Ok(_) => {
                debug!("Labels on #{} set to {}", issue_number, add_arg);
                true
            }
            Err(e) => {
                warn!("Label update on #{} failed: {}", issue_number, e);
                false
            }
        }
    }

    // =========================================================================
    // Sync entry point
    // =========================================================================

    /// Create the issue, put it on the board, create the branch and mark it
    /// in progress.
    ///
    /// A simulated issue stops the flow before any board or branch call.
    pub async fn sync_improvement_to_github(
        &self,
        improvement: &Improvement,
        workspace: &WorkspaceGuard,
    ) -> SyncReport {
        info!("Starting GitHub sync for {} improvement", improvement.kind);

        let issue = self.create_github_issue_with_retry(improvement).await;
        if issue.is_simulated() {
            warn!("Issue creation did not reach GitHub; skipping board and branch setup");
            return SyncReport {
                issue_number: issue.issue_number,
                branch: None,
                board_updated: false,
                workflow_status: SyncWorkflowStatus::Simulated,
                error: Some("issue creation failed; simulated issue used".to_string()),
            };
        }
        let number = issue.issue_number;

        let todo = self.update_board_status(number, BoardColumn::Todo).await;
        self.update_issue(number, |i| i.advance(WorkflowStage::BoardTodo));

        let branch = match self
            .create_feature_branch(number, improvement.kind.as_str(), workspace)
            .await
        {
            Ok(branch) => branch,
            Err(e) => return self.branch_failed(number, todo, &e),
        };
        self.update_issue(number, |i| {
            i.branch_name = branch.clone();
            i.advance(WorkflowStage::BranchReady);
        });

        let in_progress = self.update_board_status(number, BoardColumn::InProgress).await;
        self.update_issue(number, |i| i.advance(WorkflowStage::InProgress));

        info!("Issue #{} ready on {}", number, branch);
        SyncReport {
            issue_number: number,
            branch: Some(branch),
            board_updated: todo && in_progress,
            workflow_status: SyncWorkflowStatus::Initiated,
            error: None,
        }
    }

    /// Report for a sync stopped because the feature branch is not checked
    /// out. The issue stays tracked at its last stage.
    fn branch_failed(&self, issue_number: u64, board_updated: bool, err: &CommandError) -> SyncReport {
        warn!("Stopping setup of #{}: feature branch unavailable", issue_number);
        SyncReport {
            issue_number,
            branch: None,
            board_updated,
            workflow_status: SyncWorkflowStatus::Failed,
            error: Some(AutodevError::workflow("branch", err.to_string()).to_string()),
        }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Stage, commit and push exactly `files`.
    pub async fn commit(
        &self,
        issue_number: u64,
        files: &[PathBuf],
        _workspace: &WorkspaceGuard,
    ) -> Result<(), CommandError> {
        for file in files {
            self.git(["add".to_string(), file.to_string_lossy().into_owned()])
                .await?;
        }
        let message = self.content.commit_message(issue_number, files);
        self.git(["commit", "-m", message.as_str()]).await?;
        self.git(["push"]).await?;
        info!("Committed {} file(s) for #{}", files.len(), issue_number);
        Ok(())
    }

    /// Open a PR for a tracked issue. On failure a placeholder with no
    /// number is returned.
    pub async fn create_pull_request(&self, issue: &TrackedIssue) -> PullRequest {
        let now = Utc::now();
        let title = self.content.pr_title(issue.issue_number, &issue.improvement);
        let body = self.content.pr_body(issue.issue_number, &issue.improvement, now);
        let slug = self.github.repo_slug();

        let result = self
            .gh([
                "pr",
                "create",
                "--repo",
                slug.as_str(),
                "--head",
                issue.branch_name.as_str(),
                "--title",
                title.as_str(),
                "--body",
                body.as_str(),
            ])
            .await;

        match result {
            Ok(output) => {
                let url = output.first_line().to_string();
                info!("Opened PR {}", url);
                PullRequest {
                    number: number_from_url(&url),
                    url,
                    issue_number: issue.issue_number,
                    branch: issue.branch_name.clone(),
                }
            }
            Err(e) => {
                error!("PR creation for #{} failed: {}", issue.issue_number, e);
                PullRequest {
                    url: format!("{}/pull/auto-{}", self.github.repo_url(), issue.issue_number),
                    number: None,
                    issue_number: issue.issue_number,
                    branch: issue.branch_name.clone(),
                }
            }
        }
    }

    /// Squash-merge a PR if every check is SUCCESS or NEUTRAL. An empty
    /// rollup counts as passing. Nothing is merged when the rollup cannot be
    /// read.
    pub async fn auto_merge_if_tests_pass(&self, pr_url: &str) -> MergeOutcome {
        let Some(pr_number) = number_from_url(pr_url) else {
            return MergeOutcome::skipped_with(SkipReason::PrUnavailable, pr_url);
        };
        let number = pr_number.to_string();

        let output = match self
            .gh(["pr", "view", number.as_str(), "--json", "statusCheckRollup"])
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!("Could not read checks for PR #{}: {}", pr_number, e);
                return MergeOutcome::skipped_with(SkipReason::CheckStatusUnavailable, e.to_string());
            }
        };
        let rollup = match CheckRollup::parse(&output.stdout) {
            Ok(rollup) => rollup,
            Err(e) => {
                warn!("Unreadable check rollup for PR #{}: {}", pr_number, e);
                return MergeOutcome::skipped_with(SkipReason::CheckStatusUnavailable, e.to_string());
            }
        };

        if !rollup.all_passing() {
            let blocking = rollup.blocking().join(", ");
            info!("PR #{} not merged, checks pending: {}", pr_number, blocking);
            return MergeOutcome::skipped_with(SkipReason::ChecksPending, blocking);
        }

        match self
            .gh(["pr", "merge", number.as_str(), "--auto", "--squash"])
            .await
        {
            Ok(_) => {
                info!("PR #{} merged", pr_number);
                MergeOutcome::Merged { pr_number }
            }
            Err(e) => {
                error!("Merge of PR #{} failed: {}", pr_number, e);
                MergeOutcome::skipped_with(SkipReason::MergeFailed, e.to_string())
            }
        }
    }

    /// Close an issue and stop tracking it. Tracking is kept if the close
    /// fails.
    pub async fn close_issue(&self, issue_number: u64) -> bool {
        let slug = self.github.repo_slug();
        let number = issue_number.to_string();
        match self
            .gh([
                "issue",
                "close",
                number.as_str(),
                "--repo",
                slug.as_str(),
                "--comment",
                self.content.close_comment(),
            ])
            .await
        {
            Ok(_) => {
                let mut state = self.state();
                state.active_issues.remove(&issue_number);
                state.pending_prs.remove(&issue_number);
                info!("Closed issue #{}", issue_number);
                true
            }
            Err(e) => {
                error!("Closing issue #{} failed: {}", issue_number, e);
                false
            }
        }
    }

    /// Tag and publish the next version. The in-memory version only moves
    /// once the release exists.
    pub async fn create_version_release(&self, improvement: &Improvement) -> Option<SemVer> {
        let previous = self.current_version();
        let next = previous.bump(improvement.kind);
        let tag = next.tag();
        let title = self.content.release_title(next);
        let notes = self
            .content
            .release_notes(next, previous, improvement, Utc::now());

        let steps = async {
            self.git(["tag", tag.as_str()]).await?;
            self.git(["push", "--tags"]).await?;
            self.gh([
                "release",
                "create",
                tag.as_str(),
                "--title",
                title.as_str(),
                "--notes",
                notes.as_str(),
            ])
            .await
        };

        match steps.await {
            Ok(_) => {
                self.state().current_version = next;
                info!("Released {}", tag);
                Some(next)
            }
            Err(e) => {
                error!("Release {} failed: {}", tag, e);
                None
            }
        }
    }

    /// Commit the generated files, open a PR, move the card to Testing and,
    /// when enabled, merge, close and release.
    ///
    /// Untracked issues and empty file lists fail before any command runs.
    pub async fn complete_improvement_workflow(
        &self,
        issue_number: u64,
        files: &[PathBuf],
        workspace: &WorkspaceGuard,
    ) -> CompletionReport {
        let Some(issue) = self.tracked_issue(issue_number) else {
            let err = AutodevError::IssueNotTracked { issue_number };
            warn!("{}", err);
            return CompletionReport::failed(issue_number, err.to_string());
        };
        if files.is_empty() {
            warn!("No files to commit for #{}", issue_number);
            return CompletionReport::failed(issue_number, "no files to commit");
        }

        if let Err(e) = self.commit(issue_number, files, workspace).await {
            error!("Commit for #{} failed: {}", issue_number, e);
            return CompletionReport::failed(
                issue_number,
                AutodevError::workflow("commit", e.to_string()).to_string(),
            );
        }

        let pr = self.create_pull_request(&issue).await;
        if pr.is_real() {
            self.state().pending_prs.insert(issue_number, pr.clone());
        }
        self.update_issue(issue_number, |i| i.advance(WorkflowStage::PrOpen));

        self.update_board_status(issue_number, BoardColumn::Testing).await;
        self.update_issue(issue_number, |i| i.advance(WorkflowStage::Testing));

        let mut report = CompletionReport {
            issue_number,
            committed: true,
            pr: Some(pr.clone()),
            merge: None,
            closed: false,
            release: None,
            error: None,
        };

        if !self.workflow.auto_merge {
            return report;
        }

        let merge = if pr.is_real() {
            self.auto_merge_if_tests_pass(&pr.url).await
        } else {
            MergeOutcome::skipped(SkipReason::PrUnavailable)
        };

        if merge.merged() {
            self.state().pending_prs.remove(&issue_number);
            self.update_issue(issue_number, |i| i.advance(WorkflowStage::Merged));
            self.update_board_status(issue_number, BoardColumn::Done).await;
            self.update_issue(issue_number, |i| i.advance(WorkflowStage::Done));
            report.closed = self.close_issue(issue_number).await;

            if self.workflow.auto_versioning {
                report.release = self.create_version_release(&issue.improvement).await;
            }
        }
        report.merge = Some(merge);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCommandRunner;
    use crate::workspace::WorkspaceLock;

    const ISSUE_URL: &str = "https://github.com/acme/widgets/issues/42\n";

    fn github() -> GitHubConfig {
        GitHubConfig {
            owner: "acme".into(),
            repo: "widgets".into(),
            project_id: "7".into(),
        }
    }

    fn workflow() -> WorkflowConfig {
        WorkflowConfig {
            retry_delay_ms: 0,
            ..Default::default()
        }
    }

    fn agent(runner: &Arc<MockCommandRunner>) -> GitHubSyncAgent {
        GitHubSyncAgent::new(runner.clone(), github(), workflow())
    }

    async fn tree() -> WorkspaceGuard {
        WorkspaceLock::new().acquire().await
    }

    fn bug() -> Improvement {
        Improvement::new(ImprovementType::BugFix, Priority::High).with_pattern("NullPointer in parser")
    }

    // =========================================================================
    // Issue creation
    // =========================================================================

    #[tokio::test]
    async fn test_create_issue_parses_number_and_tracks() {
        let runner = Arc::new(MockCommandRunner::new().succeed("gh", &["issue", "create"], ISSUE_URL));
        let agent = agent(&runner);

        let issue = agent.create_issue(&bug()).await;
        assert_eq!(issue.issue_number, 42);
        assert_eq!(issue.url, "https://github.com/acme/widgets/issues/42");
        assert!(agent.is_tracked(42));

        let call = &runner.calls()[0];
        assert_eq!(call.flag_value("--repo"), Some("acme/widgets"));
        assert_eq!(call.flag_value("--label"), Some("bug,auto-generated"));
        assert_eq!(call.flag_value("--title"), Some("[BUG] Auto-Fix: NullPointer in parser"));
    }

    #[tokio::test]
    async fn test_create_issue_label_retry_drops_label_flag() {
        let runner = Arc::new(
            MockCommandRunner::new()
                .fail("gh", &["issue", "create"], 1, "could not add label: 'auto-generated' not found")
                .succeed("gh", &["issue", "create"], ISSUE_URL),
        );
        let agent = agent(&runner);

        let issue = agent.create_issue(&bug()).await;
        assert_eq!(issue.issue_number, 42);
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].has_flag("--label"));
        assert!(!calls[1].has_flag("--label"));
    }

    #[tokio::test]
    async fn test_create_issue_failure_falls_back_to_999() {
        let runner = Arc::new(MockCommandRunner::new().fail("gh", &["issue", "create"], 1, "HTTP 502"));
        let agent = agent(&runner);

        let issue = agent.create_issue(&bug()).await;
        assert_eq!(issue.issue_number, FALLBACK_ISSUE_NUMBER);
        assert!(issue.is_simulated());
        assert_eq!(issue.url, "https://github.com/acme/widgets/issues/999");
        assert!(!agent.is_tracked(FALLBACK_ISSUE_NUMBER));
        // No label retry for non-label errors.
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_create_issue_unparseable_url_falls_back() {
        let runner = Arc::new(MockCommandRunner::new().succeed("gh", &["issue", "create"], "created!\n"));
        let issue = agent(&runner).create_issue(&bug()).await;
        assert_eq!(issue.issue_number, FALLBACK_ISSUE_NUMBER);
    }

    #[tokio::test]
    async fn test_create_issue_with_retry_recovers() {
        let runner = Arc::new(
            MockCommandRunner::new()
                .fail("gh", &["issue", "create"], 1, "timeout talking to api.github.com")
                .succeed("gh", &["issue", "create"], ISSUE_URL),
        );
        let issue = agent(&runner).create_github_issue_with_retry(&bug()).await;
        assert_eq!(issue.issue_number, 42);
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_create_issue_with_retry_bounded_by_max_retries() {
        let runner = Arc::new(MockCommandRunner::new().fail("gh", &["issue", "create"], 1, "HTTP 500"));
        let issue = agent(&runner).create_github_issue_with_retry(&bug()).await;
        assert!(issue.is_simulated());
        assert_eq!(runner.call_count(), 3);
    }

    // =========================================================================
    // Board and branch
    // =========================================================================

    #[tokio::test]
    async fn test_board_update_arguments() {
        let runner = Arc::new(MockCommandRunner::new());
        let agent = agent(&runner);
        assert!(agent.update_board_status(42, BoardColumn::Testing).await);

        let call = &runner.calls()[0];
        assert_eq!(call.subcommand(2), "project item-edit");
        assert_eq!(call.flag_value("--project-id"), Some("7"));
        assert_eq!(call.flag_value("--field-id"), Some("Status"));
        assert_eq!(call.flag_value("--single-select-option-id"), Some("In Progress"));
        assert_eq!(call.args.last().map(String::as_str), Some("#42"));
    }

    #[tokio::test]
    async fn test_board_update_failure_is_soft() {
        let runner = Arc::new(MockCommandRunner::new().fail("gh", &["project"], 1, "project not found"));
        assert!(!agent(&runner).update_board_status(42, BoardColumn::Todo).await);
    }

    #[tokio::test]
    async fn test_board_update_skipped_without_project() {
        let runner = Arc::new(MockCommandRunner::new());
        let agent = GitHubSyncAgent::new(
            runner.clone(),
            GitHubConfig {
                project_id: String::new(),
                ..github()
            },
            workflow(),
        );
        assert!(!agent.update_board_status(42, BoardColumn::Todo).await);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_branch_pushes() {
        let runner = Arc::new(MockCommandRunner::new());
        let branch = agent(&runner)
            .create_feature_branch(42, "bug_fix", &tree().await)
            .await
            .unwrap();
        assert_eq!(branch, "auto/bug_fix/issue-42");
        assert_eq!(
            runner.call_summaries(4),
            vec![
                "git checkout -b auto/bug_fix/issue-42",
                "git push -u origin auto/bug_fix/issue-42"
            ]
        );
    }

    #[tokio::test]
    async fn test_create_branch_existing_is_checked_out() {
        let runner = Arc::new(MockCommandRunner::new().fail(
            "git",
            &["checkout", "-b"],
            128,
            "fatal: a branch named 'auto/bug_fix/issue-42' already exists",
        ));
        let branch = agent(&runner)
            .create_feature_branch(42, "Bug Fix", &tree().await)
            .await
            .unwrap();
        assert_eq!(branch, "auto/bug_fix/issue-42");
        assert_eq!(
            runner.call_summaries(2),
            vec!["git checkout -b", "git checkout auto/bug_fix/issue-42"]
        );
    }

    #[tokio::test]
    async fn test_create_branch_failure_is_returned() {
        let runner = Arc::new(MockCommandRunner::new().fail(
            "git",
            &["checkout", "-b"],
            128,
            "error: Your local changes would be overwritten by checkout",
        ));
        let result = agent(&runner).create_feature_branch(42, "bug_fix", &tree().await).await;
        assert!(matches!(result, Err(CommandError::NonZeroExit { exit_code: 128, .. })));
        assert!(runner.calls_matching("git", &["push"]).is_empty());
    }

    // =========================================================================
    // Sync
    // =========================================================================

    #[tokio::test]
    async fn test_sync_simulated_issue_skips_branch() {
        let runner = Arc::new(MockCommandRunner::new().fail("gh", &["issue", "create"], 1, "HTTP 500"));
        let report = agent(&runner).sync_improvement_to_github(&bug(), &tree().await).await;
        assert_eq!(report.workflow_status, SyncWorkflowStatus::Simulated);
        assert_eq!(report.issue_number, FALLBACK_ISSUE_NUMBER);
        assert!(report.branch.is_none());
        assert!(runner.calls_matching("git", &[]).is_empty());
        assert!(runner.calls_matching("gh", &["project"]).is_empty());
    }

    #[tokio::test]
    async fn test_sync_stops_when_branch_cannot_be_created() {
        let runner = Arc::new(
            MockCommandRunner::new()
                .succeed("gh", &["issue", "create"], ISSUE_URL)
                .fail("git", &["checkout", "-b"], 1, "fatal: not a valid object name: 'HEAD'"),
        );
        let agent = agent(&runner);
        let report = agent.sync_improvement_to_github(&bug(), &tree().await).await;

        assert_eq!(report.workflow_status, SyncWorkflowStatus::Failed);
        assert!(!report.is_initiated());
        assert!(report.branch.is_none());
        assert!(report.error.unwrap().contains("branch"));
        // Only the Todo move happened.
        assert_eq!(runner.calls_matching("gh", &["project"]).len(), 1);
        let issue = agent.tracked_issue(42).unwrap();
        assert_eq!(issue.stage, WorkflowStage::BoardTodo);
        assert!(issue.branch_name.is_empty());
    }

    #[tokio::test]
    async fn test_sync_marks_issue_in_progress() {
        let runner = Arc::new(MockCommandRunner::new().succeed("gh", &["issue", "create"], ISSUE_URL));
        let agent = agent(&runner);
        let report = agent.sync_improvement_to_github(&bug(), &tree().await).await;

        assert!(report.is_initiated());
        assert!(report.board_updated);
        let issue = agent.tracked_issue(42).unwrap();
        assert_eq!(issue.status, IssueStatus::InProgress);
        assert_eq!(issue.stage, WorkflowStage::InProgress);
        assert_eq!(issue.branch_name, "auto/bug_fix/issue-42");
    }

    // =========================================================================
    // Completion
    // =========================================================================

    async fn synced(runner: &Arc<MockCommandRunner>, workflow: WorkflowConfig) -> GitHubSyncAgent {
        let agent = GitHubSyncAgent::new(runner.clone(), github(), workflow);
        agent.sync_improvement_to_github(&bug(), &tree().await).await;
        agent
    }

    fn files() -> Vec<PathBuf> {
        vec![PathBuf::from("src/parser.py"), PathBuf::from("tests/test_parser.py")]
    }

    #[tokio::test]
    async fn test_complete_untracked_issue_runs_nothing() {
        let runner = Arc::new(MockCommandRunner::new());
        let report = agent(&runner).complete_improvement_workflow(7, &files(), &tree().await).await;
        assert!(!report.is_ok());
        assert!(report.error.unwrap().contains("not tracked"));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_complete_commits_given_paths_and_opens_pr() {
        let runner = Arc::new(
            MockCommandRunner::new()
                .succeed("gh", &["issue", "create"], ISSUE_URL)
                .succeed("gh", &["pr", "create"], "https://github.com/acme/widgets/pull/43\n"),
        );
        let agent = synced(&runner, workflow()).await;
        let report = agent.complete_improvement_workflow(42, &files(), &tree().await).await;

        assert!(report.is_ok(), "{:?}", report.error);
        assert!(report.committed);
        let pr = report.pr.unwrap();
        assert_eq!(pr.number, Some(43));
        assert_eq!(pr.branch, "auto/bug_fix/issue-42");
        assert!(report.merge.is_none());

        let adds: Vec<String> = runner
            .calls_matching("git", &["add"])
            .iter()
            .map(|c| c.args[1].clone())
            .collect();
        assert_eq!(adds, vec!["src/parser.py", "tests/test_parser.py"]);
        let commit = &runner.calls_matching("git", &["commit"])[0];
        assert!(commit.flag_value("-m").unwrap().contains("Closes #42"));
        assert_eq!(runner.calls_matching("git", &["push"]).len(), 2);
        assert_eq!(
            runner.calls_matching("gh", &["pr", "create"])[0].flag_value("--head"),
            Some("auto/bug_fix/issue-42")
        );
        assert_eq!(agent.tracked_issue(42).unwrap().status, IssueStatus::Testing);
        assert!(agent.pending_pr(42).is_some());
    }

    #[tokio::test]
    async fn test_complete_empty_file_list_is_error() {
        let runner = Arc::new(MockCommandRunner::new().succeed("gh", &["issue", "create"], ISSUE_URL));
        let agent = synced(&runner, workflow()).await;
        let before = runner.call_count();
        let report = agent.complete_improvement_workflow(42, &[], &tree().await).await;
        assert!(!report.is_ok());
        assert_eq!(runner.call_count(), before);
    }

    #[tokio::test]
    async fn test_complete_auto_merge_closes_and_releases() {
        let runner = Arc::new(
            MockCommandRunner::new()
                .succeed("gh", &["issue", "create"], ISSUE_URL)
                .succeed("gh", &["pr", "create"], "https://github.com/acme/widgets/pull/43\n")
                .succeed("gh", &["pr", "view"], r#"{"statusCheckRollup": []}"#),
        );
        let agent = synced(
            &runner,
            WorkflowConfig {
                auto_merge: true,
                auto_versioning: true,
                ..workflow()
            },
        )
        .await;

        let report = agent.complete_improvement_workflow(42, &files(), &tree().await).await;
        assert_eq!(report.merge, Some(MergeOutcome::Merged { pr_number: 43 }));
        assert!(report.closed);
        assert_eq!(report.release, Some(SemVer::new(1, 0, 1)));
        assert!(!agent.is_tracked(42));
        assert_eq!(agent.current_version(), SemVer::new(1, 0, 1));
        assert_eq!(runner.calls_matching("gh", &["release", "create", "v1.0.1"]).len(), 1);
    }

    #[tokio::test]
    async fn test_complete_pr_failure_skips_merge() {
        let runner = Arc::new(
            MockCommandRunner::new()
                .succeed("gh", &["issue", "create"], ISSUE_URL)
                .fail("gh", &["pr", "create"], 1, "no commits between main and branch"),
        );
        let agent = synced(
            &runner,
            WorkflowConfig {
                auto_merge: true,
                ..workflow()
            },
        )
        .await;

        let report = agent.complete_improvement_workflow(42, &files(), &tree().await).await;
        let pr = report.pr.unwrap();
        assert_eq!(pr.url, "https://github.com/acme/widgets/pull/auto-42");
        assert_eq!(report.merge.unwrap().reason(), Some(&SkipReason::PrUnavailable));
        assert!(runner.calls_matching("gh", &["pr", "merge"]).is_empty());
        assert!(agent.is_tracked(42));
    }

    // =========================================================================
    // Merge, close, release
    // =========================================================================

    #[tokio::test]
    async fn test_auto_merge_blocked_by_failure() {
        let runner = Arc::new(MockCommandRunner::new().succeed(
            "gh",
            &["pr", "view"],
            r#"{"statusCheckRollup": [{"name": "ci", "conclusion": "FAILURE"}]}"#,
        ));
        let outcome = agent(&runner)
            .auto_merge_if_tests_pass("https://github.com/acme/widgets/pull/43")
            .await;
        assert!(!outcome.merged());
        assert_eq!(outcome.reason(), Some(&SkipReason::ChecksPending));
        assert!(runner.calls_matching("gh", &["pr", "merge"]).is_empty());
    }

    #[tokio::test]
    async fn test_auto_merge_unreadable_rollup_does_not_merge() {
        let runner = Arc::new(MockCommandRunner::new().succeed("gh", &["pr", "view"], "<html>"));
        let outcome = agent(&runner)
            .auto_merge_if_tests_pass("https://github.com/acme/widgets/pull/43")
            .await;
        assert_eq!(outcome.reason(), Some(&SkipReason::CheckStatusUnavailable));
        assert!(runner.calls_matching("gh", &["pr", "merge"]).is_empty());
    }

    #[tokio::test]
    async fn test_auto_merge_squash_arguments() {
        let runner = Arc::new(MockCommandRunner::new().succeed("gh", &["pr", "view"], "{}"));
        let outcome = agent(&runner)
            .auto_merge_if_tests_pass("https://github.com/acme/widgets/pull/43")
            .await;
        assert!(outcome.merged());
        assert_eq!(
            runner.call_summaries(5).last().map(String::as_str),
            Some("gh pr merge 43 --auto --squash")
        );
    }

    #[tokio::test]
    async fn test_close_failure_keeps_tracking() {
        let runner = Arc::new(
            MockCommandRunner::new()
                .succeed("gh", &["issue", "create"], ISSUE_URL)
                .fail("gh", &["issue", "close"], 1, "HTTP 500"),
        );
        let agent = agent(&runner);
        agent.create_issue(&bug()).await;
        assert!(!agent.close_issue(42).await);
        assert!(agent.is_tracked(42));
    }

    #[tokio::test]
    async fn test_release_failure_keeps_version() {
        let runner = Arc::new(MockCommandRunner::new().fail("git", &["tag"], 128, "tag 'v1.1.0' already exists"));
        let agent = agent(&runner);
        let feature = Improvement::new(ImprovementType::Feature, Priority::Low);
        assert_eq!(agent.next_version(feature.kind), SemVer::new(1, 1, 0));
        assert!(agent.create_version_release(&feature).await.is_none());
        assert_eq!(agent.current_version(), SemVer::new(1, 0, 0));
        assert!(runner.calls_matching("gh", &["release"]).is_empty());
    }

    #[tokio::test]
    async fn test_release_sequence() {
        let runner = Arc::new(MockCommandRunner::new());
        let agent = agent(&runner);
        let feature = Improvement::new(ImprovementType::Feature, Priority::Low);
        assert_eq!(agent.create_version_release(&feature).await, Some(SemVer::new(1, 1, 0)));
        assert_eq!(agent.create_version_release(&bug()).await, Some(SemVer::new(1, 1, 1)));

        let release = &runner.calls_matching("gh", &["release", "create"])[1];
        assert_eq!(release.flag_value("--title"), Some("Auto-Release v1.1.1"));
        assert!(release
            .flag_value("--notes")
            .unwrap()
            .contains("compare/v1.1.0...v1.1.1"));
    }

    // =========================================================================
    // Comments and labels
    // =========================================================================

    #[tokio::test]
    async fn test_comment_skipped_for_simulated_issue() {
        let runner = Arc::new(MockCommandRunner::new());
        let agent = agent(&runner);
        assert!(!agent.comment_on_issue(FALLBACK_ISSUE_NUMBER, "hi").await);
        assert!(agent.comment_on_issue(42, "RED phase started").await);
        assert_eq!(runner.calls()[0].flag_value("--body"), Some("RED phase started"));
    }

    #[tokio::test]
    async fn test_status_labels_replace_other_status_labels() {
        let runner = Arc::new(MockCommandRunner::new());
        assert!(agent(&runner).apply_status_labels(42, TaskStatus::TddGreen).await);
        let call = &runner.calls()[0];
        assert_eq!(call.flag_value("--add-label"), Some("tdd-green,in-progress"));
        let removed = call.flag_value("--remove-label").unwrap();
        assert!(removed.contains("tdd-red"));
        assert!(!removed.contains("tdd-green"));
    }

    #[tokio::test]
    async fn test_sync_status_snapshot() {
        let runner = Arc::new(MockCommandRunner::new().succeed("gh", &["issue", "create"], ISSUE_URL));
        let agent = agent(&runner);
        agent.create_issue(&bug()).await;
        let status = agent.get_sync_status();
        assert_eq!(status.repo, "acme/widgets");
        assert_eq!(status.active_issues, vec![42]);
        assert_eq!(status.current_version, SemVer::new(1, 0, 0));
        assert!(status.to_string().starts_with("acme/widgets v1.0.0: 1 active issue(s)"));
    }
}
