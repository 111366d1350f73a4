//! Pull mode: turn existing GitHub issues and project cards into work.
//!
//! Two guards keep the agent from feeding on itself or stepping on people:
//! issues labelled `auto-generated` are never picked up, and issues with a
//! human assignee are left alone. Issues handed out once are remembered in
//! the agent's processed set and not handed out again.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use super::content::AUTO_GENERATED_LABEL;
use super::improvement::{Improvement, ImprovementType, Priority};
use super::state::{BoardColumn, SyncReport, SyncWorkflowStatus, TrackedIssue, WorkflowStage};
use super::GitHubSyncAgent;
use crate::error::{AutodevError, Result};
use crate::workspace::WorkspaceGuard;

/// Fields requested from `gh issue list --json`.
const ISSUE_FIELDS: &str = "number,title,labels,body,assignees,milestone";

/// Board order used for cards without an explicit priority.
const DEFAULT_CARD_PRIORITY: i64 = 999;

// ============================================================================
// GitHub payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLabel {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueUser {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueMilestone {
    pub title: String,
}

/// An issue as returned by `gh issue list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubIssue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
    #[serde(default)]
    pub assignees: Vec<IssueUser>,
    #[serde(default)]
    pub milestone: Option<IssueMilestone>,
}

impl GitHubIssue {
    /// Lower-cased label names.
    #[must_use]
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.to_lowercase()).collect()
    }

    #[must_use]
    pub fn is_auto_generated(&self) -> bool {
        self.labels
            .iter()
            .any(|l| l.name.eq_ignore_ascii_case(AUTO_GENERATED_LABEL))
    }
}

/// Content of a project board item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardContent {
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub title: String,
}

/// An item from `gh project item-list --format json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCard {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub content: CardContent,
}

impl ProjectCard {
    fn sort_key(&self) -> i64 {
        self.priority.unwrap_or(DEFAULT_CARD_PRIORITY)
    }
}

#[derive(Debug, Deserialize)]
struct ProjectItems {
    #[serde(default)]
    items: Vec<ProjectCard>,
}

// ============================================================================
// Opportunities
// ============================================================================

/// Work derived from a human-filed issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    #[serde(rename = "type")]
    pub kind: ImprovementType,
    pub priority: Priority,
    pub source: String,
    pub issue_number: u64,
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub milestone: Option<String>,
}

impl Opportunity {
    /// The equivalent improvement, with the issue title as its headline.
    #[must_use]
    pub fn to_improvement(&self) -> Improvement {
        let improvement = Improvement::new(self.kind, self.priority);
        match self.kind {
            ImprovementType::BugFix | ImprovementType::General => {
                improvement.with_pattern(self.title.clone())
            }
            ImprovementType::TestCoverage => improvement.with_gap(self.title.clone()),
            ImprovementType::Performance => improvement.with_issue(self.title.clone()),
            ImprovementType::Feature => improvement.with_idea(self.title.clone()),
        }
    }
}

fn has_any(haystack: &[String], needles: &[&str]) -> bool {
    haystack.iter().any(|h| needles.contains(&h.as_str()))
}

/// Classify an issue: labels first, then title words; features otherwise.
fn classify_issue(labels: &[String], title: &str) -> ImprovementType {
    const BUG: &[&str] = &["bug", "error", "fix"];
    const TEST: &[&str] = &["test", "testing", "tests", "coverage"];
    const PERF: &[&str] = &["performance", "optimization", "optimisation"];

    if has_any(labels, BUG) {
        return ImprovementType::BugFix;
    }
    if has_any(labels, TEST) {
        return ImprovementType::TestCoverage;
    }
    if has_any(labels, PERF) {
        return ImprovementType::Performance;
    }
    if has_any(labels, &["enhancement", "feature"]) {
        return ImprovementType::Feature;
    }

    let words: Vec<String> = title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    if has_any(&words, BUG) {
        ImprovementType::BugFix
    } else if has_any(&words, TEST) {
        ImprovementType::TestCoverage
    } else if has_any(&words, PERF) {
        ImprovementType::Performance
    } else {
        ImprovementType::Feature
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Result of [`GitHubSyncAgent::sync_with_project_board`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardSyncReport {
    pub synced: bool,
    pub todo_count: usize,
    pub in_progress_count: usize,
    pub total_issues: usize,
    pub opportunities: Vec<Opportunity>,
    #[serde(skip)]
    pub issues: Vec<GitHubIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`GitHubSyncAgent::execute_pull_workflow`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PullWorkflowReport {
    pub issues_fetched: usize,
    pub cards_synced: usize,
    pub opportunities: Vec<Opportunity>,
    /// Issue numbers left alone, with the reason.
    pub skipped: Vec<(u64, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PullWorkflowReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// Agent operations
// ============================================================================

impl GitHubSyncAgent {
    async fn try_fetch_github_issues(&self, exclude_auto_generated: bool) -> Result<Vec<GitHubIssue>> {
        let slug = self.github.repo_slug();
        let output = self
            .gh([
                "issue",
                "list",
                "--repo",
                slug.as_str(),
                "--state",
                "open",
                "--json",
                ISSUE_FIELDS,
                "--limit",
                "100",
            ])
            .await?;
        let mut issues: Vec<GitHubIssue> = serde_json::from_str(&output.stdout)?;
        if exclude_auto_generated {
            issues.retain(|i| !i.is_auto_generated());
        }
        debug!("Fetched {} open issue(s)", issues.len());
        Ok(issues)
    }

    /// Open issues of the repository, optionally without the agent's own.
    /// Failures are logged and yield an empty list.
    pub async fn fetch_github_issues(&self, exclude_auto_generated: bool) -> Vec<GitHubIssue> {
        match self.try_fetch_github_issues(exclude_auto_generated).await {
            Ok(issues) => issues,
            Err(e) => {
                error!("Fetching issues failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Convert an issue into an opportunity.
    #[must_use]
    pub fn parse_issue_to_opportunity(&self, issue: &GitHubIssue) -> Opportunity {
        let labels = issue.label_names();
        Opportunity {
            kind: classify_issue(&labels, &issue.title),
            priority: Priority::from_labels(&labels),
            source: "github_issue".to_string(),
            issue_number: issue.number,
            title: issue.title.clone(),
            description: issue.body.clone().unwrap_or_default(),
            labels,
            assignees: issue.assignees.iter().map(|a| a.login.clone()).collect(),
            milestone: issue.milestone.as_ref().map(|m| m.title.clone()),
        }
    }

    async fn try_fetch_project_cards(&self, status: Option<&str>) -> Result<Vec<ProjectCard>> {
        if self.github.project_id.is_empty() {
            return Ok(Vec::new());
        }
        let output = self
            .gh([
                "project",
                "item-list",
                self.github.project_id.as_str(),
                "--owner",
                self.github.owner.as_str(),
                "--format",
                "json",
            ])
            .await?;
        let items: ProjectItems = serde_json::from_str(&output.stdout)?;
        let cards = items
            .items
            .into_iter()
            .filter(|c| status.is_none_or(|s| c.status.as_deref() == Some(s)))
            .collect();
        Ok(Self::prioritize_cards(cards))
    }

    /// Board cards in `status` (all cards for `None`), in board priority
    /// order. Failures are logged and yield an empty list.
    pub async fn fetch_project_cards(&self, status: Option<&str>) -> Vec<ProjectCard> {
        match self.try_fetch_project_cards(status).await {
            Ok(cards) => cards,
            Err(e) => {
                warn!("Fetching project cards failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Stable sort by board priority; cards without one go last.
    #[must_use]
    pub fn prioritize_cards(mut cards: Vec<ProjectCard>) -> Vec<ProjectCard> {
        cards.sort_by_key(ProjectCard::sort_key);
        cards
    }

    /// Move a board item to another status column.
    pub async fn move_project_card(&self, card_id: &str, status: &str) -> bool {
        if self.github.project_id.is_empty() {
            debug!("No project configured, not moving card {}", card_id);
            return false;
        }
        match self
            .gh([
                "project",
                "item-edit",
                card_id,
                "--id",
                self.github.project_id.as_str(),
                "--field-id",
                "Status",
                "--single-select-option-id",
                status,
            ])
            .await
        {
            Ok(_) => {
                info!("Moved card {} to {}", card_id, status);
                true
            }
            Err(e) => {
                warn!("Moving card {} failed: {}", card_id, e);
                false
            }
        }
    }

    /// Join Todo cards with open issues into opportunities.
    ///
    /// Without a configured project every open issue counts as Todo.
    pub async fn sync_with_project_board(&self) -> BoardSyncReport {
        let issues = match self.try_fetch_github_issues(true).await {
            Ok(issues) => issues,
            Err(e) => {
                error!("Board sync failed: {}", e);
                return BoardSyncReport {
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let (todo_numbers, todo_count, in_progress_count) = if self.github.project_id.is_empty() {
            let numbers: Vec<u64> = issues.iter().map(|i| i.number).collect();
            let count = numbers.len();
            (numbers, count, 0)
        } else {
            let todo = self.fetch_project_cards(Some("Todo")).await;
            let in_progress = self.fetch_project_cards(Some("In Progress")).await;
            let numbers = todo.iter().filter_map(|c| c.content.number).collect();
            (numbers, todo.len(), in_progress.len())
        };

        let by_number: HashMap<u64, &GitHubIssue> = issues.iter().map(|i| (i.number, i)).collect();
        let opportunities: Vec<Opportunity> = todo_numbers
            .iter()
            .filter(|n| self.should_process_issue(**n))
            .filter_map(|n| by_number.get(n))
            .map(|issue| self.parse_issue_to_opportunity(issue))
            .collect();

        info!("Board sync: {} opportunity(ies)", opportunities.len());
        BoardSyncReport {
            synced: true,
            todo_count,
            in_progress_count,
            total_issues: issues.len(),
            opportunities,
            issues,
            error: None,
        }
    }

    /// Whether an issue is safe to pick up with respect to loop prevention.
    #[must_use]
    pub fn should_process_auto_generated_issue(&self, issue: &GitHubIssue) -> bool {
        !issue.is_auto_generated()
    }

    /// Whether no human has claimed the issue.
    #[must_use]
    pub fn can_auto_process_issue(&self, issue: &GitHubIssue) -> bool {
        issue.assignees.is_empty()
    }

    /// Whether the issue has not been handed out yet.
    #[must_use]
    pub fn should_process_issue(&self, issue_number: u64) -> bool {
        !self.state().processed_issues.contains(&issue_number)
    }

    pub fn mark_issue_processed(&self, issue_number: u64) {
        self.state().processed_issues.insert(issue_number);
    }

    /// Sync with the board and hand out every eligible issue once.
    pub async fn execute_pull_workflow(&self) -> PullWorkflowReport {
        info!("Starting pull workflow");
        let sync = self.sync_with_project_board().await;
        if !sync.synced {
            return PullWorkflowReport {
                error: Some(
                    AutodevError::workflow(
                        "board sync",
                        sync.error.unwrap_or_else(|| "unknown error".to_string()),
                    )
                    .to_string(),
                ),
                ..Default::default()
            };
        }

        let by_number: HashMap<u64, &GitHubIssue> =
            sync.issues.iter().map(|i| (i.number, i)).collect();
        let mut report = PullWorkflowReport {
            issues_fetched: sync.total_issues,
            cards_synced: sync.todo_count + sync.in_progress_count,
            ..Default::default()
        };

        for opportunity in sync.opportunities.iter() {
            let Some(issue) = by_number.get(&opportunity.issue_number) else {
                continue;
            };
            if !self.should_process_auto_generated_issue(issue) {
                report
                    .skipped
                    .push((issue.number, "auto-generated".to_string()));
            } else if !self.can_auto_process_issue(issue) {
                debug!("Issue #{} is assigned, leaving it to its assignee", issue.number);
                report.skipped.push((issue.number, "assigned".to_string()));
            } else {
                self.mark_issue_processed(issue.number);
                report.opportunities.push(opportunity.clone());
            }
        }

        info!(
            "Pull workflow: {} opportunity(ies), {} skipped",
            report.opportunities.len(),
            report.skipped.len()
        );
        report
    }

    /// Start tracking a pulled issue and prepare its branch, so that the
    /// completion workflow accepts it like an issue the agent created.
    pub async fn adopt_opportunity(
        &self,
        opportunity: &Opportunity,
        workspace: &WorkspaceGuard,
    ) -> SyncReport {
        let number = opportunity.issue_number;
        let url = format!("{}/issues/{}", self.github.repo_url(), number);
        self.track_issue(TrackedIssue::new(
            number,
            url,
            opportunity.title.clone(),
            opportunity.to_improvement(),
        ));

        let branch = match self
            .create_feature_branch(number, opportunity.kind.as_str(), workspace)
            .await
        {
            Ok(branch) => branch,
            Err(e) => return self.branch_failed(number, false, &e),
        };
        self.update_issue(number, |i| {
            i.branch_name = branch.clone();
            i.advance(WorkflowStage::BranchReady);
        });
        let board_updated = self.update_board_status(number, BoardColumn::InProgress).await;
        self.update_issue(number, |i| i.advance(WorkflowStage::InProgress));

        info!("Adopted issue #{} on {}", number, branch);
        SyncReport {
            issue_number: number,
            branch: Some(branch),
            board_updated,
            workflow_status: SyncWorkflowStatus::Initiated,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GitHubConfig, WorkflowConfig};
    use crate::testing::MockCommandRunner;
    use crate::workspace::WorkspaceLock;
    use std::sync::Arc;

    const ISSUES: &str = r#"[
        {"number": 1, "title": "Crash when saving", "labels": [{"name": "bug"}, {"name": "urgent"}],
         "body": "Steps...", "assignees": [], "milestone": {"title": "v2"}},
        {"number": 2, "title": "[BUG] Auto-Fix: NullPointer", "labels": [{"name": "auto-generated"}],
         "body": "", "assignees": [], "milestone": null},
        {"number": 3, "title": "Speed up search", "labels": [{"name": "optimization"}],
         "body": null, "assignees": [{"login": "alice"}], "milestone": null},
        {"number": 4, "title": "Add tests for exporter", "labels": [],
         "body": "", "assignees": [], "milestone": null}
    ]"#;

    const CARDS: &str = r#"{"items": [
        {"id": "PVTI_4", "status": "Todo", "priority": 2, "content": {"number": 4, "title": "Add tests for exporter"}},
        {"id": "PVTI_1", "status": "Todo", "priority": 1, "content": {"number": 1, "title": "Crash when saving"}},
        {"id": "PVTI_3", "status": "Todo", "content": {"number": 3, "title": "Speed up search"}},
        {"id": "PVTI_2", "status": "Todo", "priority": 0, "content": {"number": 2, "title": "auto"}},
        {"id": "PVTI_9", "status": "In Progress", "content": {"number": 9, "title": "other"}}
    ]}"#;

    fn agent(runner: MockCommandRunner, project_id: &str) -> (Arc<MockCommandRunner>, GitHubSyncAgent) {
        let runner = Arc::new(runner);
        let agent = GitHubSyncAgent::new(
            runner.clone(),
            GitHubConfig {
                owner: "acme".into(),
                repo: "widgets".into(),
                project_id: project_id.into(),
            },
            WorkflowConfig::default(),
        );
        (runner, agent)
    }

    fn issue(labels: &[&str], title: &str) -> GitHubIssue {
        GitHubIssue {
            number: 10,
            title: title.to_string(),
            body: None,
            labels: labels
                .iter()
                .map(|l| IssueLabel {
                    name: l.to_string(),
                })
                .collect(),
            assignees: Vec::new(),
            milestone: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_excludes_auto_generated() {
        let (runner, agent) = agent(MockCommandRunner::new().succeed("gh", &["issue", "list"], ISSUES), "7");
        let issues = agent.fetch_github_issues(true).await;
        let numbers: Vec<u64> = issues.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 3, 4]);

        let call = &runner.calls()[0];
        assert_eq!(call.flag_value("--json"), Some(ISSUE_FIELDS));
        assert_eq!(call.flag_value("--state"), Some("open"));
        assert_eq!(agent.fetch_github_issues(false).await.len(), 4);
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_empty() {
        let (_, agent) = agent(MockCommandRunner::new().fail("gh", &["issue", "list"], 1, "HTTP 500"), "7");
        assert!(agent.fetch_github_issues(true).await.is_empty());
    }

    #[test]
    fn test_classification_from_labels_and_title() {
        let (_, agent) = agent(MockCommandRunner::new(), "");
        let cases = [
            (issue(&["bug"], "Whatever"), ImprovementType::BugFix),
            (issue(&["Coverage"], "x"), ImprovementType::TestCoverage),
            (issue(&["optimization"], "x"), ImprovementType::Performance),
            (issue(&["enhancement"], "Fix typo"), ImprovementType::Feature),
            (issue(&[], "Fix crash in parser"), ImprovementType::BugFix),
            (issue(&[], "Improve test coverage"), ImprovementType::TestCoverage),
            (issue(&[], "Performance of search"), ImprovementType::Performance),
            (issue(&[], "Prefix handling"), ImprovementType::Feature),
            (issue(&[], "Dark mode"), ImprovementType::Feature),
        ];
        for (issue, expected) in cases {
            assert_eq!(
                agent.parse_issue_to_opportunity(&issue).kind,
                expected,
                "{:?}",
                issue.title
            );
        }
    }

    #[test]
    fn test_priority_from_labels() {
        let (_, agent) = agent(MockCommandRunner::new(), "");
        assert_eq!(agent.parse_issue_to_opportunity(&issue(&["Critical"], "x")).priority, Priority::High);
        assert_eq!(agent.parse_issue_to_opportunity(&issue(&["documentation"], "x")).priority, Priority::Low);
        assert_eq!(agent.parse_issue_to_opportunity(&issue(&["question"], "x")).priority, Priority::Medium);
        assert_eq!(agent.parse_issue_to_opportunity(&issue(&["high-priority"], "x")).priority, Priority::High);
    }

    #[test]
    fn test_opportunity_to_improvement() {
        let (_, agent) = agent(MockCommandRunner::new(), "");
        let opp = agent.parse_issue_to_opportunity(&issue(&["bug"], "Crash on save"));
        let improvement = opp.to_improvement();
        assert_eq!(improvement.kind, ImprovementType::BugFix);
        assert_eq!(improvement.headline(), Some("Crash on save"));
    }

    #[tokio::test]
    async fn test_cards_sorted_and_filtered() {
        let (runner, agent) = agent(MockCommandRunner::new().succeed("gh", &["project", "item-list"], CARDS), "7");
        let cards = agent.fetch_project_cards(Some("Todo")).await;
        let ids: Vec<&str> = cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["PVTI_2", "PVTI_1", "PVTI_4", "PVTI_3"]);
        assert_eq!(agent.fetch_project_cards(None).await.len(), 5);
        assert_eq!(runner.calls()[0].flag_value("--owner"), Some("acme"));
    }

    #[tokio::test]
    async fn test_pull_workflow_applies_guards() {
        let (_, agent) = agent(
            MockCommandRunner::new()
                .succeed("gh", &["issue", "list"], ISSUES)
                .succeed("gh", &["project", "item-list"], CARDS),
            "7",
        );

        let report = agent.execute_pull_workflow().await;
        assert!(report.is_ok());
        assert_eq!(report.issues_fetched, 3);
        assert_eq!(report.cards_synced, 5);
        let picked: Vec<u64> = report.opportunities.iter().map(|o| o.issue_number).collect();
        assert_eq!(picked, vec![1, 4]);
        assert_eq!(report.skipped, vec![(3, "assigned".to_string())]);
        assert!(!agent.should_process_issue(1));
        assert!(agent.should_process_issue(3));

        // Second run hands out nothing new.
        let again = agent.execute_pull_workflow().await;
        assert!(again.opportunities.is_empty());
    }

    #[tokio::test]
    async fn test_pull_workflow_without_project_uses_open_issues() {
        let (runner, agent) = agent(MockCommandRunner::new().succeed("gh", &["issue", "list"], ISSUES), "");
        let report = agent.execute_pull_workflow().await;
        let picked: Vec<u64> = report.opportunities.iter().map(|o| o.issue_number).collect();
        assert_eq!(picked, vec![1, 4]);
        assert!(runner.calls_matching("gh", &["project"]).is_empty());
    }

    #[tokio::test]
    async fn test_pull_workflow_reports_fetch_failure() {
        let (_, agent) = agent(MockCommandRunner::new().fail("gh", &["issue", "list"], 4, "not logged in"), "7");
        let report = agent.execute_pull_workflow().await;
        assert!(!report.is_ok());
        assert!(report.opportunities.is_empty());
    }

    #[tokio::test]
    async fn test_move_project_card_arguments() {
        let (runner, agent) = agent(MockCommandRunner::new(), "7");
        assert!(agent.move_project_card("PVTI_1", "Done").await);
        assert_eq!(
            runner.call_summaries(3),
            vec!["gh project item-edit PVTI_1"]
        );
        assert_eq!(runner.calls()[0].flag_value("--id"), Some("7"));
    }

    #[tokio::test]
    async fn test_adopt_opportunity_tracks_issue_and_branch() {
        let (runner, agent) = agent(MockCommandRunner::new().succeed("gh", &["issue", "list"], ISSUES), "");
        let report = agent.execute_pull_workflow().await;
        let crash = &report.opportunities[0];

        let sync = agent
            .adopt_opportunity(crash, &WorkspaceLock::new().acquire().await)
            .await;
        assert!(sync.is_initiated());
        assert_eq!(sync.branch.as_deref(), Some("auto/bug_fix/issue-1"));

        let tracked = agent.tracked_issue(1).unwrap();
        assert_eq!(tracked.url, "https://github.com/acme/widgets/issues/1");
        assert_eq!(tracked.stage, WorkflowStage::InProgress);
        assert_eq!(tracked.improvement.headline(), Some("Crash when saving"));
        assert_eq!(runner.calls_matching("git", &["checkout", "-b"]).len(), 1);
    }

    #[tokio::test]
    async fn test_adopt_opportunity_without_branch_is_failed() {
        let (runner, agent) = agent(
            MockCommandRunner::new()
                .succeed("gh", &["issue", "list"], ISSUES)
                .fail("git", &["checkout", "-b"], 128, "fatal: not a git repository"),
            "",
        );
        let report = agent.execute_pull_workflow().await;
        let crash = &report.opportunities[0];

        let sync = agent
            .adopt_opportunity(crash, &WorkspaceLock::new().acquire().await)
            .await;
        assert_eq!(sync.workflow_status, SyncWorkflowStatus::Failed);
        assert!(sync.branch.is_none());
        assert!(runner.calls_matching("git", &["push"]).is_empty());
        assert_eq!(agent.tracked_issue(1).unwrap().stage, WorkflowStage::IssueCreated);
    }
}
