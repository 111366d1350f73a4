//! Text generation for issues, pull requests, commits and releases.

use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::Path;

use super::improvement::{Improvement, ImprovementType};
use super::version::SemVer;

/// Label added to every issue the agent creates; pull mode skips issues
/// carrying it.
pub const AUTO_GENERATED_LABEL: &str = "auto-generated";

/// Title, body and labels for a new issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueContent {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Builds the text the agent posts to GitHub.
#[derive(Debug, Clone)]
pub struct IssueContentGenerator {
    repo_url: String,
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn bullets(out: &mut String, items: &[String]) {
    if items.is_empty() {
        out.push_str("- (none reported)\n");
    }
    for item in items {
        let _ = writeln!(out, "- {}", item);
    }
}

fn checklist(out: &mut String, items: &[&str]) {
    for item in items {
        let _ = writeln!(out, "- [ ] {}", item);
    }
}

impl IssueContentGenerator {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
        }
    }

    /// Title, body and labels for an improvement.
    #[must_use]
    pub fn issue(&self, improvement: &Improvement, at: DateTime<Utc>) -> IssueContent {
        IssueContent {
            title: self.issue_title(improvement),
            body: self.issue_body(improvement, at),
            labels: self.issue_labels(improvement.kind),
        }
    }

    #[must_use]
    pub fn issue_title(&self, improvement: &Improvement) -> String {
        match improvement.kind {
            ImprovementType::BugFix => format!(
                "[BUG] Auto-Fix: {}",
                improvement.headline().unwrap_or("Unknown issue")
            ),
            ImprovementType::TestCoverage => "[TEST] Auto-Test: Improve test coverage".to_string(),
            ImprovementType::Performance => "[PERF] Auto-Optimization: Performance".to_string(),
            ImprovementType::Feature => format!(
                "[FEAT] Auto-Feature: {}",
                improvement.headline().unwrap_or("New feature")
            ),
            ImprovementType::General => match improvement.headline() {
                Some(h) => format!("[AUTO] Auto-Improvement: {}", h),
                None => "[AUTO] Auto-Improvement: general".to_string(),
            },
        }
    }

    #[must_use]
    pub fn issue_body(&self, improvement: &Improvement, at: DateTime<Utc>) -> String {
        let mut out = String::new();
        let (heading, list_heading, plan): (&str, &str, &[&str]) = match improvement.kind {
            ImprovementType::BugFix => (
                "Automatically Detected Bug",
                "Error Patterns",
                &[
                    "Analyse the source code",
                    "Generate an automatic fix",
                    "Regression tests",
                    "Apply the fix",
                ],
            ),
            ImprovementType::TestCoverage => (
                "Test Coverage Gap Detected",
                "Modules Without Tests",
                &[
                    "Generate unit tests",
                    "Generate integration tests",
                    "Validate coverage above threshold",
                ],
            ),
            ImprovementType::Performance => (
                "Performance Optimization Required",
                "Detected Issues",
                &["Profile", "Optimise algorithms", "Performance tests"],
            ),
            ImprovementType::Feature => (
                "New Auto-Generated Feature",
                "Ideas",
                &[
                    "Requirements analysis",
                    "Implement feature",
                    "Complete tests",
                    "Documentation",
                ],
            ),
            ImprovementType::General => ("Auto-Detected Improvement", "Details", &[]),
        };

        let _ = writeln!(out, "## {}\n", heading);
        let _ = writeln!(out, "**Type:** {}", improvement.kind);
        let _ = writeln!(
            out,
            "**Priority:** {}",
            improvement.priority.as_str().to_uppercase()
        );
        match improvement.cycle {
            Some(cycle) => {
                let _ = writeln!(out, "**Detected by:** autodev cycle #{}", cycle);
            }
            None => out.push_str("**Detected by:** autodev\n"),
        }

        let _ = writeln!(out, "\n### {}:", list_heading);
        bullets(&mut out, improvement.details());

        if !plan.is_empty() {
            out.push_str("\n### Plan:\n");
            checklist(&mut out, plan);
        }

        let _ = write!(out, "\n**Auto-generated on {}**\n", stamp(at));
        out
    }

    /// `bug` for bug fixes, `enhancement` otherwise, plus the
    /// auto-generated marker.
    #[must_use]
    pub fn issue_labels(&self, kind: ImprovementType) -> Vec<String> {
        let type_label = match kind {
            ImprovementType::BugFix => "bug",
            _ => "enhancement",
        };
        vec![type_label.to_string(), AUTO_GENERATED_LABEL.to_string()]
    }

    #[must_use]
    pub fn pr_title(&self, issue_number: u64, improvement: &Improvement) -> String {
        format!("Auto-Fix #{}: {}", issue_number, improvement.kind.title())
    }

    #[must_use]
    pub fn pr_body(&self, issue_number: u64, improvement: &Improvement, at: DateTime<Utc>) -> String {
        format!(
            "## Auto-Generated Pull Request\n\n\
             **Fixes:** #{n}\n\
             **Type:** {kind}\n\
             **Priority:** {priority}\n\n\
             ### Changes:\n\
             - Generated through a RED/GREEN/REFACTOR cycle\n\
             - Tests included\n\n\
             **Auto-generated on {at}**\n",
            n = issue_number,
            kind = improvement.kind,
            priority = improvement.priority,
            at = stamp(at),
        )
    }

    /// Commit message listing the committed paths and closing the issue.
    #[must_use]
    pub fn commit_message<P: AsRef<Path>>(&self, issue_number: u64, files: &[P]) -> String {
        let mut msg = format!(
            "Auto-fix: Resolve issue #{}\n\nGenerated by autodev:\n",
            issue_number
        );
        for file in files {
            let _ = writeln!(msg, "- {}", file.as_ref().display());
        }
        let _ = write!(msg, "\nCloses #{}", issue_number);
        msg
    }

    #[must_use]
    pub fn release_title(&self, version: SemVer) -> String {
        format!("Auto-Release {}", version.tag())
    }

    /// Release notes with a compare link from `previous` to `version`.
    #[must_use]
    pub fn release_notes(
        &self,
        version: SemVer,
        previous: SemVer,
        improvement: &Improvement,
        at: DateTime<Utc>,
    ) -> String {
        let mut notes = format!("# Auto-Release {}\n\n## What's New\n", version.tag());
        let _ = writeln!(
            notes,
            "- **{}**: {}",
            improvement.kind.title(),
            improvement.headline().unwrap_or("automatic improvements")
        );
        let _ = write!(
            notes,
            "\n## Auto-Generated\nReleased by autodev on {}\n\n**Full Changelog**: {}/compare/{}...{}\n",
            stamp(at),
            self.repo_url,
            previous.tag(),
            version.tag()
        );
        notes
    }

    #[must_use]
    pub fn close_comment(&self) -> &'static str {
        "Resolved automatically by autodev."
    }
}
