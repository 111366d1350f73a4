//! Proposed units of work fed into the sync agent.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Kind of improvement. Unknown type names deserialize to `General`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementType {
    BugFix,
    TestCoverage,
    Performance,
    Feature,
    #[default]
    General,
}

impl ImprovementType {
    /// Parse a type name; anything unrecognised is `General`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bug_fix" | "bugfix" | "bug" => Self::BugFix,
            "test_coverage" | "tests" | "test" => Self::TestCoverage,
            "performance" | "perf" => Self::Performance,
            "feature" => Self::Feature,
            _ => Self::General,
        }
    }

    /// Wire name, also used as the branch type segment.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BugFix => "bug_fix",
            Self::TestCoverage => "test_coverage",
            Self::Performance => "performance",
            Self::Feature => "feature",
            Self::General => "general",
        }
    }

    /// Title-cased words, e.g. `Bug Fix`.
    #[must_use]
    pub fn title(&self) -> String {
        self.as_str()
            .split('_')
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<'de> Deserialize<'de> for ImprovementType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

impl fmt::Display for ImprovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Improvement priority. Unknown names deserialize to `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Issue labels that raise a pulled issue to [`Priority::High`].
pub const HIGH_PRIORITY_LABELS: &[&str] = &["critical", "urgent", "high", "high-priority", "priority:high"];

/// Issue labels that lower a pulled issue to [`Priority::Low`].
pub const LOW_PRIORITY_LABELS: &[&str] = &["low", "low-priority", "priority:low", "minor", "documentation"];

impl Priority {
    /// Priority implied by issue labels, compared case-insensitively. A high
    /// label wins over a low one.
    #[must_use]
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let has = |table: &[&str]| {
            labels
                .iter()
                .any(|l| table.iter().any(|t| l.as_ref().trim().eq_ignore_ascii_case(t)))
        };
        if has(HIGH_PRIORITY_LABELS) {
            Self::High
        } else if has(LOW_PRIORITY_LABELS) {
            Self::Low
        } else {
            Self::Medium
        }
    }

    /// Parse a priority name; anything unrecognised is `Medium`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed unit of work, as produced by an external detector.
///
/// The meaning of the string lists depends on the type: `patterns` for bug
/// fixes, `gaps` for test coverage, `issues` for performance and `ideas` for
/// features.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Improvement {
    #[serde(rename = "type", default)]
    pub kind: ImprovementType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub ideas: Vec<String>,
    /// Originating evolution cycle, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<u32>,
}

impl Improvement {
    pub fn new(kind: ImprovementType, priority: Priority) -> Self {
        Self {
            kind,
            priority,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    #[must_use]
    pub fn with_gap(mut self, gap: impl Into<String>) -> Self {
        self.gaps.push(gap.into());
        self
    }

    #[must_use]
    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    #[must_use]
    pub fn with_idea(mut self, idea: impl Into<String>) -> Self {
        self.ideas.push(idea.into());
        self
    }

    /// The list relevant to this improvement's type.
    #[must_use]
    pub fn details(&self) -> &[String] {
        match self.kind {
            ImprovementType::BugFix => &self.patterns,
            ImprovementType::TestCoverage => &self.gaps,
            ImprovementType::Performance => &self.issues,
            ImprovementType::Feature => &self.ideas,
            ImprovementType::General => {
                [&self.patterns, &self.gaps, &self.issues, &self.ideas]
                    .into_iter()
                    .find(|l| !l.is_empty())
                    .map_or(&[][..], |l| l.as_slice())
            }
        }
    }

    /// First detail line, used in titles and task descriptions.
    #[must_use]
    pub fn headline(&self) -> Option<&str> {
        self.details().first().map(String::as_str)
    }
}
