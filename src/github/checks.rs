//! Pull request check rollup, as reported by
//! `gh pr view N --json statusCheckRollup`.

use serde::Deserialize;

/// One entry of the rollup. Check runs report `conclusion`, commit statuses
/// report `state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CheckEntry {
    #[serde(default, alias = "context")]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl CheckEntry {
    /// The verdict: `conclusion` when present and non-empty, else `state`.
    #[must_use]
    pub fn verdict(&self) -> Option<&str> {
        self.conclusion
            .as_deref()
            .filter(|c| !c.is_empty())
            .or(self.state.as_deref().filter(|s| !s.is_empty()))
    }

    /// SUCCESS or NEUTRAL.
    #[must_use]
    pub fn is_passing(&self) -> bool {
        self.verdict()
            .is_some_and(|v| v.eq_ignore_ascii_case("SUCCESS") || v.eq_ignore_ascii_case("NEUTRAL"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRollup {
    #[serde(default)]
    pub status_check_rollup: Vec<CheckEntry>,
}

impl CheckRollup {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// True when every entry passes. An empty rollup passes.
    #[must_use]
    pub fn all_passing(&self) -> bool {
        self.status_check_rollup.iter().all(CheckEntry::is_passing)
    }

    /// Names (or verdicts) of the entries holding the merge back.
    #[must_use]
    pub fn blocking(&self) -> Vec<String> {
        self.status_check_rollup
            .iter()
            .filter(|c| !c.is_passing())
            .map(|c| {
                let name = c.name.as_deref().unwrap_or("unnamed");
                format!("{}={}", name, c.verdict().unwrap_or("PENDING"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rollup_passes() {
        let rollup = CheckRollup::parse(r#"{"statusCheckRollup": []}"#).unwrap();
        assert!(rollup.all_passing());
        let missing = CheckRollup::parse("{}").unwrap();
        assert!(missing.all_passing());
    }

    #[test]
    fn test_success_and_neutral_pass() {
        let rollup = CheckRollup::parse(
            r#"{"statusCheckRollup": [
                {"name": "ci", "status": "COMPLETED", "conclusion": "SUCCESS"},
                {"context": "lint", "state": "SUCCESS"},
                {"name": "docs", "conclusion": "NEUTRAL"}
            ]}"#,
        )
        .unwrap();
        assert!(rollup.all_passing());
        assert!(rollup.blocking().is_empty());
    }

    #[test]
    fn test_failure_blocks() {
        let rollup = CheckRollup::parse(
            r#"{"statusCheckRollup": [
                {"name": "ci", "conclusion": "SUCCESS"},
                {"name": "tests", "conclusion": "FAILURE"}
            ]}"#,
        )
        .unwrap();
        assert!(!rollup.all_passing());
        assert_eq!(rollup.blocking(), vec!["tests=FAILURE".to_string()]);
    }

    #[test]
    fn test_in_progress_blocks() {
        let rollup = CheckRollup::parse(
            r#"{"statusCheckRollup": [{"name": "ci", "status": "IN_PROGRESS", "conclusion": ""}]}"#,
        )
        .unwrap();
        assert!(!rollup.all_passing());
        assert_eq!(rollup.blocking(), vec!["ci=PENDING".to_string()]);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(CheckRollup::parse("not json").is_err());
    }
}
