//! Runs the project's test command through a [`CommandRunner`].

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

use crate::config::TddConfig;
use crate::process::{CommandError, CommandSpec};
use crate::testing::{CommandRunner, TestRunReport, TestSuite};

/// [`TestSuite`] backed by an external test command such as pytest.
pub struct CommandTestSuite {
    runner: Arc<dyn CommandRunner>,
    command: Vec<String>,
    dir: PathBuf,
    timeout: Duration,
}

impl std::fmt::Debug for CommandTestSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTestSuite")
            .field("command", &self.command)
            .field("dir", &self.dir)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CommandTestSuite {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &TddConfig, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            command: config.test_command.clone(),
            dir: dir.into(),
            timeout: Duration::from_secs(config.test_timeout_secs),
        }
    }

    fn spec(&self) -> Option<CommandSpec> {
        let (program, args) = self.command.split_first()?;
        Some(
            CommandSpec::new(program.as_str())
                .args(args.iter().map(String::as_str))
                .in_dir(self.dir.clone())
                .with_timeout(self.timeout),
        )
    }
}

#[async_trait]
impl TestSuite for CommandTestSuite {
    async fn run(&self) -> Result<TestRunReport, CommandError> {
        let Some(spec) = self.spec() else {
            return Err(CommandError::Spawn {
                program: String::new(),
                message: "test command is empty".to_string(),
                not_found: true,
            });
        };
        debug!("Running test suite: {}", spec);

        match self.runner.run(&spec).await {
            Ok(output) => {
                let coverage = extract_coverage(&output.stdout);
                Ok(TestRunReport {
                    passed: true,
                    exit_code: output.exit_code,
                    output: output.stdout,
                    errors: output.stderr,
                    coverage,
                })
            }
            Err(CommandError::NonZeroExit {
                exit_code,
                stdout,
                stderr,
                ..
            }) => {
                let coverage = extract_coverage(&stdout);
                Ok(TestRunReport {
                    passed: false,
                    exit_code,
                    output: stdout,
                    errors: stderr,
                    coverage,
                })
            }
            Err(other) => Err(other),
        }
    }
}

fn coverage_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)%").ok())
        .as_ref()
}

/// Total line coverage from a coverage report's `TOTAL` row, 0.0 when the
/// output has none.
///
/// ```
/// use autodev::tdd::extract_coverage;
///
/// let out = "src/a.py   10   1   90%\nTOTAL      20   3   85%\n";
/// assert_eq!(extract_coverage(out), 85.0);
/// assert_eq!(extract_coverage("3 passed"), 0.0);
/// ```
#[must_use]
pub fn extract_coverage(output: &str) -> f64 {
    let Some(pattern) = coverage_pattern() else {
        return 0.0;
    };
    output
        .lines()
        .filter(|line| line.trim_start().starts_with("TOTAL"))
        .filter_map(|line| pattern.captures_iter(line).last())
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .last()
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCommandRunner;

    const PYTEST_OUTPUT: &str = "\
============ test session starts ============
collected 4 items

tests/test_parser.py ....                [100%]

---------- coverage: platform linux ----------
Name              Stmts   Miss  Cover   Missing
-----------------------------------------------
src/parser.py        40      6    85%   12-17
-----------------------------------------------
TOTAL                40      6    85%
============ 4 passed in 0.12s ============
";

    fn suite(runner: &Arc<MockCommandRunner>) -> CommandTestSuite {
        CommandTestSuite::new(runner.clone(), &TddConfig::default(), "/work")
    }

    #[test]
    fn test_extract_coverage_uses_total_row() {
        assert_eq!(extract_coverage(PYTEST_OUTPUT), 85.0);
        assert_eq!(extract_coverage("TOTAL 10 0 100%"), 100.0);
        assert_eq!(extract_coverage("TOTAL 10 1 92.5%"), 92.5);
        assert_eq!(extract_coverage("src/a.py 10 0 100%"), 0.0);
        assert_eq!(extract_coverage(""), 0.0);
    }

    #[tokio::test]
    async fn test_passing_suite_reports_coverage() {
        let runner = Arc::new(MockCommandRunner::new().succeed("python", &["-m", "pytest"], PYTEST_OUTPUT));
        let report = suite(&runner).run().await.unwrap();

        assert!(report.passed);
        assert_eq!(report.coverage, 85.0);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].current_dir.as_deref(), Some(std::path::Path::new("/work")));
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn test_failing_suite_is_ok_report() {
        let runner = Arc::new(MockCommandRunner::new().fail("python", &["-m", "pytest"], 1, "1 failed"));
        let report = suite(&runner).run().await.unwrap();

        assert!(!report.passed);
        assert_eq!(report.exit_code, 1);
        assert_eq!(report.errors, "1 failed");
        assert_eq!(report.coverage, 0.0);
    }

    #[tokio::test]
    async fn test_failing_suite_keeps_stdout_and_coverage() {
        let failing = PYTEST_OUTPUT.replace("4 passed", "1 failed, 3 passed");
        let runner = Arc::new(MockCommandRunner::new().fail_with_output(
            "python",
            &["-m", "pytest"],
            1,
            &failing,
            "DeprecationWarning: old API",
        ));
        let report = suite(&runner).run().await.unwrap();

        assert!(!report.passed);
        assert!(report.output.contains("1 failed, 3 passed"));
        assert_eq!(report.errors, "DeprecationWarning: old API");
        assert_eq!(report.coverage, 85.0);
    }

    #[tokio::test]
    async fn test_empty_command_is_error() {
        let runner = Arc::new(MockCommandRunner::new());
        let config = TddConfig {
            test_command: Vec::new(),
            ..TddConfig::default()
        };
        let suite = CommandTestSuite::new(runner.clone(), &config, "/work");
        assert!(suite.run().await.is_err());
        assert_eq!(runner.call_count(), 0);
    }
}
