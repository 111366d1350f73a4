//! Mock implementations of testing traits.
//!
//! These mocks provide controllable test doubles for external dependencies,
//! enabling deterministic unit tests. All of them are thread-safe so they can
//! be shared behind an `Arc` between the sync agent and the TDD driver.

use super::traits::{AiBackend, CommandRunner, FileSystem, TestRunReport, TestSuite};
use crate::ai::AiError;
use crate::process::{CommandError, CommandOutput, CommandSpec};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

type Reply = Result<CommandOutput, CommandError>;

#[derive(Debug)]
struct MockRule {
    program: String,
    prefix: Vec<String>,
    replies: VecDeque<Reply>,
}

impl MockRule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        spec.program == self.program
            && spec.args.len() >= self.prefix.len()
            && spec.args.iter().zip(&self.prefix).all(|(a, p)| a == p)
    }

    /// Pop the next reply; the last reply repeats forever.
    fn next_reply(&mut self) -> Reply {
        if self.replies.len() > 1 {
            self.replies.pop_front().unwrap_or_else(|| Ok(CommandOutput::default()))
        } else {
            self.replies
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(CommandOutput::default()))
        }
    }
}

/// Scripted subprocess runner that records every invocation.
///
/// Rules match on program name and an argument prefix. The first matching
/// rule answers; successive matches consume its queued replies and the last
/// reply repeats. Commands without a rule succeed with empty output.
///
/// # Example
///
/// ```rust,ignore
/// let runner = MockCommandRunner::new()
///     .succeed("gh", &["issue", "create"], "https://github.com/o/r/issues/42\n")
///     .fail("git", &["checkout", "-b"], 128, "fatal: branch already exists");
///
/// runner.run(&CommandSpec::gh(["issue", "create"])).await?;
/// assert_eq!(runner.call_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockCommandRunner {
    rules: Mutex<Vec<MockRule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl MockCommandRunner {
    /// Create a runner where every command succeeds with empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for commands matching `program` + `prefix`.
    #[must_use]
    pub fn on(mut self, program: &str, prefix: &[&str], reply: Reply) -> Self {
        let rules = self.rules.get_mut().unwrap_or_else(|e| e.into_inner());
        let existing = rules.iter().position(|r| {
            r.program == program && r.prefix.iter().map(String::as_str).eq(prefix.iter().copied())
        });
        match existing {
            Some(i) => rules[i].replies.push_back(reply),
            None => rules.push(MockRule {
                program: program.to_string(),
                prefix: prefix.iter().map(|s| s.to_string()).collect(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    /// Queue a successful reply with the given stdout.
    #[must_use]
    pub fn succeed(self, program: &str, prefix: &[&str], stdout: &str) -> Self {
        self.on(program, prefix, Ok(CommandOutput::success(stdout)))
    }

    /// Queue a nonzero-exit reply with the given stderr.
    #[must_use]
    pub fn fail(self, program: &str, prefix: &[&str], exit_code: i32, stderr: &str) -> Self {
        self.on(
            program,
            prefix,
            Err(CommandError::exit(program, exit_code, stderr)),
        )
    }

    /// Queue a nonzero-exit reply carrying both streams.
    #[must_use]
    pub fn fail_with_output(
        self,
        program: &str,
        prefix: &[&str],
        exit_code: i32,
        stdout: &str,
        stderr: &str,
    ) -> Self {
        self.on(
            program,
            prefix,
            Err(CommandError::exit(program, exit_code, stderr).with_stdout(stdout)),
        )
    }

    /// All recorded invocations, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of recorded invocations.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Recorded invocations matching `program` + `prefix`.
    pub fn calls_matching(&self, program: &str, prefix: &[&str]) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| {
                c.program == program
                    && c.args.len() >= prefix.len()
                    && c.args.iter().zip(prefix).all(|(a, p)| a == p)
            })
            .collect()
    }

    /// Recorded invocations rendered as `"program arg1 arg2"` prefixes of
    /// `width` arguments, handy for asserting sequences.
    pub fn call_summaries(&self, width: usize) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| format!("{} {}", c.program, c.subcommand(width)))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());

        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        match rules.iter_mut().find(|r| r.matches(spec)) {
            Some(rule) => rule.next_reply(),
            None => Ok(CommandOutput::default()),
        }
    }
}

/// Mock chat backend.
///
/// Replies are taken from a queue; once it is drained the default response
/// is returned. Every prompt pair is recorded.
#[derive(Debug)]
pub struct MockAiBackend {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    default_response: String,
    prompts: Mutex<Vec<(String, String)>>,
    call_count: AtomicU32,
}

impl Default for MockAiBackend {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_response: "pass".to_string(),
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }
}

impl MockAiBackend {
    /// Create a backend that answers `"pass"` to everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the response returned once the queue is empty.
    #[must_use]
    pub fn with_default_response(mut self, response: &str) -> Self {
        self.default_response = response.to_string();
        self
    }

    /// Queue a successful reply.
    #[must_use]
    pub fn with_response(mut self, response: &str) -> Self {
        self.replies
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(response.to_string()));
        self
    }

    /// Queue a failing reply.
    #[must_use]
    pub fn with_error(mut self, error: AiError) -> Self {
        self.replies
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
        self
    }

    /// Number of chat calls made.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Recorded `(system, user)` prompt pairs.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AiBackend for MockAiBackend {
    async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, AiError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((system_prompt.to_string(), user_prompt.to_string()));

        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(self.default_response.clone()))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Mock test suite returning scripted reports; the last report repeats.
#[derive(Debug, Default)]
pub struct MockTestSuite {
    reports: Mutex<VecDeque<TestRunReport>>,
    call_count: AtomicU32,
}

impl MockTestSuite {
    /// Create a suite that always passes with 100% coverage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue reports in the order the driver will observe them.
    #[must_use]
    pub fn with_reports(mut self, reports: Vec<TestRunReport>) -> Self {
        self.reports
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .extend(reports);
        self
    }

    /// Number of suite runs.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestSuite for MockTestSuite {
    async fn run(&self) -> Result<TestRunReport, CommandError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut reports = self.reports.lock().unwrap_or_else(|e| e.into_inner());
        let report = if reports.len() > 1 {
            reports.pop_front()
        } else {
            reports.front().cloned()
        };
        Ok(report.unwrap_or_else(|| TestRunReport::pass(100.0)))
    }
}

/// In-memory file system.
#[derive(Debug, Default)]
pub struct MockFileSystem {
    files: Mutex<HashMap<PathBuf, String>>,
}

impl MockFileSystem {
    /// Create an empty file system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content of a file, if written.
    pub fn content(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path.as_ref())
            .cloned()
    }

    /// Paths written so far, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl FileSystem for MockFileSystem {
    async fn read_file(&self, path: &Path) -> std::io::Result<String> {
        self.content(path).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )
        })
    }

    async fn write_file(&self, path: &Path, content: &str) -> std::io::Result<()> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        self.content(path).is_some()
    }
}
