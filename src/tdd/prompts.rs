//! Prompts sent to the AI backend at each phase.

use std::path::Path;

use crate::config::TddConfig;
use crate::tracker::Task;

pub const SYSTEM_PROMPT: &str = "You are a senior software engineer specialised in test-driven \
development and clean code. Provide practical, implementable solutions. When asked for code, \
reply with a single fenced code block containing the complete file.";

pub const ANALYSIS_MAX_TOKENS: u32 = 1000;
pub const CODE_MAX_TOKENS: u32 = 1500;
pub const TEMPERATURE: f32 = 0.3;

fn task_header(task: &Task) -> String {
    let mut header = format!("**Title:** {}\n", task.title);
    if !task.description.is_empty() {
        header.push_str(&format!("**Description:** {}\n", task.description));
    }
    if !task.labels.is_empty() {
        header.push_str(&format!("**Labels:** {}\n", task.labels.join(", ")));
    }
    header
}

#[must_use]
pub fn analysis(task: &Task, config: &TddConfig) -> String {
    format!(
        "Analyse this task for test-driven development in {language}:\n\n{header}\n\
         Please provide:\n\
         1. Feature analysis: what functionality needs to be implemented?\n\
         2. Test strategy: which tests should be written first?\n\
         3. Implementation plan, step by step\n\
         4. Acceptance criteria\n\
         5. Files to create or modify\n",
        language = config.language,
        header = task_header(task),
    )
}

#[must_use]
pub fn red(task: &Task, analysis: &str, test_path: &Path, impl_path: &Path, config: &TddConfig) -> String {
    format!(
        "Write tests for this feature using {framework} (RED phase of TDD):\n\n{header}\n\
         **Analysis:**\n{analysis}\n\n\
         The tests go in `{test}` and exercise code that will live in `{implementation}`.\n\
         Requirements:\n\
         1. The tests must FAIL until the feature is implemented\n\
         2. Cover every acceptance criterion\n\
         3. Mock external dependencies\n\
         Return the complete test file.\n",
        framework = config.test_framework,
        header = task_header(task),
        analysis = analysis.trim(),
        test = test_path.display(),
        implementation = impl_path.display(),
    )
}

#[must_use]
pub fn green(task: &Task, tests: &str, impl_path: &Path, config: &TddConfig) -> String {
    format!(
        "Implement the MINIMAL {language} code that makes these tests pass (GREEN phase of TDD):\n\n\
         {header}\n**Tests to satisfy:**\n```\n{tests}\n```\n\n\
         The implementation goes in `{implementation}`.\n\
         Write only what the tests need. Return the complete file.\n",
        language = config.language,
        header = task_header(task),
        tests = tests.trim(),
        implementation = impl_path.display(),
    )
}

#[must_use]
pub fn refactor(task: &Task, implementation: &str, test_output: &str) -> String {
    format!(
        "Refactor this code while keeping all tests passing (REFACTOR phase of TDD):\n\n\
         {header}\n**Current implementation:**\n```\n{implementation}\n```\n\n\
         **Test results:**\n```\n{output}\n```\n\n\
         Improve readability and remove duplication without changing behaviour or adding \
         features. Return the complete refactored file.\n",
        header = task_header(task),
        implementation = implementation.trim(),
        output = test_output.trim(),
    )
}
