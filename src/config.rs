//! Configuration management for autodev.
//!
//! Settings live in `<project>/.autodev/settings.json` (camelCase JSON). A
//! missing file yields defaults; CLI flags are applied on top through
//! [`ConfigOverrides`].

pub mod git;
pub mod validation;

pub use git::{verify_git_environment, GitEnvironmentCheck};
pub use validation::{ConfigValidator, ValidationReport};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding autodev state inside a project.
pub const STATE_DIR: &str = ".autodev";

/// Repository coordinates and project board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubConfig {
    /// Repository owner (user or organisation).
    #[serde(default)]
    pub owner: String,

    /// Repository name.
    #[serde(default)]
    pub repo: String,

    /// Project board id. Board updates are skipped when empty.
    #[serde(default)]
    pub project_id: String,
}

impl GitHubConfig {
    /// `owner/repo` as accepted by `gh --repo`.
    #[must_use]
    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Web URL of the repository.
    #[must_use]
    pub fn repo_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }
}

/// Workflow policy switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Merge PRs automatically once checks pass.
    #[serde(default)]
    pub auto_merge: bool,

    /// Tag and release after each merged improvement.
    #[serde(default)]
    pub auto_versioning: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Timeout applied to every git/gh invocation.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Version the release counter starts from.
    #[serde(default = "default_initial_version")]
    pub initial_version: String,

    #[serde(default)]
    pub pull_mode_enabled: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_initial_version() -> String {
    "1.0.0".to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            auto_merge: false,
            auto_versioning: false,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            command_timeout_secs: default_command_timeout_secs(),
            initial_version: default_initial_version(),
            pull_mode_enabled: false,
        }
    }
}

impl WorkflowConfig {
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Chat-completion backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    #[serde(default = "default_ai_model")]
    pub model: String,

    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Environment variable holding the API key, if the server needs one.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_ai_base_url() -> String {
    crate::ai::lm_studio::DEFAULT_BASE_URL.to_string()
}

fn default_ai_model() -> String {
    crate::ai::lm_studio::DEFAULT_MODEL.to_string()
}

fn default_ai_timeout_secs() -> u64 {
    crate::ai::lm_studio::DEFAULT_TIMEOUT_SECS
}

fn default_api_key_env() -> String {
    "LM_STUDIO_API_KEY".to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            timeout_secs: default_ai_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// TDD cycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TddConfig {
    /// Test command as program + arguments.
    #[serde(default = "default_test_command")]
    pub test_command: Vec<String>,

    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,

    /// Coverage below this percentage is reported but does not fail a task.
    #[serde(default = "default_min_coverage")]
    pub min_coverage: f64,

    #[serde(default = "default_tests_dir")]
    pub tests_dir: PathBuf,

    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    #[serde(default = "default_test_file_extension")]
    pub test_file_extension: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_test_framework")]
    pub test_framework: String,
}

fn default_test_command() -> Vec<String> {
    ["python", "-m", "pytest", "--cov=src", "--cov-report=term-missing"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_test_timeout_secs() -> u64 {
    600
}

fn default_min_coverage() -> f64 {
    80.0
}

fn default_tests_dir() -> PathBuf {
    PathBuf::from("tests")
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_test_file_extension() -> String {
    "py".to_string()
}

fn default_language() -> String {
    "python".to_string()
}

fn default_test_framework() -> String {
    "pytest".to_string()
}

impl Default for TddConfig {
    fn default() -> Self {
        Self {
            test_command: default_test_command(),
            test_timeout_secs: default_test_timeout_secs(),
            min_coverage: default_min_coverage(),
            tests_dir: default_tests_dir(),
            source_dir: default_source_dir(),
            test_file_extension: default_test_file_extension(),
            language: default_language(),
            test_framework: default_test_framework(),
        }
    }
}

/// MCP tool server launched for one-shot stdio exchanges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    /// Server command, e.g. `["docker", "exec", "-i", "mcp", "mcp-server"]`.
    #[serde(default)]
    pub server_command: Vec<String>,
}

/// Project-level configuration loaded from `.autodev/settings.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub tdd: TddConfig,

    #[serde(default)]
    pub mcp: McpConfig,
}

/// Command-line overrides applied on top of the settings file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub project_id: Option<String>,
    pub auto_merge: Option<bool>,
    pub auto_versioning: Option<bool>,
    pub ai_base_url: Option<String>,
    pub ai_model: Option<String>,
}

impl ProjectConfig {
    /// Load configuration from a project directory.
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        let settings_path = Self::settings_path(project_dir);

        if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            let config: ProjectConfig = serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", settings_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the configuration as pretty JSON, creating `.autodev/`.
    pub fn save(&self, project_dir: &Path) -> anyhow::Result<PathBuf> {
        let path = Self::settings_path(project_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Apply CLI overrides; `None` fields leave the loaded value alone.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(owner) = &overrides.owner {
            self.github.owner = owner.clone();
        }
        if let Some(repo) = &overrides.repo {
            self.github.repo = repo.clone();
        }
        if let Some(project_id) = &overrides.project_id {
            self.github.project_id = project_id.clone();
        }
        if let Some(auto_merge) = overrides.auto_merge {
            self.workflow.auto_merge = auto_merge;
        }
        if let Some(auto_versioning) = overrides.auto_versioning {
            self.workflow.auto_versioning = auto_versioning;
        }
        if let Some(base_url) = &overrides.ai_base_url {
            self.ai.base_url = base_url.clone();
        }
        if let Some(model) = &overrides.ai_model {
            self.ai.model = model.clone();
        }
    }

    /// Get the state directory for a project
    pub fn state_dir(project_dir: &Path) -> PathBuf {
        project_dir.join(STATE_DIR)
    }

    /// Get the settings.json path for a project
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        Self::state_dir(project_dir).join("settings.json")
    }

    /// Get the persisted task register path
    pub fn tasks_path(project_dir: &Path) -> PathBuf {
        Self::state_dir(project_dir).join("tasks.json")
    }
}
