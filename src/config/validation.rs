//! Configuration validation for autodev.
//!
//! # Example
//!
//! ```rust,ignore
//! use autodev::config::ConfigValidator;
//! use std::path::Path;
//!
//! let report = ConfigValidator::new(Path::new("/path/to/project")).validate();
//!
//! if !report.is_valid() {
//!     eprintln!("{}", report.verbose_report());
//!     std::process::exit(report.exit_code());
//! }
//! ```

use std::path::{Path, PathBuf};

use super::ProjectConfig;

/// Result of configuration validation.
///
/// Warnings do not affect validity.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Errors that prevent the configuration from being valid.
    pub errors: Vec<String>,
    /// Warnings that don't prevent validity but indicate potential issues.
    pub warnings: Vec<String>,
    /// Settings file that was checked, if present.
    pub settings_file: Option<PathBuf>,
}

impl ValidationReport {
    /// Create a new empty validation report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the configuration is valid (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns 0 if valid, 1 if invalid.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_valid() {
            0
        } else {
            1
        }
    }

    /// Generate a human-readable summary of the validation result.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_valid() {
            if self.warnings.is_empty() {
                "Configuration is valid.".to_string()
            } else {
                format!(
                    "Configuration is valid with {} warning(s).",
                    self.warnings.len()
                )
            }
        } else {
            format!(
                "Configuration is invalid with {} error(s).",
                self.errors.len()
            )
        }
    }

    /// Generate a verbose report including all details.
    #[must_use]
    pub fn verbose_report(&self) -> String {
        let mut lines = vec![
            "Configuration Validation Report".to_string(),
            "\u{2500}".repeat(50),
            String::new(),
        ];

        match &self.settings_file {
            Some(path) => lines.push(format!("Settings file: {}", path.display())),
            None => lines.push("Settings file: (none, using defaults)".to_string()),
        }

        if !self.errors.is_empty() {
            lines.push(String::new());
            lines.push(format!("Errors ({}):", self.errors.len()));
            for error in &self.errors {
                lines.push(format!("  \u{2717} {}", error));
            }
        }

        if !self.warnings.is_empty() {
            lines.push(String::new());
            lines.push(format!("Warnings ({}):", self.warnings.len()));
            for warning in &self.warnings {
                lines.push(format!("  \u{26a0} {}", warning));
            }
        }

        lines.push(String::new());
        lines.push(format!("Status: {}", self.summary()));

        lines.join("\n")
    }
}

/// Validates a project's settings file and the values it produces.
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    project_dir: PathBuf,
}

impl ConfigValidator {
    /// Create a new validator for the given project directory.
    #[must_use]
    pub fn new(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
        }
    }

    /// Validate the settings file and return a report.
    ///
    /// Unreadable or malformed files are reported as errors rather than
    /// returned as `Err`.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        let path = ProjectConfig::settings_path(&self.project_dir);

        let config = if path.exists() {
            report.settings_file = Some(path.clone());
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<ProjectConfig>(&content) {
                    Ok(config) => config,
                    Err(e) => {
                        report
                            .errors
                            .push(format!("{}: invalid JSON: {}", path.display(), e));
                        return report;
                    }
                },
                Err(e) => {
                    report
                        .errors
                        .push(format!("{}: cannot read: {}", path.display(), e));
                    return report;
                }
            }
        } else {
            report
                .warnings
                .push("No settings file found; defaults are in effect".to_string());
            ProjectConfig::default()
        };

        Self::validate_values(&config, &mut report);
        report
    }

    /// Check field values of an already-loaded configuration.
    pub fn validate_values(config: &ProjectConfig, report: &mut ValidationReport) {
        if config.github.owner.trim().is_empty() {
            report.errors.push("github.owner must not be empty".to_string());
        }
        if config.github.repo.trim().is_empty() {
            report.errors.push("github.repo must not be empty".to_string());
        }
        if config.github.project_id.trim().is_empty() {
            report
                .warnings
                .push("github.projectId is empty; project board updates are disabled".to_string());
        }

        if config.workflow.max_retries == 0 {
            report
                .errors
                .push("workflow.maxRetries must be at least 1".to_string());
        }
        if crate::github::version::SemVer::parse(&config.workflow.initial_version).is_none() {
            report.errors.push(format!(
                "workflow.initialVersion '{}' is not MAJOR.MINOR.PATCH",
                config.workflow.initial_version
            ));
        }
        if config.workflow.auto_merge {
            report.warnings.push(
                "workflow.autoMerge is on: PRs on repositories without CI checks merge immediately"
                    .to_string(),
            );
        }

        if !(0.0..=100.0).contains(&config.tdd.min_coverage) {
            report.errors.push(format!(
                "tdd.minCoverage must be within 0..=100, got {}",
                config.tdd.min_coverage
            ));
        }
        if config.tdd.test_command.is_empty() || config.tdd.test_command[0].trim().is_empty() {
            report
                .errors
                .push("tdd.testCommand must not be empty".to_string());
        }

        let base_url = config.ai.base_url.as_str();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            report.errors.push(format!(
                "ai.baseUrl must start with http:// or https://, got '{}'",
                base_url
            ));
        }
        if config.ai.max_retries == 0 {
            report.errors.push("ai.maxRetries must be at least 1".to_string());
        }
    }
}
