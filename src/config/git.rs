//! Git and GitHub CLI environment checks.
//!
//! The workflow drives `git` and `gh` as subprocesses, so both must be
//! installed and `gh` must be authenticated before anything useful happens.

use crate::process::CommandSpec;
use crate::testing::CommandRunner;

/// Result of git environment verification
#[derive(Debug, Clone, Default)]
pub struct GitEnvironmentCheck {
    /// git is installed
    pub git_installed: bool,
    /// gh CLI is installed
    pub gh_installed: bool,
    /// gh CLI is authenticated
    pub gh_authenticated: bool,
    /// Working directory is inside a git repository
    pub inside_repository: bool,
    /// Currently checked-out branch
    pub current_branch: Option<String>,
    /// Current git user
    pub git_user: Option<String>,
    /// Errors encountered
    pub errors: Vec<String>,
    /// Warnings
    pub warnings: Vec<String>,
}

impl GitEnvironmentCheck {
    /// Check if environment is ready
    pub fn is_ready(&self) -> bool {
        self.git_installed && self.gh_installed && self.gh_authenticated && self.inside_repository
    }
}

async fn stdout_of(runner: &dyn CommandRunner, spec: CommandSpec) -> Option<String> {
    runner
        .run(&spec)
        .await
        .ok()
        .map(|o| o.stdout.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Verify the git environment is properly configured for autodev
pub async fn verify_git_environment(runner: &dyn CommandRunner) -> GitEnvironmentCheck {
    let mut check = GitEnvironmentCheck::default();

    match runner.run(&CommandSpec::git(["--version"])).await {
        Ok(_) => check.git_installed = true,
        Err(_) => check.errors.push("git not installed".to_string()),
    }

    if check.git_installed {
        match runner
            .run(&CommandSpec::git(["rev-parse", "--is-inside-work-tree"]))
            .await
        {
            Ok(out) if out.stdout.trim() == "true" => check.inside_repository = true,
            _ => check
                .errors
                .push("current directory is not a git repository".to_string()),
        }
        check.current_branch =
            stdout_of(runner, CommandSpec::git(["branch", "--show-current"])).await;
        check.git_user = stdout_of(runner, CommandSpec::git(["config", "user.name"])).await;
        if check.git_user.is_none() {
            check
                .warnings
                .push("git user.name is not set; commits may be rejected".to_string());
        }
    }

    match runner.run(&CommandSpec::gh(["--version"])).await {
        Ok(_) => check.gh_installed = true,
        Err(_) => check
            .errors
            .push("gh CLI not installed - required for GitHub operations".to_string()),
    }

    if check.gh_installed {
        match runner.run(&CommandSpec::gh(["auth", "status"])).await {
            Ok(_) => check.gh_authenticated = true,
            Err(e) => check.errors.push(format!(
                "gh CLI not authenticated - run 'gh auth login': {}",
                e.stderr().trim()
            )),
        }
    }

    check
}
