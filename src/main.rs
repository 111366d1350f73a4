//! autodev - GitHub issue to pull request automation with a TDD core

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use autodev::ai::LmStudioClient;
use autodev::config::{ConfigOverrides, ConfigValidator, ProjectConfig};
use autodev::github::{
    BranchName, GitHubSyncAgent, Improvement, ImprovementType, Priority, TrackedIssue,
};
use autodev::mcp::McpClient;
use autodev::process::{tool_available, TokioCommandRunner};
use autodev::tdd::{CommandTestSuite, TddCycleDriver, TddDependencies};
use autodev::testing::CommandRunner;
use autodev::tracker::TaskStatusTracker;
use autodev::workspace::WorkspaceLock;
use autodev::{verify_git_environment, AutodevError, IntoAutodevError, Pipeline, RealFileSystem};

#[derive(Parser)]
#[command(name = "autodev")]
#[command(version)]
#[command(about = "Turn improvements and GitHub issues into tested pull requests", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Repository owner
    #[arg(long, global = true, env = "AUTODEV_GITHUB_OWNER")]
    owner: Option<String>,

    /// Repository name
    #[arg(long, global = true, env = "AUTODEV_GITHUB_REPO")]
    repo: Option<String>,

    /// Project board id
    #[arg(long, global = true, env = "AUTODEV_PROJECT_ID")]
    project_id: Option<String>,

    /// Merge PRs automatically once checks pass
    #[arg(long, global = true, env = "AUTODEV_AUTO_MERGE", num_args = 0..=1, default_missing_value = "true")]
    auto_merge: Option<bool>,

    /// Tag and release after each merge
    #[arg(long, global = true, env = "AUTODEV_AUTO_VERSIONING", num_args = 0..=1, default_missing_value = "true")]
    auto_versioning: Option<bool>,

    /// AI server base URL
    #[arg(long, global = true, env = "AUTODEV_AI_BASE_URL")]
    ai_base_url: Option<String>,

    /// AI model identifier
    #[arg(long, global = true, env = "AUTODEV_AI_MODEL")]
    ai_model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a settings file for this project
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show repository, task and environment status
    Status {
        /// Also check git, gh and the AI server
        #[arg(long)]
        check: bool,
    },

    /// Create the issue, board card and branch for an improvement
    Sync {
        /// Improvement JSON file
        improvement: PathBuf,
    },

    /// Commit files for an issue, open the PR and optionally merge
    Complete {
        /// Issue number
        issue: u64,

        /// Files to commit, exactly as given
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Improvement type the issue was created for
        #[arg(short = 't', long = "type", default_value = "general")]
        kind: String,
    },

    /// Pick up open GitHub issues
    Pull {
        /// Develop each picked issue through the TDD cycle
        #[arg(long)]
        develop: bool,
    },

    /// Run the TDD cycle over a task list
    Tdd {
        /// Task list JSON (array of tasks or saved register)
        tasks: PathBuf,
    },

    /// Sync, develop and complete one improvement
    Run {
        /// Improvement JSON file
        improvement: PathBuf,
    },

    /// Talk to the configured MCP server
    Mcp {
        #[command(subcommand)]
        action: McpAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Validate the settings file
    Validate,
}

#[derive(Subcommand)]
enum McpAction {
    /// List tools
    Tools,

    /// List resources
    Resources,

    /// Call a tool with JSON arguments
    Call {
        name: String,

        #[arg(default_value = "{}")]
        arguments: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let default_filter = if cli.verbose {
        "autodev=debug,info"
    } else {
        "autodev=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    let overrides = ConfigOverrides {
        owner: cli.owner.clone(),
        repo: cli.repo.clone(),
        project_id: cli.project_id.clone(),
        auto_merge: cli.auto_merge,
        auto_versioning: cli.auto_versioning,
        ai_base_url: cli.ai_base_url.clone(),
        ai_model: cli.ai_model.clone(),
    };

    match cli.command {
        Commands::Init { force } => {
            let settings = ProjectConfig::settings_path(&project_path);
            if settings.exists() && !force {
                eprintln!(
                    "{} {} already exists (use --force to overwrite)",
                    "Error:".red().bold(),
                    settings.display()
                );
                std::process::exit(1);
            }
            let mut config = ProjectConfig::default();
            config.apply_overrides(&overrides);
            let path = config.save(&project_path)?;

            println!("{} Wrote {}", "OK".green().bold(), path.display());
            println!("\nNext steps:");
            println!("  1. Set github.owner and github.repo in the settings file");
            println!("  2. Run: autodev config validate");
            println!("  3. Run: autodev status --check");
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(&project_path, &overrides);
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Validate => {
                let report = ConfigValidator::new(&project_path).validate();
                if cli.verbose {
                    println!("{}", report.verbose_report());
                } else {
                    for error in &report.errors {
                        println!("{} {}", "Error:".red().bold(), error);
                    }
                    for warning in &report.warnings {
                        println!("{} {}", "Warning:".yellow(), warning);
                    }
                    let summary = report.summary();
                    if report.is_valid() {
                        println!("{} {}", "OK".green().bold(), summary);
                    } else {
                        println!("{}", summary.red());
                    }
                }
                std::process::exit(report.exit_code());
            }
        },

        Commands::Status { check } => {
            let config = load_config(&project_path, &overrides);
            let runner = command_runner(&project_path, &config);
            let agent = GitHubSyncAgent::from_config(runner.clone(), &config);
            let tracker = TaskStatusTracker::load_or_new(&ProjectConfig::tasks_path(&project_path))?;
            let status = agent.get_sync_status();

            if cli.json {
                print_json(&serde_json::json!({
                    "sync": status,
                    "tasks": tracker.get_loop_statistics(),
                }))?;
            } else {
                println!("{} {}", "Repository:".cyan(), status);
                println!(
                    "   Auto-merge: {}, auto-versioning: {}, pull mode: {}",
                    config.workflow.auto_merge, config.workflow.auto_versioning, status.pull_mode_enabled
                );
                println!("{} {}", "Tasks:".cyan(), tracker.generate_progress_report());
            }

            if check {
                let env = verify_git_environment(runner.as_ref()).await;
                for (tool, ok) in [("git", env.git_installed), ("gh", env.gh_installed)] {
                    print_check(tool, ok);
                }
                print_check("gh authenticated", env.gh_authenticated);
                print_check("inside a git repository", env.inside_repository);
                if let Some(branch) = &env.current_branch {
                    println!("   Current branch: {}", branch);
                }
                for error in &env.errors {
                    println!("   {} {}", "Error:".red().bold(), error);
                }
                for warning in &env.warnings {
                    println!("   {} {}", "Warning:".yellow(), warning);
                }

                let health = LmStudioClient::from_config(&config.ai)?.health_check().await;
                print_check(&format!("AI server at {}", config.ai.base_url), health.is_healthy());
                if !env.is_ready() {
                    std::process::exit(1);
                }
            }
        }

        Commands::Sync { improvement } => {
            let config = load_config(&project_path, &overrides);
            require_repo(&config).unwrap_or_else(|e| exit_with(e));
            let improvement: Improvement = read_json(&improvement)?;
            let agent = GitHubSyncAgent::from_config(command_runner(&project_path, &config), &config);

            let workspace = WorkspaceLock::new().acquire().await;
            let report = agent.sync_improvement_to_github(&improvement, &workspace).await;
            if cli.json {
                print_json(&report)?;
            } else if report.is_initiated() {
                println!(
                    "{} Issue #{} ready on {}",
                    "OK".green().bold(),
                    report.issue_number,
                    report.branch.as_deref().unwrap_or("-")
                );
            } else {
                println!(
                    "{} {}",
                    "Warning:".yellow().bold(),
                    report.error.as_deref().unwrap_or("sync did not complete")
                );
            }
            if !report.is_initiated() {
                std::process::exit(1);
            }
        }

        Commands::Complete { issue, files, kind } => {
            let config = load_config(&project_path, &overrides);
            require_repo(&config).unwrap_or_else(|e| exit_with(e));
            let agent = GitHubSyncAgent::from_config(command_runner(&project_path, &config), &config);

            let kind = ImprovementType::parse(&kind);
            let mut tracked = TrackedIssue::new(
                issue,
                format!("{}/issues/{}", config.github.repo_url(), issue),
                kind.title(),
                Improvement::new(kind, Priority::default()),
            );
            tracked.branch_name = BranchName::for_issue(kind.as_str(), issue).into_string();
            agent.track_issue(tracked);

            let workspace = WorkspaceLock::new().acquire().await;
            let report = agent.complete_improvement_workflow(issue, &files, &workspace).await;
            if cli.json {
                print_json(&report)?;
            } else {
                match &report.error {
                    Some(error) => println!("{} {}", "Error:".red().bold(), error),
                    None => {
                        if let Some(pr) = &report.pr {
                            println!("{} PR {}", "OK".green().bold(), pr.url);
                        }
                        if let Some(merge) = &report.merge {
                            match merge.reason() {
                                None => println!("   Merged"),
                                Some(reason) => println!("   Not merged: {}", reason.as_str()),
                            }
                        }
                        if let Some(version) = &report.release {
                            println!("   Released {}", version.tag());
                        }
                    }
                }
            }
            if !report.is_ok() {
                std::process::exit(1);
            }
        }

        Commands::Pull { develop } => {
            let config = load_config(&project_path, &overrides);
            require_repo(&config).unwrap_or_else(|e| exit_with(e));
            let runner = command_runner(&project_path, &config);
            let agent = Arc::new(GitHubSyncAgent::from_config(runner.clone(), &config));

            if develop {
                let tasks_path = ProjectConfig::tasks_path(&project_path);
                let tracker = TaskStatusTracker::load_or_new(&tasks_path)?;
                let driver = tdd_driver(&project_path, &config, runner, Some(agent.clone()), tracker)?;
                let mut pipeline = Pipeline::new(agent, driver);
                let result = pipeline.run_pull_mode().await;
                pipeline.into_driver().into_tracker().save(&tasks_path)?;

                if cli.json {
                    print_json(&result)?;
                } else {
                    print_pull(&result.pull);
                    for run in &result.runs {
                        let marker = if run.is_complete() {
                            "OK".green().bold()
                        } else {
                            "FAILED".red().bold()
                        };
                        println!("   {} #{}", marker, run.sync.issue_number);
                    }
                    for number in &result.skipped {
                        println!("   {} #{} (already tracked)", "SKIP".dimmed(), number);
                    }
                }
            } else {
                let report = agent.execute_pull_workflow().await;
                if cli.json {
                    print_json(&report)?;
                } else {
                    print_pull(&report);
                }
                if !report.is_ok() {
                    std::process::exit(1);
                }
            }
        }

        Commands::Tdd { tasks } => {
            let config = load_config(&project_path, &overrides);
            let tracker = TaskStatusTracker::load_task_list(&tasks)?;
            let runner = command_runner(&project_path, &config);
            let github = if config.github.owner.is_empty() || config.github.repo.is_empty() {
                None
            } else {
                Some(Arc::new(GitHubSyncAgent::from_config(runner.clone(), &config)))
            };

            let mut driver = tdd_driver(&project_path, &config, runner, github, tracker)?;
            let summary = driver.run_all().await;
            driver
                .into_tracker()
                .save(&ProjectConfig::tasks_path(&project_path))?;

            if cli.json {
                print_json(&summary)?;
            } else {
                for outcome in &summary.outcomes {
                    if outcome.completed {
                        println!(
                            "{} Task {} ({:.1}% coverage)",
                            "OK".green().bold(),
                            outcome.task_id,
                            outcome.coverage
                        );
                    } else {
                        println!(
                            "{} Task {}: {}",
                            "FAILED".red().bold(),
                            outcome.task_id,
                            outcome.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
                println!("\n{} {}", "Summary:".cyan(), summary.report);
            }
            if summary.statistics.blocked > 0 {
                std::process::exit(1);
            }
        }

        Commands::Run { improvement } => {
            let config = load_config(&project_path, &overrides);
            require_repo(&config).unwrap_or_else(|e| exit_with(e));
            let improvement: Improvement = read_json(&improvement)?;
            let runner = command_runner(&project_path, &config);
            let agent = Arc::new(GitHubSyncAgent::from_config(runner.clone(), &config));
            let tasks_path = ProjectConfig::tasks_path(&project_path);
            let tracker = TaskStatusTracker::load_or_new(&tasks_path)?;

            let driver = tdd_driver(&project_path, &config, runner, Some(agent.clone()), tracker)?;
            let mut pipeline = Pipeline::new(agent, driver);
            let run = pipeline.run_improvement(&improvement).await;
            pipeline.into_driver().into_tracker().save(&tasks_path)?;

            if cli.json {
                print_json(&run)?;
            } else if run.is_complete() {
                println!("{} Issue #{} completed", "OK".green().bold(), run.sync.issue_number);
            } else {
                let reason = run
                    .completion
                    .as_ref()
                    .and_then(|c| c.error.clone())
                    .or_else(|| run.tdd.as_ref().and_then(|t| t.error.clone()))
                    .or_else(|| run.sync.error.clone())
                    .unwrap_or_else(|| "unknown error".to_string());
                println!("{} Issue #{}: {}", "FAILED".red().bold(), run.sync.issue_number, reason);
            }
            if !run.is_complete() {
                std::process::exit(1);
            }
        }

        Commands::Mcp { action } => {
            let config = load_config(&project_path, &overrides);
            let runner = command_runner(&project_path, &config);
            let Some(client) = McpClient::from_config(runner, &config.mcp) else {
                exit_with(AutodevError::config_with_path(
                    "no MCP server configured (set mcp.serverCommand)",
                    ProjectConfig::settings_path(&project_path),
                ));
            };

            match action {
                McpAction::Tools => {
                    let tools = client.list_tools().await?;
                    if cli.json {
                        print_json(&tools)?;
                    } else {
                        for tool in &tools {
                            println!(
                                "  {} {}",
                                tool.name.bold(),
                                tool.description.as_deref().unwrap_or("")
                            );
                        }
                    }
                }
                McpAction::Resources => {
                    let resources = client.list_resources().await?;
                    if cli.json {
                        print_json(&resources)?;
                    } else {
                        for resource in &resources {
                            println!("  {} ({})", resource.name.bold(), resource.uri);
                        }
                    }
                }
                McpAction::Call { name, arguments } => {
                    let arguments: serde_json::Value =
                        serde_json::from_str(&arguments).context("Tool arguments must be JSON")?;
                    let result = client.call_tool(&name, arguments).await?;
                    if cli.json {
                        print_json(&result)?;
                    } else {
                        println!("{}", result.text());
                    }
                    if result.is_error {
                        std::process::exit(1);
                    }
                }
            }
        }
    }

    Ok(())
}

fn load_config(project: &Path, overrides: &ConfigOverrides) -> ProjectConfig {
    let mut config = ProjectConfig::load(project)
        .into_autodev_config()
        .unwrap_or_else(|e| exit_with(e));
    config.apply_overrides(overrides);
    config
}

fn require_repo(config: &ProjectConfig) -> autodev::Result<()> {
    if config.github.owner.is_empty() || config.github.repo.is_empty() {
        return Err(AutodevError::InvalidConfig {
            field: "github".to_string(),
            reason: "owner and repo must be set (settings file, --owner/--repo or AUTODEV_GITHUB_OWNER/AUTODEV_GITHUB_REPO)"
                .to_string(),
        });
    }
    if !tool_available("gh") {
        return Err(AutodevError::MissingTool {
            tool: "gh".to_string(),
        });
    }
    Ok(())
}

fn exit_with(err: AutodevError) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), err);
    std::process::exit(err.exit_code());
}

fn command_runner(project: &Path, config: &ProjectConfig) -> Arc<dyn CommandRunner> {
    Arc::new(
        TokioCommandRunner::new()
            .with_timeout(config.workflow.command_timeout())
            .with_working_dir(project),
    )
}

fn tdd_driver(
    project: &Path,
    config: &ProjectConfig,
    runner: Arc<dyn CommandRunner>,
    github: Option<Arc<GitHubSyncAgent>>,
    tracker: TaskStatusTracker,
) -> anyhow::Result<TddCycleDriver> {
    let ai = LmStudioClient::from_config(&config.ai)?;
    let deps = TddDependencies {
        ai: Arc::new(ai),
        tests: Arc::new(CommandTestSuite::new(runner, &config.tdd, project)),
        fs: Arc::new(RealFileSystem::new(project.to_path_buf())),
        github,
    };
    Ok(TddCycleDriver::new(deps, tracker, config.tdd.clone()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    if !path.exists() {
        return Err(AutodevError::MissingFile {
            path: path.to_path_buf(),
        }
        .into());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_check(label: &str, ok: bool) {
    if ok {
        println!("   {} {}", "✓".green(), label);
    } else {
        println!("   {} {}", "✗".red(), label);
    }
}

fn print_pull(report: &autodev::github::PullWorkflowReport) {
    if let Some(error) = &report.error {
        println!("{} {}", "Error:".red().bold(), error);
        return;
    }
    println!(
        "{} {} issue(s) fetched, {} card(s) synced",
        "OK".green().bold(),
        report.issues_fetched,
        report.cards_synced
    );
    for opportunity in &report.opportunities {
        println!(
            "   #{} [{}] {}",
            opportunity.issue_number,
            opportunity.kind.as_str(),
            opportunity.title
        );
    }
    for (number, reason) in &report.skipped {
        println!("   {} #{} ({})", "Skipped".yellow(), number, reason);
    }
}
