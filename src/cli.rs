use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::auth::Token;
use crate::config::{Config, PollingConfig};
use crate::inventory::{Inventory, InventoryLoader, RepoList};
use crate::output;
use crate::platform::{SourcePlatform, TargetPlatform};
use crate::providers::{AdoProvider, GitHubProvider};
use crate::scheduler::{ExecutionMode, Preflight, Scheduler, SchedulerSettings};
use crate::steps::{MigrationPlan, StepFlags};

#[derive(Parser)]
#[command(name = "ado2gh")]
#[command(author, version, about = "Migrate Azure DevOps organizations to GitHub", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./ado2gh.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the JSON report or plan to this file
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate every discovered repository
    Migrate {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        steps: StepArgs,

        /// Finish each repo before starting the next; stop at the first failure
        #[arg(long)]
        sequential: bool,

        /// Directory for downloaded migration logs
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// Print the steps a migration would run without running them
    Plan {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        steps: StepArgs,
    },
}

#[derive(Args, Default)]
struct TargetArgs {
    #[arg(long, env = "ADO_PAT", hide_env_values = true)]
    ado_token: Option<String>,

    #[arg(long)]
    ado_server_url: Option<String>,

    /// Only migrate this Azure DevOps org
    #[arg(long)]
    ado_org: Option<String>,

    /// Only migrate this team project
    #[arg(long)]
    ado_team_project: Option<String>,

    #[arg(long, env = "GH_PAT", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long)]
    github_api_url: Option<String>,

    #[arg(long)]
    github_org: Option<String>,

    /// private, public or internal
    #[arg(long)]
    target_repo_visibility: Option<String>,

    /// CSV with org, teamproject and repo columns restricting the migration
    #[arg(long)]
    repo_list: Option<PathBuf>,
}

#[derive(Args, Default)]
#[allow(clippy::struct_excessive_bools)]
struct StepArgs {
    /// Run every optional step
    #[arg(long)]
    all: bool,

    #[arg(long)]
    create_teams: bool,

    /// Link the created teams to IdP groups of the same name
    #[arg(long)]
    link_idp_groups: bool,

    #[arg(long)]
    lock_source_repos: bool,

    #[arg(long)]
    disable_source_repos: bool,

    #[arg(long)]
    rewire_pipelines: bool,

    #[arg(long)]
    download_migration_logs: bool,
}

impl StepArgs {
    fn flags(&self) -> StepFlags {
        StepFlags::new(
            self.all,
            self.create_teams,
            self.link_idp_groups,
            self.lock_source_repos,
            self.disable_source_repos,
            self.rewire_pipelines,
            self.download_migration_logs,
        )
    }
}

/// Command line values merged over the config file.
#[derive(Debug)]
struct Settings {
    ado_token: Option<Token>,
    ado_server_url: String,
    ado_org: Option<String>,
    ado_team_project: Option<String>,
    github_token: Option<Token>,
    github_api_url: String,
    github_org: String,
    target_repo_visibility: String,
    repo_list: Option<PathBuf>,
    flags: StepFlags,
}

impl Settings {
    fn resolve(config: &Config, target: &TargetArgs, steps: &StepArgs) -> Result<Self> {
        let migration = &config.migration;

        let github_org = target
            .github_org
            .clone()
            .or_else(|| config.github.org.clone())
            .context("A target GitHub org is required (--github-org or [github] org)")?;

        Ok(Self {
            ado_token: target
                .ado_token
                .clone()
                .or_else(|| config.ado.token.clone())
                .map(Token::from),
            ado_server_url: target
                .ado_server_url
                .clone()
                .unwrap_or_else(|| config.ado.server_url.clone()),
            ado_org: target.ado_org.clone().or_else(|| config.ado.org.clone()),
            ado_team_project: target
                .ado_team_project
                .clone()
                .or_else(|| config.ado.team_project.clone()),
            github_token: target
                .github_token
                .clone()
                .or_else(|| config.github.token.clone())
                .map(Token::from),
            github_api_url: target
                .github_api_url
                .clone()
                .unwrap_or_else(|| config.github.api_url.clone()),
            github_org,
            target_repo_visibility: target
                .target_repo_visibility
                .clone()
                .unwrap_or_else(|| config.github.target_repo_visibility.clone()),
            repo_list: target
                .repo_list
                .clone()
                .or_else(|| migration.repo_list.clone()),
            flags: steps.flags().union(migration.step_flags()),
        })
    }

    fn ado_token(&self) -> Result<Token> {
        self.ado_token
            .clone()
            .context("An Azure DevOps PAT is required (--ado-token or ADO_PAT)")
    }

    fn github_token(&self) -> Result<Token> {
        self.github_token
            .clone()
            .context("A GitHub PAT is required (--github-token or GH_PAT)")
    }

    async fn load_inventory(&self, source: &dyn SourcePlatform) -> Result<Inventory> {
        let repo_list = match &self.repo_list {
            Some(path) => Some(RepoList::load(path)?),
            None => None,
        };
        let rewire_target = self
            .flags
            .rewire_pipelines
            .then(|| self.github_org.clone());

        let inventory = InventoryLoader::new(source)
            .org_filter(self.ado_org.clone())
            .team_project_filter(self.ado_team_project.clone())
            .repo_list(repo_list)
            .with_pipeline_rewiring(rewire_target)
            .load()
            .await
            .context("Failed to discover Azure DevOps repositories")?;

        Ok(inventory)
    }
}

impl Cli {
    fn write_output<T: Serialize>(&self, value: &T) -> Result<()> {
        let Some(output_path) = &self.output else {
            return Ok(());
        };

        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        std::fs::write(output_path, json_output)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        info!("Report written to: {}", output_path.display());

        Ok(())
    }

    async fn execute_migrate(
        &self,
        settings: Settings,
        mode: ExecutionMode,
        log_dir: &Path,
        polling: &PollingConfig,
        cancel: CancellationToken,
    ) -> Result<()> {
        let ado_token = settings.ado_token()?;
        let github_token = settings.github_token()?;

        let ado = Arc::new(
            AdoProvider::new(&settings.ado_server_url, ado_token.clone())?
                .with_cancellation(cancel.clone()),
        );
        let github = Arc::new(
            GitHubProvider::new(
                &settings.github_api_url,
                github_token,
                &settings.ado_server_url,
                ado_token,
            )?
            .with_cancellation(cancel.clone()),
        );

        let inventory = settings.load_inventory(ado.as_ref()).await?;

        let source: Arc<dyn SourcePlatform> = ado;
        let target: Arc<dyn TargetPlatform> = github;
        let scheduler = Scheduler::new(
            source,
            target,
            SchedulerSettings {
                github_org: settings.github_org.clone(),
                target_repo_visibility: settings.target_repo_visibility.clone(),
                flags: settings.flags,
                poll_interval: polling.migration_interval(),
                log_retry: polling.log_retry(),
                log_dir: log_dir.to_path_buf(),
            },
            cancel,
        );

        let report = scheduler.run(&inventory, mode).await?;

        output::print_run_summary(&report);
        self.write_output(&report)?;

        if !report.is_success() {
            bail!(
                "{} of {} repositories failed to migrate",
                report.failed,
                report.total_repositories
            );
        }

        Ok(())
    }

    async fn execute_plan(&self, settings: Settings) -> Result<()> {
        let ado = AdoProvider::new(&settings.ado_server_url, settings.ado_token()?)?;
        let inventory = settings.load_inventory(&ado).await?;

        inventory.ensure_migratable()?;
        inventory.log_repo_list();
        Preflight::check(&inventory, settings.flags);

        let plan = MigrationPlan::build(&inventory, settings.flags);
        output::print_plan(&plan, &settings.github_org);
        self.write_output(&plan)
    }

    pub async fn execute(&self, cancel: CancellationToken) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Migrate {
                target,
                steps,
                sequential,
                log_dir,
            } => {
                let settings = Settings::resolve(&config, target, steps)?;
                let mode = if *sequential || config.migration.sequential {
                    ExecutionMode::Sequential
                } else {
                    ExecutionMode::Parallel
                };
                let log_dir = log_dir
                    .clone()
                    .or_else(|| config.migration.log_dir.clone())
                    .unwrap_or_else(|| PathBuf::from("."));

                self.execute_migrate(settings, mode, &log_dir, &config.polling, cancel)
                    .await
            }
            Commands::Plan { target, steps } => {
                let settings = Settings::resolve(&config, target, steps)?;
                self.execute_plan(settings).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_args() -> TargetArgs {
        TargetArgs {
            github_org: Some("gh".into()),
            ..TargetArgs::default()
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_migrate_flags() {
        let cli = Cli::try_parse_from([
            "ado2gh",
            "migrate",
            "--github-org",
            "gh",
            "--ado-org",
            "contoso",
            "--sequential",
            "--link-idp-groups",
            "--verbose",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Migrate {
                target,
                steps,
                sequential,
                ..
            } => {
                assert!(sequential);
                assert!(steps.link_idp_groups);
                assert_eq!(target.ado_org.as_deref(), Some("contoso"));
            }
            Commands::Plan { .. } => panic!("expected migrate"),
        }
    }

    #[test]
    fn test_command_line_overrides_config() {
        let mut config = Config::default();
        config.ado.org = Some("from-file".into());
        config.ado.team_project = Some("Web".into());
        config.github.org = Some("gh-file".into());
        config.migration.lock_source_repos = true;

        let target = TargetArgs {
            ado_org: Some("from-cli".into()),
            ..target_args()
        };
        let steps = StepArgs {
            rewire_pipelines: true,
            ..StepArgs::default()
        };

        let settings = Settings::resolve(&config, &target, &steps).unwrap();
        assert_eq!(settings.ado_org.as_deref(), Some("from-cli"));
        assert_eq!(settings.ado_team_project.as_deref(), Some("Web"));
        assert_eq!(settings.github_org, "gh");
        assert!(settings.flags.lock_source_repos);
        assert!(settings.flags.rewire_pipelines);
        assert!(!settings.flags.create_teams);
        assert_eq!(settings.ado_server_url, "https://dev.azure.com");
        assert_eq!(settings.target_repo_visibility, "private");
    }

    #[test]
    fn test_github_org_is_required() {
        let err = Settings::resolve(&Config::default(), &TargetArgs::default(), &StepArgs::default())
            .unwrap_err();
        assert!(err.to_string().contains("--github-org"));
    }

    #[test]
    fn test_missing_tokens_are_reported() {
        let settings =
            Settings::resolve(&Config::default(), &target_args(), &StepArgs::default()).unwrap();
        assert!(settings.ado_token().unwrap_err().to_string().contains("ADO_PAT"));
        assert!(settings.github_token().unwrap_err().to_string().contains("GH_PAT"));
    }

    #[test]
    fn test_all_flag_from_config_enables_every_step() {
        let mut config = Config::default();
        config.migration.all = true;

        let settings = Settings::resolve(&config, &target_args(), &StepArgs::default()).unwrap();
        assert!(settings.flags.create_teams);
        assert!(settings.flags.link_idp_groups);
        assert!(settings.flags.download_migration_logs);
    }
}
