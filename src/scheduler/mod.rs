//! Executes a [`MigrationPlan`] against the source and target platforms.
//!
//! Two strategies share the step executor defined here:
//! [`ExecutionMode::Sequential`] runs every repository to completion before
//! touching the next and aborts on the first failure, while
//! [`ExecutionMode::Parallel`] queues every migration first and then waits on
//! all of them, isolating failures per repository.

mod parallel;
mod sequential;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{MigrationError, Result};
use crate::inventory::{DuplicateTargetName, Inventory};
use crate::platform::{
    MigrationRequest, SourcePlatform, StartMigrationError, TargetPlatform, TeamRole,
};
use crate::retry::{poll_until_terminal, RetryOutcome, RetryPolicy};
use crate::steps::{MigrationPlan, RepoPlan, Step, StepFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Parallel => f.write_str("parallel"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub github_org: String,
    pub target_repo_visibility: String,
    pub flags: StepFlags,
    pub poll_interval: Duration,
    pub log_retry: RetryPolicy,
    pub log_dir: PathBuf,
}

/// Per-repository outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub succeeded: usize,
    pub failed: usize,
    /// Repositories whose target already existed.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Preflight {
    pub duplicate_target_names: Vec<DuplicateTargetName>,
    pub missing_credentials: Vec<String>,
}

impl Preflight {
    /// Collects and logs the advisory warnings for `inventory`. Nothing here
    /// stops a run.
    pub fn check(inventory: &Inventory, flags: StepFlags) -> Self {
        let missing_credentials: Vec<String> = if flags.rewire_pipelines {
            inventory
                .orgs_missing_credential()
                .into_iter()
                .map(str::to_owned)
                .collect()
        } else {
            Vec::new()
        };

        for org in &missing_credentials {
            warn!(
                "No GitHub service connection found for ADO org {org}; pipelines in this org will not be rewired"
            );
        }

        let duplicate_target_names = inventory.duplicate_target_names();
        for duplicate in &duplicate_target_names {
            let sources: Vec<String> = duplicate.sources.iter().map(ToString::to_string).collect();
            warn!(
                "Multiple repos map to the GitHub repo name {}: {}",
                duplicate.target_name,
                sources.join(", ")
            );
        }

        Self {
            duplicate_target_names,
            missing_credentials,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub collected_at: DateTime<Utc>,
    pub mode: ExecutionMode,
    pub total_repositories: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duplicate_target_names: Vec<DuplicateTargetName>,
    pub missing_credentials: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// How a repository's migration start ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Started {
    Queued(String),
    Skipped,
}

pub struct Scheduler {
    source: Arc<dyn SourcePlatform>,
    target: Arc<dyn TargetPlatform>,
    settings: SchedulerSettings,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn SourcePlatform>,
        target: Arc<dyn TargetPlatform>,
        settings: SchedulerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            target,
            settings,
            cancel,
        }
    }

    /// Runs the whole inventory.
    ///
    /// In sequential mode the first failing step aborts the run and comes
    /// back as the error. In parallel mode failures are counted in the
    /// report instead.
    pub async fn run(&self, inventory: &Inventory, mode: ExecutionMode) -> Result<RunReport> {
        inventory.ensure_migratable()?;
        inventory.log_repo_list();

        let preflight = Preflight::check(inventory, self.settings.flags);
        let plan = MigrationPlan::build(inventory, self.settings.flags);

        info!(
            "Migrating {} repos to GitHub org {} ({mode})",
            plan.repo_count(),
            self.settings.github_org
        );

        let result = match mode {
            ExecutionMode::Sequential => sequential::run(self, &plan).await?,
            ExecutionMode::Parallel => parallel::run(self, &plan).await,
        };

        info!(
            "Migration finished: {} succeeded, {} failed, {} skipped",
            result.succeeded, result.failed, result.skipped
        );

        Ok(RunReport {
            collected_at: Utc::now(),
            mode,
            total_repositories: plan.repo_count(),
            succeeded: result.succeeded,
            failed: result.failed,
            skipped: result.skipped,
            duplicate_target_names: preflight.duplicate_target_names,
            missing_credentials: preflight.missing_credentials,
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }
        Ok(())
    }

    /// Runs one team-project scoped step.
    async fn run_setup_step(&self, org: &str, team_project: &str, step: &Step) -> Result<()> {
        let github_org = &self.settings.github_org;

        let result = match step {
            Step::CreateMaintainersTeam { team, idp_group }
            | Step::CreateAdminsTeam { team, idp_group } => {
                self.target
                    .create_team(github_org, team, idp_group.as_deref())
                    .await
            }
            Step::ShareIntegrationCredential { credential_id } => {
                self.source
                    .share_integration_credential(org, team_project, credential_id)
                    .await
            }
            other => Err(MigrationError::Config(format!(
                "{} is not a team project step",
                other.name()
            ))),
        };

        result.map_err(|source| {
            error!("{step} failed for team project {org}/{team_project}: {source}");
            step_failed(step, org, team_project, "*", source)
        })
    }

    /// Runs the steps up to and including the migration start, without
    /// waiting for the migration to finish.
    async fn start_repo(&self, org: &str, team_project: &str, repo: &RepoPlan) -> Result<Started> {
        for step in repo.migration_steps() {
            let result = match step {
                Step::LockSourceRepo => self
                    .source
                    .lock_repo(org, team_project, &repo.name)
                    .await
                    .map(|()| None),
                Step::MigrateRepo => self.start_migration(org, team_project, repo).await.map(Some),
                other => Err(MigrationError::Config(format!(
                    "{} cannot run before the migration",
                    other.name()
                ))),
            };

            match result {
                Ok(Some(started)) => return Ok(started),
                Ok(None) => {}
                Err(source) => {
                    error!(
                        "{step} failed for {org}/{team_project}/{}: {source}",
                        repo.name
                    );
                    return Err(step_failed(step, org, team_project, &repo.name, source));
                }
            }
        }

        Err(MigrationError::Config(format!(
            "no migration step planned for {org}/{team_project}/{}",
            repo.name
        )))
    }

    async fn start_migration(
        &self,
        org: &str,
        team_project: &str,
        repo: &RepoPlan,
    ) -> Result<Started> {
        let request = MigrationRequest {
            source_repo_url: self.source.repo_url(org, team_project, &repo.name)?,
            target_org: self.settings.github_org.clone(),
            target_repo: repo.target_name.clone(),
            target_repo_visibility: self.settings.target_repo_visibility.clone(),
        };

        info!(
            "Queueing migration of {org}/{team_project}/{} to {}/{}",
            repo.name, request.target_org, request.target_repo
        );

        match self.target.start_migration(&request).await {
            Ok(migration_id) => {
                info!(
                    "Migration {migration_id} queued for {org}/{team_project}/{}",
                    repo.name
                );
                Ok(Started::Queued(migration_id))
            }
            Err(StartMigrationError::TargetExists { org: gh_org, repo: gh_repo }) => {
                warn!(
                    "The target repo {gh_org}/{gh_repo} already exists; skipping migration of {org}/{team_project}/{}",
                    repo.name
                );
                Ok(Started::Skipped)
            }
            Err(StartMigrationError::Other(err)) => Err(err),
        }
    }

    /// Blocks until the migration is terminal. Anything but success is an
    /// error.
    async fn wait_for_migration(
        &self,
        org: &str,
        team_project: &str,
        repo: &RepoPlan,
        migration_id: &str,
    ) -> Result<()> {
        let waited = poll_until_terminal(
            migration_id,
            || self.target.migration_status(migration_id),
            self.settings.poll_interval,
            &self.cancel,
        )
        .await;

        let failure = match waited {
            Ok((state, status)) if state.is_succeeded() => {
                info!(
                    "Migration {migration_id} for {org}/{team_project}/{} succeeded",
                    repo.name
                );
                if status.warnings_count > 0 {
                    warn!(
                        "Migration {migration_id} finished with {} warnings",
                        status.warnings_count
                    );
                }
                if let Some(url) = status.migration_log_url.filter(|u| !u.is_empty()) {
                    info!("Migration log available at {url}");
                }
                return Ok(());
            }
            Ok((state, status)) => {
                let reason = status
                    .failure_reason
                    .unwrap_or_else(|| format!("migration ended in state {state}"));
                MigrationError::MigrationFailed {
                    migration_id: migration_id.to_owned(),
                    reason,
                }
            }
            Err(err) => err,
        };

        error!(
            "Migration {migration_id} for {org}/{team_project}/{} failed: {failure}",
            repo.name
        );
        Err(step_failed(
            &Step::MigrateRepo,
            org,
            team_project,
            &repo.name,
            failure,
        ))
    }

    async fn run_post_step(
        &self,
        org: &str,
        team_project: &str,
        repo: &RepoPlan,
        step: &Step,
    ) -> Result<()> {
        let github_org = &self.settings.github_org;

        let result = match step {
            Step::DisableSourceRepo => {
                self.source
                    .disable_repo(org, team_project, &repo.name)
                    .await
            }
            Step::AttachMaintainersTeam { team } => {
                self.target
                    .add_team_to_repo(github_org, &repo.target_name, team, TeamRole::Maintain)
                    .await
            }
            Step::AttachAdminsTeam { team } => {
                self.target
                    .add_team_to_repo(github_org, &repo.target_name, team, TeamRole::Admin)
                    .await
            }
            Step::DownloadMigrationLog => self.download_migration_log(&repo.target_name).await,
            Step::RewirePipeline {
                pipeline,
                credential_id,
            } => {
                self.source
                    .rewire_pipeline(
                        org,
                        team_project,
                        pipeline,
                        github_org,
                        &repo.target_name,
                        credential_id,
                    )
                    .await
            }
            other => Err(MigrationError::Config(format!(
                "{} is not a post-migration step",
                other.name()
            ))),
        };

        result.map_err(|source| {
            error!(
                "{step} failed for {org}/{team_project}/{}: {source}",
                repo.name
            );
            step_failed(step, org, team_project, &repo.name, source)
        })
    }

    async fn download_migration_log(&self, target_repo: &str) -> Result<()> {
        let github_org = &self.settings.github_org;
        let policy = self.settings.log_retry;

        let outcome = policy
            .retry_on_result(
                || self.target.migration_log_url(github_org, target_repo),
                |location| location.as_ref().map_or(true, |l| l.url.is_empty()),
                "Waiting for migration log to populate...",
                &self.cancel,
            )
            .await?;

        let location = match outcome {
            RetryOutcome::Success(Some(location)) => location,
            RetryOutcome::Exhausted { last, attempts } => {
                match last {
                    Some(location) => warn!(
                        "Migration {} for {github_org}/{target_repo} still has no log URL after {attempts} attempts",
                        location.migration_id
                    ),
                    None => warn!(
                        "No migration found for {github_org}/{target_repo} after {attempts} attempts"
                    ),
                }
                return Err(MigrationError::MigrationLogUnavailable {
                    repo: format!("{github_org}/{target_repo}"),
                    attempts,
                });
            }
            RetryOutcome::Success(None) => {
                return Err(MigrationError::MigrationLogUnavailable {
                    repo: format!("{github_org}/{target_repo}"),
                    attempts: policy.max_attempts(),
                });
            }
        };

        let log = self.target.download(&location.url).await?;

        let path = self.settings.log_dir.join(format!(
            "migration-log-{github_org}-{target_repo}-{}.log",
            location.migration_id
        ));
        tokio::fs::create_dir_all(&self.settings.log_dir).await?;
        tokio::fs::write(&path, log).await?;

        info!("Migration log written to {}", path.display());
        Ok(())
    }
}

fn step_failed(
    step: &Step,
    org: &str,
    team_project: &str,
    repo: &str,
    source: MigrationError,
) -> MigrationError {
    MigrationError::StepFailed {
        step: step.name().to_owned(),
        org: org.to_owned(),
        team_project: team_project.to_owned(),
        repo: repo.to_owned(),
        source: Box::new(source),
    }
}
