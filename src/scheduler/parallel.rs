use std::collections::HashMap;

use futures::future::join_all;
use log::{info, warn};

use super::{RunResult, Scheduler, Started};
use crate::naming::MigrationKey;
use crate::steps::{MigrationPlan, RepoPlan};

/// A repository after the queueing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queued {
    Started,
    Skipped,
    Failed,
}

struct RepoRef<'a> {
    org: &'a str,
    team_project: &'a str,
    repo: &'a RepoPlan,
    queued: Queued,
}

/// A migration started in the first phase, with the repository that owns it.
struct QueuedMigration {
    id: String,
    source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeeded,
    Failed,
    Skipped,
}

/// Queues every migration, then waits on all of them concurrently. A
/// repository's failure never affects another repository.
pub(super) async fn run(scheduler: &Scheduler, plan: &MigrationPlan) -> RunResult {
    let progress = crate::output::PhaseProgress::start_queueing(plan.repo_count());
    let (repos, migrations) = queue_all(scheduler, plan).await;

    let started = repos
        .iter()
        .filter(|repo| repo.queued == Queued::Started)
        .count();
    let progress = progress.finish_queueing_start_waiting(started);
    let outcomes = join_all(
        repos
            .iter()
            .map(|repo| finish_repo(scheduler, repo, &migrations)),
    )
    .await;
    progress.finish_waiting();

    outcomes
        .into_iter()
        .fold(RunResult::default(), |mut result, outcome| {
            match outcome {
                Outcome::Succeeded => result.succeeded += 1,
                Outcome::Failed => result.failed += 1,
                Outcome::Skipped => result.skipped += 1,
            }
            result
        })
}

async fn queue_all<'a>(
    scheduler: &Scheduler,
    plan: &'a MigrationPlan,
) -> (Vec<RepoRef<'a>>, HashMap<MigrationKey, QueuedMigration>) {
    let mut repos = Vec::new();
    let mut migrations = HashMap::new();

    for org in &plan.orgs {
        for project in &org.projects {
            let mut setup_ok = true;
            for step in &project.setup {
                let result = match scheduler.check_cancelled() {
                    Ok(()) => scheduler.run_setup_step(&org.name, &project.name, step).await,
                    Err(err) => Err(err),
                };
                if result.is_err() {
                    setup_ok = false;
                    break;
                }
            }

            if !setup_ok {
                warn!(
                    "Skipping the {} repos of {}/{} because team project setup failed",
                    project.repos.len(),
                    org.name,
                    project.name
                );
            }

            for repo in &project.repos {
                let queued = if setup_ok {
                    queue_repo(scheduler, &org.name, &project.name, repo, &mut migrations).await
                } else {
                    Queued::Failed
                };

                repos.push(RepoRef {
                    org: &org.name,
                    team_project: &project.name,
                    repo,
                    queued,
                });
            }
        }
    }

    (repos, migrations)
}

/// Starts one repository's migration. A second repository mapping to an
/// already queued target is failed without being started, so every queued
/// key belongs to exactly one repository.
async fn queue_repo(
    scheduler: &Scheduler,
    org: &str,
    team_project: &str,
    repo: &RepoPlan,
    migrations: &mut HashMap<MigrationKey, QueuedMigration>,
) -> Queued {
    if scheduler.check_cancelled().is_err() {
        return Queued::Failed;
    }

    let source = format!("{org}/{team_project}/{}", repo.name);
    let key = MigrationKey::new(org, &repo.target_name);
    if let Some(owner) = migrations.get(&key) {
        warn!(
            "Not migrating {source}: {} is already being migrated to {}/{} by migration {}",
            owner.source, scheduler.settings.github_org, repo.target_name, owner.id
        );
        return Queued::Failed;
    }

    match scheduler.start_repo(org, team_project, repo).await {
        Ok(Started::Queued(id)) => {
            migrations.insert(key, QueuedMigration { id, source });
            Queued::Started
        }
        Ok(Started::Skipped) => Queued::Skipped,
        Err(_) => Queued::Failed,
    }
}

/// Waits for one repository's migration and runs its post-migration steps
/// as a batch. Every step in the batch is attempted even after a failure.
async fn finish_repo(
    scheduler: &Scheduler,
    repo: &RepoRef<'_>,
    migrations: &HashMap<MigrationKey, QueuedMigration>,
) -> Outcome {
    match repo.queued {
        Queued::Skipped => return Outcome::Skipped,
        Queued::Failed => return Outcome::Failed,
        Queued::Started => {}
    }

    let key = MigrationKey::new(repo.org, &repo.repo.target_name);
    let Some(migration) = migrations.get(&key) else {
        return Outcome::Failed;
    };

    if scheduler
        .wait_for_migration(repo.org, repo.team_project, repo.repo, &migration.id)
        .await
        .is_err()
    {
        return Outcome::Failed;
    }

    let mut failures = 0;
    for step in repo.repo.post_migration_steps() {
        if scheduler
            .run_post_step(repo.org, repo.team_project, repo.repo, step)
            .await
            .is_err()
        {
            failures += 1;
        }
    }

    if failures == 0 {
        info!(
            "Finished {}/{}/{} -> {}",
            repo.org, repo.team_project, repo.repo.name, repo.repo.target_name
        );
        Outcome::Succeeded
    } else {
        warn!(
            "{failures} post-migration steps failed for {}/{}/{}",
            repo.org, repo.team_project, repo.repo.name
        );
        Outcome::Failed
    }
}
