use log::info;

use super::{RunResult, Scheduler, Started};
use crate::error::Result;
use crate::steps::MigrationPlan;

/// Runs every repository to completion, in discovery order. The first
/// failing step aborts the whole run.
pub(super) async fn run(scheduler: &Scheduler, plan: &MigrationPlan) -> Result<RunResult> {
    let mut result = RunResult::default();

    for org in &plan.orgs {
        for project in &org.projects {
            for step in &project.setup {
                scheduler.check_cancelled()?;
                scheduler
                    .run_setup_step(&org.name, &project.name, step)
                    .await?;
            }

            for repo in &project.repos {
                scheduler.check_cancelled()?;

                let migration_id =
                    match scheduler.start_repo(&org.name, &project.name, repo).await? {
                        Started::Queued(id) => id,
                        Started::Skipped => {
                            result.skipped += 1;
                            continue;
                        }
                    };

                scheduler
                    .wait_for_migration(&org.name, &project.name, repo, &migration_id)
                    .await?;

                for step in repo.post_migration_steps() {
                    scheduler
                        .run_post_step(&org.name, &project.name, repo, step)
                        .await?;
                }

                info!(
                    "Finished {}/{}/{} -> {}",
                    org.name, project.name, repo.name, repo.target_name
                );
                result.succeeded += 1;
            }
        }
    }

    Ok(result)
}
