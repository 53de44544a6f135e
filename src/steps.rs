use std::fmt;

use serde::Serialize;

use crate::inventory::{Inventory, Pipeline, Repository};
use crate::naming::{admins_team_name, maintainers_team_name};

/// Which optional steps a run performs. Migrating the repository itself is
/// never optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepFlags {
    pub create_teams: bool,
    pub link_idp_groups: bool,
    pub lock_source_repos: bool,
    pub disable_source_repos: bool,
    pub rewire_pipelines: bool,
    pub download_migration_logs: bool,
}

impl StepFlags {
    /// `all` switches on every step; linking IdP groups needs the teams, so
    /// it switches on team creation as well.
    #[allow(clippy::fn_params_excessive_bools)]
    pub fn new(
        all: bool,
        create_teams: bool,
        link_idp_groups: bool,
        lock_source_repos: bool,
        disable_source_repos: bool,
        rewire_pipelines: bool,
        download_migration_logs: bool,
    ) -> Self {
        let link_idp_groups = all || link_idp_groups;

        Self {
            create_teams: all || create_teams || link_idp_groups,
            link_idp_groups,
            lock_source_repos: all || lock_source_repos,
            disable_source_repos: all || disable_source_repos,
            rewire_pipelines: all || rewire_pipelines,
            download_migration_logs: all || download_migration_logs,
        }
    }

    /// Steps enabled in either set.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            create_teams: self.create_teams || other.create_teams,
            link_idp_groups: self.link_idp_groups || other.link_idp_groups,
            lock_source_repos: self.lock_source_repos || other.lock_source_repos,
            disable_source_repos: self.disable_source_repos || other.disable_source_repos,
            rewire_pipelines: self.rewire_pipelines || other.rewire_pipelines,
            download_migration_logs: self.download_migration_logs
                || other.download_migration_logs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    CreateMaintainersTeam {
        team: String,
        idp_group: Option<String>,
    },
    CreateAdminsTeam {
        team: String,
        idp_group: Option<String>,
    },
    ShareIntegrationCredential {
        credential_id: String,
    },
    LockSourceRepo,
    MigrateRepo,
    DisableSourceRepo,
    AttachMaintainersTeam {
        team: String,
    },
    AttachAdminsTeam {
        team: String,
    },
    DownloadMigrationLog,
    RewirePipeline {
        pipeline: Pipeline,
        credential_id: String,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateMaintainersTeam { .. } => "CreateMaintainersTeam",
            Self::CreateAdminsTeam { .. } => "CreateAdminsTeam",
            Self::ShareIntegrationCredential { .. } => "ShareIntegrationCredential",
            Self::LockSourceRepo => "LockSourceRepo",
            Self::MigrateRepo => "MigrateRepo",
            Self::DisableSourceRepo => "DisableSourceRepo",
            Self::AttachMaintainersTeam { .. } => "AttachMaintainersTeam",
            Self::AttachAdminsTeam { .. } => "AttachAdminsTeam",
            Self::DownloadMigrationLog => "DownloadMigrationLog",
            Self::RewirePipeline { .. } => "RewirePipeline",
        }
    }

    /// Steps that only make sense once the repository migration succeeded.
    pub fn is_post_migration(&self) -> bool {
        matches!(
            self,
            Self::DisableSourceRepo
                | Self::AttachMaintainersTeam { .. }
                | Self::AttachAdminsTeam { .. }
                | Self::DownloadMigrationLog
                | Self::RewirePipeline { .. }
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateMaintainersTeam { team, idp_group }
            | Self::CreateAdminsTeam { team, idp_group } => match idp_group {
                Some(group) => write!(f, "Create team {team} linked to IdP group {group}"),
                None => write!(f, "Create team {team}"),
            },
            Self::ShareIntegrationCredential { credential_id } => {
                write!(f, "Share service connection {credential_id}")
            }
            Self::LockSourceRepo => f.write_str("Lock source repo"),
            Self::MigrateRepo => f.write_str("Migrate repo"),
            Self::DisableSourceRepo => f.write_str("Disable source repo"),
            Self::AttachMaintainersTeam { team } => write!(f, "Grant maintain to {team}"),
            Self::AttachAdminsTeam { team } => write!(f, "Grant admin to {team}"),
            Self::DownloadMigrationLog => f.write_str("Download migration log"),
            Self::RewirePipeline { pipeline, .. } => {
                write!(f, "Rewire pipeline {}", pipeline.name)
            }
        }
    }
}

/// Steps run once per team project, before any of its repositories.
pub fn plan_team_project_steps(
    team_project: &str,
    credential_id: Option<&str>,
    flags: StepFlags,
) -> Vec<Step> {
    let mut steps = Vec::new();

    if flags.create_teams {
        let maintainers = maintainers_team_name(team_project);
        let admins = admins_team_name(team_project);
        let idp_group = |team: &str| flags.link_idp_groups.then(|| team.to_owned());

        steps.push(Step::CreateMaintainersTeam {
            idp_group: idp_group(&maintainers),
            team: maintainers,
        });
        steps.push(Step::CreateAdminsTeam {
            idp_group: idp_group(&admins),
            team: admins,
        });
    }

    if flags.rewire_pipelines {
        if let Some(credential_id) = credential_id {
            steps.push(Step::ShareIntegrationCredential {
                credential_id: credential_id.to_owned(),
            });
        }
    }

    steps
}

/// Ordered steps for one repository.
pub fn plan_repo_steps(
    team_project: &str,
    repo: &Repository,
    credential_id: Option<&str>,
    flags: StepFlags,
) -> Vec<Step> {
    let mut steps = Vec::new();

    if flags.lock_source_repos {
        steps.push(Step::LockSourceRepo);
    }

    steps.push(Step::MigrateRepo);

    if flags.disable_source_repos {
        steps.push(Step::DisableSourceRepo);
    }

    if flags.create_teams {
        steps.push(Step::AttachMaintainersTeam {
            team: maintainers_team_name(team_project),
        });
        steps.push(Step::AttachAdminsTeam {
            team: admins_team_name(team_project),
        });
    }

    if flags.download_migration_logs {
        steps.push(Step::DownloadMigrationLog);
    }

    if flags.rewire_pipelines {
        if let Some(credential_id) = credential_id {
            steps.extend(repo.pipelines.iter().map(|pipeline| Step::RewirePipeline {
                pipeline: pipeline.clone(),
                credential_id: credential_id.to_owned(),
            }));
        }
    }

    steps
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoPlan {
    pub name: String,
    pub target_name: String,
    pub steps: Vec<Step>,
}

impl RepoPlan {
    /// Steps up to and including `MigrateRepo`.
    pub fn migration_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| !s.is_post_migration())
    }

    pub fn post_migration_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.is_post_migration())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectPlan {
    pub name: String,
    pub setup: Vec<Step>,
    pub repos: Vec<RepoPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgPlan {
    pub name: String,
    pub credential_id: Option<String>,
    pub projects: Vec<ProjectPlan>,
}

/// The inventory expanded into concrete steps, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub orgs: Vec<OrgPlan>,
}

impl MigrationPlan {
    pub fn build(inventory: &Inventory, flags: StepFlags) -> Self {
        let orgs = inventory
            .orgs()
            .iter()
            .map(|org| {
                let credential_id = org.credential_id.as_deref();

                let projects = org
                    .team_projects
                    .iter()
                    .filter(|tp| !tp.repos.is_empty())
                    .map(|tp| ProjectPlan {
                        name: tp.name.clone(),
                        setup: plan_team_project_steps(&tp.name, credential_id, flags),
                        repos: tp
                            .repos
                            .iter()
                            .map(|repo| RepoPlan {
                                name: repo.name.clone(),
                                target_name: repo.target_name.clone(),
                                steps: plan_repo_steps(&tp.name, repo, credential_id, flags),
                            })
                            .collect(),
                    })
                    .collect();

                OrgPlan {
                    name: org.name.clone(),
                    credential_id: org.credential_id.clone(),
                    projects,
                }
            })
            .collect();

        Self { orgs }
    }

    pub fn repo_count(&self) -> usize {
        self.orgs
            .iter()
            .flat_map(|o| &o.projects)
            .map(|p| p.repos.len())
            .sum()
    }

    pub fn step_count(&self) -> usize {
        self.orgs
            .iter()
            .flat_map(|o| &o.projects)
            .map(|p| p.setup.len() + p.repos.iter().map(|r| r.steps.len()).sum::<usize>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Organization, TeamProject};

    fn pipeline(id: u64, name: &str) -> Pipeline {
        Pipeline {
            id,
            name: name.to_string(),
        }
    }

    fn repo(team_project: &str, name: &str, pipelines: Vec<Pipeline>) -> Repository {
        Repository::new(team_project, name, pipelines)
    }

    fn names(steps: &[Step]) -> Vec<&'static str> {
        steps.iter().map(Step::name).collect()
    }

    fn all_flags() -> StepFlags {
        StepFlags::new(true, false, false, false, false, false, false)
    }

    #[test]
    fn test_all_enables_every_flag() {
        let flags = all_flags();
        assert!(flags.create_teams);
        assert!(flags.link_idp_groups);
        assert!(flags.lock_source_repos);
        assert!(flags.disable_source_repos);
        assert!(flags.rewire_pipelines);
        assert!(flags.download_migration_logs);
    }

    #[test]
    fn test_linking_idp_groups_implies_creating_teams() {
        let flags = StepFlags::new(false, false, true, false, false, false, false);
        assert!(flags.create_teams);
        assert!(flags.link_idp_groups);
        assert!(!flags.lock_source_repos);
    }

    #[test]
    fn test_union_keeps_steps_from_both_sides() {
        let cli = StepFlags::new(false, false, false, true, false, false, false);
        let file = StepFlags::new(false, false, true, false, false, false, false);

        let merged = cli.union(file);
        assert!(merged.lock_source_repos);
        assert!(merged.link_idp_groups);
        assert!(merged.create_teams);
        assert!(!merged.rewire_pipelines);
    }

    #[test]
    fn test_minimal_plan_only_migrates() {
        let steps = plan_repo_steps("Web", &repo("Web", "api", vec![]), None, StepFlags::default());
        assert_eq!(steps, vec![Step::MigrateRepo]);
    }

    #[test]
    fn test_full_plan_keeps_dependency_order() {
        let r = repo("Web", "api", vec![pipeline(1, "\\ci"), pipeline(2, "\\release")]);
        let steps = plan_repo_steps("Web", &r, Some("sc-1"), all_flags());

        assert_eq!(
            names(&steps),
            vec![
                "LockSourceRepo",
                "MigrateRepo",
                "DisableSourceRepo",
                "AttachMaintainersTeam",
                "AttachAdminsTeam",
                "DownloadMigrationLog",
                "RewirePipeline",
                "RewirePipeline",
            ]
        );
    }

    #[test]
    fn test_no_rewire_without_credential() {
        let r = repo("Web", "api", vec![pipeline(1, "\\ci")]);
        let steps = plan_repo_steps("Web", &r, None, all_flags());

        assert!(!steps.iter().any(|s| matches!(s, Step::RewirePipeline { .. })));
        assert!(plan_team_project_steps("Web", None, all_flags())
            .iter()
            .all(|s| !matches!(s, Step::ShareIntegrationCredential { .. })));
    }

    #[test]
    fn test_credential_is_not_shared_unless_rewiring() {
        let flags = StepFlags::new(false, true, false, false, false, false, false);
        let steps = plan_team_project_steps("Web", Some("sc-1"), flags);
        assert_eq!(names(&steps), vec!["CreateMaintainersTeam", "CreateAdminsTeam"]);
    }

    #[test]
    fn test_team_steps_use_sanitized_names_and_idp_groups() {
        let steps = plan_team_project_steps("My Project", Some("sc-1"), all_flags());

        assert_eq!(
            steps,
            vec![
                Step::CreateMaintainersTeam {
                    team: "My-Project-Maintainers".into(),
                    idp_group: Some("My-Project-Maintainers".into()),
                },
                Step::CreateAdminsTeam {
                    team: "My-Project-Admins".into(),
                    idp_group: Some("My-Project-Admins".into()),
                },
                Step::ShareIntegrationCredential {
                    credential_id: "sc-1".into(),
                },
            ]
        );
    }

    #[test]
    fn test_post_migration_split() {
        let r = repo("Web", "api", vec![pipeline(1, "\\ci")]);
        let plan = RepoPlan {
            name: r.name.clone(),
            target_name: r.target_name.clone(),
            steps: plan_repo_steps("Web", &r, Some("sc-1"), all_flags()),
        };

        assert_eq!(
            plan.migration_steps().map(Step::name).collect::<Vec<_>>(),
            vec!["LockSourceRepo", "MigrateRepo"]
        );
        assert_eq!(plan.post_migration_steps().count(), 5);
    }

    fn inventory() -> Inventory {
        Inventory::new(vec![Organization {
            name: "O".into(),
            credential_id: None,
            team_projects: vec![
                TeamProject {
                    name: "P".into(),
                    repos: vec![repo("P", "r1", vec![]), repo("P", "r2", vec![])],
                },
                TeamProject {
                    name: "Empty".into(),
                    repos: vec![],
                },
            ],
        }])
    }

    #[test]
    fn test_empty_team_projects_get_no_team_steps() {
        let flags = StepFlags::new(false, true, false, false, false, false, false);
        let plan = MigrationPlan::build(&inventory(), flags);

        let projects: Vec<_> = plan.orgs[0].projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(projects, vec!["P"]);
    }

    #[test]
    fn test_team_steps_are_planned_once_per_team_project() {
        let flags = StepFlags::new(false, true, false, true, false, false, false);
        let plan = MigrationPlan::build(&inventory(), flags);
        let project = &plan.orgs[0].projects[0];

        assert_eq!(names(&project.setup), vec!["CreateMaintainersTeam", "CreateAdminsTeam"]);
        assert_eq!(plan.repo_count(), 2);
        assert_eq!(plan.step_count(), 2 + 2 * 4);
    }

    #[test]
    fn test_lock_and_migrate_only_without_credential() {
        let flags = StepFlags::new(false, false, false, true, false, true, false);
        let plan = MigrationPlan::build(&inventory(), flags);

        for repo in &plan.orgs[0].projects[0].repos {
            assert_eq!(names(&repo.steps), vec!["LockSourceRepo", "MigrateRepo"]);
        }
    }

    #[test]
    fn test_steps_describe_themselves() {
        let step = Step::RewirePipeline {
            pipeline: pipeline(3, "\\ci\\build"),
            credential_id: "sc".into(),
        };
        assert_eq!(step.to_string(), "Rewire pipeline \\ci\\build");
        assert_eq!(
            Step::AttachAdminsTeam { team: "P-Admins".into() }.to_string(),
            "Grant admin to P-Admins"
        );
    }
}
