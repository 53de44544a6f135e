mod repo_list;

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use crate::error::{MigrationError, Result};
use crate::naming::target_repo_name;
use crate::platform::SourcePlatform;

pub use repo_list::RepoList;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pipeline {
    pub id: u64,
    /// Folder path and name, e.g. `\ci\build`.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub name: String,
    pub target_name: String,
    pub pipelines: Vec<Pipeline>,
}

impl Repository {
    pub fn new(team_project: &str, name: &str, pipelines: Vec<Pipeline>) -> Self {
        Self {
            name: name.to_owned(),
            target_name: target_repo_name(team_project, name),
            pipelines,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamProject {
    pub name: String,
    pub repos: Vec<Repository>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Organization {
    pub name: String,
    /// Service connection usable to rewire pipelines to GitHub. `None` means
    /// rewiring is skipped for this org only.
    pub credential_id: Option<String>,
    pub team_projects: Vec<TeamProject>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SourceCoordinates {
    pub org: String,
    pub team_project: String,
    pub repo: String,
}

impl std::fmt::Display for SourceCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.org, self.team_project, self.repo)
    }
}

/// A target repository name claimed by more than one source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateTargetName {
    pub target_name: String,
    pub sources: Vec<SourceCoordinates>,
}

/// Snapshot of everything a run will touch. Built once by
/// [`InventoryLoader`] and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Inventory {
    orgs: Vec<Organization>,
}

impl Inventory {
    pub fn new(orgs: Vec<Organization>) -> Self {
        Self { orgs }
    }

    pub fn orgs(&self) -> &[Organization] {
        &self.orgs
    }

    pub fn repo_count(&self) -> usize {
        self.orgs
            .iter()
            .flat_map(|o| &o.team_projects)
            .map(|tp| tp.repos.len())
            .sum()
    }

    /// Errors when there is nothing to migrate, which almost always means the
    /// filters excluded everything.
    pub fn ensure_migratable(&self) -> Result<()> {
        if self.repo_count() == 0 {
            return Err(MigrationError::NoMigratableRepos);
        }
        Ok(())
    }

    pub fn orgs_missing_credential(&self) -> Vec<&str> {
        self.orgs
            .iter()
            .filter(|o| o.credential_id.is_none())
            .map(|o| o.name.as_str())
            .collect()
    }

    /// Every target name produced by two or more source repositories, with
    /// all of their coordinates. Sorted, so discovery order never matters.
    pub fn duplicate_target_names(&self) -> Vec<DuplicateTargetName> {
        let mut by_target: BTreeMap<&str, Vec<SourceCoordinates>> = BTreeMap::new();

        for org in &self.orgs {
            for team_project in &org.team_projects {
                for repo in &team_project.repos {
                    by_target
                        .entry(repo.target_name.as_str())
                        .or_default()
                        .push(SourceCoordinates {
                            org: org.name.clone(),
                            team_project: team_project.name.clone(),
                            repo: repo.name.clone(),
                        });
                }
            }
        }

        by_target
            .into_iter()
            .filter(|(_, sources)| sources.len() > 1)
            .map(|(target_name, mut sources)| {
                sources.sort();
                DuplicateTargetName {
                    target_name: target_name.to_owned(),
                    sources,
                }
            })
            .collect()
    }

    pub fn log_repo_list(&self) {
        for org in &self.orgs {
            info!("ADO Org: {}", org.name);
            for team_project in &org.team_projects {
                info!("  Team Project: {}", team_project.name);
                for repo in &team_project.repos {
                    info!("    Repo: {}", repo.name);
                }
            }
        }
    }
}

/// Discovers the inventory from the source platform, honouring filters and
/// an optional repo list override.
pub struct InventoryLoader<'a> {
    source: &'a dyn SourcePlatform,
    org_filter: Option<String>,
    team_project_filter: Option<String>,
    repo_list: Option<RepoList>,
    credential_target_org: Option<String>,
}

impl<'a> InventoryLoader<'a> {
    pub fn new(source: &'a dyn SourcePlatform) -> Self {
        Self {
            source,
            org_filter: None,
            team_project_filter: None,
            repo_list: None,
            credential_target_org: None,
        }
    }

    #[must_use]
    pub fn org_filter(mut self, org: Option<String>) -> Self {
        self.org_filter = org;
        self
    }

    #[must_use]
    pub fn team_project_filter(mut self, team_project: Option<String>) -> Self {
        self.team_project_filter = team_project;
        self
    }

    #[must_use]
    pub fn repo_list(mut self, repo_list: Option<RepoList>) -> Self {
        self.repo_list = repo_list;
        self
    }

    /// Looks up integration credentials for `target_org` and discovers
    /// pipelines for every org that has one. Without this the inventory
    /// carries no credentials and no pipelines.
    #[must_use]
    pub fn with_pipeline_rewiring(mut self, target_org: Option<String>) -> Self {
        self.credential_target_org = target_org;
        self
    }

    pub async fn load(self) -> Result<Inventory> {
        let mut orgs = Vec::new();

        for org in self.list_orgs().await? {
            let credential_id = match &self.credential_target_org {
                Some(target_org) => self.find_credential(&org, target_org).await?,
                None => None,
            };

            let mut team_projects = Vec::new();
            for team_project in self.list_team_projects(&org).await? {
                let mut repos = Vec::new();
                for repo in self.list_repos(&org, &team_project).await? {
                    let pipelines = if credential_id.is_some() {
                        self.source
                            .list_pipelines(&org, &team_project, &repo)
                            .await?
                    } else {
                        Vec::new()
                    };
                    repos.push(Repository::new(&team_project, &repo, pipelines));
                }

                team_projects.push(TeamProject {
                    name: team_project,
                    repos,
                });
            }

            orgs.push(Organization {
                name: org,
                credential_id,
                team_projects,
            });
        }

        let inventory = Inventory::new(orgs);
        debug!("Discovered {} repos", inventory.repo_count());

        Ok(inventory)
    }

    async fn list_orgs(&self) -> Result<Vec<String>> {
        if let Some(repo_list) = &self.repo_list {
            return Ok(keep_matching(repo_list.orgs(), self.org_filter.as_deref()));
        }

        match &self.org_filter {
            Some(org) => Ok(vec![org.clone()]),
            None => {
                info!("Retrieving list of all Orgs PAT has access to...");
                self.source.list_orgs().await
            }
        }
    }

    async fn list_team_projects(&self, org: &str) -> Result<Vec<String>> {
        if let Some(repo_list) = &self.repo_list {
            return Ok(keep_matching(
                repo_list.team_projects(org),
                self.team_project_filter.as_deref(),
            ));
        }

        match &self.team_project_filter {
            Some(team_project) => Ok(vec![team_project.clone()]),
            None => self.source.list_team_projects(org).await,
        }
    }

    async fn list_repos(&self, org: &str, team_project: &str) -> Result<Vec<String>> {
        match &self.repo_list {
            Some(repo_list) => Ok(repo_list.repos(org, team_project)),
            None => self.source.list_enabled_repos(org, team_project).await,
        }
    }

    async fn find_credential(&self, org: &str, target_org: &str) -> Result<Option<String>> {
        // Every team project is searched, even when filtering to one of them.
        let all_team_projects = self.source.list_team_projects(org).await?;
        self.source
            .find_integration_credential(org, target_org, &all_team_projects)
            .await
    }
}

fn keep_matching(values: Vec<String>, filter: Option<&str>) -> Vec<String> {
    match filter {
        Some(filter) => values.into_iter().filter(|v| v == filter).collect(),
        None => values,
    }
}

#[cfg(test)]
impl Inventory {
    fn org(&self, org: &str) -> Option<&Organization> {
        self.orgs.iter().find(|o| o.name == org)
    }

    fn team_projects(&self, org: &str) -> &[TeamProject] {
        self.org(org).map_or(&[], |o| o.team_projects.as_slice())
    }

    fn repos(&self, org: &str, team_project: &str) -> &[Repository] {
        self.team_projects(org)
            .iter()
            .find(|tp| tp.name == team_project)
            .map_or(&[], |tp| tp.repos.as_slice())
    }

    fn pipelines(&self, org: &str, team_project: &str, repo: &str) -> &[Pipeline] {
        self.repos(org, team_project)
            .iter()
            .find(|r| r.name == repo)
            .map_or(&[], |r| r.pipelines.as_slice())
    }

    fn credential_id(&self, org: &str) -> Option<&str> {
        self.org(org).and_then(|o| o.credential_id.as_deref())
    }
}
