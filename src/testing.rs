//! In-memory platforms for exercising the inventory loader and the
//! schedulers without HTTP.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::{MigrationError, Result};
use crate::inventory::Pipeline;
use crate::platform::{
    MigrationLogLocation, MigrationRequest, MigrationStatus, SourcePlatform, StartMigrationError,
    TargetPlatform, TeamRole,
};

fn injected(call: &str) -> MigrationError {
    MigrationError::ApiError {
        status: 500,
        message: format!("injected failure: {call}"),
    }
}

#[derive(Default)]
struct CallLog {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
}

impl CallLog {
    fn record(&self, call: String) -> Result<()> {
        let fails = self.failing.contains(&call);
        self.calls.lock().unwrap().push(call.clone());
        if fails {
            Err(injected(&call))
        } else {
            Ok(())
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeSource {
    tree: IndexMap<String, IndexMap<String, Vec<String>>>,
    pipelines: HashMap<(String, String, String), Vec<Pipeline>>,
    // (org, team project scope, credential id); no scope matches anywhere.
    credentials: Vec<(String, Option<String>, String)>,
    log: CallLog,
    list_repo_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_team_project(mut self, org: &str, team_project: &str) -> Self {
        self.tree
            .entry(org.to_string())
            .or_default()
            .entry(team_project.to_string())
            .or_default();
        self
    }

    pub fn with_repo(mut self, org: &str, team_project: &str, repo: &str) -> Self {
        self.tree
            .entry(org.to_string())
            .or_default()
            .entry(team_project.to_string())
            .or_default()
            .push(repo.to_string());
        self
    }

    pub fn with_pipeline(
        mut self,
        org: &str,
        team_project: &str,
        repo: &str,
        id: u64,
        name: &str,
    ) -> Self {
        self.pipelines
            .entry((org.to_string(), team_project.to_string(), repo.to_string()))
            .or_default()
            .push(Pipeline {
                id,
                name: name.to_string(),
            });
        self
    }

    pub fn with_credential(mut self, org: &str, credential_id: &str) -> Self {
        self.credentials
            .push((org.to_string(), None, credential_id.to_string()));
        self
    }

    pub fn with_credential_in_team_project(
        mut self,
        org: &str,
        team_project: &str,
        credential_id: &str,
    ) -> Self {
        self.credentials.push((
            org.to_string(),
            Some(team_project.to_string()),
            credential_id.to_string(),
        ));
        self
    }

    /// Makes the call recorded as `call` fail, e.g. `"lock_repo O/P/r1"`.
    pub fn failing(mut self, call: &str) -> Self {
        self.log.failing.insert(call.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.calls()
    }

    pub fn list_repo_calls(&self) -> usize {
        self.list_repo_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourcePlatform for FakeSource {
    async fn list_orgs(&self) -> Result<Vec<String>> {
        Ok(self.tree.keys().cloned().collect())
    }

    async fn list_team_projects(&self, org: &str) -> Result<Vec<String>> {
        Ok(self
            .tree
            .get(org)
            .map(|tps| tps.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_enabled_repos(&self, org: &str, team_project: &str) -> Result<Vec<String>> {
        self.list_repo_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tree
            .get(org)
            .and_then(|tps| tps.get(team_project))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_pipelines(
        &self,
        org: &str,
        team_project: &str,
        repo: &str,
    ) -> Result<Vec<Pipeline>> {
        Ok(self
            .pipelines
            .get(&(org.to_string(), team_project.to_string(), repo.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn find_integration_credential(
        &self,
        org: &str,
        _target_org: &str,
        team_projects: &[String],
    ) -> Result<Option<String>> {
        Ok(self
            .credentials
            .iter()
            .find(|(o, scope, _)| {
                o == org && scope.as_ref().map_or(true, |tp| team_projects.contains(tp))
            })
            .map(|(_, _, id)| id.clone()))
    }

    async fn share_integration_credential(
        &self,
        org: &str,
        team_project: &str,
        credential_id: &str,
    ) -> Result<()> {
        self.log.record(format!(
            "share_integration_credential {org}/{team_project} {credential_id}"
        ))
    }

    async fn lock_repo(&self, org: &str, team_project: &str, repo: &str) -> Result<()> {
        self.log.record(format!("lock_repo {org}/{team_project}/{repo}"))
    }

    async fn disable_repo(&self, org: &str, team_project: &str, repo: &str) -> Result<()> {
        self.log
            .record(format!("disable_repo {org}/{team_project}/{repo}"))
    }

    async fn rewire_pipeline(
        &self,
        org: &str,
        team_project: &str,
        pipeline: &Pipeline,
        target_org: &str,
        target_repo: &str,
        credential_id: &str,
    ) -> Result<()> {
        self.log.record(format!(
            "rewire_pipeline {org}/{team_project} {} -> {target_org}/{target_repo} {credential_id}",
            pipeline.id
        ))
    }

    fn repo_url(&self, org: &str, team_project: &str, repo: &str) -> Result<String> {
        Ok(format!("https://dev.azure.com/{org}/{team_project}/_git/{repo}"))
    }
}

#[derive(Default)]
pub struct FakeTarget {
    // Status sequence per target repo; the last entry repeats.
    statuses: Mutex<HashMap<String, VecDeque<String>>>,
    existing: HashSet<String>,
    empty_log_urls: HashSet<String>,
    migrations: Mutex<HashMap<String, String>>,
    next_id: AtomicU32,
    log: CallLog,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statuses(self, target_repo: &str, states: &[&str]) -> Self {
        self.statuses.lock().unwrap().insert(
            target_repo.to_string(),
            states.iter().map(ToString::to_string).collect(),
        );
        self
    }

    pub fn with_existing_repo(mut self, target_repo: &str) -> Self {
        self.existing.insert(target_repo.to_string());
        self
    }

    /// The migration log URL for `target_repo` never populates.
    pub fn with_empty_log_url(mut self, target_repo: &str) -> Self {
        self.empty_log_urls.insert(target_repo.to_string());
        self
    }

    pub fn failing(mut self, call: &str) -> Self {
        self.log.failing.insert(call.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.calls()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn migration_id_for(&self, target_repo: &str) -> Option<String> {
        self.migrations
            .lock()
            .unwrap()
            .iter()
            .find(|(_, repo)| repo.as_str() == target_repo)
            .map(|(id, _)| id.clone())
    }
}

#[async_trait]
impl TargetPlatform for FakeTarget {
    async fn create_team(&self, org: &str, team: &str, idp_group: Option<&str>) -> Result<()> {
        self.log.record(format!(
            "create_team {org}/{team} idp={}",
            idp_group.unwrap_or("-")
        ))
    }

    async fn add_team_to_repo(
        &self,
        org: &str,
        repo: &str,
        team: &str,
        role: TeamRole,
    ) -> Result<()> {
        self.log.record(format!(
            "add_team_to_repo {org}/{repo} {team} {}",
            role.as_str()
        ))
    }

    async fn start_migration(
        &self,
        request: &MigrationRequest,
    ) -> std::result::Result<String, StartMigrationError> {
        self.log.record(format!(
            "start_migration {}/{}",
            request.target_org, request.target_repo
        ))?;

        if self.existing.contains(&request.target_repo) {
            return Err(StartMigrationError::TargetExists {
                org: request.target_org.clone(),
                repo: request.target_repo.clone(),
            });
        }

        let id = format!("RM_{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.migrations
            .lock()
            .unwrap()
            .insert(id.clone(), request.target_repo.clone());
        Ok(id)
    }

    async fn migration_status(&self, migration_id: &str) -> Result<MigrationStatus> {
        self.log.record(format!("migration_status {migration_id}"))?;

        let repo = self
            .migrations
            .lock()
            .unwrap()
            .get(migration_id)
            .cloned()
            .ok_or_else(|| MigrationError::UnexpectedResponse(migration_id.to_string()))?;

        let state = {
            let mut statuses = self.statuses.lock().unwrap();
            match statuses.get_mut(&repo) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap_or_else(|| "SUCCEEDED".into()),
                None => "SUCCEEDED".to_string(),
            }
        };

        Ok(MigrationStatus {
            failure_reason: (state.starts_with("FAILED")).then(|| "boom".to_string()),
            state,
            repository_name: repo,
            migration_log_url: None,
            warnings_count: 0,
        })
    }

    async fn migration_log_url(
        &self,
        org: &str,
        repo: &str,
    ) -> Result<Option<MigrationLogLocation>> {
        self.log.record(format!("migration_log_url {org}/{repo}"))?;

        let Some(migration_id) = self.migration_id_for(repo) else {
            return Ok(None);
        };
        let url = if self.empty_log_urls.contains(repo) {
            String::new()
        } else {
            format!("https://logs.example.com/{repo}")
        };

        Ok(Some(MigrationLogLocation { url, migration_id }))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.log.record(format!("download {url}"))?;
        Ok(format!("log from {url}").into_bytes())
    }
}
