//! Contracts the migration core needs from the two platforms.
//!
//! `SourcePlatform` is implemented by the Azure DevOps provider and
//! `TargetPlatform` by the GitHub provider; the scheduler and inventory only
//! ever see these traits, which keeps them testable against in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{MigrationError, Result};
use crate::inventory::Pipeline;

/// Repository permission granted to a team on the target side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Maintain,
    Admin,
}

impl TeamRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Maintain => "maintain",
            Self::Admin => "admin",
        }
    }
}

/// Everything needed to queue one repository migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    pub source_repo_url: String,
    pub target_org: String,
    pub target_repo: String,
    pub target_repo_visibility: String,
}

/// Raw migration status as reported by the target platform. `state` is left
/// unparsed; classification happens in the poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub state: String,
    pub repository_name: String,
    pub failure_reason: Option<String>,
    pub migration_log_url: Option<String>,
    pub warnings_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationLogLocation {
    pub url: String,
    pub migration_id: String,
}

#[derive(Error, Debug)]
pub enum StartMigrationError {
    #[error("A repository called {org}/{repo} already exists")]
    TargetExists { org: String, repo: String },

    #[error(transparent)]
    Other(#[from] MigrationError),
}

#[async_trait]
pub trait SourcePlatform: Send + Sync {
    async fn list_orgs(&self) -> Result<Vec<String>>;

    async fn list_team_projects(&self, org: &str) -> Result<Vec<String>>;

    /// Repositories that can be migrated; disabled repositories are excluded.
    async fn list_enabled_repos(&self, org: &str, team_project: &str) -> Result<Vec<String>>;

    async fn list_pipelines(
        &self,
        org: &str,
        team_project: &str,
        repo: &str,
    ) -> Result<Vec<Pipeline>>;

    /// Looks through the service endpoints of `team_projects` for one that
    /// connects this org to `target_org`.
    async fn find_integration_credential(
        &self,
        org: &str,
        target_org: &str,
        team_projects: &[String],
    ) -> Result<Option<String>>;

    async fn share_integration_credential(
        &self,
        org: &str,
        team_project: &str,
        credential_id: &str,
    ) -> Result<()>;

    async fn lock_repo(&self, org: &str, team_project: &str, repo: &str) -> Result<()>;

    async fn disable_repo(&self, org: &str, team_project: &str, repo: &str) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    async fn rewire_pipeline(
        &self,
        org: &str,
        team_project: &str,
        pipeline: &Pipeline,
        target_org: &str,
        target_repo: &str,
        credential_id: &str,
    ) -> Result<()>;

    fn repo_url(&self, org: &str, team_project: &str, repo: &str) -> Result<String>;
}

#[async_trait]
pub trait TargetPlatform: Send + Sync {
    /// Creates the team unless it already exists, optionally linking it to
    /// the IdP group of the given name.
    async fn create_team(&self, org: &str, team: &str, idp_group: Option<&str>) -> Result<()>;

    async fn add_team_to_repo(&self, org: &str, repo: &str, team: &str, role: TeamRole)
        -> Result<()>;

    /// Queues a migration and returns its id without waiting for it.
    async fn start_migration(
        &self,
        request: &MigrationRequest,
    ) -> std::result::Result<String, StartMigrationError>;

    async fn migration_status(&self, migration_id: &str) -> Result<MigrationStatus>;

    /// Latest migration for `repo`, whose log URL may still be empty.
    async fn migration_log_url(&self, org: &str, repo: &str)
        -> Result<Option<MigrationLogLocation>>;

    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_roles_match_github_permission_names() {
        assert_eq!(TeamRole::Maintain.as_str(), "maintain");
        assert_eq!(TeamRole::Admin.as_str(), "admin");
    }

    #[test]
    fn test_target_exists_message_names_the_repo() {
        let err = StartMigrationError::TargetExists {
            org: "contoso".into(),
            repo: "Web-api".into(),
        };
        assert_eq!(err.to_string(), "A repository called contoso/Web-api already exists");
    }
}
