use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Method;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::client::{into_data, with_page, GitHubClient, PAGE_SIZE};
use super::queries::{
    CreateMigrationSource, CreateMigrationSourceVariables, GetMigration, GetMigrationLogUrl,
    GetMigrationLogUrlVariables, GetMigrationVariables, GetOrganization, GetOrganizationVariables,
    StartRepositoryMigration, StartRepositoryMigrationVariables,
};
use super::types::{ExternalGroups, GitHubTeam, TeamMember};
use crate::auth::Token;
use crate::error::{MigrationError, Result};
use crate::platform::{
    MigrationLogLocation, MigrationRequest, MigrationStatus, StartMigrationError, TargetPlatform,
    TeamRole,
};

const MIGRATION_SOURCE_NAME: &str = "Azure DevOps Source";
const MIGRATION_SOURCE_TYPE: &str = "AZURE_DEVOPS";

/// Ids needed to start migrations into one GitHub org.
#[derive(Debug, Clone)]
struct MigrationTarget {
    /// Node id of the GitHub org
    org_id: String,
    /// Node id of the Azure DevOps migration source
    source_id: String,
}

/// GitHub as the migration target.
pub struct GitHubProvider {
    /// GitHub API client
    client: GitHubClient,
    /// Token GitHub uses to read the Azure DevOps repositories
    ado_token: Token,
    /// Azure DevOps server registered as the migration source
    ado_server_url: String,
    /// Migration targets already resolved, by org login
    targets: Mutex<HashMap<String, MigrationTarget>>,
}

impl GitHubProvider {
    /// Create a GitHub provider.
    ///
    /// # Arguments
    ///
    /// * `api_url` - GitHub API base URL
    /// * `token` - GitHub personal access token with admin rights on the target org
    /// * `ado_server_url` - Azure DevOps server the migration source points at
    /// * `ado_token` - Azure DevOps token GitHub uses to read the source repos
    ///
    /// # Errors
    ///
    /// Returns an error if `api_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(api_url: &str, token: Token, ado_server_url: &str, ado_token: Token) -> Result<Self> {
        Ok(Self::from_client(
            GitHubClient::new(api_url, token)?,
            ado_server_url,
            ado_token,
        ))
    }

    /// Makes retry back-offs end as soon as `cancel` fires.
    #[must_use]
    pub fn with_cancellation(self, cancel: CancellationToken) -> Self {
        Self {
            client: self.client.with_cancellation(cancel),
            ..self
        }
    }

    /// Wraps an already configured client.
    pub(super) fn from_client(client: GitHubClient, ado_server_url: &str, ado_token: Token) -> Self {
        Self {
            client,
            ado_token,
            ado_server_url: ado_server_url.to_owned(),
            targets: Mutex::new(HashMap::new()),
        }
    }

    /// All teams of `org`.
    async fn teams(&self, org: &str) -> Result<Vec<GitHubTeam>> {
        let url = self.client.url(&["orgs", org, "teams"])?;
        self.client.get_all(&url).await
    }

    /// Slug of the team named `team`, compared case-insensitively.
    async fn team_slug(&self, org: &str, team: &str) -> Result<String> {
        self.teams(org)
            .await?
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(team))
            .map(|t| t.slug)
            .ok_or_else(|| {
                MigrationError::UnexpectedResponse(format!("Team {org}/{team} does not exist"))
            })
    }

    /// Replaces the team's members with the IdP group of the given name.
    async fn link_idp_group(&self, org: &str, slug: &str, group: &str) -> Result<()> {
        let members_url = self.client.url(&["orgs", org, "teams", slug, "members"])?;
        let members: Vec<TeamMember> = self.client.get_all(&members_url).await?;

        for member in &members {
            let url = self
                .client
                .url(&["orgs", org, "teams", slug, "memberships", &member.login])?;
            self.client.send(Method::DELETE, &url, None).await?;
        }
        debug!("Removed {} members from team {org}/{slug}", members.len());

        let group_id = self.idp_group_id(org, group).await?;
        let url = self
            .client
            .url(&["orgs", org, "teams", slug, "external-groups"])?;
        self.client
            .send(Method::PATCH, &url, Some(&json!({ "group_id": group_id })))
            .await?;

        info!("Linked team {org}/{slug} to IdP group {group}");
        Ok(())
    }

    /// Id of the IdP group named `group`, searched page by page.
    async fn idp_group_id(&self, org: &str, group: &str) -> Result<u64> {
        let base = self.client.url(&["orgs", org, "external-groups"])?;

        for page in 1.. {
            let batch: ExternalGroups = self.client.get(&with_page(&base, page)).await?;
            let last_page = batch.groups.len() < PAGE_SIZE;

            if let Some(found) = batch
                .groups
                .into_iter()
                .find(|g| g.group_name.eq_ignore_ascii_case(group))
            {
                return Ok(found.group_id);
            }
            if last_page {
                break;
            }
        }

        Err(MigrationError::UnexpectedResponse(format!(
            "IdP group {group} is not available in {org}"
        )))
    }

    /// Org id and migration source for `org`, created on first use.
    async fn migration_target(&self, org: &str) -> Result<MigrationTarget> {
        let mut targets = self.targets.lock().await;
        if let Some(target) = targets.get(org) {
            return Ok(target.clone());
        }

        let organization = self
            .client
            .graphql_data::<GetOrganization>(GetOrganizationVariables {
                login: org.to_owned(),
            })
            .await?;
        let org_id = organization.organization.id;

        let source = self
            .client
            .graphql_data::<CreateMigrationSource>(CreateMigrationSourceVariables {
                name: MIGRATION_SOURCE_NAME.to_owned(),
                url: self.ado_server_url.clone(),
                owner_id: org_id.clone(),
                source_type: MIGRATION_SOURCE_TYPE.to_owned(),
            })
            .await?;

        let target = MigrationTarget {
            org_id,
            source_id: source.create_migration_source.migration_source.id,
        };
        debug!("Created migration source {} for {org}", target.source_id);
        targets.insert(org.to_owned(), target.clone());

        Ok(target)
    }
}

#[async_trait]
impl TargetPlatform for GitHubProvider {
    /// Creates a closed team unless one with the same name exists. With
    /// `idp_group`, membership is then handed to that IdP group.
    async fn create_team(&self, org: &str, team: &str, idp_group: Option<&str>) -> Result<()> {
        let existing = self
            .teams(org)
            .await?
            .into_iter()
            .find(|t| t.name == team);

        let slug = match existing {
            Some(existing) => {
                info!("Team '{team}' already exists in {org}; it will not be created");
                existing.slug
            }
            None => {
                let url = self.client.url(&["orgs", org, "teams"])?;
                let created: GitHubTeam = self
                    .client
                    .send_json(
                        Method::POST,
                        &url,
                        &json!({ "name": team, "privacy": "closed" }),
                    )
                    .await?;
                info!("Created team {org}/{team}");
                created.slug
            }
        };

        match idp_group {
            Some(group) => self.link_idp_group(org, &slug, group).await,
            None => Ok(()),
        }
    }

    /// Grants `role` on `repo` to the team named `team`.
    async fn add_team_to_repo(
        &self,
        org: &str,
        repo: &str,
        team: &str,
        role: TeamRole,
    ) -> Result<()> {
        let slug = self.team_slug(org, team).await?;
        let url = self
            .client
            .url(&["orgs", org, "teams", &slug, "repos", org, repo])?;

        self.client
            .send(
                Method::PUT,
                &url,
                Some(&json!({ "permission": role.as_str() })),
            )
            .await?;
        info!("Granted {} on {org}/{repo} to team {team}", role.as_str());
        Ok(())
    }

    /// Queues a repository migration and returns its id.
    ///
    /// The first call per org looks up the org id and creates the Azure DevOps
    /// migration source; later calls reuse them. A target repo that already
    /// exists is reported as [`StartMigrationError::TargetExists`].
    async fn start_migration(
        &self,
        request: &MigrationRequest,
    ) -> std::result::Result<String, StartMigrationError> {
        let target = self.migration_target(&request.target_org).await?;

        let response = self
            .client
            .graphql::<StartRepositoryMigration>(StartRepositoryMigrationVariables {
                source_id: target.source_id,
                owner_id: target.org_id,
                source_repository_url: request.source_repo_url.clone(),
                repository_name: request.target_repo.clone(),
                continue_on_error: true,
                access_token: self.ado_token.as_str().to_owned(),
                github_pat: None,
                target_repo_visibility: Some(request.target_repo_visibility.clone()),
            })
            .await?;

        let exists_message = format!(
            "A repository called {}/{} already exists",
            request.target_org, request.target_repo
        );
        if response
            .errors
            .iter()
            .flatten()
            .any(|e| e.message == exists_message)
        {
            return Err(StartMigrationError::TargetExists {
                org: request.target_org.clone(),
                repo: request.target_repo.clone(),
            });
        }

        let data = into_data("startRepositoryMigration", response)?;
        Ok(data.start_repository_migration.repository_migration.id)
    }

    /// Current state of the migration. An empty failure reason is dropped.
    async fn migration_status(&self, migration_id: &str) -> Result<MigrationStatus> {
        let data = self
            .client
            .graphql_data::<GetMigration>(GetMigrationVariables {
                id: migration_id.to_owned(),
            })
            .await?;

        let node = data.node.ok_or_else(|| {
            MigrationError::UnexpectedResponse(format!("Migration {migration_id} not found"))
        })?;

        Ok(MigrationStatus {
            state: node.state,
            repository_name: node.repository_name,
            failure_reason: node.failure_reason.filter(|r| !r.is_empty()),
            migration_log_url: node.migration_log_url,
            warnings_count: node.warnings_count,
        })
    }

    /// Latest migration into `org/repo` and its log URL, empty until GitHub
    /// publishes the log.
    async fn migration_log_url(
        &self,
        org: &str,
        repo: &str,
    ) -> Result<Option<MigrationLogLocation>> {
        let data = self
            .client
            .graphql_data::<GetMigrationLogUrl>(GetMigrationLogUrlVariables {
                org: org.to_owned(),
                repo: repo.to_owned(),
            })
            .await?;

        Ok(data
            .organization
            .repository_migrations
            .nodes
            .into_iter()
            .next()
            .map(|node| MigrationLogLocation {
                url: node.migration_log_url.unwrap_or_default(),
                migration_id: node.id,
            }))
    }

    /// Fetches the migration log body.
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.client.download(url).await
    }
}
