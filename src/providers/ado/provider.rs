use async_trait::async_trait;
use log::{debug, info};
use reqwest::Method;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::client::{AdoClient, Host};
use super::types::{
    AdoAccount, AdoBuildDefinition, AdoIdentity, AdoList, AdoProfile, AdoProject, AdoRepository,
    AdoServiceEndpoint,
};
use crate::auth::Token;
use crate::error::{MigrationError, Result};
use crate::inventory::Pipeline;
use crate::platform::SourcePlatform;
use crate::providers::http::path_url;

const GIT_REPOS_NAMESPACE: &str = "2e9eb7ed-3c0a-47d4-87c1-0ffdd275fd87";
const LOCKED_PERMISSIONS: u32 = 56828;
const LOCK_GROUP: &str = "Project Valid Users";

/// Azure DevOps as the migration source.
pub struct AdoProvider {
    /// Azure DevOps API client
    client: AdoClient,
}

impl AdoProvider {
    /// Create a provider for the Azure DevOps server at `server_url`.
    ///
    /// # Arguments
    ///
    /// * `server_url` - Base URL, `https://dev.azure.com/` for the cloud service
    /// * `token` - Personal access token with read and manage scopes
    ///
    /// # Errors
    ///
    /// Returns an error if `server_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(server_url: &str, token: Token) -> Result<Self> {
        Ok(Self {
            client: AdoClient::new(server_url, token)?,
        })
    }

    /// Makes retry back-offs end as soon as `cancel` fires.
    #[must_use]
    pub fn with_cancellation(self, cancel: CancellationToken) -> Self {
        Self {
            client: self.client.with_cancellation(cancel),
        }
    }

    #[cfg(test)]
    pub(super) fn from_client(client: AdoClient) -> Self {
        Self { client }
    }

    /// Public alias of the user the token belongs to.
    async fn user_id(&self) -> Result<String> {
        let url = self.client.url(
            Host::Profile,
            &["_apis", "profile", "profiles", "me"],
            &[],
            "5.0-preview.1",
        )?;
        let profile: AdoProfile = self.client.get(&url).await?;
        Ok(profile.core_attributes.public_alias.value)
    }

    /// Id of the team project, needed for security namespaces and sharing.
    async fn team_project_id(&self, org: &str, team_project: &str) -> Result<String> {
        let url = self.client.url(
            Host::Server,
            &[org, "_apis", "projects", team_project],
            &[],
            "5.0-preview.1",
        )?;
        let project: AdoProject = self.client.get(&url).await?;
        Ok(project.id)
    }

    /// Id of the Git repository.
    async fn repo_id(&self, org: &str, team_project: &str, repo: &str) -> Result<String> {
        let url = self.client.url(
            Host::Server,
            &[org, team_project, "_apis", "git", "repositories", repo],
            &[],
            "4.1",
        )?;
        let repository: AdoRepository = self.client.get(&url).await?;
        Ok(repository.id)
    }

    /// Descriptor of the `group` identity scoped to the given team project.
    /// Groups of the same name exist in every project, so the scope decides.
    async fn identity_descriptor(
        &self,
        org: &str,
        team_project_id: &str,
        group: &str,
    ) -> Result<String> {
        let url = self.client.url(
            Host::Identity,
            &[org, "_apis", "identities"],
            &[
                ("searchFilter", "General"),
                ("filterValue", group),
                ("queryMembership", "None"),
            ],
            "6.1-preview.1",
        )?;
        let identities: Vec<AdoIdentity> = self.client.get_all(&url).await?;

        identities
            .into_iter()
            .find(|identity| {
                identity
                    .properties
                    .local_scope_id
                    .as_ref()
                    .is_some_and(|scope| scope.value == team_project_id)
            })
            .map(|identity| identity.descriptor)
            .ok_or_else(|| {
                MigrationError::UnexpectedResponse(format!(
                    "No '{group}' group found in team project {team_project_id}"
                ))
            })
    }

    /// Whether the service connection is already visible in `team_project`.
    async fn is_credential_shared(
        &self,
        org: &str,
        team_project: &str,
        credential_id: &str,
    ) -> Result<bool> {
        let url = self.client.url(
            Host::Server,
            &[org, team_project, "_apis", "serviceendpoint", "endpoints", credential_id],
            &[],
            "6.0-preview.4",
        )?;
        let body = self.client.get_text(&url).await?;

        // Endpoints not shared with the team project come back as `null`.
        let body = body.trim();
        Ok(!body.is_empty() && !body.eq_ignore_ascii_case("null"))
    }
}

/// The definition's repository replaced by the GitHub repository, keeping
/// the settings that carry over.
fn rewired_definition(
    mut definition: Value,
    target_org: &str,
    target_repo: &str,
    credential_id: &str,
) -> Result<Value> {
    let repository = definition
        .get("repository")
        .ok_or_else(|| MigrationError::UnexpectedResponse("pipeline has no repository".into()))?;

    let default_branch = repository
        .get("defaultBranch")
        .and_then(Value::as_str)
        .map(|branch| branch.strip_prefix("refs/heads/").unwrap_or(branch))
        .unwrap_or_default()
        .to_owned();
    let clean = repository.get("clean").cloned().unwrap_or(Value::Null);
    let checkout_submodules = repository
        .get("checkoutSubmodules")
        .cloned()
        .unwrap_or(Value::Null);

    let full_name = format!("{target_org}/{target_repo}");
    let web_url = format!("https://github.com/{full_name}");
    let api_url = format!("https://api.github.com/repos/{full_name}");

    definition["repository"] = json!({
        "properties": {
            "apiUrl": api_url,
            "branchesUrl": format!("{api_url}/branches"),
            "cloneUrl": format!("{web_url}.git"),
            "connectedServiceId": credential_id,
            "defaultBranch": default_branch,
            "fullName": full_name,
            "manageUrl": web_url,
            "orgName": target_org,
            "refsUrl": format!("{api_url}/git/refs"),
            "safeRepository": full_name,
            "shortName": target_repo,
            "reportBuildStatus": "true",
        },
        "id": full_name,
        "type": "GitHub",
        "name": full_name,
        "url": format!("{web_url}.git"),
        "defaultBranch": default_branch,
        "clean": clean,
        "checkoutSubmodules": checkout_submodules,
    });

    Ok(definition)
}

#[async_trait]
impl SourcePlatform for AdoProvider {
    /// Organizations the token's user is a member of.
    async fn list_orgs(&self) -> Result<Vec<String>> {
        let user_id = self.user_id().await?;
        let url = self.client.url(
            Host::Profile,
            &["_apis", "accounts"],
            &[("memberId", user_id.as_str())],
            "5.0-preview.1",
        )?;
        let accounts: AdoList<AdoAccount> = self.client.get(&url).await?;

        Ok(accounts
            .value
            .into_iter()
            .map(|account| account.account_name)
            .collect())
    }

    /// All team projects in `org`, following continuation tokens.
    async fn list_team_projects(&self, org: &str) -> Result<Vec<String>> {
        let url = self
            .client
            .url(Host::Server, &[org, "_apis", "projects"], &[], "6.1-preview")?;
        let projects: Vec<AdoProject> = self.client.get_all(&url).await?;
        Ok(projects.into_iter().map(|p| p.name).collect())
    }

    /// Repositories of the team project, leaving out disabled ones.
    async fn list_enabled_repos(&self, org: &str, team_project: &str) -> Result<Vec<String>> {
        let url = self.client.url(
            Host::Server,
            &[org, team_project, "_apis", "git", "repositories"],
            &[],
            "6.1-preview.1",
        )?;
        let repos: Vec<AdoRepository> = self.client.get_all(&url).await?;

        Ok(repos
            .into_iter()
            .filter(|repo| {
                if repo.is_disabled {
                    debug!("Skipping disabled repo {org}/{team_project}/{}", repo.name);
                }
                !repo.is_disabled
            })
            .map(|repo| repo.name)
            .collect())
    }

    /// Build definitions whose repository is `repo`.
    async fn list_pipelines(
        &self,
        org: &str,
        team_project: &str,
        repo: &str,
    ) -> Result<Vec<Pipeline>> {
        let repo_id = self.repo_id(org, team_project, repo).await?;
        let url = self.client.url(
            Host::Server,
            &[org, team_project, "_apis", "build", "definitions"],
            &[
                ("repositoryId", repo_id.as_str()),
                ("repositoryType", "TfsGit"),
                ("queryOrder", "lastModifiedDescending"),
            ],
            "6.0",
        )?;
        let definitions: Vec<AdoBuildDefinition> = self.client.get_all(&url).await?;

        Ok(definitions
            .into_iter()
            .map(|definition| Pipeline {
                id: definition.id,
                name: definition.full_name(),
            })
            .collect())
    }

    /// Looks for the GitHub service connection of the org. The first team
    /// project holding a matching connection wins.
    async fn find_integration_credential(
        &self,
        org: &str,
        target_org: &str,
        team_projects: &[String],
    ) -> Result<Option<String>> {
        for team_project in team_projects {
            let url = self.client.url(
                Host::Server,
                &[org, team_project, "_apis", "serviceendpoint", "endpoints"],
                &[],
                "6.0-preview.4",
            )?;
            let endpoints: Vec<AdoServiceEndpoint> = self.client.get_all(&url).await?;

            if let Some(endpoint) = endpoints
                .into_iter()
                .find(|e| e.connects(target_org, team_project))
            {
                debug!(
                    "Found service connection {} ({}) in {org}/{team_project}",
                    endpoint.id, endpoint.name
                );
                return Ok(Some(endpoint.id));
            }
        }

        Ok(None)
    }

    /// Shares the service connection with `team_project` unless it is
    /// already shared there.
    async fn share_integration_credential(
        &self,
        org: &str,
        team_project: &str,
        credential_id: &str,
    ) -> Result<()> {
        if self
            .is_credential_shared(org, team_project, credential_id)
            .await?
        {
            info!("Service connection {credential_id} is already shared with {org}/{team_project}");
            return Ok(());
        }

        let team_project_id = self.team_project_id(org, team_project).await?;
        let url = self.client.url(
            Host::Server,
            &[org, "_apis", "serviceendpoint", "endpoints", credential_id],
            &[],
            "6.0-preview.4",
        )?;
        let body = json!([{
            "name": format!("{org}-{team_project}"),
            "projectReference": {
                "id": team_project_id,
                "name": team_project,
            },
        }]);

        self.client.send_body(Method::PATCH, &url, &body).await?;
        info!("Shared service connection {credential_id} with {org}/{team_project}");
        Ok(())
    }

    /// Denies write access to the repository for the project's
    /// `Project Valid Users` group.
    async fn lock_repo(&self, org: &str, team_project: &str, repo: &str) -> Result<()> {
        let team_project_id = self.team_project_id(org, team_project).await?;
        let repo_id = self.repo_id(org, team_project, repo).await?;
        let descriptor = self
            .identity_descriptor(org, &team_project_id, LOCK_GROUP)
            .await?;

        let url = self.client.url(
            Host::Server,
            &[org, "_apis", "accesscontrolentries", GIT_REPOS_NAMESPACE],
            &[],
            "6.1-preview.1",
        )?;
        let body = json!({
            "token": format!("repoV2/{team_project_id}/{repo_id}"),
            "merge": true,
            "accessControlEntries": [{
                "descriptor": descriptor,
                "allow": 0,
                "deny": LOCKED_PERMISSIONS,
                "extendedInfo": {
                    "effectiveAllow": 0,
                    "effectiveDeny": LOCKED_PERMISSIONS,
                    "inheritedAllow": 0,
                    "inheritedDeny": LOCKED_PERMISSIONS,
                },
            }],
        });

        self.client.send_body(Method::POST, &url, &body).await?;
        info!("Locked {org}/{team_project}/{repo}");
        Ok(())
    }

    /// Marks the repository as disabled so it can no longer be used.
    async fn disable_repo(&self, org: &str, team_project: &str, repo: &str) -> Result<()> {
        let repo_id = self.repo_id(org, team_project, repo).await?;
        let url = self.client.url(
            Host::Server,
            &[org, team_project, "_apis", "git", "repositories", repo_id.as_str()],
            &[],
            "6.1-preview.1",
        )?;

        self.client
            .send_body(Method::PATCH, &url, &json!({ "isDisabled": true }))
            .await?;
        info!("Disabled {org}/{team_project}/{repo}");
        Ok(())
    }

    /// Points the build definition at the GitHub repository, using the
    /// service connection `credential_id` to authenticate.
    async fn rewire_pipeline(
        &self,
        org: &str,
        team_project: &str,
        pipeline: &Pipeline,
        target_org: &str,
        target_repo: &str,
        credential_id: &str,
    ) -> Result<()> {
        let pipeline_id = pipeline.id.to_string();
        let url = self.client.url(
            Host::Server,
            &[org, team_project, "_apis", "build", "definitions", pipeline_id.as_str()],
            &[],
            "6.0",
        )?;

        let definition: Value = self.client.get(&url).await?;
        let definition = rewired_definition(definition, target_org, target_repo, credential_id)?;

        self.client.send_body(Method::PUT, &url, &definition).await?;
        info!(
            "Rewired pipeline {} in {org}/{team_project} to {target_org}/{target_repo}",
            pipeline.name
        );
        Ok(())
    }

    fn repo_url(&self, org: &str, team_project: &str, repo: &str) -> Result<String> {
        let url = path_url(self.client.server_url(), &[org, team_project, "_git", repo])?;
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewired_definition_points_at_github() {
        let definition = json!({
            "id": 7,
            "name": "build",
            "triggers": [{"triggerType": "continuousIntegration"}],
            "repository": {
                "type": "TfsGit",
                "defaultBranch": "refs/heads/main",
                "clean": "true",
                "checkoutSubmodules": false,
            },
        });

        let rewired = rewired_definition(definition, "gh", "Web-api", "sc-1").unwrap();
        let repository = &rewired["repository"];

        assert_eq!(repository["type"], "GitHub");
        assert_eq!(repository["name"], "gh/Web-api");
        assert_eq!(repository["defaultBranch"], "main");
        assert_eq!(repository["clean"], "true");
        assert_eq!(repository["checkoutSubmodules"], false);
        assert_eq!(repository["properties"]["connectedServiceId"], "sc-1");
        assert_eq!(rewired["triggers"][0]["triggerType"], "continuousIntegration");
        assert_eq!(rewired["name"], "build");
    }

    #[test]
    fn test_definition_without_repository_is_rejected() {
        let result = rewired_definition(json!({"id": 1}), "gh", "r", "sc");
        assert!(matches!(result, Err(MigrationError::UnexpectedResponse(_))));
    }
}
