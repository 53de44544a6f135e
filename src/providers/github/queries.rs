//! GraphQL operations of the GitHub migration API.
//!
//! Every operation lives in `graphql/migrations.graphql` and is selected by
//! its operation name. Variables are typed here; responses decode into the
//! structs in [`super::types`].

use graphql_client::{GraphQLQuery, QueryBody};
use serde::Serialize;

use super::types::{
    CreateMigrationSourceData, MigrationLogData, MigrationNodeData, OrganizationData,
    StartRepositoryMigrationData,
};

const MIGRATIONS_DOCUMENT: &str = include_str!("graphql/migrations.graphql");

fn body<V>(variables: V, operation_name: &'static str) -> QueryBody<V> {
    QueryBody {
        variables,
        query: MIGRATIONS_DOCUMENT,
        operation_name,
    }
}

/// Looks up the node id of an organization.
pub struct GetOrganization;

#[derive(Debug, Serialize)]
pub struct GetOrganizationVariables {
    /// Organization login
    pub login: String,
}

impl GraphQLQuery for GetOrganization {
    type Variables = GetOrganizationVariables;
    type ResponseData = OrganizationData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        body(variables, "getOrganization")
    }
}

/// Registers an Azure DevOps server as a migration source of an org.
pub struct CreateMigrationSource;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMigrationSourceVariables {
    pub name: String,
    /// Azure DevOps server URL
    pub url: String,
    /// Node id of the owning organization
    pub owner_id: String,
    /// `MigrationSourceType` enum value, e.g. `AZURE_DEVOPS`
    #[serde(rename = "type")]
    pub source_type: String,
}

impl GraphQLQuery for CreateMigrationSource {
    type Variables = CreateMigrationSourceVariables;
    type ResponseData = CreateMigrationSourceData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        body(variables, "createMigrationSource")
    }
}

/// Queues the migration of one repository.
pub struct StartRepositoryMigration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRepositoryMigrationVariables {
    pub source_id: String,
    pub owner_id: String,
    /// Clone URL of the Azure DevOps repository
    pub source_repository_url: String,
    /// Name of the repository to create on GitHub
    pub repository_name: String,
    pub continue_on_error: bool,
    /// Azure DevOps token GitHub reads the source with
    pub access_token: String,
    pub github_pat: Option<String>,
    pub target_repo_visibility: Option<String>,
}

impl GraphQLQuery for StartRepositoryMigration {
    type Variables = StartRepositoryMigrationVariables;
    type ResponseData = StartRepositoryMigrationData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        body(variables, "startRepositoryMigration")
    }
}

/// Reads the state of a migration by node id.
pub struct GetMigration;

#[derive(Debug, Serialize)]
pub struct GetMigrationVariables {
    pub id: String,
}

impl GraphQLQuery for GetMigration {
    type Variables = GetMigrationVariables;
    type ResponseData = MigrationNodeData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        body(variables, "getMigration")
    }
}

/// Finds the latest migration into a repository and its log URL.
pub struct GetMigrationLogUrl;

#[derive(Debug, Serialize)]
pub struct GetMigrationLogUrlVariables {
    pub org: String,
    pub repo: String,
}

impl GraphQLQuery for GetMigrationLogUrl {
    type Variables = GetMigrationLogUrlVariables;
    type ResponseData = MigrationLogData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        body(variables, "getMigrationLogUrl")
    }
}
