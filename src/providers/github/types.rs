use serde::Deserialize;

/// Result of the organization id lookup.
#[derive(Debug, Deserialize)]
pub struct OrganizationData {
    pub organization: Organization,
}

/// GitHub organization as returned by GraphQL.
#[derive(Debug, Deserialize)]
pub struct Organization {
    /// Global node id, used as the owner of migration sources and migrations
    pub id: String,
}

/// Result of the `createMigrationSource` mutation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMigrationSourceData {
    pub create_migration_source: CreateMigrationSourcePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMigrationSourcePayload {
    /// The Azure DevOps migration source that was created
    pub migration_source: Node,
}

/// Result of the `startRepositoryMigration` mutation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRepositoryMigrationData {
    pub start_repository_migration: StartRepositoryMigrationPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRepositoryMigrationPayload {
    /// The queued migration
    pub repository_migration: Node,
}

/// Any GraphQL object identified only by its node id.
#[derive(Debug, Deserialize)]
pub struct Node {
    /// Global node id
    pub id: String,
}

/// Result of looking a migration up by node id.
#[derive(Debug, Deserialize)]
pub struct MigrationNodeData {
    /// `None` when the id does not name a migration
    pub node: Option<MigrationNode>,
}

/// Status of one repository migration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationNode {
    /// Raw migration state, e.g. `QUEUED`, `IN_PROGRESS` or `SUCCEEDED`
    pub state: String,
    /// Name of the target repository
    pub repository_name: String,
    /// Number of warnings raised while migrating
    #[serde(default)]
    pub warnings_count: u32,
    /// Why the migration failed, if it did
    pub failure_reason: Option<String>,
    /// Location of the migration log once it is available
    pub migration_log_url: Option<String>,
}

/// Result of the migration log lookup for one repository.
#[derive(Debug, Deserialize)]
pub struct MigrationLogData {
    pub organization: MigrationLogOrganization,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationLogOrganization {
    /// Most recent migrations into the repository
    pub repository_migrations: MigrationLogConnection,
}

#[derive(Debug, Deserialize)]
pub struct MigrationLogConnection {
    pub nodes: Vec<MigrationLogNode>,
}

/// A migration and its log location.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationLogNode {
    /// Migration node id
    pub id: String,
    /// Log URL; empty or missing until GitHub has published the log
    pub migration_log_url: Option<String>,
}

/// Team in a GitHub organization.
#[derive(Debug, Deserialize)]
pub struct GitHubTeam {
    /// Display name of the team
    pub name: String,
    /// URL-safe name used in REST paths
    pub slug: String,
}

/// Member of a GitHub team.
#[derive(Debug, Deserialize)]
pub struct TeamMember {
    /// GitHub user name
    pub login: String,
}

/// One page of the IdP groups available to an organization.
#[derive(Debug, Deserialize)]
pub struct ExternalGroups {
    #[serde(default)]
    pub groups: Vec<ExternalGroup>,
}

/// IdP group that a team can be linked to.
#[derive(Debug, Deserialize)]
pub struct ExternalGroup {
    /// Id passed when linking a team
    pub group_id: u64,
    /// Name of the group in the identity provider
    pub group_name: String,
}
