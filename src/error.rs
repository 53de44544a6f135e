use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API request failed with status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("API request failed with status {status} after {retries} retries")]
    ApiErrorAfterRetries { status: u16, retries: u32 },

    #[error("GraphQL request {operation} failed: {errors}")]
    GraphQLError { operation: String, errors: String },

    #[error("Unexpected API response: {0}")]
    UnexpectedResponse(String),

    #[error(
        "No migratable repositories were found. Disabled repositories are never migrated; check the org and team project filters"
    )]
    NoMigratableRepos,

    #[error("Unrecognized migration state '{0}'")]
    UnknownMigrationState(String),

    #[error("Migration {migration_id} failed: {reason}")]
    MigrationFailed {
        migration_id: String,
        reason: String,
    },

    #[error("Migration log for repository {repo} is unavailable after {attempts} attempts")]
    MigrationLogUnavailable { repo: String, attempts: u32 },

    #[error("Invalid repo list at line {line}: {message}")]
    RepoList { line: usize, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{step} failed for {org}/{team_project}/{repo}: {source}")]
    StepFailed {
        step: String,
        org: String,
        team_project: String,
        repo: String,
        #[source]
        source: Box<MigrationError>,
    },
}

pub type Result<T> = std::result::Result<T, MigrationError>;
