use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::steps::StepFlags;

const CANDIDATES: [&str; 4] = ["ado2gh.toml", "ado2gh.json", "ado2gh.yaml", "ado2gh.yml"];

/// Configuration file structure for ado2gh.
///
/// Every value can also be given on the command line, which takes
/// precedence over the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub ado: AdoConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub migration: MigrationConfig,

    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdoConfig {
    /// Azure DevOps personal access token
    pub token: Option<String>,

    #[serde(default = "default_ado_server_url")]
    pub server_url: String,

    /// Only migrate this org
    pub org: Option<String>,

    /// Only migrate this team project
    pub team_project: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// GitHub personal access token
    pub token: Option<String>,

    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Target organization
    pub org: Option<String>,

    #[serde(default = "default_target_repo_visibility")]
    pub target_repo_visibility: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MigrationConfig {
    #[serde(default)]
    pub all: bool,

    #[serde(default)]
    pub create_teams: bool,

    #[serde(default)]
    pub link_idp_groups: bool,

    #[serde(default)]
    pub lock_source_repos: bool,

    #[serde(default)]
    pub disable_source_repos: bool,

    #[serde(default)]
    pub rewire_pipelines: bool,

    #[serde(default)]
    pub download_migration_logs: bool,

    /// Run repos one at a time instead of queueing all migrations first
    #[serde(default)]
    pub sequential: bool,

    /// CSV file restricting which repos are migrated
    pub repo_list: Option<PathBuf>,

    /// Where downloaded migration logs are written
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollingConfig {
    #[serde(default = "default_migration_interval_secs")]
    pub migration_interval_secs: u64,

    #[serde(default = "default_log_retry_interval_secs")]
    pub log_retry_interval_secs: u64,

    #[serde(default = "default_log_max_attempts")]
    pub log_max_attempts: u32,
}

impl Default for AdoConfig {
    fn default() -> Self {
        Self {
            token: None,
            server_url: default_ado_server_url(),
            org: None,
            team_project: None,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_github_api_url(),
            org: None,
            target_repo_visibility: default_target_repo_visibility(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            migration_interval_secs: default_migration_interval_secs(),
            log_retry_interval_secs: default_log_retry_interval_secs(),
            log_max_attempts: default_log_max_attempts(),
        }
    }
}

fn default_ado_server_url() -> String {
    "https://dev.azure.com".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_target_repo_visibility() -> String {
    "private".to_string()
}

fn default_migration_interval_secs() -> u64 {
    10
}

fn default_log_retry_interval_secs() -> u64 {
    4
}

fn default_log_max_attempts() -> u32 {
    6
}

impl MigrationConfig {
    pub fn step_flags(&self) -> StepFlags {
        StepFlags::new(
            self.all,
            self.create_teams,
            self.link_idp_groups,
            self.lock_source_repos,
            self.disable_source_repos,
            self.rewire_pipelines,
            self.download_migration_logs,
        )
    }
}

impl PollingConfig {
    pub fn migration_interval(&self) -> Duration {
        Duration::from_secs(self.migration_interval_secs)
    }

    pub fn log_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.log_max_attempts,
            Duration::from_secs(self.log_retry_interval_secs),
        )
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./ado2gh.toml, ./ado2gh.json, ./ado2gh.yaml, ./ado2gh.yml
    /// 3. `<config dir>/ado2gh/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let user_dir = dirs::config_dir().map(|dir| dir.join("ado2gh"));
        Self::discover(Path::new("."), user_dir.as_deref())
    }

    fn discover(working_dir: &Path, user_dir: Option<&Path>) -> Result<Self> {
        let user_config = user_dir.map(|dir| dir.join("config.toml"));

        let found = CANDIDATES
            .iter()
            .map(|candidate| working_dir.join(candidate))
            .chain(user_config)
            .find(|path| path.exists());

        match found {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ado.server_url, "https://dev.azure.com");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.target_repo_visibility, "private");
        assert_eq!(config.polling.migration_interval_secs, 10);
        assert_eq!(config.polling.log_retry().max_attempts(), 6);
        assert!(!config.migration.sequential);
        assert_eq!(config.migration.step_flags(), StepFlags::default());
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[ado]
token = "ado-pat"
org = "contoso"

[github]
org = "contoso-gh"
target-repo-visibility = "internal"

[migration]
link-idp-groups = true
sequential = true
log-dir = "/tmp/logs"

[polling]
migration-interval-secs = 30
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.ado.token.as_deref(), Some("ado-pat"));
        assert_eq!(config.ado.org.as_deref(), Some("contoso"));
        assert_eq!(config.ado.server_url, "https://dev.azure.com");
        assert_eq!(config.github.org.as_deref(), Some("contoso-gh"));
        assert_eq!(config.github.target_repo_visibility, "internal");
        assert!(config.migration.sequential);
        assert_eq!(config.migration.log_dir, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(config.polling.migration_interval(), Duration::from_secs(30));
        assert_eq!(config.polling.log_retry_interval_secs, 4);

        let flags = config.migration.step_flags();
        assert!(flags.link_idp_groups);
        assert!(flags.create_teams);
        assert!(!flags.lock_source_repos);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "ado": { "server-url": "https://ado.example.com/tfs" },
  "migration": { "all": true }
}"#;
        write!(temp_file, "{json_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.ado.server_url, "https://ado.example.com/tfs");
        assert!(config.migration.step_flags().download_migration_logs);
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yml").unwrap();
        write!(
            temp_file,
            "github:\n  org: gh\npolling:\n  log-max-attempts: 2\n"
        )
        .unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.github.org.as_deref(), Some("gh"));
        assert_eq!(config.polling.log_max_attempts, 2);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let result = Config::load(Some(Path::new("nonexistent-ado2gh.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "[ado\ntoken = ").unwrap();

        let err = Config::load_from_path(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_discover_prefers_working_directory() {
        let working_dir = tempfile::tempdir().unwrap();
        let user_dir = tempfile::tempdir().unwrap();
        std::fs::write(working_dir.path().join("ado2gh.yaml"), "ado:\n  org: local\n").unwrap();
        std::fs::write(user_dir.path().join("config.toml"), "[ado]\norg = \"user\"\n").unwrap();

        let config = Config::discover(working_dir.path(), Some(user_dir.path())).unwrap();
        assert_eq!(config.ado.org.as_deref(), Some("local"));
    }

    #[test]
    fn test_discover_falls_back_to_user_config() {
        let working_dir = tempfile::tempdir().unwrap();
        let user_dir = tempfile::tempdir().unwrap();
        std::fs::write(user_dir.path().join("config.toml"), "[ado]\norg = \"user\"\n").unwrap();

        let config = Config::discover(working_dir.path(), Some(user_dir.path())).unwrap();
        assert_eq!(config.ado.org.as_deref(), Some("user"));

        let config = Config::discover(working_dir.path(), None).unwrap();
        assert!(config.ado.org.is_none());
    }
}
