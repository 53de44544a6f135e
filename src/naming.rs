use std::fmt;

use serde::Serialize;

const SUBSTITUTE: char = '-';

fn is_permitted(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Replaces every run of characters GitHub does not accept in a repository
/// or team name with a single dash.
pub fn sanitize(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut in_invalid_run = false;

    for c in name.chars() {
        if is_permitted(c) {
            sanitized.push(c);
            in_invalid_run = false;
        } else if !in_invalid_run {
            sanitized.push(SUBSTITUTE);
            in_invalid_run = true;
        }
    }

    sanitized
}

/// Name of the GitHub repository an Azure DevOps repository migrates into.
pub fn target_repo_name(team_project: &str, repo: &str) -> String {
    sanitize(&format!("{team_project}-{repo}"))
}

pub fn maintainers_team_name(team_project: &str) -> String {
    format!("{}-Maintainers", sanitize(team_project))
}

pub fn admins_team_name(team_project: &str) -> String {
    format!("{}-Admins", sanitize(team_project))
}

/// Correlates a migration queued in the first parallel phase with the wait
/// performed in the second. Only lives for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MigrationKey {
    pub org: String,
    pub target_repo: String,
}

impl MigrationKey {
    pub fn new(org: &str, target_repo: &str) -> Self {
        Self {
            org: org.to_owned(),
            target_repo: target_repo.to_owned(),
        }
    }
}

impl fmt::Display for MigrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.target_repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_permitted_characters() {
        assert_eq!(sanitize("My_Repo.v2-final"), "My_Repo.v2-final");
    }

    #[test]
    fn test_replaces_spaces_and_symbols_with_dash() {
        assert_eq!(sanitize("Team Project"), "Team-Project");
        assert_eq!(sanitize("a/b\\c"), "a-b-c");
    }

    #[test]
    fn test_collapses_runs_of_invalid_characters() {
        assert_eq!(sanitize("Team  &  Project"), "Team-Project");
    }

    #[test]
    fn test_replaces_non_ascii_letters() {
        assert_eq!(sanitize("Café"), "Caf-");
    }

    #[test]
    fn test_target_name_joins_project_and_repo() {
        assert_eq!(target_repo_name("Fabrikam Web", "api"), "Fabrikam-Web-api");
    }

    #[test]
    fn test_target_name_is_deterministic() {
        let first = target_repo_name("Project (Legacy)", "repo #1");
        let second = target_repo_name("Project (Legacy)", "repo #1");
        assert_eq!(first, second);
        assert!(first.chars().all(is_permitted), "got {first}");
    }

    #[test]
    fn test_different_projects_can_collapse_to_the_same_target_name() {
        assert_eq!(
            target_repo_name("Team A", "repoA"),
            target_repo_name("Team/A", "repoA")
        );
    }

    #[test]
    fn test_team_names_use_sanitized_project() {
        assert_eq!(maintainers_team_name("My Project"), "My-Project-Maintainers");
        assert_eq!(admins_team_name("My Project"), "My-Project-Admins");
    }

    #[test]
    fn test_migration_key_displays_org_and_repo() {
        let key = MigrationKey::new("contoso", "Web-api");
        assert_eq!(key.to_string(), "contoso/Web-api");
    }
}
