use serde::Deserialize;

/// Envelope of every list endpoint in the Azure DevOps REST API.
#[derive(Debug, Deserialize)]
pub struct AdoList<T> {
    pub value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoProfile {
    pub core_attributes: ProfileAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProfileAttributes {
    pub public_alias: ProfileAttribute,
}

#[derive(Debug, Deserialize)]
pub struct ProfileAttribute {
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoAccount {
    pub account_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AdoProject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoRepository {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_disabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct AdoBuildDefinition {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
}

impl AdoBuildDefinition {
    /// `\folder\name`, the way pipelines are displayed in Azure DevOps.
    pub fn full_name(&self) -> String {
        let path = self.path.as_deref().unwrap_or("\\").trim_end_matches('\\');
        format!("{path}\\{}", self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct AdoServiceEndpoint {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub endpoint_type: String,
}

impl AdoServiceEndpoint {
    /// A GitHub connection named after the GitHub org, or a GitHub App
    /// connection named after the team project.
    pub fn connects(&self, github_org: &str, team_project: &str) -> bool {
        (self.endpoint_type.eq_ignore_ascii_case("GitHub")
            && self.name.eq_ignore_ascii_case(github_org))
            || (self.endpoint_type.eq_ignore_ascii_case("GitHubProximaPipelines")
                && self.name.eq_ignore_ascii_case(team_project))
    }
}

#[derive(Debug, Deserialize)]
pub struct AdoIdentity {
    pub descriptor: String,
    pub properties: IdentityProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdentityProperties {
    pub local_scope_id: Option<IdentityProperty>,
}

#[derive(Debug, Deserialize)]
pub struct IdentityProperty {
    #[serde(rename = "$value")]
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(endpoint_type: &str, name: &str) -> AdoServiceEndpoint {
        AdoServiceEndpoint {
            id: "id".into(),
            name: name.into(),
            endpoint_type: endpoint_type.into(),
        }
    }

    #[test]
    fn test_github_endpoint_matches_org_name_ignoring_case() {
        assert!(endpoint("github", "My-Org").connects("my-org", "Web"));
        assert!(!endpoint("GitHub", "other").connects("my-org", "Web"));
    }

    #[test]
    fn test_app_endpoint_matches_team_project_name() {
        assert!(endpoint("GitHubProximaPipelines", "web").connects("my-org", "Web"));
        assert!(!endpoint("GitHubProximaPipelines", "my-org").connects("my-org", "Web"));
    }

    #[test]
    fn test_pipeline_names_include_folder() {
        let root = AdoBuildDefinition {
            id: 1,
            name: "build".into(),
            path: Some("\\".into()),
        };
        let nested = AdoBuildDefinition {
            id: 2,
            name: "deploy".into(),
            path: Some("\\ops\\prod".into()),
        };

        assert_eq!(root.full_name(), "\\build");
        assert_eq!(nested.full_name(), "\\ops\\prod\\deploy");
    }

    #[test]
    fn test_disabled_flag_defaults_to_enabled() {
        let repo: AdoRepository = serde_json::from_str(r#"{"id":"1","name":"api"}"#).unwrap();
        assert!(!repo.is_disabled);
    }
}
