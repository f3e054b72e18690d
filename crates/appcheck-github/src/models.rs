use serde::{Deserialize, Serialize};

/// A deployment as returned by the deployments API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Filter for listing deployments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentQuery {
    pub environment: Option<String>,
    pub git_ref: Option<String>,
}

/// Body for creating a deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDeployment {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub environment: String,
    pub auto_merge: bool,
    pub required_contexts: Vec<String>,
}

impl NewDeployment {
    /// A deployment that skips merge and commit status checks.
    pub fn unchecked(git_ref: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            git_ref: git_ref.into(),
            environment: environment.into(),
            auto_merge: false,
            required_contexts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub config: HookConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Body for creating an organization hook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewHook {
    pub name: String,
    pub active: bool,
    pub events: Vec<String>,
    pub config: HookConfig,
}

impl NewHook {
    /// A JSON webhook delivering deployment events to `url`.
    pub fn deployments(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: "web".into(),
            active: true,
            events: vec!["deployment".into()],
            config: HookConfig {
                url: Some(url.into()),
                content_type: Some("json".into()),
                secret: Some(secret.into()),
            },
        }
    }
}
