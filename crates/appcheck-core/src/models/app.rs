use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::keys;

/// Namespace + name address of an App resource.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AppKey {
    pub namespace: String,
    pub name: String,
}

impl AppKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// An App resource as observed in (or written to) the resource store.
///
/// `revision` is the store's monotonically increasing version token. It is
/// `0` for a resource that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppResource {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub spec: AppSpec,
    #[serde(default)]
    pub status: AppStatus,
}

impl AppResource {
    pub fn key(&self) -> AppKey {
        AppKey::new(&self.namespace, &self.name)
    }

    pub fn release_status(&self) -> ReleaseStatus {
        ReleaseStatus::parse(&self.status.release.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Application (chart) name. Also the upstream repository name.
    pub name: String,
    /// Namespace the application is installed into.
    pub namespace: String,
    pub catalog: String,
    pub version: String,
    #[serde(default)]
    pub kube_config: KubeConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeConfig {
    #[serde(default)]
    pub in_cluster: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    #[serde(default)]
    pub release: ReleaseInfo,
    /// Version the operator last installed.
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed: Option<jiff::Timestamp>,
}

/// Release lifecycle as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    Unknown,
    Pending,
    Deployed,
    Failed,
    NotInstalled,
}

impl ReleaseStatus {
    /// Case-insensitive parse of the store's status string.
    ///
    /// Spaces and underscores are read as hyphens, so `"not installed"`,
    /// `"NOT_INSTALLED"` and `"not-installed"` are the same status. Anything
    /// unrecognised, including the empty string, is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '_' => '-',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        match normalized.as_str() {
            "pending" | "pending-install" | "pending-upgrade" | "pending-rollback" => {
                Self::Pending
            }
            "deployed" => Self::Deployed,
            "failed" => Self::Failed,
            "not-installed" => Self::NotInstalled,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::NotInstalled => "not-installed",
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The App a deployment event asks for.
///
/// Computed fresh per event and never reused. Same inputs always produce
/// the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredApp {
    /// Resource name in the store.
    pub name: String,
    /// Namespace of the resource and of the installed application.
    pub namespace: String,
    /// Application (chart) name.
    pub app_name: String,
    pub catalog: String,
    pub version: String,
    pub disable_force_upgrade: bool,
}

impl DesiredApp {
    pub fn key(&self) -> AppKey {
        AppKey::new(&self.namespace, &self.name)
    }

    /// The App resource to write. Revision is left at `0`; the reconciler
    /// carries the store's token forward on update.
    pub fn to_resource(&self) -> AppResource {
        let mut labels = BTreeMap::new();
        labels.insert(
            keys::APP_OPERATOR_VERSION_LABEL.to_string(),
            keys::APP_OPERATOR_VERSION.to_string(),
        );

        let mut annotations = BTreeMap::new();
        if self.disable_force_upgrade {
            annotations.insert(
                keys::FORCE_HELM_UPGRADE_ANNOTATION.to_string(),
                "false".to_string(),
            );
        }

        AppResource {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            revision: 0,
            labels,
            annotations,
            spec: AppSpec {
                name: self.app_name.clone(),
                namespace: self.namespace.clone(),
                catalog: self.catalog.clone(),
                version: self.version.clone(),
                kube_config: KubeConfig { in_cluster: true },
            },
            status: AppStatus::default(),
        }
    }
}
