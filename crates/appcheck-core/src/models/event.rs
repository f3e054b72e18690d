use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A deployment requested upstream, in canonical form.
///
/// Immutable once received. `payload` is kept as the opaque JSON blob the
/// requester attached; [`Payload::parse`] turns it into typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    pub repo: String,
    pub owner: String,
    pub git_ref: String,
    pub environment: String,
    pub deployment_id: i64,
    pub payload: serde_json::Value,
}

/// Typed view of the deployment payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
    #[serde(default)]
    pub unique: bool,
}

impl Payload {
    /// Parse and validate a raw payload.
    ///
    /// The payload may arrive as a JSON object or as a string holding JSON
    /// (older API clients send the latter). `appVersion` and `namespace`
    /// are required and must be non-empty.
    pub fn parse(raw: &serde_json::Value) -> Result<Self, CoreError> {
        let payload: Payload = match raw {
            serde_json::Value::String(s) => serde_json::from_str(s)
                .map_err(|e| CoreError::InvalidPayload(e.to_string()))?,
            serde_json::Value::Object(_) => serde_json::from_value(raw.clone())
                .map_err(|e| CoreError::InvalidPayload(e.to_string()))?,
            serde_json::Value::Null => return Err(CoreError::MissingField("appVersion")),
            other => {
                return Err(CoreError::InvalidPayload(format!(
                    "expected a JSON object, got {other}"
                )));
            }
        };

        if payload.app_version.trim().is_empty() {
            return Err(CoreError::MissingField("appVersion"));
        }
        if payload.namespace.trim().is_empty() {
            return Err(CoreError::MissingField("namespace"));
        }

        Ok(payload)
    }

    /// Chart name with empty strings treated as absent.
    pub fn chart(&self) -> Option<&str> {
        self.chart.as_deref().filter(|c| !c.is_empty())
    }
}

/// A decoded deployment event together with its validated payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    pub event: DeploymentEvent,
    pub payload: Payload,
}

impl DeploymentRequest {
    pub fn new(event: DeploymentEvent) -> Result<Self, CoreError> {
        let payload = Payload::parse(&event.payload)?;
        Ok(Self { event, payload })
    }
}
