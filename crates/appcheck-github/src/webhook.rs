//! Signed webhook delivery decoding.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use appcheck_core::models::event::{DeploymentEvent, DeploymentRequest};

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const DEPLOYMENT_EVENT: &str = "deployment";

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Deserialize)]
struct DeploymentBody {
    deployment: DeploymentField,
    repository: RepositoryField,
}

#[derive(Debug, Deserialize)]
struct DeploymentField {
    id: i64,
    #[serde(rename = "ref")]
    git_ref: String,
    environment: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RepositoryField {
    name: String,
    owner: OwnerField,
}

#[derive(Debug, Deserialize)]
struct OwnerField {
    login: String,
}

/// Verifies and decodes webhook deliveries signed with a shared secret.
#[derive(Clone)]
pub struct EventDecoder {
    secret: Vec<u8>,
}

impl std::fmt::Debug for EventDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDecoder").finish_non_exhaustive()
    }
}

impl EventDecoder {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Check `sha256=<hex>` against the HMAC of the raw body.
    pub fn verify(&self, signature: Option<&str>, body: &[u8]) -> Result<(), WebhookError> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;
        let hex_digest = signature
            .trim()
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or(WebhookError::SignatureMismatch)?;
        let expected = hex::decode(hex_digest).map_err(|_| WebhookError::SignatureMismatch)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| WebhookError::SignatureMismatch)?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| WebhookError::SignatureMismatch)
    }

    /// Verify and decode one delivery.
    ///
    /// Returns `Ok(None)` for correctly signed events of any type other than
    /// `deployment`. A deployment event is returned only once its payload has
    /// passed validation.
    pub fn decode(
        &self,
        event_type: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<Option<DeploymentRequest>, WebhookError> {
        self.verify(signature, body)?;

        let event_type = event_type.ok_or(WebhookError::MissingEventType)?;
        if event_type != DEPLOYMENT_EVENT {
            tracing::debug!(event_type, "ignoring non-deployment event");
            return Ok(None);
        }

        let parsed: DeploymentBody =
            serde_json::from_slice(body).map_err(|e| WebhookError::Decode(e.to_string()))?;

        let event = DeploymentEvent {
            repo: parsed.repository.name,
            owner: parsed.repository.owner.login,
            git_ref: parsed.deployment.git_ref,
            environment: parsed.deployment.environment,
            deployment_id: parsed.deployment.id,
            payload: parsed.deployment.payload,
        };

        Ok(Some(DeploymentRequest::new(event)?))
    }

    /// Signature header value for `body`. Used by clients and tests that
    /// need to produce a valid delivery.
    pub fn sign(&self, body: &[u8]) -> String {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(body);
        format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
    }
}
