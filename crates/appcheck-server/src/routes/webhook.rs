use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Serialize;

use appcheck_engine::{SyncOutcome, TrackOutcome};
use appcheck_github::webhook::{EVENT_HEADER, SIGNATURE_HEADER};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookResponse {
    Ignored {
        reason: String,
    },
    Tracked {
        action: String,
        result: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl From<SyncOutcome> for WebhookResponse {
    fn from(outcome: SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Ignored(reason) => WebhookResponse::Ignored {
                reason: reason.to_string(),
            },
            SyncOutcome::Tracked { action, outcome } => {
                let (result, reason) = match outcome {
                    TrackOutcome::Succeeded { .. } => ("succeeded", None),
                    TrackOutcome::Failed { reason } => ("failed", Some(reason)),
                    TrackOutcome::TimedOut => ("timed_out", None),
                    TrackOutcome::Aborted { reason } => ("aborted", Some(reason)),
                };
                WebhookResponse::Tracked {
                    action: action.to_string(),
                    result,
                    reason,
                }
            }
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Receive one signed delivery and run it to a terminal report.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let event_type = header(&headers, EVENT_HEADER);
    let request = state
        .decoder
        .decode(event_type, header(&headers, SIGNATURE_HEADER), &body)?;

    let Some(request) = request else {
        return Ok(Json(WebhookResponse::Ignored {
            reason: format!("event type {} is not handled", event_type.unwrap_or_default()),
        }));
    };

    let outcome = state.sync.handle(&request).await?;
    Ok(Json(outcome.into()))
}
