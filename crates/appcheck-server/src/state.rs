use std::sync::Arc;

use appcheck_engine::DeploymentSync;
use appcheck_github::EventDecoder;

/// Shared state injected into route handlers.
#[derive(Clone)]
pub struct AppState {
    pub decoder: EventDecoder,
    pub sync: Arc<DeploymentSync>,
}
