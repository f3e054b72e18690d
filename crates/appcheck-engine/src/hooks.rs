//! Keeps the organization webhook that feeds this service in place.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use appcheck_github::DeploymentApi;
use appcheck_github::models::NewHook;

use crate::error::{EngineError, format_err_chain};

#[derive(Debug, Clone)]
pub struct HookConfig {
    pub org: String,
    /// Public URL deliveries are sent to.
    pub url: String,
    pub secret: String,
    pub interval: Duration,
}

pub struct HookInstaller {
    config: HookConfig,
    api: Arc<dyn DeploymentApi>,
}

impl HookInstaller {
    pub fn new(config: HookConfig, api: Arc<dyn DeploymentApi>) -> Self {
        Self { config, api }
    }

    /// Create the hook unless an active one already delivers deployment
    /// events to our URL. Returns whether a hook was created.
    pub async fn ensure(&self) -> Result<bool, EngineError> {
        let hooks = self.api.list_org_hooks(&self.config.org).await?;
        let installed = hooks.iter().any(|hook| {
            hook.active
                && hook.events.iter().any(|event| event == "deployment")
                && hook.config.url.as_deref() == Some(self.config.url.as_str())
        });
        if installed {
            return Ok(false);
        }

        let hook = NewHook::deployments(&self.config.url, &self.config.secret);
        let created = self.api.create_org_hook(&self.config.org, &hook).await?;
        tracing::info!(org = %self.config.org, hook_id = created.id, "created deployment webhook");
        Ok(true)
    }

    /// Check on every tick, starting immediately, until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticks = tokio::time::interval(self.config.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticks.tick() => {}
            }
            if let Err(err) = self.ensure().await {
                tracing::debug!(
                    org = %self.config.org,
                    error = %format_err_chain(&err),
                    "could not ensure deployment webhook"
                );
            }
        }
    }
}
