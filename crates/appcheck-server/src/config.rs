//! Process configuration from flags and `APPCHECK_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use appcheck_core::naming::CatalogPolicy;
use appcheck_engine::{
    ControllerConfig, HookConfig, RetryPolicy, SyncConfig, WaitStrategy, WatchConfig,
};

/// Slack for reconciling the App, on top of the wait window and the two
/// retried status reports around it.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{flag} must not be empty")]
    Empty { flag: &'static str },

    #[error("{flag} must be greater than zero")]
    Zero { flag: &'static str },

    #[error("poll interval ({poll}s) must be shorter than the wait window ({window}s)")]
    PollInterval { poll: u64, window: u64 },

    #[error("webhook url {0:?} must start with http:// or https://")]
    WebhookUrl(String),
}

#[derive(Debug, Parser)]
#[command(name = "appcheck", version, about)]
pub struct Args {
    /// HTTP bind address.
    #[arg(long, env = "APPCHECK_LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: SocketAddr,

    /// Installation environment. Only deployments for it are processed.
    #[arg(long, env = "APPCHECK_ENVIRONMENT")]
    pub environment: String,

    #[arg(long, env = "APPCHECK_GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: String,

    /// Shared secret used to sign webhook deliveries.
    #[arg(long, env = "APPCHECK_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: String,

    /// Public URL of this service. Enables the webhook installer.
    #[arg(long, env = "APPCHECK_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    #[arg(long, env = "APPCHECK_GITHUB_ORG", default_value = "giantswarm")]
    pub github_org: String,

    #[arg(
        long,
        env = "APPCHECK_GITHUB_API_URL",
        default_value = appcheck_github::client::DEFAULT_API_URL
    )]
    pub github_api_url: String,

    /// Explicit kubeconfig. Defaults to in-cluster or the usual inference.
    #[arg(long, env = "APPCHECK_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    #[arg(long, env = "APPCHECK_CONTROLLER_NAMESPACE", default_value = "giantswarm")]
    pub controller_namespace: String,

    /// Serve only the webhook direction.
    #[arg(long, env = "APPCHECK_DISABLE_CONTROLLER")]
    pub disable_controller: bool,

    /// How to wait for a release: push or poll.
    #[arg(long, env = "APPCHECK_WAIT_STRATEGY", default_value = "push")]
    pub wait_strategy: WaitStrategy,

    #[arg(long, env = "APPCHECK_WAIT_WINDOW_SECS", default_value_t = 300)]
    pub wait_window_secs: u64,

    #[arg(long, env = "APPCHECK_POLL_INTERVAL_SECS", default_value_t = 10)]
    pub poll_interval_secs: u64,

    #[arg(long, env = "APPCHECK_RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    #[arg(long, env = "APPCHECK_RETRY_MAX_ATTEMPTS", default_value_t = 5)]
    pub retry_max_attempts: usize,

    #[arg(long, env = "APPCHECK_REPOLL_INTERVAL_SECS", default_value_t = 60)]
    pub repoll_interval_secs: u64,

    #[arg(long, env = "APPCHECK_MAX_REPOLL_ATTEMPTS", default_value_t = 3)]
    pub max_repoll_attempts: usize,

    #[arg(long, env = "APPCHECK_HOOK_CHECK_INTERVAL_SECS", default_value_t = 600)]
    pub hook_check_interval_secs: u64,

    /// Repositories whose deployments are ignored.
    #[arg(
        long,
        env = "APPCHECK_SKIP_REPOS",
        value_delimiter = ',',
        default_value = "draughtsman,aws-app-collection,azure-app-collection,kvm-app-collection,conformance-app-collection"
    )]
    pub skip_repos: Vec<String>,

    /// Repository whose deployments name the chart in their payload.
    #[arg(long, env = "APPCHECK_UMBRELLA_REPO", default_value = "releases")]
    pub umbrella_repo: String,
}

/// Validated settings every component is built from.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_addr: SocketAddr,
    pub environment: String,
    pub github_token: String,
    pub webhook_secret: String,
    pub webhook_url: Option<String>,
    pub github_org: String,
    pub github_api_url: String,
    pub kubeconfig: Option<PathBuf>,
    pub controller_namespace: String,
    pub disable_controller: bool,
    pub watch: WatchConfig,
    pub retry: RetryPolicy,
    pub repoll_interval: Duration,
    pub max_repoll_attempts: usize,
    pub hook_check_interval: Duration,
    pub skip_repos: Vec<String>,
    pub catalogs: CatalogPolicy,
}

fn non_empty(flag: &'static str, value: String) -> Result<String, ConfigError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ConfigError::Empty { flag });
    }
    Ok(value)
}

fn positive(flag: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { flag });
    }
    Ok(value)
}

impl TryFrom<Args> for Settings {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let window = positive("--wait-window-secs", args.wait_window_secs)?;
        let poll = positive("--poll-interval-secs", args.poll_interval_secs)?;
        if poll >= window {
            return Err(ConfigError::PollInterval { poll, window });
        }
        positive("--retry-max-attempts", args.retry_max_attempts as u64)?;
        positive("--repoll-interval-secs", args.repoll_interval_secs)?;
        positive("--hook-check-interval-secs", args.hook_check_interval_secs)?;

        let webhook_url = match args.webhook_url.map(|u| u.trim().to_string()) {
            Some(url) if url.is_empty() => None,
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => Some(url),
            Some(url) => return Err(ConfigError::WebhookUrl(url)),
            None => None,
        };

        Ok(Self {
            listen_addr: args.listen_addr,
            environment: non_empty("--environment", args.environment)?,
            github_token: non_empty("--github-token", args.github_token)?,
            webhook_secret: non_empty("--webhook-secret", args.webhook_secret)?,
            webhook_url,
            github_org: non_empty("--github-org", args.github_org)?,
            github_api_url: non_empty("--github-api-url", args.github_api_url)?,
            kubeconfig: args.kubeconfig,
            controller_namespace: non_empty("--controller-namespace", args.controller_namespace)?,
            disable_controller: args.disable_controller,
            watch: WatchConfig {
                strategy: args.wait_strategy,
                window: Duration::from_secs(window),
                poll_interval: Duration::from_secs(poll),
                ..WatchConfig::default()
            },
            retry: RetryPolicy {
                delay: Duration::from_millis(args.retry_delay_ms),
                max_attempts: args.retry_max_attempts,
            },
            repoll_interval: Duration::from_secs(args.repoll_interval_secs),
            max_repoll_attempts: args.max_repoll_attempts,
            hook_check_interval: Duration::from_secs(args.hook_check_interval_secs),
            skip_repos: args
                .skip_repos
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            catalogs: CatalogPolicy::with_umbrella_repo(&non_empty(
                "--umbrella-repo",
                args.umbrella_repo,
            )?),
        })
    }
}

impl Settings {
    /// Long enough for a webhook call to send `in_progress`, wait out the
    /// window and still deliver its terminal report with every retry.
    pub fn request_timeout(&self) -> Duration {
        let report = self
            .retry
            .budget(appcheck_github::client::REQUEST_TIMEOUT);
        self.watch.window + report * 2 + REQUEST_TIMEOUT_MARGIN
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            environment: self.environment.clone(),
            skip_repos: self.skip_repos.clone(),
            catalogs: self.catalogs.clone(),
            retry: self.retry,
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            namespace: self.controller_namespace.clone(),
            org: self.github_org.clone(),
            environment: self.environment.clone(),
            repoll_interval: self.repoll_interval,
            max_repoll_attempts: self.max_repoll_attempts,
            retry: self.retry,
        }
    }

    /// `None` unless a public webhook URL is configured.
    pub fn hook_config(&self) -> Option<HookConfig> {
        let url = self.webhook_url.clone()?;
        Some(HookConfig {
            org: self.github_org.clone(),
            url,
            secret: self.webhook_secret.clone(),
            interval: self.hook_check_interval,
        })
    }
}
