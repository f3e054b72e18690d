use std::sync::Arc;

use clap::Parser;
use eyre::WrapErr;
use kube::config::{KubeConfigOptions, Kubeconfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use appcheck_engine::{
    Controller, DeploymentSync, HookInstaller, Ledger, Reconciler, StatusReporter, StatusWatcher,
    Tracker, format_err_chain,
};
use appcheck_github::{DeploymentApi, EventDecoder, GithubClient};
use appcheck_server::{AppState, Args, Settings, project, router};
use appcheck_store::{AppStore, KubeAppStore};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let settings = Settings::try_from(Args::parse()).wrap_err("invalid configuration")?;
    let info = project::info();
    tracing::info!(
        version = info.version,
        git_commit = info.git_commit,
        environment = %settings.environment,
        strategy = %settings.watch.strategy,
        "starting"
    );

    let client = kube_client(&settings).await?;
    let store: Arc<dyn AppStore> = Arc::new(KubeAppStore::new(client));
    let api: Arc<dyn DeploymentApi> = Arc::new(
        GithubClient::new(&settings.github_api_url, &settings.github_token)
            .wrap_err("failed to build GitHub client")?,
    );

    let ledger = Arc::new(Ledger::new());
    let reporter = Arc::new(StatusReporter::new(
        api.clone(),
        &settings.environment,
        settings.retry,
    ));
    let tracker = Arc::new(Tracker::new(
        StatusWatcher::new(store.clone(), settings.watch.clone()),
        reporter.clone(),
        ledger.clone(),
    ));
    let sync = Arc::new(DeploymentSync::new(
        settings.sync_config(),
        Reconciler::new(store.clone()),
        tracker.clone(),
        reporter,
        ledger.clone(),
    ));

    let cancel = CancellationToken::new();

    let controller = if settings.disable_controller {
        tracing::info!("controller disabled");
        None
    } else {
        let controller = Controller::new(
            settings.controller_config(),
            store.clone(),
            api.clone(),
            tracker.clone(),
            ledger.clone(),
        );
        let cancel = cancel.clone();
        Some(tokio::spawn(async move {
            let result = controller.run(cancel.clone()).await;
            if let Err(err) = &result {
                tracing::error!(error = %format_err_chain(err), "controller stopped");
                cancel.cancel();
            }
            result
        }))
    };

    let installer = settings.hook_config().map(|config| {
        tracing::info!(org = %config.org, url = %config.url, "webhook installer enabled");
        tokio::spawn(HookInstaller::new(config, api.clone()).run(cancel.clone()))
    });

    let state = AppState {
        decoder: EventDecoder::new(settings.webhook_secret.clone()),
        sync,
    };
    let app = router(state, settings.request_timeout());

    let listener = tokio::net::TcpListener::bind(settings.listen_addr)
        .await
        .wrap_err_with(|| format!("failed to bind {}", settings.listen_addr))?;
    tracing::info!(addr = %settings.listen_addr, "listening");

    let signalled = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown requested");
        signalled.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .wrap_err("server error")?;

    cancel.cancel();
    if let Some(installer) = installer {
        installer.await?;
    }
    if let Some(controller) = controller {
        controller.await??;
    }

    tracing::info!("stopped");
    Ok(())
}

async fn kube_client(settings: &Settings) -> eyre::Result<kube::Client> {
    let config = match &settings.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .wrap_err_with(|| format!("failed to read kubeconfig {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
        }
        None => kube::Config::infer().await?,
    };
    Ok(kube::Client::try_from(config)?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
