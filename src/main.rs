//! k8s-visualizer - Entry Point
//!
//! Builds the cluster client, starts the monitor tasks and the subscription
//! server, and shuts everything down on Ctrl+C or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use k8s_visualizer::api::ApiServer;
use k8s_visualizer::cluster::{ClientFactory, ClientHandle, KubeClientFactory};
use k8s_visualizer::config::LogConfig;
use k8s_visualizer::{Config, MonitorContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(&config.log);

    info!("Starting k8s-visualizer");

    let factory = Arc::new(KubeClientFactory::new(&config.cluster));

    // The health supervisor keeps retrying if this first attempt fails
    let client = match factory.connect().await {
        Ok(client) => {
            info!("Connected to Kubernetes API using {}", client.source());
            ClientHandle::with_client(client)
        }
        Err(e) => {
            warn!("Starting without a cluster client: {}", e);
            ClientHandle::empty()
        }
    };

    let context = MonitorContext::new(config.clone(), client);

    let (shutdown_tx, _) = watch::channel(false);
    let tasks = context.spawn(factory, &shutdown_tx);

    let api_server = ApiServer::new(config.server.clone(), context.app_state(&tasks));
    let api_shutdown = shutdown_tx.subscribe();
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("Subscription server error: {}", e);
        }
    });

    info!("Subscription server started on {}", config.server_addr());

    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(api_task, tasks.join());

    info!("k8s-visualizer stopped");
    Ok(())
}

/// Initialize tracing from `RUST_LOG`, falling back to the configured level
fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("k8s_visualizer={},tower_http=debug", log.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
