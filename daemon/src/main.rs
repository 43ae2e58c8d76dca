mod config;
mod dispatcher;
mod protocol;
mod scheduler;
mod server;
mod session;
mod transport;
mod util;

use std::sync::Arc;

use anyhow::Result;
use config::DaemonConfig;
use dispatcher::Dispatcher;
use scheduler::RefreshScheduler;
use server::SuggestServer;
use suggest_core::{JsonFileSource, SuggestionStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = DaemonConfig::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        route = %config.server.route,
        idle_timeout_secs = config.server.idle_timeout_secs,
        shutdown_grace_secs = config.server.shutdown_grace_secs,
        source = %config.refresh.source_path.display(),
        refresh_interval_secs = config.refresh.interval_secs,
        "loaded suggestd config"
    );

    let store = Arc::new(SuggestionStore::new());
    let scheduler = RefreshScheduler::start(
        store.clone(),
        Arc::new(JsonFileSource::new(config.refresh.source_path.clone())),
        config.refresh.interval(),
    );

    let dispatcher = Dispatcher::new(store, config.server.route.clone());
    let server = SuggestServer::bind(&config.server, dispatcher).await?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                trigger.cancel();
            }
            Err(err) => warn!("failed to listen for ctrl-c: {err}"),
        }
    });

    let served = server.run(shutdown).await;
    scheduler.shutdown().await;
    served
}
