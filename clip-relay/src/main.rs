use std::sync::Arc;

use anyhow::Context;
use clip_relay::api::{ApiServer, AppState};
use clip_relay::config::AppConfig;
use clip_relay::services::ServiceContainer;
use clip_relay::{logging, panic_hook};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("loading configuration")?;

    let (logging_config, _log_guard) =
        logging::init_logging(&config.log_dir).context("initializing logging")?;
    panic_hook::install(&config.log_dir);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting clip-relay");

    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.child_token());

    let api_config = config.api.clone();
    let services = Arc::new(ServiceContainer::new(config));
    services.start().await;

    let state = AppState::from_container(&services).with_logging(logging_config.clone());
    let server = ApiServer::new(api_config, state);
    let server_token = server.cancel_token();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            info!("Shutdown signal received");
            shutdown.cancel();
            server_token.cancel();
        }
    });

    let result = server.run().await;

    shutdown.cancel();
    services.shutdown().await;
    info!("clip-relay stopped");

    result.context("API server failed")
}
