//! Relay server entry point.

use std::sync::Arc;

use tandem_relay::{RelayServer, ServerConfig, ServerError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        production = config.production,
        "starting tandem relay"
    );

    let server = RelayServer::new(config);

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await
}
