//! Relay server: listener, accept loop, connection lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::ServerError;
use crate::guest::Guest;
use crate::hall::Hall;
use crate::handshake;
use crate::session::Session;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 5613;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Origins accepted during the handshake when `production` is set.
    pub allowed_origins: Vec<String>,
    /// Enforce the origin allow-list.
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origins: vec![
                "https://localhost:4000".to_string(),
                "https://www.wannaexpresso.com".to_string(),
            ],
            production: false,
        }
    }
}

impl ServerConfig {
    /// Reads overrides from the environment: `TANDEM_PORT`, and
    /// `TANDEM_ENV=production` to enforce the origin allow-list.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(port) = std::env::var("TANDEM_PORT") {
            match port.parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!(%port, "ignoring unparseable TANDEM_PORT"),
            }
        }
        config.production = std::env::var("TANDEM_ENV").is_ok_and(|env| env == "production");
        config
    }
}

/// The relay server. Owns the hall and accepts guest connections until
/// shutdown.
pub struct RelayServer {
    config: ServerConfig,
    hall: Arc<Hall>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            hall: Hall::new(),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address once [`run`](Self::run) has bound it.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|addr| addr.port()).unwrap_or(0)
    }

    /// The room registry, for introspection.
    pub fn hall(&self) -> &Arc<Hall> {
        &self.hall
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the accept loop until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        info!("relay listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            info!(%peer_addr, "incoming request");
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                server.handle_connection(stream, peer_addr).await;
                            });
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Upgrades one TCP connection and runs its session to completion.
    async fn handle_connection(self: &Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = write_half;

        if let Err(e) = handshake::accept(&mut reader, &mut writer, &self.config).await {
            // No close frame before the connection is open; dropping the
            // socket is the whole teardown.
            warn!(%peer_addr, "handshake failed: {e}");
            return;
        }
        info!(%peer_addr, "handshake valid, connection open");

        let guest = Guest::new(writer, self.cancel.child_token());
        Session::new(Arc::clone(&guest), Arc::clone(&self.hall), reader)
            .run()
            .await;
    }
}
