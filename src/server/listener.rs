use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use crate::config::Config;
use crate::http::connection::Connection;
use crate::router::Router;
use crate::storage::FileStore;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Per-connection settings shared by every accepted socket.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_connections: Option<usize>,
    pub max_request_bytes: usize,
}

impl From<&Config> for Limits {
    fn from(cfg: &Config) -> Self {
        Self {
            max_connections: cfg.server.max_connections,
            max_request_bytes: cfg.server.max_request_bytes,
        }
    }
}

pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.listen_addr))?;
    info!("Listening on {}", cfg.server.listen_addr);
    info!("Serving files from {}", cfg.files.directory.display());

    let router = Arc::new(Router::new(FileStore::new(cfg.files.directory.clone())));
    serve(listener, router, Limits::from(cfg)).await
}

/// Accepts connections forever, one task per connection.
///
/// Only a closed connection semaphore ends the loop; accept errors are logged.
pub async fn serve(listener: TcpListener, router: Arc<Router>, limits: Limits) -> anyhow::Result<()> {
    let permits = limits.max_connections.map(|n| Arc::new(Semaphore::new(n)));

    loop {
        let permit = match &permits {
            Some(semaphore) => Some(semaphore.clone().acquire_owned().await?),
            None => None,
        };

        // Accept failures such as EMFILE are transient; keep listening.
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        info!("Accepted connection from {}", peer);

        let router = router.clone();
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, router)
                .with_max_request_bytes(limits.max_request_bytes);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
            drop(permit);
        });
    }
}
