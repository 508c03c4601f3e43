//! TCP server for the bubble service.
//!
//! Accepts connections and answers each one with a freshly generated speech
//! bubble, then disconnects. The byte stream from the client is never read;
//! connecting is the whole request.

use crate::config::Config;
use crate::oracle::{generate, Oracle};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Server instance
pub struct Server {
    config: Config,
    oracle: Arc<dyn Oracle>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, oracle: Arc<dyn Oracle>) -> Self {
        let connection_limit = Arc::new(Semaphore::new(config.max_connections));

        Server {
            config,
            oracle,
            connection_limit,
        }
    }

    /// Bind the configured address and begin accepting connections.
    ///
    /// A bind failure is fatal and propagates to the caller; once bound, the
    /// accept loop runs until the process is terminated externally.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.listen)
            .await
            .map_err(|e| format!("failed to bind {}: {}", self.config.listen, e))?;
        info!(address = %self.config.listen, "Server listening");

        Arc::new(self).serve(listener).await
    }

    /// Accept loop over an already-bound listener.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    let oracle = Arc::clone(&self.oracle);
                    let deadline = Duration::from_secs(self.config.handler_timeout);

                    tokio::spawn(async move {
                        match timeout(deadline, handle_connection(stream, oracle)).await {
                            Ok(Ok(bytes)) => debug!(peer = %addr, bytes, "Response sent"),
                            Ok(Err(e)) => debug!(peer = %addr, error = %e, "Request failed"),
                            Err(_) => warn!(peer = %addr, "Handler deadline exceeded"),
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Serve one connection: generate the bubble, write it, disconnect.
///
/// On generation failure nothing is written; the client observes a clean
/// close either way. The stream is dropped on every exit path, including
/// when the enclosing timeout aborts this future.
async fn handle_connection(
    mut stream: TcpStream,
    oracle: Arc<dyn Oracle>,
) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
    let body = generate(oracle.as_ref()).await?;

    stream.write_all(body.as_bytes()).await?;
    stream.shutdown().await?;

    Ok(body.len())
}
