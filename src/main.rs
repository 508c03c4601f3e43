//! bubblecast: a speech-bubble quotation server
//!
//! Every TCP connection is answered with one random quotation rendered
//! inside an ASCII-art speech bubble, then closed. The quotation and the
//! rendering are delegated to external programs (fortune and cowsay by
//! default); this process only owns the listener and the per-connection
//! plumbing.
//!
//! Features:
//! - One response per connection, nothing read from the client
//! - Concurrent handling with a bounded connection cap and per-connection deadline
//! - Configuration via CLI arguments, the PORT variable, or a TOML file

mod config;
mod oracle;
mod server;

use config::Config;
use oracle::{CommandSpec, ExecOracle};
use server::Server;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        quote = %config.quote_command,
        bubble = %config.bubble_command,
        timeout = config.handler_timeout,
        max_connections = config.max_connections,
        "Starting bubblecast server"
    );

    let oracle = ExecOracle::new(
        CommandSpec {
            program: config.quote_command.clone(),
            args: config.quote_args.clone(),
        },
        CommandSpec {
            program: config.bubble_command.clone(),
            args: config.bubble_args.clone(),
        },
    );

    // A collaborator that is missing now will be missing for every request,
    // so refuse to start rather than serve guaranteed failures.
    if let Err(e) = oracle.preflight() {
        error!(error = %e, "Collaborator check failed");
        return Err(e.into());
    }

    Server::new(config, Arc::new(oracle)).run().await
}
