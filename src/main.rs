//! refdata-tunneld: tunnels reference-data lookups over plain TCP.
//!
//! A client connects, writes one JSON request (either
//! `[securities, fields]` or `{"securities": [...], "fields": [...]}`),
//! half-closes its write side, and reads back one JSON reply mapping each
//! security to its resolved field values. Lookups are delegated to the
//! configured backend resolver; a rejected or failed exchange closes the
//! connection without a reply.
//!
//! Configuration comes from CLI arguments or a TOML file; see `--help`.

use refdata_tunnel::config::Config;
use refdata_tunnel::resolver::BackendResolver;
use refdata_tunnel::server::Server;
use std::sync::Arc;
use tracing::info;
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
        backend_host = %config.backend.host,
        backend_port = config.backend.port,
        "Starting refdata-tunnel server"
    );

    let resolver = Arc::new(BackendResolver::new(config.backend.clone()));
    let server = Server::new(config, resolver);

    server.run().await
}
