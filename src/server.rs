//! TCP server for tunnel exchanges.
//!
//! Accepts connections and dispatches each to an independent handler.
//! One connection carries one exchange: read the request until the client
//! half-closes, decode and validate it, resolve it against the backend,
//! write the reply, close. Any failure between decode and resolve aborts
//! the exchange, and the connection closes with zero reply bytes written.

use crate::config::Config;
use crate::query::{self, RequestError};
use crate::resolver::{Resolver, ResolverError};
use bytes::BytesMut;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Maximum number of concurrent exchanges
const MAX_CONNECTIONS: usize = 1024;

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Why an exchange was aborted without a reply
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error("failed to encode reply: {0}")]
    Encode(#[from] serde_json::Error),
}

/// How one exchange ended.
///
/// `Aborted` is the silent-closure path: the reason is logged server-side
/// and nothing is written to the client, which only observes a connection
/// that closes without a payload.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// A reply of this many bytes was written
    Replied(usize),
    /// No reply bytes were written
    Aborted(ExchangeError),
}

/// Server instance
pub struct Server {
    config: Config,
    resolver: Arc<dyn Resolver>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, resolver: Arc<dyn Resolver>) -> Self {
        Server {
            config,
            resolver,
            connection_limit: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        }
    }

    /// Accept connections until an interrupt signal arrives.
    ///
    /// Each accepted connection runs in its own task so one slow backend
    /// lookup never blocks acceptance of the next connection. On interrupt
    /// the listener closes; in-flight exchanges are left to finish.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.listen).await?;
        info!(address = %self.config.listen, "Server listening");

        self.serve(listener, tokio::signal::ctrl_c()).await
    }

    /// Accept on `listener` until `shutdown` completes.
    ///
    /// `shutdown` covers the wait for a connection slot as well as the
    /// accept itself, so an interrupt is observed even while every slot is
    /// held by an in-flight exchange.
    async fn serve<F: Future>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error>> {
        tokio::pin!(shutdown);

        loop {
            // A connection needs a slot before it is accepted
            let next = async {
                let permit = self.connection_limit.clone().acquire_owned().await?;
                Ok::<_, tokio::sync::AcquireError>((permit, listener.accept().await))
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Interrupt received, shutting down");
                    return Ok(());
                }
                slot = next => {
                    let (permit, accepted) = slot?;
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!(peer = %addr, "New connection");

                            let resolver = Arc::clone(&self.resolver);

                            tokio::spawn(async move {
                                match handle_exchange(stream, resolver.as_ref()).await {
                                    Ok(ExchangeOutcome::Replied(bytes)) => {
                                        info!(peer = %addr, bytes, "Exchange replied");
                                    }
                                    Ok(ExchangeOutcome::Aborted(reason)) => {
                                        warn!(peer = %addr, %reason, "Exchange aborted, no reply sent");
                                    }
                                    Err(e) => {
                                        debug!(peer = %addr, error = %e, "Connection error");
                                    }
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
    }

    /// Create a server with a custom connection limit
    #[cfg(test)]
    fn with_connection_limit(config: Config, resolver: Arc<dyn Resolver>, limit: usize) -> Self {
        Server {
            config,
            resolver,
            connection_limit: Arc::new(Semaphore::new(limit)),
        }
    }
}

/// Handle one exchange on an accepted connection.
///
/// The `Err` case is a socket failure; protocol and backend failures end
/// up in `ExchangeOutcome::Aborted`.
pub async fn handle_exchange(
    mut stream: TcpStream,
    resolver: &dyn Resolver,
) -> Result<ExchangeOutcome, std::io::Error> {
    // Read phase: no length prefix on the wire, EOF on the client's write
    // half is the only message boundary.
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);
    loop {
        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            break;
        }
    }
    debug!(request = %String::from_utf8_lossy(&buffer), "Received request");

    match run_exchange(&buffer, resolver).await {
        Ok(reply) => {
            stream.write_all(&reply).await?;
            Ok(ExchangeOutcome::Replied(reply.len()))
        }
        Err(reason) => Ok(ExchangeOutcome::Aborted(reason)),
    }
}

/// Decode, resolve, and encode one request body. Split from the socket so
/// it can be driven without a connection.
async fn run_exchange(body: &[u8], resolver: &dyn Resolver) -> Result<Vec<u8>, ExchangeError> {
    let query = query::decode(body)?;
    debug!(
        securities = query.securities.len(),
        fields = query.fields.len(),
        "Query decoded"
    );

    let result = resolver.resolve(&query.securities, &query.fields).await?;

    Ok(serde_json::to_vec(&result)?)
}
