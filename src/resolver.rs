//! The backend resolution capability.
//!
//! [`Resolver`] is the seam between the exchange handler and the external
//! reference-data service. [`BackendResolver`] is the production adapter:
//! each call opens its own session against the configured backend address,
//! sends one request frame, polls newline-delimited JSON page frames until
//! the terminal page, and releases the session on every exit path. Sessions
//! are never shared between exchanges.
//!
//! Page frames carry an `event` tag plus `securityData` entries:
//!
//! ```json
//! {"event": "PARTIAL_RESPONSE",
//!  "securityData": [{"security": "ED1 Comdty",
//!                    "fieldData": {"PX_MID": "98.25"}}]}
//! ```
//!
//! `PARTIAL_RESPONSE` pages are merged and polling continues; a `RESPONSE`
//! page is merged and ends the session; any other event is skipped.

use crate::config::BackendConfig;
use crate::reply::{FieldMap, ResultSet};
use async_trait::async_trait;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

/// Service the request frame addresses on the backend
const REFDATA_SERVICE: &str = "//blp/refdata";

/// Backend failure taxonomy. Both kinds abort the exchange that triggered
/// the call; nothing is written back to the tunnel client.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The backend session could not be established or opened
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The session opened but misbehaved: unreadable frame, early close,
    /// or no terminal page within the configured patience
    #[error("backend protocol error: {0}")]
    Protocol(String),
}

/// The resolution capability consumed by the exchange handler.
///
/// Implementations must treat each call as fully self-contained: acquire
/// whatever session they need, use it, and release it before returning,
/// on success and failure alike.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Look up `fields` for each of `securities`.
    ///
    /// Securities the backend cannot resolve, and fields it marks invalid
    /// for a security, are absent from the returned mapping.
    async fn resolve(
        &self,
        securities: &[String],
        fields: &[String],
    ) -> Result<ResultSet, ResolverError>;
}

/// One lookup request, written as a single frame when the session opens
#[derive(Debug, Serialize)]
struct RequestFrame<'a> {
    service: &'a str,
    auth: &'a str,
    securities: &'a [String],
    fields: &'a [String],
}

/// One response page as sent by the backend
#[derive(Debug, Deserialize)]
struct PageFrame {
    event: String,
    #[serde(default, rename = "securityData")]
    security_data: Vec<SecurityData>,
}

/// Per-security payload within a page
#[derive(Debug, Deserialize)]
struct SecurityData {
    security: String,
    #[serde(default, rename = "fieldData")]
    field_data: FieldMap,
}

/// Classification of one backend page by its event tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageKind {
    /// Carries data; more pages follow
    Partial,
    /// Carries data; nothing follows
    Terminal,
    /// Carries nothing useful; skipped without ending the poll loop
    Ignorable,
}

fn classify(event: &str) -> PageKind {
    match event {
        "PARTIAL_RESPONSE" => PageKind::Partial,
        "RESPONSE" => PageKind::Terminal,
        _ => PageKind::Ignorable,
    }
}

/// Production resolver backed by the configured reference-data service.
pub struct BackendResolver {
    config: BackendConfig,
}

impl BackendResolver {
    pub fn new(config: BackendConfig) -> Self {
        BackendResolver { config }
    }
}

#[async_trait]
impl Resolver for BackendResolver {
    async fn resolve(
        &self,
        securities: &[String],
        fields: &[String],
    ) -> Result<ResultSet, ResolverError> {
        // The session lives for this call only; it drops on every return
        // path, closing the backend connection.
        let mut session = Session::open(&self.config).await?;
        session
            .send_request(&self.config.auth, securities, fields)
            .await?;
        session
            .collect(self.config.poll_wait(), self.config.patience())
            .await
    }
}

/// One backend session, owned by a single `resolve` call. Dropping it
/// releases the connection.
struct Session {
    stream: TcpStream,
    buf: BytesMut,
}

impl Session {
    async fn open(config: &BackendConfig) -> Result<Self, ResolverError> {
        let addr = format!("{}:{}", config.host, config.port);
        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            ResolverError::Unavailable(format!("cannot connect to {addr}: {e}"))
        })?;
        debug!(backend = %addr, "Backend session opened");

        Ok(Session {
            stream,
            buf: BytesMut::with_capacity(4096),
        })
    }

    async fn send_request(
        &mut self,
        auth: &str,
        securities: &[String],
        fields: &[String],
    ) -> Result<(), ResolverError> {
        let frame = RequestFrame {
            service: REFDATA_SERVICE,
            auth,
            securities,
            fields,
        };
        let mut payload = serde_json::to_vec(&frame)
            .map_err(|e| ResolverError::Protocol(format!("cannot encode request: {e}")))?;
        payload.push(b'\n');

        self.stream.write_all(&payload).await.map_err(|e| {
            ResolverError::Unavailable(format!("cannot send request: {e}"))
        })
    }

    /// Poll pages until the terminal one, merging as they arrive.
    ///
    /// Each poll waits at most `poll_wait`; if `patience` elapses without a
    /// terminal page the session fails. Page order does not matter, only
    /// the terminal tag ends the loop.
    async fn collect(
        &mut self,
        poll_wait: Duration,
        patience: Duration,
    ) -> Result<ResultSet, ResolverError> {
        let deadline = Instant::now() + patience;
        let mut result = ResultSet::new();

        loop {
            // Drain every complete frame already buffered
            while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                if process_frame(&line, &mut result)? {
                    return Ok(result);
                }
            }

            if Instant::now() >= deadline {
                return Err(ResolverError::Protocol(
                    "no terminal page within patience".to_string(),
                ));
            }

            match timeout(poll_wait, self.stream.read_buf(&mut self.buf)).await {
                // Poll elapsed with nothing to read; try again until patience runs out
                Err(_) => continue,
                Ok(Ok(0)) => {
                    return Err(ResolverError::Protocol(
                        "backend closed before terminal page".to_string(),
                    ))
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    return Err(ResolverError::Protocol(format!("backend read failed: {e}")))
                }
            }
        }
    }
}

/// Merge one frame into `result`. Returns true when the frame was the
/// terminal page.
fn process_frame(line: &[u8], result: &mut ResultSet) -> Result<bool, ResolverError> {
    let text = std::str::from_utf8(line)
        .map_err(|e| ResolverError::Protocol(format!("frame is not UTF-8: {e}")))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(false);
    }

    let frame: PageFrame = serde_json::from_str(text)
        .map_err(|e| ResolverError::Protocol(format!("bad page frame: {e}")))?;

    match classify(&frame.event) {
        PageKind::Ignorable => {
            trace!(event = %frame.event, "Skipping backend event");
            Ok(false)
        }
        PageKind::Partial => {
            merge_page(frame, result);
            Ok(false)
        }
        PageKind::Terminal => {
            merge_page(frame, result);
            Ok(true)
        }
    }
}

fn merge_page(frame: PageFrame, result: &mut ResultSet) {
    for entry in frame.security_data {
        result.merge(entry.security, entry.field_data);
    }
}
