//! Reference requester for the tunnel protocol.
//!
//! One call, one exchange: write the request, half-close, read the reply
//! until the server closes. Deliberately bare: no retries, no timeouts,
//! so connection failures and backend stalls surface to the caller as-is.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Receive chunk size
const RECV_CHUNK: usize = 1024;

/// Send one request and collect the reply chunks.
///
/// Writes `request` in full, then shuts down the write half so the server
/// sees end-of-request without the socket closing. Reads until the server
/// closes its side; an aborted exchange shows up as zero chunks.
pub async fn send(host: &str, port: u16, request: &[u8]) -> std::io::Result<Vec<Bytes>> {
    let mut stream = TcpStream::connect((host, port)).await?;

    stream.write_all(request).await?;
    stream.shutdown().await?;
    debug!(bytes = request.len(), "Request sent");

    let mut chunks = Vec::new();
    loop {
        let mut buf = BytesMut::with_capacity(RECV_CHUNK);
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            break;
        }
        chunks.push(buf.freeze());
    }

    debug!(chunks = chunks.len(), "Reply complete");
    Ok(chunks)
}
