//! Transport trait abstraction for pluggable network backends

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Reads per liveness probe before the stream is assumed open
const MAX_PROBE_READS: usize = 64;

/// A transport stream that can read and write bytes
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Close the transport gracefully
    async fn close(&mut self) -> Result<()>;

    /// Non-blocking liveness check. Discards any stale buffered input.
    fn is_connected(&mut self) -> bool {
        discard_ready(self)
    }
}

/// Factory for creating transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Attempt to connect, returning a stream on success
    async fn connect(&self) -> Result<Self::Stream>;

    /// Human-readable name for this transport
    fn name(&self) -> &str;
}

/// Consume whatever input is already buffered without waiting for more.
///
/// Returns `false` once the peer has closed the stream or it has failed.
pub fn discard_ready<S: AsyncRead + Unpin + ?Sized>(stream: &mut S) -> bool {
    let mut scratch = [0u8; 512];

    for _ in 0..MAX_PROBE_READS {
        match stream.read(&mut scratch).now_or_never() {
            // Nothing buffered, peer still there
            None => return true,
            Some(Ok(0)) => return false,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return false,
        }
    }

    true
}
