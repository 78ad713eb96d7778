//! HTTP delivery: write one POST, drain the reply, forget it
//!
//! The response status is never checked. Once the request is flushed the
//! delivery counts as done; waiting for the header block is bounded by the
//! response timeout and a timeout is not an error.

use aquamon_shared::codec::{self, ConnectionPolicy, HeaderScanner};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::config::CollectorEndpoint;
use crate::transport::traits::discard_ready;

/// Errors while talking to the collector
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No open connection")]
    NotConnected,

    #[error("Write failed: {0}")]
    Write(#[source] io::Error),
}

/// How the response wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// End of response headers seen
    Acknowledged,
    /// Budget expired before the headers ended
    TimedOut,
    /// Peer closed before the headers ended
    PeerClosed,
    /// Read failed before the headers ended
    Reset,
}

/// Result of one send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub outcome: DeliveryOutcome,
    /// Request bytes written, head plus body
    pub bytes_sent: usize,
    /// Stream still usable after the drain
    pub connection_open: bool,
    /// Single-use policy: the owner must close the connection now
    pub close_requested: bool,
}

/// Minimal HTTP/1.1 POST transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    host: String,
    path: String,
    policy: ConnectionPolicy,
    response_timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: &CollectorEndpoint, keep_alive: bool, response_timeout: Duration) -> Self {
        Self {
            host: endpoint.host.clone(),
            path: endpoint.path.clone(),
            policy: ConnectionPolicy::from_keep_alive(keep_alive),
            response_timeout,
        }
    }

    /// Send `body` as a JSON POST and drain the response
    pub async fn send<S>(&self, stream: &mut S, body: &[u8]) -> Result<DeliveryReport, TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        let request = codec::encode_request(&self.host, &self.path, self.policy, body);
        let write = async {
            stream.write_all(&request).await?;
            stream.flush().await
        };
        match timeout(self.response_timeout, write).await {
            Ok(result) => result.map_err(TransportError::Write)?,
            Err(_) => {
                return Err(TransportError::Write(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("write stalled for {:?}", self.response_timeout),
                )))
            }
        }

        let outcome = timeout(self.response_timeout, read_response_head(stream))
            .await
            .unwrap_or(DeliveryOutcome::TimedOut);

        // Whatever is already buffered (body, trailing bytes) is thrown away
        let connection_open = match outcome {
            DeliveryOutcome::PeerClosed | DeliveryOutcome::Reset => false,
            _ => discard_ready(stream),
        };

        debug!(
            "[HTTP] {} bytes sent, outcome={:?} open={}",
            request.len(),
            outcome,
            connection_open
        );

        Ok(DeliveryReport {
            outcome,
            bytes_sent: request.len(),
            connection_open,
            close_requested: !self.policy.is_keep_alive(),
        })
    }
}

/// Read until the blank line ending the response headers.
///
/// The request is already flushed, so a failed read only tells the caller
/// the connection is unusable.
async fn read_response_head<S>(stream: &mut S) -> DeliveryOutcome
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut scanner = HeaderScanner::new();
    let mut buf = [0u8; 512];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => return DeliveryOutcome::PeerClosed,
            Ok(n) => n,
            Err(e) => {
                debug!("[HTTP] Response read failed: {}", e);
                return DeliveryOutcome::Reset;
            }
        };
        scanner.feed(&buf[..n]);
        if scanner.is_complete() {
            return DeliveryOutcome::Acknowledged;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aquamon_shared::codec::RequestDecoder;
    use tokio::io::{duplex, DuplexStream};

    fn transport(keep_alive: bool, response_timeout: Duration) -> HttpTransport {
        HttpTransport::new(&CollectorEndpoint::default(), keep_alive, response_timeout)
    }

    async fn read_request(server: &mut DuplexStream) -> aquamon_shared::codec::Request {
        let mut decoder = RequestDecoder::new();
        let mut buf = [0u8; 1024];
        loop {
            if let Some(request) = decoder.decode_next().unwrap() {
                return request;
            }
            let n = server.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed before a full request");
            decoder.extend(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn test_exact_request_bytes() {
        let (mut client, mut server) = duplex(4096);
        let body = br#"{"T":0.0,"PH":0.0,"C":0.0}"#;

        let report = transport(true, Duration::from_millis(50))
            .send(&mut client, body)
            .await
            .unwrap();

        let expected = concat!(
            "POST /water-monitor/publish HTTP/1.1\r\n",
            "Host: 51.92.64.38\r\n",
            "Connection: keep-alive\r\n",
            "Content-Type: application/json\r\n",
            "Content-Length: 26\r\n",
            "\r\n",
            r#"{"T":0.0,"PH":0.0,"C":0.0}"#,
        );
        let mut received = vec![0u8; expected.len()];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected.as_bytes());
        assert_eq!(report.bytes_sent, expected.len());

        // Nothing after the body
        let mut extra = [0u8; 1];
        assert!(futures::FutureExt::now_or_never(server.read(&mut extra)).is_none());
    }

    #[tokio::test]
    async fn test_acknowledged_and_body_discarded() {
        let (mut client, mut server) = duplex(4096);

        let peer = tokio::spawn(async move {
            let request = read_request(&mut server).await;
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 15\r\n\r\n{\"status\":\"ok\"}")
                .await
                .unwrap();
            (request, server)
        });

        let report = transport(true, Duration::from_secs(1))
            .send(&mut client, b"{}")
            .await
            .unwrap();
        let (request, _server) = peer.await.unwrap();

        assert_eq!(report.outcome, DeliveryOutcome::Acknowledged);
        assert!(report.connection_open);
        assert!(!report.close_requested);
        assert_eq!(request.header("Content-Length"), Some("2"));
        assert!(discard_ready(&mut client));
    }

    #[tokio::test]
    async fn test_error_status_is_not_checked() {
        let (mut client, mut server) = duplex(4096);

        tokio::spawn(async move {
            read_request(&mut server).await;
            server
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\n\r\n")
                .await
                .unwrap();
            server
        });

        let report = transport(true, Duration::from_secs(1))
            .send(&mut client, b"{}")
            .await
            .unwrap();
        assert_eq!(report.outcome, DeliveryOutcome::Acknowledged);
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (mut client, _server) = duplex(4096);

        let started = std::time::Instant::now();
        let report = transport(true, Duration::from_millis(50))
            .send(&mut client, b"{}")
            .await
            .unwrap();

        assert_eq!(report.outcome, DeliveryOutcome::TimedOut);
        assert!(report.connection_open);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_peer_close_before_headers() {
        let (mut client, mut server) = duplex(4096);

        tokio::spawn(async move {
            read_request(&mut server).await;
            drop(server);
        });

        let report = transport(false, Duration::from_secs(1))
            .send(&mut client, b"{}")
            .await
            .unwrap();

        assert_eq!(report.outcome, DeliveryOutcome::PeerClosed);
        assert!(!report.connection_open);
        assert!(report.close_requested);
    }

    #[tokio::test]
    async fn test_close_policy_header() {
        let (mut client, mut server) = duplex(4096);

        let peer = tokio::spawn(async move {
            let request = read_request(&mut server).await;
            server.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await.unwrap();
            request
        });

        let report = transport(false, Duration::from_secs(1))
            .send(&mut client, b"{}")
            .await
            .unwrap();
        let request = peer.await.unwrap();

        assert_eq!(request.connection_policy(), ConnectionPolicy::Close);
        assert!(report.close_requested);
    }

    /// Accepts every write, fails every read
    struct ResettingStream {
        written: Vec<u8>,
    }

    impl AsyncRead for ResettingStream {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()))
        }
    }

    impl AsyncWrite for ResettingStream {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<io::Result<usize>> {
            self.written.extend_from_slice(buf);
            std::task::Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_reset_after_flush_is_delivered() {
        let mut stream = ResettingStream { written: Vec::new() };
        let body = br#"{"T":0.0,"PH":0.0,"C":0.0}"#;

        let report = transport(true, Duration::from_secs(1))
            .send(&mut stream, body)
            .await
            .unwrap();

        assert!(stream.written.ends_with(body));
        assert_eq!(report.bytes_sent, stream.written.len());
        assert_eq!(report.outcome, DeliveryOutcome::Reset);
        assert!(!report.connection_open);
    }

    #[tokio::test]
    async fn test_stalled_write_times_out() {
        // Buffer smaller than the request and nobody reading the other end
        let (mut client, _server) = duplex(16);

        let started = std::time::Instant::now();
        let result = transport(true, Duration::from_millis(50))
            .send(&mut client, b"{}")
            .await;

        match result {
            Err(TransportError::Write(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected write timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_write_to_closed_stream_fails() {
        let (mut client, server) = duplex(64);
        drop(server);

        let result = transport(true, Duration::from_millis(50))
            .send(&mut client, b"{}")
            .await;
        assert!(matches!(result, Err(TransportError::Write(_))));
    }
}
