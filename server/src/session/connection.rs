//! Individual agent connection handling

use anyhow::Result;
use aquamon_shared::codec::{self, CodecError, ConnectionPolicy, Request, RequestDecoder};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::routes;
use crate::store::ReadingStore;

enum Incoming {
    Request(Request),
    Malformed(CodecError),
    Closed,
}

/// Active connection from an agent (or any HTTP client)
pub struct CollectorSession {
    stream: TcpStream,
    addr: SocketAddr,
    store: ReadingStore,
    decoder: RequestDecoder,
    read_buf: Vec<u8>,
    connected_at: Instant,
    served: u64,
}

impl CollectorSession {
    pub fn new(stream: TcpStream, addr: SocketAddr, store: ReadingStore) -> Self {
        Self {
            stream,
            addr,
            store,
            decoder: RequestDecoder::new(),
            read_buf: vec![0u8; 4096],
            connected_at: Instant::now(),
            served: 0,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve requests until the connection ends
    pub async fn run(mut self) -> Result<()> {
        loop {
            let request = match self.recv().await {
                Incoming::Request(request) => request,
                Incoming::Malformed(e) => {
                    warn!("[COLLECTOR] Malformed request from {}: {}", self.addr, e);
                    let body = json!({ "status": "error", "message": e.to_string() }).to_string();
                    let reply = codec::encode_response(400, "Bad Request", ConnectionPolicy::Close, body.as_bytes());
                    self.stream.write_all(&reply).await?;
                    break;
                }
                Incoming::Closed => break,
            };

            let policy = request.connection_policy();
            let response = routes::handle(&request, &self.store).await;
            debug!(
                "[COLLECTOR] {} {} {} -> {}",
                self.addr, request.method, request.path, response.status
            );

            let reply = codec::encode_response(
                response.status,
                response.reason,
                policy,
                &response.encode_body(),
            );
            self.stream.write_all(&reply).await?;
            self.served += 1;

            if policy == ConnectionPolicy::Close {
                break;
            }
        }

        self.stream.shutdown().await.ok();
        info!(
            "[COLLECTOR] {} disconnected after {} requests in {:?}",
            self.addr,
            self.served,
            self.connected_at.elapsed()
        );
        Ok(())
    }

    /// Read the next complete request
    async fn recv(&mut self) -> Incoming {
        loop {
            match self.decoder.decode_next() {
                Ok(Some(request)) => return Incoming::Request(request),
                Ok(None) => {}
                Err(e) => return Incoming::Malformed(e),
            }

            match self.stream.read(&mut self.read_buf).await {
                Ok(0) => return Incoming::Closed,
                Ok(n) => self.decoder.extend(&self.read_buf[..n]),
                Err(e) => {
                    debug!("[COLLECTOR] Read error from {}: {}", self.addr, e);
                    return Incoming::Closed;
                }
            }
        }
    }
}
