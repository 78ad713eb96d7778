//! Test doubles shared by the agent's unit tests

use anyhow::{anyhow, Result};
use aquamon_shared::codec::{self, ConnectionPolicy, RequestDecoder};
use aquamon_shared::Channel;
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::clock::Clock;
use crate::config::NetworkCredentials;
use crate::link::{LinkLayer, LinkStatus};
use crate::sampler::AnalogInput;
use crate::transport::{TransportConnector, TransportStream};

/// Clock advanced by hand
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

const ACK: &[u8] = br#"{"status":"ok","message":"data received"}"#;

#[derive(Default)]
struct PeerConnection {
    decoder: RequestDecoder,
    outbound: BytesMut,
    severed: bool,
    closing: bool,
    read_waker: Option<Waker>,
}

#[derive(Default)]
struct PeerState {
    bodies: Vec<Bytes>,
    refuse: bool,
    silent: bool,
    connections: Vec<Arc<Mutex<PeerConnection>>>,
}

/// In-process collector answering every request like the real server
#[derive(Clone, Default)]
pub struct CollectorPeer {
    state: Arc<Mutex<PeerState>>,
}

impl CollectorPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent connect attempts fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    /// Stop replying to requests
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().unwrap().silent = silent;
    }

    /// Bodies received so far, in order
    pub fn bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .bodies
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    /// Sever every open connection from the collector side
    pub fn drop_connections(&self) {
        let connections = self.state.lock().unwrap().connections.clone();
        for conn in connections {
            let mut conn = conn.lock().unwrap();
            conn.severed = true;
            if let Some(waker) = conn.read_waker.take() {
                waker.wake();
            }
        }
    }

    fn accept(&self) -> Result<PeerStream> {
        let mut state = self.state.lock().unwrap();
        if state.refuse {
            return Err(anyhow!("connection refused"));
        }
        let conn = Arc::new(Mutex::new(PeerConnection::default()));
        state.connections.push(conn.clone());
        Ok(PeerStream {
            conn,
            peer: self.clone(),
        })
    }
}

/// Client end of an in-memory collector connection
pub struct PeerStream {
    conn: Arc<Mutex<PeerConnection>>,
    peer: CollectorPeer,
}

impl AsyncWrite for PeerStream {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let silent = self.peer.state.lock().unwrap().silent;
        let mut received = Vec::new();
        {
            let mut conn = self.conn.lock().unwrap();
            if conn.severed {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            conn.decoder.extend(buf);
            while let Ok(Some(request)) = conn.decoder.decode_next() {
                let policy = request.connection_policy();
                received.push(request.body);
                if silent {
                    continue;
                }
                let response = codec::encode_response(200, "OK", policy, ACK);
                conn.outbound.extend_from_slice(&response);
                conn.closing = policy == ConnectionPolicy::Close;
            }
            if let Some(waker) = conn.read_waker.take() {
                waker.wake();
            }
        }
        self.peer.state.lock().unwrap().bodies.extend(received);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.conn.lock().unwrap().severed = true;
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for PeerStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let mut conn = self.conn.lock().unwrap();
        if !conn.outbound.is_empty() {
            let n = conn.outbound.len().min(buf.remaining());
            buf.put_slice(&conn.outbound[..n]);
            conn.outbound.advance(n);
            return Poll::Ready(Ok(()));
        }
        if conn.severed || conn.closing {
            // EOF
            return Poll::Ready(Ok(()));
        }
        conn.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

#[async_trait]
impl TransportStream for PeerStream {
    async fn close(&mut self) -> Result<()> {
        self.conn.lock().unwrap().severed = true;
        Ok(())
    }
}

/// Connector handing out in-memory streams to a `CollectorPeer`
pub struct PeerConnector {
    peer: CollectorPeer,
}

impl PeerConnector {
    pub fn new(peer: CollectorPeer) -> Self {
        Self { peer }
    }
}

#[async_trait]
impl TransportConnector for PeerConnector {
    type Stream = PeerStream;

    async fn connect(&self) -> Result<Self::Stream> {
        self.peer.accept()
    }

    fn name(&self) -> &str {
        "test-collector"
    }
}

/// Link layer following a script of association results
pub struct ScriptedLink {
    pub status: LinkStatus,
    pub begin_results: VecDeque<LinkStatus>,
    pub begin_calls: u32,
    pub outdated_firmware: bool,
}

impl ScriptedLink {
    pub fn associated() -> Self {
        Self::with_status(LinkStatus::Associated)
    }

    pub fn with_status(status: LinkStatus) -> Self {
        Self {
            status,
            begin_results: VecDeque::new(),
            begin_calls: 0,
            outdated_firmware: false,
        }
    }

    /// Queue results for the next `begin` calls
    pub fn then(mut self, results: &[LinkStatus]) -> Self {
        self.begin_results.extend(results.iter().copied());
        self
    }
}

#[async_trait]
impl LinkLayer for ScriptedLink {
    async fn status(&mut self) -> LinkStatus {
        self.status
    }

    async fn begin(&mut self, _credentials: &NetworkCredentials) -> LinkStatus {
        self.begin_calls += 1;
        self.status = self.begin_results.pop_front().unwrap_or(LinkStatus::Associated);
        self.status
    }

    async fn local_address(&mut self) -> Option<IpAddr> {
        (self.status == LinkStatus::Associated).then_some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)))
    }

    fn firmware_outdated(&self) -> bool {
        self.outdated_firmware
    }
}

/// ADC returning one fixed value per channel
#[derive(Debug, Clone)]
pub struct FixedAdc {
    pub turbidity: u16,
    pub acidity: u16,
    pub conductivity: u16,
    pub reads: u32,
    pub fail: bool,
}

impl FixedAdc {
    pub fn new(turbidity: u16, acidity: u16, conductivity: u16) -> Self {
        Self {
            turbidity,
            acidity,
            conductivity,
            reads: 0,
            fail: false,
        }
    }
}

#[async_trait]
impl AnalogInput for FixedAdc {
    async fn read(&mut self, channel: Channel) -> Result<u16> {
        if self.fail {
            return Err(anyhow!("no reply from sensor board"));
        }
        self.reads += 1;
        Ok(match channel {
            Channel::Turbidity => self.turbidity,
            Channel::Acidity => self.acidity,
            Channel::Conductivity => self.conductivity,
        })
    }

    fn resolution_bits(&self) -> u8 {
        12
    }
}
