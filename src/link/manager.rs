//! Link manager: sole owner of the collector connection

use aquamon_shared::state_machine::{
    LinkEvent, LinkPolicy, LinkState, LinkStateMachine, TransitionResult,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::transport::{
    DeliveryOutcome, HttpTransport, TransportConnector, TransportError, TransportStream,
};

/// Connection lifecycle counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    /// Successful connect attempts
    pub connects: u64,
    /// Failed or timed-out connect attempts
    pub connect_failures: u64,
    /// Connections torn down for any reason
    pub closes: u64,
    /// Payloads flushed to the collector
    pub deliveries: u64,
}

/// Owns the single outbound connection and its state machine.
///
/// No other component touches the socket; the scheduler goes through
/// `ensure_connected`, `deliver`, `maybe_recycle` and `note_failure`.
pub struct LinkManager<C: TransportConnector> {
    connector: C,
    fsm: LinkStateMachine,
    connection: Option<C::Stream>,
    clock: Arc<dyn Clock>,
    stats: LinkStats,
}

impl<C: TransportConnector> LinkManager<C> {
    pub fn new(connector: C, policy: LinkPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            connector,
            fsm: LinkStateMachine::new(policy),
            connection: None,
            clock,
            stats: LinkStats::default(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.fsm.state()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Make sure a usable connection exists, connecting on demand.
    ///
    /// A connection the transport reports as gone is dropped first and
    /// replaced by a fresh attempt. Returns `false` when the attempt fails;
    /// the caller drops this cycle's reading.
    pub async fn ensure_connected(&mut self) -> bool {
        if let Some(stream) = self.connection.as_mut() {
            if stream.is_connected() {
                return true;
            }
            warn!("[LINK] Collector connection lost");
            self.note_failure().await;
        }

        match self.connector.connect().await {
            Ok(stream) => {
                let now = self.clock.now_ms();
                self.transition(LinkEvent::Established { at_ms: now });
                self.connection = Some(stream);
                self.stats.connects += 1;
                info!("[LINK] Connected to collector {}", self.connector.name());
                true
            }
            Err(e) => {
                self.transition(LinkEvent::ConnectFailed);
                self.stats.connect_failures += 1;
                warn!("[LINK] Connect to {} failed: {}", self.connector.name(), e);
                false
            }
        }
    }

    /// Close a keep-alive connection that has reached the reconnect
    /// interval. Returns whether a connection was recycled.
    pub async fn maybe_recycle(&mut self, now_ms: u64) -> bool {
        if !self.fsm.is_recycle_due(now_ms) {
            return false;
        }

        let age = self.fsm.connection_age_ms(now_ms).unwrap_or_default();
        info!("[LINK] Recycling connection after {} ms", age);
        self.transition(LinkEvent::IntervalElapsed);
        self.release().await;
        true
    }

    /// Force the link down after a transport failure
    pub async fn note_failure(&mut self) {
        self.transition(LinkEvent::TransportLost);
        self.release().await;
    }

    /// Explicitly close the connection, if any
    pub async fn close(&mut self) {
        self.transition(LinkEvent::Closed);
        self.release().await;
    }

    /// Send one payload over the current connection.
    ///
    /// Applies the transport's verdict afterwards: a refreshed keep-alive
    /// connection, a single-use close, or teardown when the stream died.
    pub async fn deliver(
        &mut self,
        transport: &HttpTransport,
        body: &[u8],
    ) -> Result<DeliveryOutcome, TransportError> {
        let stream = self.connection.as_mut().ok_or(TransportError::NotConnected)?;

        let report = match transport.send(stream, body).await {
            Ok(report) => report,
            Err(e) => {
                warn!("[LINK] Delivery failed: {}", e);
                self.note_failure().await;
                return Err(e);
            }
        };

        let now = self.clock.now_ms();
        self.transition(LinkEvent::Delivered { at_ms: now });
        self.stats.deliveries += 1;

        if report.close_requested {
            self.transition(LinkEvent::DeliveryClosed);
            self.release().await;
        } else if !report.connection_open {
            warn!("[LINK] Collector closed the connection");
            self.note_failure().await;
        }

        Ok(report.outcome)
    }

    fn transition(&mut self, event: LinkEvent) {
        if let TransitionResult::Invalid { from, event } = self.fsm.process_event(event) {
            debug!("[LINK] Ignored {:?} in state {:?}", event, from);
        }
    }

    /// Drop the stream, closing it gracefully when possible
    async fn release(&mut self) {
        if let Some(mut stream) = self.connection.take() {
            if let Err(e) = TransportStream::close(&mut stream).await {
                debug!("[LINK] Close error ignored: {}", e);
            }
            self.stats.closes += 1;
            debug!("[LINK] Connection closed ({} total)", self.stats.closes);
        }
    }
}
