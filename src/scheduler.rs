//! Fixed-period scheduler
//!
//! One tick every `tick_period`, strictly sequential:
//!
//! 1. Check link-layer association; reassociate (blocking) if it was lost.
//!    A tick that had to reassociate ends there.
//! 2. Recycle the keep-alive connection if it reached the reconnect interval.
//! 3. If the update interval has elapsed, run one sample, encode and send
//!    cycle.
//!
//! Failures inside a cycle drop that cycle's reading and are only logged.
//! Missing link-layer hardware is the one error that stops the loop.

use aquamon_shared::{Measurements, TelemetryPayload};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::AgentConfig;
use crate::error::AgentResult;
use crate::link::{AssociationState, Associator, LinkLayer, LinkManager, LinkStats, LinkStatus};
use crate::sampler::{AnalogInput, Sampler};
use crate::transport::{DeliveryOutcome, HttpTransport, TransportConnector};

/// How one sample/send cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Payload flushed to the collector
    Delivered(DeliveryOutcome),
    /// No connection could be made; reading dropped
    ConnectFailed,
    /// Sensor read failed; nothing sent
    SampleFailed,
    /// Payload could not be encoded; nothing sent
    EncodeFailed,
    /// Connection died while writing; reading dropped
    SendFailed,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reassociated: bool,
    pub recycled: bool,
    pub cycle: Option<CycleOutcome>,
}

pub struct Scheduler<A, L, C: TransportConnector> {
    sampler: Sampler<A>,
    link_layer: L,
    associator: Associator,
    link: LinkManager<C>,
    transport: HttpTransport,
    clock: Arc<dyn Clock>,
    update_interval_ms: u64,
    tick_period: Duration,
    diagnostics_every: u64,
    last_send_ms: Option<u64>,
    cycles: u64,
}

impl<A, L, C> Scheduler<A, L, C>
where
    A: AnalogInput,
    L: LinkLayer,
    C: TransportConnector,
{
    pub fn new(
        config: &AgentConfig,
        sampler: Sampler<A>,
        link_layer: L,
        connector: C,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sampler,
            link_layer,
            associator: Associator::new(config.credentials.clone(), config.association_retry_delay),
            link: LinkManager::new(connector, config.link_policy(), clock.clone()),
            transport: HttpTransport::new(
                &config.collector,
                config.keep_alive,
                config.response_timeout,
            ),
            clock,
            update_interval_ms: config.update_interval.as_millis() as u64,
            tick_period: config.tick_period,
            diagnostics_every: u64::from(config.diagnostics_every.max(1)),
            last_send_ms: None,
            cycles: 0,
        }
    }

    pub fn link_stats(&self) -> LinkStats {
        self.link.stats()
    }

    pub fn association_state(&self) -> AssociationState {
        self.associator.state()
    }

    pub fn link_layer(&self) -> &L {
        &self.link_layer
    }

    /// Cycles started since boot
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Associate, then tick forever. Returns only on missing hardware.
    pub async fn run(&mut self) -> AgentResult<()> {
        self.associator.associate(&mut self.link_layer).await?;

        let mut ticker = interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await?;
        }
    }

    /// One scheduler iteration
    pub async fn tick(&mut self) -> AgentResult<TickReport> {
        let mut report = TickReport::default();

        if self.link_layer.status().await != LinkStatus::Associated {
            warn!("[NET] Link-layer association lost, reassociating");
            // Whatever was open went down with the radio
            self.link.note_failure().await;
            self.associator.associate(&mut self.link_layer).await?;
            report.reassociated = true;
            return Ok(report);
        }

        let now = self.clock.now_ms();
        report.recycled = self.link.maybe_recycle(now).await;

        if self.send_due(now) {
            self.last_send_ms = Some(now);
            report.cycle = Some(self.run_cycle().await);
        }

        Ok(report)
    }

    fn send_due(&self, now_ms: u64) -> bool {
        match self.last_send_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.update_interval_ms,
        }
    }

    async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles += 1;

        let measurements = match self.sampler.sample().await {
            Ok(m) => m,
            Err(e) => {
                warn!("[ADC] Sampling failed, cycle {} dropped: {:#}", self.cycles, e);
                return CycleOutcome::SampleFailed;
            }
        };
        self.log_reading(&measurements);

        let body = match TelemetryPayload::from(measurements).encode() {
            Ok(body) => body,
            Err(e) => {
                warn!("[HTTP] Payload encoding failed: {}", e);
                return CycleOutcome::EncodeFailed;
            }
        };

        if !self.link.ensure_connected().await {
            return CycleOutcome::ConnectFailed;
        }

        let outcome = match self.link.deliver(&self.transport, &body).await {
            Ok(outcome) => {
                if outcome == DeliveryOutcome::TimedOut {
                    debug!("[HTTP] No response within budget, payload already flushed");
                }
                CycleOutcome::Delivered(outcome)
            }
            Err(_) => CycleOutcome::SendFailed,
        };

        debug!("[LINK] {:?}", self.link.stats());
        outcome
    }

    fn log_reading(&self, measurements: &Measurements) {
        if self.cycles % self.diagnostics_every == 0 {
            info!("[ADC] {}", measurements);
        } else {
            debug!("[ADC] {}", measurements);
        }
    }
}
