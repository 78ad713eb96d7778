//! Link-layer association
//!
//! The agent cannot do anything useful without a network, so association
//! retries until it succeeds. The only way out is missing hardware.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::config::NetworkCredentials;
use crate::error::{AgentError, AgentResult};

/// Link-layer status as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// No radio hardware
    NoModule,
    /// Present but not associated
    Idle,
    /// Associated with an address
    Associated,
}

/// Link-layer (radio) association provider
#[async_trait]
pub trait LinkLayer: Send {
    /// Current association status
    async fn status(&mut self) -> LinkStatus;

    /// Start one association attempt
    async fn begin(&mut self, credentials: &NetworkCredentials) -> LinkStatus;

    /// Address assigned to this device, once associated
    async fn local_address(&mut self) -> Option<IpAddr>;

    /// Whether the radio firmware should be upgraded
    fn firmware_outdated(&self) -> bool {
        false
    }
}

/// Progress of the association procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    Idle,
    Associating { attempt: u32 },
    Associated,
}

/// Drives a `LinkLayer` until it is associated
pub struct Associator {
    credentials: NetworkCredentials,
    retry_delay: Duration,
    state: AssociationState,
    associations: u64,
}

impl Associator {
    pub fn new(credentials: NetworkCredentials, retry_delay: Duration) -> Self {
        Self {
            credentials,
            retry_delay,
            state: AssociationState::Idle,
            associations: 0,
        }
    }

    pub fn state(&self) -> AssociationState {
        self.state
    }

    /// Completed associations since startup
    pub fn associations(&self) -> u64 {
        self.associations
    }

    /// Block until the link layer is associated.
    ///
    /// Retries without limit, waiting `retry_delay` after each failed
    /// attempt. Fails only with `AgentError::NoModule`.
    pub async fn associate<L: LinkLayer + ?Sized>(
        &mut self,
        link: &mut L,
    ) -> AgentResult<Option<IpAddr>> {
        if link.status().await == LinkStatus::NoModule {
            self.state = AssociationState::Idle;
            error!("[NET] Communication with link-layer module failed");
            return Err(AgentError::NoModule);
        }

        if link.firmware_outdated() {
            warn!("[NET] Please upgrade the radio firmware");
        }

        let mut attempt = 0;
        while link.status().await != LinkStatus::Associated {
            attempt += 1;
            self.state = AssociationState::Associating { attempt };
            info!(
                "[NET] Attempting to associate with SSID {} (attempt {})",
                self.credentials.ssid, attempt
            );

            match link.begin(&self.credentials).await {
                LinkStatus::Associated => break,
                LinkStatus::NoModule => {
                    self.state = AssociationState::Idle;
                    error!("[NET] Link-layer module disappeared");
                    return Err(AgentError::NoModule);
                }
                LinkStatus::Idle => {
                    debug!("[NET] Association attempt {} failed", attempt);
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }

        self.state = AssociationState::Associated;
        self.associations += 1;

        let address = link.local_address().await;
        match address {
            Some(ip) => info!("[NET] Associated with {}, address {}", self.credentials.ssid, ip),
            None => info!("[NET] Associated with {}", self.credentials.ssid),
        }
        Ok(address)
    }
}

/// Link layer of a host whose network is managed by the OS.
///
/// Association means "has a route toward the collector": a UDP socket is
/// connected to the collector address, which selects a local address
/// without sending anything.
pub struct HostLink {
    probe_target: String,
}

impl HostLink {
    pub fn new(probe_target: String) -> Self {
        Self { probe_target }
    }

    async fn routed_address(&self) -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(&self.probe_target).await?;
        Ok(socket.local_addr()?.ip())
    }
}

#[async_trait]
impl LinkLayer for HostLink {
    async fn status(&mut self) -> LinkStatus {
        match self.routed_address().await {
            Ok(ip) if !ip.is_unspecified() => LinkStatus::Associated,
            Ok(_) => LinkStatus::Idle,
            Err(e) => {
                debug!("[NET] No route to {}: {}", self.probe_target, e);
                LinkStatus::Idle
            }
        }
    }

    async fn begin(&mut self, credentials: &NetworkCredentials) -> LinkStatus {
        debug!(
            "[NET] Association with {} is handled by the host network stack",
            credentials.ssid
        );
        self.status().await
    }

    async fn local_address(&mut self) -> Option<IpAddr> {
        self.routed_address().await.ok()
    }
}
