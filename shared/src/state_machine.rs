//! Link State Machine
//!
//! Tracks the lifecycle of the agent's single outbound collector session
//! and decides when a keep-alive connection has to be recycled.

use crate::limits;

/// Connection state as seen by the link manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Connect attempt succeeded
    Established { at_ms: u64 },
    /// Connect attempt failed or timed out
    ConnectFailed,
    /// A payload was flushed on the open connection
    Delivered { at_ms: u64 },
    /// Keep-alive connection reached the reconnect interval
    IntervalElapsed,
    /// Single-use connection closed after its delivery
    DeliveryClosed,
    /// Transport reported the connection gone
    TransportLost,
    /// Explicit close requested by the owner
    Closed,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid
    Success(LinkState),
    /// Transition was invalid from current state
    Invalid { from: LinkState, event: LinkEvent },
}

/// Connection reuse policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPolicy {
    /// Reuse one connection across cycles
    pub keep_alive: bool,
    /// Maximum age of a reused connection
    pub reconnect_interval_ms: u64,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            keep_alive: true,
            reconnect_interval_ms: limits::RECONNECT_INTERVAL_MS,
        }
    }
}

/// The link state machine
#[derive(Debug)]
pub struct LinkStateMachine {
    current_state: LinkState,
    policy: LinkPolicy,
    established_at_ms: Option<u64>,
    last_used_ms: Option<u64>,
}

impl Default for LinkStateMachine {
    fn default() -> Self {
        Self::new(LinkPolicy::default())
    }
}

impl LinkStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new(policy: LinkPolicy) -> Self {
        Self {
            current_state: LinkState::Disconnected,
            policy,
            established_at_ms: None,
            last_used_ms: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.current_state
    }

    pub fn policy(&self) -> LinkPolicy {
        self.policy
    }

    pub fn is_connected(&self) -> bool {
        self.current_state == LinkState::Connected
    }

    /// When the current connection was established
    pub fn established_at_ms(&self) -> Option<u64> {
        self.established_at_ms
    }

    /// When the current connection last carried a delivery
    pub fn last_used_ms(&self) -> Option<u64> {
        self.last_used_ms
    }

    /// Age of the current connection, if any
    pub fn connection_age_ms(&self, current_time_ms: u64) -> Option<u64> {
        self.established_at_ms
            .map(|at| current_time_ms.saturating_sub(at))
    }

    /// Check if a keep-alive connection has outlived the reconnect interval
    pub fn is_recycle_due(&self, current_time_ms: u64) -> bool {
        if !self.policy.keep_alive || !self.is_connected() {
            return false;
        }
        self.connection_age_ms(current_time_ms)
            .is_some_and(|age| age >= self.policy.reconnect_interval_ms)
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LinkEvent) -> TransitionResult {
        use LinkEvent::*;
        use LinkState::*;

        let next = match (self.current_state, &event) {
            (Disconnected, Established { at_ms }) => {
                self.established_at_ms = Some(*at_ms);
                self.last_used_ms = Some(*at_ms);
                Some(Connected)
            }
            (Disconnected, ConnectFailed) => Some(Disconnected),

            (Connected, Delivered { at_ms }) => {
                self.last_used_ms = Some(*at_ms);
                Some(Connected)
            }

            // Recycling only applies to reused connections
            (Connected, IntervalElapsed) if self.policy.keep_alive => Some(Disconnected),
            (Connected, DeliveryClosed) if !self.policy.keep_alive => Some(Disconnected),

            // Failure and close are accepted from either state
            (_, TransportLost | Closed) => Some(Disconnected),

            _ => None,
        };

        match next {
            Some(state) => {
                if state == Disconnected {
                    self.established_at_ms = None;
                    self.last_used_ms = None;
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }
}
