//! AquaMon Shared Protocol Types
//!
//! This crate provides the calibration, payload encoding, HTTP framing and
//! link state machine shared by the water-quality telemetry agent and the
//! collector server.

pub mod calibration;
pub mod codec;
pub mod payload;
pub mod state_machine;

// Re-export commonly used types at crate root
pub use calibration::Channel;
pub use payload::{Measurements, TelemetryPayload};

/// Timing and sampling parameters for the agent
pub mod limits {
    /// Hardware reads averaged into one raw value per channel
    pub const SAMPLES_PER_READ: u32 = 10;

    /// Delay between consecutive hardware reads in milliseconds
    pub const SAMPLE_DELAY_MS: u64 = 2;

    /// Interval between sample/encode/send cycles in milliseconds
    pub const UPDATE_INTERVAL_MS: u64 = 1000;

    /// Scheduler tick period in milliseconds
    pub const TICK_PERIOD_MS: u64 = 1000;

    /// Maximum lifetime of a reused keep-alive connection
    pub const RECONNECT_INTERVAL_MS: u64 = 60_000;

    /// Time budget for draining the collector's response
    pub const RESPONSE_TIMEOUT_MS: u64 = 1000;

    /// Upper bound on a single connect attempt
    pub const CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Wait between link-layer association attempts
    pub const ASSOCIATION_RETRY_MS: u64 = 5000;
}

/// Default collector endpoint of the deployed device
pub mod collector {
    pub const DEFAULT_HOST: &str = "51.92.64.38";
    pub const DEFAULT_PORT: u16 = 8000;
    pub const PUBLISH_PATH: &str = "/water-monitor/publish";
    pub const LATEST_PATH: &str = "/water-monitor/latest";
    pub const HEALTH_PATH: &str = "/health";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recycle_window_spans_many_cycles() {
        assert!(limits::RECONNECT_INTERVAL_MS > limits::UPDATE_INTERVAL_MS);
        assert_eq!(limits::RECONNECT_INTERVAL_MS / limits::UPDATE_INTERVAL_MS, 60);
    }

    #[test]
    fn test_collector_paths_are_absolute() {
        for path in [collector::PUBLISH_PATH, collector::LATEST_PATH, collector::HEALTH_PATH] {
            assert!(path.starts_with('/'), "{path} must be absolute");
        }
    }
}
