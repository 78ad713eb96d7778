//! Agent configuration
//!
//! All values are fixed at deploy time. `AgentConfig::from_env` applies
//! overrides once at startup; nothing changes while the agent runs.

use aquamon_shared::{collector, limits, state_machine::LinkPolicy};
use std::env;
use std::fmt;
use std::time::Duration;

/// Link-layer (radio) credentials
#[derive(Clone)]
pub struct NetworkCredentials {
    pub ssid: String,
    pub passphrase: String,
}

impl fmt::Debug for NetworkCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkCredentials")
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Destination of telemetry POSTs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorEndpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl CollectorEndpoint {
    /// `host:port` form for connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for CollectorEndpoint {
    fn default() -> Self {
        Self {
            host: collector::DEFAULT_HOST.into(),
            port: collector::DEFAULT_PORT,
            path: collector::PUBLISH_PATH.into(),
        }
    }
}

/// Where raw analog values come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdcSource {
    /// Sensor microcontroller on a serial line (e.g. "/dev/ttyACM0")
    Serial { port: String, baud: u32 },
    /// Generated values for development without hardware
    Simulated,
}

impl Default for AdcSource {
    fn default() -> Self {
        Self::Serial {
            port: "/dev/ttyACM0".into(),
            baud: 9600,
        }
    }
}

/// Configuration for the telemetry agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Radio credentials used for (re)association
    pub credentials: NetworkCredentials,
    /// Collector host, port and path
    pub collector: CollectorEndpoint,
    /// Minimum time between two sample/send cycles
    pub update_interval: Duration,
    /// Scheduler loop period
    pub tick_period: Duration,
    /// Reuse one connection across cycles
    pub keep_alive: bool,
    /// Maximum lifetime of a reused connection
    pub reconnect_interval: Duration,
    /// Connect attempt bound
    pub connect_timeout: Duration,
    /// Response drain budget
    pub response_timeout: Duration,
    /// Wait between association attempts
    pub association_retry_delay: Duration,
    /// Log readings at info level every N cycles
    pub diagnostics_every: u32,
    /// Analog input source
    pub adc: AdcSource,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            credentials: NetworkCredentials {
                ssid: "aquamon".into(),
                passphrase: String::new(),
            },
            collector: CollectorEndpoint::default(),
            update_interval: Duration::from_millis(limits::UPDATE_INTERVAL_MS),
            tick_period: Duration::from_millis(limits::TICK_PERIOD_MS),
            keep_alive: true,
            reconnect_interval: Duration::from_millis(limits::RECONNECT_INTERVAL_MS),
            connect_timeout: Duration::from_millis(limits::CONNECT_TIMEOUT_MS),
            response_timeout: Duration::from_millis(limits::RESPONSE_TIMEOUT_MS),
            association_retry_delay: Duration::from_millis(limits::ASSOCIATION_RETRY_MS),
            diagnostics_every: 5,
            adc: AdcSource::default(),
        }
    }
}

impl AgentConfig {
    /// Defaults with deploy-time overrides from the environment
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Apply `AQUAMON_*` overrides from a lookup function
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup("AQUAMON_HOST") {
            self.collector.host = host;
        }
        if let Some(port) = lookup("AQUAMON_PORT").and_then(|s| s.parse().ok()) {
            self.collector.port = port;
        }
        if let Some(path) = lookup("AQUAMON_PATH").filter(|p| p.starts_with('/')) {
            self.collector.path = path;
        }
        if let Some(keep_alive) = lookup("AQUAMON_KEEP_ALIVE").and_then(|s| parse_flag(&s)) {
            self.keep_alive = keep_alive;
        }
        if let Some(ssid) = lookup("AQUAMON_SSID") {
            self.credentials.ssid = ssid;
        }
        if let Some(passphrase) = lookup("AQUAMON_PASSPHRASE") {
            self.credentials.passphrase = passphrase;
        }
        match lookup("AQUAMON_ADC_PORT").as_deref() {
            Some("sim") | Some("simulated") => self.adc = AdcSource::Simulated,
            Some(port) => {
                let baud = match &self.adc {
                    AdcSource::Serial { baud, .. } => *baud,
                    AdcSource::Simulated => 9600,
                };
                self.adc = AdcSource::Serial {
                    port: port.to_string(),
                    baud,
                };
            }
            None => {}
        }
        self
    }

    /// Connection reuse policy for the link manager
    pub fn link_policy(&self) -> LinkPolicy {
        LinkPolicy {
            keep_alive: self.keep_alive,
            reconnect_interval_ms: self.reconnect_interval.as_millis() as u64,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
