//! Telemetry payload
//!
//! One flat JSON document per cycle with exactly three numeric fields:
//!
//! ```text
//! {"T":<turbidity>,"PH":<pH>,"C":<conductivity>}
//! ```
//!
//! Values are rounded to two decimals and encoded without whitespace, so
//! the Content-Length of a request is always the length of `encode()`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::calibration::{self, round2};

/// Calibrated measurements from one sampling pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurements {
    /// Turbidity (NTU)
    pub turbidity: f64,
    /// Acidity (pH)
    pub acidity: f64,
    /// Conductivity (uS/cm)
    pub conductivity: f64,
}

impl Measurements {
    /// Convert one averaged raw value per channel
    pub fn from_raw(turbidity_raw: u16, acidity_raw: u16, conductivity_raw: u16) -> Self {
        Self {
            turbidity: calibration::turbidity(turbidity_raw),
            acidity: calibration::acidity(acidity_raw),
            conductivity: calibration::conductivity(conductivity_raw),
        }
    }
}

impl fmt::Display for Measurements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T:{:.2};PH:{:.2};C:{:.2}",
            self.turbidity, self.acidity, self.conductivity
        )
    }
}

/// Wire document sent to the collector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    #[serde(rename = "T")]
    pub turbidity: f64,
    #[serde(rename = "PH")]
    pub acidity: f64,
    #[serde(rename = "C")]
    pub conductivity: f64,
}

impl TelemetryPayload {
    /// Round measurements to two decimals for transmission
    pub fn from_measurements(measurements: &Measurements) -> Self {
        Self {
            turbidity: round2(measurements.turbidity),
            acidity: round2(measurements.acidity),
            conductivity: round2(measurements.conductivity),
        }
    }

    /// Compact JSON encoding, field order T, PH, C
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Parse a payload received by the collector
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

impl From<Measurements> for TelemetryPayload {
    fn from(measurements: Measurements) -> Self {
        Self::from_measurements(&measurements)
    }
}
