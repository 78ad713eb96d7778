//! Sensor calibration
//!
//! Converts raw 12-bit ADC readings into physical units using the linear
//! calibration of the deployed probe set:
//!
//! ```text
//! turbidity    = 1000 * (1 - raw / 4095)   (inverted, NTU)
//! acidity      =   14 * (raw / 4095)       (pH)
//! conductivity = 1500 * (raw / 4095)       (uS/cm)
//! ```

use std::fmt;

/// Full-scale value of the 12-bit ADC
pub const ADC_MAX: u16 = 4095;

/// ADC resolution the calibration was taken at
pub const ADC_RESOLUTION_BITS: u8 = 12;

/// Turbidity reported for a fully dark (raw = 0) reading
pub const TURBIDITY_SCALE: f64 = 1000.0;

/// pH reported at full scale
pub const ACIDITY_SCALE: f64 = 14.0;

/// Conductivity reported at full scale
pub const CONDUCTIVITY_SCALE: f64 = 1500.0;

/// Analog channels wired to the probe array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Turbidity,
    Acidity,
    Conductivity,
}

impl Channel {
    /// Sampling order used for every cycle
    pub const ALL: [Channel; 3] = [Channel::Turbidity, Channel::Acidity, Channel::Conductivity];

    /// Analog pin index (A0..A2)
    pub fn pin(self) -> u8 {
        match self {
            Channel::Turbidity => 0,
            Channel::Acidity => 1,
            Channel::Conductivity => 2,
        }
    }

    /// Field name used in the telemetry document
    pub fn field_name(self) -> &'static str {
        match self {
            Channel::Turbidity => "T",
            Channel::Acidity => "PH",
            Channel::Conductivity => "C",
        }
    }

    /// Apply this channel's calibration to a raw value
    pub fn convert(self, raw: u16) -> f64 {
        match self {
            Channel::Turbidity => turbidity(raw),
            Channel::Acidity => acidity(raw),
            Channel::Conductivity => conductivity(raw),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Turbidity => write!(f, "turbidity"),
            Channel::Acidity => write!(f, "pH"),
            Channel::Conductivity => write!(f, "conductivity"),
        }
    }
}

/// Fraction of full scale; values above `ADC_MAX` are clamped
#[inline]
fn full_scale_fraction(raw: u16) -> f64 {
    raw.min(ADC_MAX) as f64 / ADC_MAX as f64
}

/// Turbidity from a raw reading. Higher raw means clearer water.
pub fn turbidity(raw: u16) -> f64 {
    TURBIDITY_SCALE * (1.0 - full_scale_fraction(raw))
}

/// pH from a raw reading
pub fn acidity(raw: u16) -> f64 {
    ACIDITY_SCALE * full_scale_fraction(raw)
}

/// Conductivity from a raw reading
pub fn conductivity(raw: u16) -> f64 {
    CONDUCTIVITY_SCALE * full_scale_fraction(raw)
}

/// Round to two decimal places, ties away from zero
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
