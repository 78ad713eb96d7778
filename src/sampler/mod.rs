//! Sensor sampling: raw analog sources and the averaging sampler

pub mod adc;
pub mod averaging;

pub use adc::{AnalogInput, SerialAdc, SimulatedAdc};
pub use averaging::Sampler;
