//! Averaged sampling of the three probes

use anyhow::Result;
use aquamon_shared::calibration::{ADC_MAX, ADC_RESOLUTION_BITS};
use aquamon_shared::{limits, Channel, Measurements};
use std::time::Duration;
use tracing::{trace, warn};

use super::adc::AnalogInput;

/// Reads each probe through an `AnalogInput` and averages the noise out
pub struct Sampler<A> {
    adc: A,
    samples: u32,
    sample_delay: Duration,
}

impl<A: AnalogInput> Sampler<A> {
    pub fn new(adc: A) -> Self {
        let bits = adc.resolution_bits();
        if bits != ADC_RESOLUTION_BITS {
            warn!(
                "[ADC] Converter reports {} bits, calibration assumes {}",
                bits, ADC_RESOLUTION_BITS
            );
        }
        Self {
            adc,
            samples: limits::SAMPLES_PER_READ,
            sample_delay: Duration::from_millis(limits::SAMPLE_DELAY_MS),
        }
    }

    /// Override the pause between conversions
    pub fn with_sample_delay(mut self, delay: Duration) -> Self {
        self.sample_delay = delay;
        self
    }

    pub fn adc(&self) -> &A {
        &self.adc
    }

    /// Mean of `SAMPLES_PER_READ` conversions, truncated toward zero.
    ///
    /// Any failed conversion fails the whole read.
    pub async fn read_channel(&mut self, channel: Channel) -> Result<u16> {
        let mut sum: u32 = 0;
        for i in 0..self.samples {
            let raw = self.adc.read(channel).await?.min(ADC_MAX);
            sum += raw as u32;
            if i + 1 < self.samples {
                tokio::time::sleep(self.sample_delay).await;
            }
        }
        let mean = (sum / self.samples) as u16;
        trace!("[ADC] {} mean {}", channel, mean);
        Ok(mean)
    }

    /// One full measurement: turbidity, then pH, then conductivity
    pub async fn sample(&mut self) -> Result<Measurements> {
        let turbidity = self.read_channel(Channel::Turbidity).await?;
        let acidity = self.read_channel(Channel::Acidity).await?;
        let conductivity = self.read_channel(Channel::Conductivity).await?;
        Ok(Measurements::from_raw(turbidity, acidity, conductivity))
    }
}
