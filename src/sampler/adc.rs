//! Analog input sources
//!
//! The probes hang off a sensor microcontroller that answers a tiny line
//! protocol on its serial port: the agent sends `R<pin>\n` and gets the raw
//! 12-bit value back as `<value>\n`.

use anyhow::{anyhow, bail, Context, Result};
use aquamon_shared::calibration::{ADC_MAX, ADC_RESOLUTION_BITS};
use aquamon_shared::Channel;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

/// Upper bound on one request/reply exchange with the sensor board
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Source of raw analog readings
#[async_trait]
pub trait AnalogInput: Send {
    /// One raw conversion of `channel`
    async fn read(&mut self, channel: Channel) -> Result<u16>;

    /// Converter resolution in bits
    fn resolution_bits(&self) -> u8;
}

/// Sensor board reached over a byte stream, normally a serial port
pub struct SerialAdc<S> {
    stream: BufReader<S>,
    line: String,
}

impl SerialAdc<SerialStream> {
    /// Open the board's serial port
    pub fn open(port: &str, baud: u32) -> Result<Self> {
        let stream = tokio_serial::new(port, baud)
            .open_native_async()
            .with_context(|| format!("failed to open {} at {} baud", port, baud))?;
        info!("[ADC] Opened sensor board on {} ({} baud)", port, baud);
        Ok(Self::with_stream(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> SerialAdc<S> {
    pub fn with_stream(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            line: String::new(),
        }
    }

    async fn exchange(&mut self, pin: u8) -> Result<u16> {
        let request = format!("R{}\n", pin);
        self.stream.get_mut().write_all(request.as_bytes()).await?;
        self.stream.get_mut().flush().await?;

        self.line.clear();
        let n = self.stream.read_line(&mut self.line).await?;
        if n == 0 {
            bail!("sensor board closed the port");
        }

        let reply = self.line.trim();
        let value: u16 = reply
            .parse()
            .map_err(|_| anyhow!("unexpected reply {:?} for pin {}", reply, pin))?;
        if value > ADC_MAX {
            bail!("reading {} on pin {} exceeds {}", value, pin, ADC_MAX);
        }
        Ok(value)
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> AnalogInput for SerialAdc<S> {
    async fn read(&mut self, channel: Channel) -> Result<u16> {
        timeout(READ_TIMEOUT, self.exchange(channel.pin()))
            .await
            .map_err(|_| anyhow!("no reply for {} within {:?}", channel, READ_TIMEOUT))?
    }

    fn resolution_bits(&self) -> u8 {
        ADC_RESOLUTION_BITS
    }
}

/// Stand-in for the sensor board when running without hardware.
///
/// Each channel walks a triangle wave across the full scale so every
/// conversion path gets exercised over a few minutes.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAdc {
    step: u32,
}

impl SimulatedAdc {
    pub fn new() -> Self {
        debug!("[ADC] Using simulated sensor board");
        Self::default()
    }
}

#[async_trait]
impl AnalogInput for SimulatedAdc {
    async fn read(&mut self, channel: Channel) -> Result<u16> {
        self.step = self.step.wrapping_add(1);
        let period = 2 * ADC_MAX as u32;
        let offset = channel.pin() as u32 * (ADC_MAX as u32 / 3);
        let phase = (self.step / 30 + offset) % period;
        let value = if phase <= ADC_MAX as u32 {
            phase
        } else {
            period - phase
        };
        Ok(value as u16)
    }

    fn resolution_bits(&self) -> u8 {
        ADC_RESOLUTION_BITS
    }
}
