mod clock;
mod config;
mod error;
mod link;
mod sampler;
mod scheduler;
mod transport;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clock::{Clock, MonotonicClock};
use config::{AdcSource, AgentConfig};
use link::HostLink;
use sampler::{AnalogInput, Sampler, SerialAdc, SimulatedAdc};
use scheduler::Scheduler;
use std::sync::Arc;
use transport::TcpConnector;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = AgentConfig::from_env();

    info!("Water-quality agent starting");
    info!("  Collector: {}{}", config.collector.address(), config.collector.path);
    info!("  Keep-alive: {}", config.keep_alive);
    info!("  Update interval: {:?}", config.update_interval);

    match config.adc.clone() {
        AdcSource::Serial { port, baud } => {
            let adc = SerialAdc::open(&port, baud)?;
            run(config, adc).await
        }
        AdcSource::Simulated => run(config, SimulatedAdc::new()).await,
    }
}

async fn run<A: AnalogInput>(config: AgentConfig, adc: A) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let link_layer = HostLink::new(config.collector.address());
    let connector = TcpConnector::new(config.collector.address(), config.connect_timeout);

    let mut scheduler = Scheduler::new(&config, Sampler::new(adc), link_layer, connector, clock);

    if let Err(e) = scheduler.run().await {
        error!("[MAIN] Agent halted: {}", e);
        return Err(e.into());
    }
    Ok(())
}
