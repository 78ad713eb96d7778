//! Collector for water-quality telemetry
//!
//! Accepts the agent's JSON POSTs over plain HTTP/1.1 and keeps the most
//! recent reading for `GET` queries.

mod routes;
mod session;
mod store;

use aquamon_shared::collector;
use session::CollectorSession;
use store::ReadingStore;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let bind_addr = format!("0.0.0.0:{}", collector::DEFAULT_PORT);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Collector listening on {}", bind_addr);

    let store = ReadingStore::new();

    loop {
        let (socket, addr) = listener.accept().await?;
        info!("Connection from: {}", addr);

        let session = CollectorSession::new(socket, addr, store.clone());
        tokio::spawn(async move {
            let addr = session.addr();
            if let Err(e) = session.run().await {
                warn!("Session {} ended with error: {}", addr, e);
            }
        });
    }
}
