//! Request routing for the collector

use aquamon_shared::codec::Request;
use aquamon_shared::{collector, TelemetryPayload};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::store::ReadingStore;

/// Status line and JSON body of a reply
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub body: Value,
}

impl Response {
    fn ok(body: Value) -> Self {
        Self { status: 200, reason: "OK", body }
    }

    fn status(status: u16, reason: &'static str, message: &str) -> Self {
        Self {
            status,
            reason,
            body: json!({ "status": "error", "message": message }),
        }
    }

    pub fn encode_body(&self) -> Vec<u8> {
        self.body.to_string().into_bytes()
    }
}

/// Dispatch one request
pub async fn handle(request: &Request, store: &ReadingStore) -> Response {
    match (request.method.as_str(), request.path.as_str()) {
        ("POST", collector::PUBLISH_PATH) => publish(&request.body, store).await,
        ("GET", collector::LATEST_PATH) => latest(store).await,
        ("GET", collector::HEALTH_PATH) => Response::ok(json!({ "status": "healthy" })),
        (_, collector::PUBLISH_PATH) | (_, collector::LATEST_PATH) | (_, collector::HEALTH_PATH) => {
            Response::status(405, "Method Not Allowed", "method not allowed")
        }
        _ => Response::status(404, "Not Found", "not found"),
    }
}

async fn publish(body: &[u8], store: &ReadingStore) -> Response {
    match TelemetryPayload::decode(body) {
        Ok(payload) => {
            info!(
                "[COLLECTOR] T={} PH={} C={}",
                payload.turbidity, payload.acidity, payload.conductivity
            );
            let seq = store.publish(payload).await;
            debug!("[COLLECTOR] Stored reading #{}", seq);
            Response::ok(json!({ "status": "ok", "message": "data received" }))
        }
        // Well-formed JSON without the three numeric fields
        Err(e) if e.is_data() => {
            debug!("[COLLECTOR] Incomplete reading: {}", e);
            Response::ok(json!({ "status": "info", "message": "incomplete data" }))
        }
        Err(e) => {
            warn!("[COLLECTOR] Invalid JSON received: {}", e);
            Response::status(400, "Bad Request", "invalid JSON format")
        }
    }
}

async fn latest(store: &ReadingStore) -> Response {
    match store.latest().await {
        Some((payload, seq)) => {
            debug!("[COLLECTOR] Serving reading #{}", seq);
            Response::ok(json!(payload))
        }
        None => Response::status(404, "Not Found", "no reading received yet"),
    }
}
