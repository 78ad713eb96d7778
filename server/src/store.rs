//! Latest-reading store shared by all collector sessions

use aquamon_shared::TelemetryPayload;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    latest: Option<TelemetryPayload>,
    count: u64,
}

/// Most recent reading published by any agent
#[derive(Clone, Default)]
pub struct ReadingStore {
    inner: Arc<RwLock<Inner>>,
}

impl ReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest reading. Returns how many readings have been
    /// accepted since startup, this one included.
    pub async fn publish(&self, payload: TelemetryPayload) -> u64 {
        let mut inner = self.inner.write().await;
        inner.latest = Some(payload);
        inner.count += 1;
        inner.count
    }

    /// Latest reading together with its sequence number
    pub async fn latest(&self) -> Option<(TelemetryPayload, u64)> {
        let inner = self.inner.read().await;
        inner.latest.map(|payload| (payload, inner.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(turbidity: f64) -> TelemetryPayload {
        TelemetryPayload { turbidity, acidity: 7.0, conductivity: 300.0 }
    }

    #[tokio::test]
    async fn test_latest_replaces_previous() {
        let store = ReadingStore::new();
        assert!(store.latest().await.is_none());

        assert_eq!(store.publish(reading(1.0)).await, 1);
        assert_eq!(store.clone().publish(reading(2.0)).await, 2);

        assert_eq!(store.latest().await, Some((reading(2.0), 2)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reading_and_count_change_together() {
        let store = ReadingStore::new();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 1..=500u32 {
                    store.publish(reading(f64::from(i))).await;
                }
            })
        };

        // Each reading carries its own sequence number, so it must match the count
        for _ in 0..500 {
            if let Some((latest, count)) = store.latest().await {
                assert_eq!(latest.turbidity, count as f64);
            }
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
        assert_eq!(store.latest().await, Some((reading(500.0), 500)));
    }
}
