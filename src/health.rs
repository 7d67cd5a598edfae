use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Connectivity and freshness counters shared between the stream workers,
/// the fan-in consumer and the readiness endpoint.
///
/// Plain atomics: read far more often than written, no lock needed.
#[derive(Default)]
pub struct StreamHealth {
    connected_workers: AtomicI64,
    /// Unix timestamp of the most recent ingested result, 0 = never
    last_result_unix: AtomicI64,
}

impl StreamHealth {
    pub fn worker_connected(&self) {
        self.connected_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_disconnected(&self) {
        self.connected_workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_ingest(&self, unix_ts: i64) {
        self.last_result_unix.store(unix_ts, Ordering::Relaxed);
    }

    pub fn connected_workers(&self) -> i64 {
        self.connected_workers.load(Ordering::Relaxed)
    }

    pub fn last_ingest(&self) -> Option<i64> {
        match self.last_result_unix.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }
}

/// Collapses worker connectivity and data freshness into one readiness bit
pub struct HealthMonitor {
    health: Arc<StreamHealth>,
    max_data_age: Option<Duration>,
}

impl HealthMonitor {
    pub fn new(health: Arc<StreamHealth>, max_data_age: Option<Duration>) -> Self {
        Self {
            health,
            max_data_age,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy_at(Utc::now().timestamp())
    }

    fn is_healthy_at(&self, now: i64) -> bool {
        if self.health.connected_workers() <= 0 {
            debug!("Health check failed: no connected workers");
            return false;
        }

        if let Some(max_age) = self.max_data_age {
            let Some(last) = self.health.last_ingest() else {
                debug!("Health check failed: no data received yet");
                return false;
            };
            if now - last > max_age.as_secs() as i64 {
                debug!(
                    "Health check failed: data age {}s exceeds max {}s",
                    now - last,
                    max_age.as_secs()
                );
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_when_connected_and_no_age_limit() {
        let health = Arc::new(StreamHealth::default());
        health.worker_connected();

        let monitor = HealthMonitor::new(health, None);
        assert!(monitor.is_healthy());
    }

    #[test]
    fn unhealthy_without_connected_workers() {
        let health = Arc::new(StreamHealth::default());
        health.record_ingest(Utc::now().timestamp());

        let monitor = HealthMonitor::new(health, None);
        assert!(!monitor.is_healthy());
    }

    #[test]
    fn age_limit_requires_data() {
        let health = Arc::new(StreamHealth::default());
        health.worker_connected();

        let monitor = HealthMonitor::new(health, Some(Duration::from_secs(10)));
        assert!(!monitor.is_healthy());
    }

    #[test]
    fn data_freshness_decides_readiness() {
        let now = 1_700_000_000;
        let health = Arc::new(StreamHealth::default());
        health.worker_connected();

        let monitor = HealthMonitor::new(health.clone(), Some(Duration::from_secs(10)));

        health.record_ingest(now - 5);
        assert!(monitor.is_healthy_at(now));

        health.record_ingest(now - 15);
        assert!(!monitor.is_healthy_at(now));
    }

    #[test]
    fn disconnect_brings_count_back_down() {
        let health = Arc::new(StreamHealth::default());
        health.worker_connected();
        health.worker_disconnected();

        let monitor = HealthMonitor::new(health, None);
        assert!(!monitor.is_healthy());
    }
}
