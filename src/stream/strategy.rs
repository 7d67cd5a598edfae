use super::feed::ResultFeed;
use super::worker::StreamWorker;
use crate::config::HistogramBuckets;
use crate::exporter::{AfCapabilityValidator, Measurement, RttHistogram};
use crate::health::{HealthMonitor, StreamHealth};
use crate::metrics::ExporterMetrics;
use crate::probes::{ProbeCache, ProbeError};
use crate::protocols::{ProtocolExporter, UnsupportedMeasurement};
use crate::types::{MeasurementId, MeasurementKind, MeasurementResult};
use chrono::Utc;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Knobs the strategy needs from the configuration surface
#[derive(Debug, Clone, Default)]
pub struct StrategySettings {
    pub buffer_size: usize,
    pub filter_invalid_results: bool,
    pub max_result_age: Option<Duration>,
    pub health_max_data_age: Option<Duration>,
    pub histogram_buckets: HistogramBuckets,
}

#[derive(Debug, thiserror::Error)]
enum ProcessError {
    #[error("probe metadata unavailable: {0}")]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedMeasurement),
}

/// Orchestrates one stream worker per configured measurement and fans
/// their results into the per-measurement stores.
pub struct StreamingStrategy {
    measurements: Mutex<HashMap<MeasurementId, Arc<Measurement>>>,
    health: Arc<StreamHealth>,
    monitor: HealthMonitor,
    metrics: Arc<ExporterMetrics>,
    settings: StrategySettings,
}

impl StreamingStrategy {
    /// Launch the workers and the fan-in consumer, all bound to `cancel`
    pub fn start(
        measurement_ids: &[MeasurementId],
        feed: Arc<dyn ResultFeed>,
        probes: Arc<ProbeCache>,
        metrics: Arc<ExporterMetrics>,
        settings: StrategySettings,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let health = Arc::new(StreamHealth::default());
        let monitor = HealthMonitor::new(health.clone(), settings.health_max_data_age);

        let strategy = Arc::new(Self {
            measurements: Mutex::new(HashMap::new()),
            health: health.clone(),
            monitor,
            metrics: metrics.clone(),
            settings,
        });

        // backpressure: workers block on send once the buffer fills
        let (result_tx, result_rx) = mpsc::channel(strategy.settings.buffer_size.max(1));

        for &id in measurement_ids {
            let worker = StreamWorker::new(
                id,
                feed.clone(),
                result_tx.clone(),
                health.clone(),
                metrics.clone(),
            );
            tokio::spawn(worker.run(cancel.clone()));
        }
        drop(result_tx); // the channel closes once the last worker exits

        tokio::spawn(strategy.clone().consume(result_rx, probes));

        strategy
    }

    /// Fan-in consumer. An error while routing one result only drops that
    /// result; a caught fault pauses briefly before resuming. Only channel
    /// closure ends ingestion.
    async fn consume(
        self: Arc<Self>,
        mut results: mpsc::Receiver<MeasurementResult>,
        probes: Arc<ProbeCache>,
    ) {
        while let Some(result) = results.recv().await {
            let id = result.measurement_id;
            match AssertUnwindSafe(self.process(result, &probes))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Dropping result for measurement {}: {}", id, e),
                Err(_) => {
                    error!(
                        "Unexpected fault while processing a result for measurement {}, resuming",
                        id
                    );
                    time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        info!("Result channel closed, stopping consumer");
    }

    async fn process(
        &self,
        result: MeasurementResult,
        probes: &ProbeCache,
    ) -> Result<(), ProcessError> {
        debug!(
            "Got result for {} from probe {}",
            result.measurement_id, result.probe_id
        );

        let now = Utc::now().timestamp();
        self.health.record_ingest(now);
        self.metrics
            .last_data_timestamp
            .with_label_values(&[&result.measurement_id.to_string()])
            .set(now);

        // probe resolution completes before any store lock is taken
        let probe = probes.get(result.probe_id).await?;
        self.add(result, probe)?;
        Ok(())
    }

    fn add(
        &self,
        result: MeasurementResult,
        probe: Arc<crate::probes::Probe>,
    ) -> Result<(), UnsupportedMeasurement> {
        let store = {
            let mut measurements = self.measurements.lock();
            match measurements.entry(result.measurement_id) {
                Entry::Occupied(e) => e.get().clone(),
                Entry::Vacant(v) => {
                    debug!(
                        "Creating store for measurement {} of type '{}'",
                        result.measurement_id, result.kind
                    );
                    let store = Arc::new(self.new_store(&result)?);
                    v.insert(store.clone());
                    store
                }
            }
        };

        store.add(result, probe);
        Ok(())
    }

    fn new_store(&self, result: &MeasurementResult) -> Result<Measurement, UnsupportedMeasurement> {
        let exporter = ProtocolExporter::for_kind(result.kind, result.measurement_id)?;
        let mut store = Measurement::new(exporter);

        if let Some(buckets) = self.rtt_buckets(result.kind) {
            match RttHistogram::new(result.kind, result.measurement_id, result.af, buckets) {
                Ok(histogram) => store = store.with_histogram(histogram),
                Err(e) => warn!(
                    "Skipping RTT histogram for measurement {}: {}",
                    result.measurement_id, e
                ),
            }
        }

        if self.settings.filter_invalid_results {
            store = store.with_validator(Box::new(AfCapabilityValidator));
        }

        if let Some(age) = self.settings.max_result_age {
            store = store.with_max_result_age(age);
        }

        Ok(store)
    }

    fn rtt_buckets(&self, kind: MeasurementKind) -> Option<&[f64]> {
        match kind {
            MeasurementKind::Ping => Some(&self.settings.histogram_buckets.ping),
            MeasurementKind::Dns => Some(&self.settings.histogram_buckets.dns),
            MeasurementKind::Http => Some(&self.settings.histogram_buckets.http),
            _ => None,
        }
    }

    /// Stores for the requested ids; ids with no data yet are skipped
    pub fn measurement_results(&self, ids: &[MeasurementId]) -> Vec<Arc<Measurement>> {
        let measurements = self.measurements.lock();
        ids.iter()
            .filter_map(|id| {
                let store = measurements.get(id).cloned();
                if store.is_none() {
                    debug!("No data for measurement {} yet", id);
                }
                store
            })
            .collect()
    }

    pub fn is_healthy(&self) -> bool {
        self.monitor.is_healthy()
    }
}
