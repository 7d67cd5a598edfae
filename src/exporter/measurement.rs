use super::{ResultValidator, RttHistogram};
use crate::probes::Probe;
use crate::protocols::{ExportItem, ProtocolExporter};
use crate::types::{MeasurementResult, ProbeId};
use chrono::Utc;
use parking_lot::RwLock;
use prometheus::Registry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Inner {
    latest: HashMap<ProbeId, Arc<MeasurementResult>>,
    probes: HashMap<ProbeId, Arc<Probe>>,
}

/// Per-measurement aggregation point.
///
/// Retains the latest result and probe per probe id (last write wins) and
/// renders the current state into a per-scrape registry on demand. Writes
/// come from the fan-in consumer, reads from concurrent scrapes; the lock
/// is held only to mutate or snapshot the maps, never while exporting.
pub struct Measurement {
    inner: RwLock<Inner>,
    exporter: ProtocolExporter,
    histograms: Vec<RttHistogram>,
    validator: Option<Box<dyn ResultValidator>>,
    max_result_age: Option<Duration>,
}

impl Measurement {
    pub fn new(exporter: ProtocolExporter) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            exporter,
            histograms: Vec::new(),
            validator: None,
            max_result_age: None,
        }
    }

    pub fn with_histogram(mut self, histogram: RttHistogram) -> Self {
        self.histograms.push(histogram);
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn ResultValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_max_result_age(mut self, age: Duration) -> Self {
        self.max_result_age = Some(age);
        self
    }

    /// Store a result/probe pair, replacing any prior entry for the probe
    pub fn add(&self, result: MeasurementResult, probe: Arc<Probe>) {
        if let Some(validator) = &self.validator {
            if !validator.is_valid(&result, &probe) {
                return;
            }
        }

        for histogram in &self.histograms {
            histogram.observe(&result);
        }

        let result = Arc::new(result);
        let mut inner = self.inner.write();
        inner.latest.insert(result.probe_id, result);
        inner.probes.insert(probe.id, probe);
    }

    /// Render the current state into the given registry.
    ///
    /// The maps are snapshotted under the read lock; the lock is released
    /// before the exporter runs so a slow scrape never blocks ingestion.
    pub fn collect_into(&self, registry: &Registry) -> prometheus::Result<()> {
        let (results, probes) = {
            let inner = self.inner.read();
            let results: Vec<Arc<MeasurementResult>> = inner.latest.values().cloned().collect();
            (results, inner.probes.clone())
        };

        let cutoff = self
            .max_result_age
            .map(|age| Utc::now().timestamp() - age.as_secs() as i64);

        let items: Vec<ExportItem> = results
            .into_iter()
            .filter(|r| cutoff.map_or(true, |c| r.timestamp >= c))
            .filter_map(|r| probes.get(&r.probe_id).cloned().map(|p| (r, p)))
            .collect();

        self.exporter.export_into(registry, &items)?;

        for histogram in &self.histograms {
            registry.register(Box::new(histogram.inner().clone()))?;
        }

        Ok(())
    }

    /// Number of probes with a retained result
    pub fn probe_count(&self) -> usize {
        self.inner.read().latest.len()
    }
}
