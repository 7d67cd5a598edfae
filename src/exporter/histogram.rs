use crate::protocols;
use crate::types::{MeasurementId, MeasurementKind, MeasurementResult};
use prometheus::{Histogram, HistogramOpts};

/// RTT distribution accumulator for one measurement.
///
/// Fed at add time, so it survives across scrapes; at collect time a clone
/// (sharing the same core) is registered into the per-scrape registry.
pub struct RttHistogram {
    kind: MeasurementKind,
    hist: Histogram,
}

impl RttHistogram {
    pub fn new(
        kind: MeasurementKind,
        measurement_id: MeasurementId,
        ip_version: u8,
        buckets: &[f64],
    ) -> prometheus::Result<Self> {
        let mut opts = HistogramOpts::new(
            format!("atlas_{}_rtt_histogram_ms", kind),
            "Roundtrip time distribution in ms",
        )
        .const_label("measurement", measurement_id.to_string())
        .const_label("ip_version", ip_version.to_string());

        if !buckets.is_empty() {
            opts = opts.buckets(buckets.to_vec());
        }

        Ok(Self {
            kind,
            hist: Histogram::with_opts(opts)?,
        })
    }

    /// Record the result's RTT sample, if the protocol yields one
    pub fn observe(&self, result: &MeasurementResult) {
        if let Some(rtt) = protocols::rtt_sample(self.kind, result) {
            if rtt > 0.0 {
                self.hist.observe(rtt);
            }
        }
    }

    pub fn inner(&self) -> &Histogram {
        &self.hist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn observes_ping_rtt_samples() {
        let h = RttHistogram::new(MeasurementKind::Ping, 77, 4, &[5.0, 50.0, 500.0]).unwrap();

        let ok: MeasurementResult = serde_json::from_value(json!({
            "msm_id": 77, "prb_id": 1, "af": 4, "timestamp": 1700000000,
            "type": "ping", "min": 9.0, "avg": 10.0, "max": 12.0,
            "sent": 3, "rcvd": 3
        }))
        .unwrap();
        let failed: MeasurementResult = serde_json::from_value(json!({
            "msm_id": 77, "prb_id": 2, "af": 4, "timestamp": 1700000000,
            "type": "ping", "min": -1.0, "avg": -1.0, "max": -1.0,
            "sent": 3, "rcvd": 0
        }))
        .unwrap();

        h.observe(&ok);
        h.observe(&failed);

        assert_eq!(h.inner().get_sample_count(), 1);
        assert!((h.inner().get_sample_sum() - 10.0).abs() < f64::EPSILON);
    }
}
