use super::{common_label_values, register_gauge, ExportItem};
use crate::types::{MeasurementId, MeasurementResult};
use prometheus::Registry;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PingFields {
    #[serde(default = "unreachable_rtt")]
    min: f64,
    #[serde(default = "unreachable_rtt")]
    avg: f64,
    #[serde(default = "unreachable_rtt")]
    max: f64,
    #[serde(default)]
    sent: i64,
    #[serde(default)]
    rcvd: i64,
    #[serde(default)]
    dup: i64,
}

fn unreachable_rtt() -> f64 {
    -1.0
}

#[derive(Debug)]
pub struct PingExporter {
    id: MeasurementId,
}

impl PingExporter {
    pub fn new(id: MeasurementId) -> Self {
        Self { id }
    }

    pub fn export_into(&self, registry: &Registry, items: &[ExportItem]) -> prometheus::Result<()> {
        let success =
            register_gauge(registry, self.id, "atlas_ping_success", "Destination was reachable")?;
        let min = register_gauge(registry, self.id, "atlas_ping_min_latency", "Minimum RTT in ms")?;
        let avg = register_gauge(registry, self.id, "atlas_ping_avg_latency", "Average RTT in ms")?;
        let max = register_gauge(registry, self.id, "atlas_ping_max_latency", "Maximum RTT in ms")?;
        let sent =
            register_gauge(registry, self.id, "atlas_ping_sent", "Number of probe packets sent")?;
        let rcvd = register_gauge(
            registry,
            self.id,
            "atlas_ping_received",
            "Number of probe packets received",
        )?;
        let dup = register_gauge(
            registry,
            self.id,
            "atlas_ping_dup",
            "Number of duplicate packets received",
        )?;

        for (result, probe) in items {
            let Some(fields) = result.decode_fields::<PingFields>() else {
                continue;
            };

            let values = common_label_values(result, probe);
            let labels: Vec<&str> = values.iter().map(String::as_str).collect();

            sent.with_label_values(&labels).set(fields.sent as f64);
            rcvd.with_label_values(&labels).set(fields.rcvd as f64);
            dup.with_label_values(&labels).set(fields.dup as f64);

            if fields.max > 0.0 {
                success.with_label_values(&labels).set(1.0);
                min.with_label_values(&labels).set(fields.min);
                avg.with_label_values(&labels).set(fields.avg);
                max.with_label_values(&labels).set(fields.max);
            } else {
                success.with_label_values(&labels).set(0.0);
            }
        }

        Ok(())
    }
}

pub fn rtt(result: &MeasurementResult) -> Option<f64> {
    result
        .decode_fields::<PingFields>()
        .map(|f| f.avg)
        .filter(|rtt| *rtt > 0.0)
}
