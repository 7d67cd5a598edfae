use super::{common_label_values, register_gauge, ExportItem};
use crate::types::{MeasurementId, MeasurementResult};
use prometheus::Registry;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct DnsFields {
    #[serde(default)]
    result: Option<DnsReply>,
}

#[derive(Debug, Deserialize)]
struct DnsReply {
    /// Response time in ms
    #[serde(default)]
    rt: Option<f64>,
}

#[derive(Debug)]
pub struct DnsExporter {
    id: MeasurementId,
}

impl DnsExporter {
    pub fn new(id: MeasurementId) -> Self {
        Self { id }
    }

    pub fn export_into(&self, registry: &Registry, items: &[ExportItem]) -> prometheus::Result<()> {
        let success =
            register_gauge(registry, self.id, "atlas_dns_success", "Destination was reachable")?;
        let rtt_gauge = register_gauge(registry, self.id, "atlas_dns_rtt", "Roundtrip time in ms")?;

        for (result, probe) in items {
            let values = common_label_values(result, probe);
            let labels: Vec<&str> = values.iter().map(String::as_str).collect();

            match rtt(result) {
                Some(rt) => {
                    success.with_label_values(&labels).set(1.0);
                    rtt_gauge.with_label_values(&labels).set(rt);
                }
                None => {
                    success.with_label_values(&labels).set(0.0);
                }
            }
        }

        Ok(())
    }
}

pub fn rtt(result: &MeasurementResult) -> Option<f64> {
    result
        .decode_fields::<DnsFields>()
        .and_then(|f| f.result)
        .and_then(|r| r.rt)
        .filter(|rt| *rt > 0.0)
}
