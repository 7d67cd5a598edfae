use super::{common_label_values, register_gauge, ExportItem};
use crate::types::MeasurementId;
use prometheus::Registry;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct TracerouteFields {
    #[serde(default)]
    result: Vec<Value>,
    #[serde(default)]
    destination_ip_responded: bool,
}

#[derive(Debug)]
pub struct TracerouteExporter {
    id: MeasurementId,
}

impl TracerouteExporter {
    pub fn new(id: MeasurementId) -> Self {
        Self { id }
    }

    pub fn export_into(&self, registry: &Registry, items: &[ExportItem]) -> prometheus::Result<()> {
        let success = register_gauge(
            registry,
            self.id,
            "atlas_traceroute_success",
            "Destination IP responded",
        )?;
        let hop_count =
            register_gauge(registry, self.id, "atlas_traceroute_hop_count", "Number of hops")?;

        for (result, probe) in items {
            let Some(fields) = result.decode_fields::<TracerouteFields>() else {
                continue;
            };

            let values = common_label_values(result, probe);
            let labels: Vec<&str> = values.iter().map(String::as_str).collect();

            success
                .with_label_values(&labels)
                .set(if fields.destination_ip_responded { 1.0 } else { 0.0 });
            hop_count
                .with_label_values(&labels)
                .set(fields.result.len() as f64);
        }

        Ok(())
    }
}
