use super::{common_label_values, register_gauge, ExportItem};
use crate::types::{MeasurementId, MeasurementResult};
use prometheus::Registry;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct SslCertFields {
    /// Response time in ms
    #[serde(default)]
    rt: Option<f64>,
    /// Time to connect in ms
    #[serde(default)]
    ttc: Option<f64>,
    #[serde(default)]
    alert: Option<Value>,
}

#[derive(Debug)]
pub struct SslCertExporter {
    id: MeasurementId,
}

impl SslCertExporter {
    pub fn new(id: MeasurementId) -> Self {
        Self { id }
    }

    pub fn export_into(&self, registry: &Registry, items: &[ExportItem]) -> prometheus::Result<()> {
        let success = register_gauge(
            registry,
            self.id,
            "atlas_sslcert_success",
            "TLS handshake completed without alert",
        )?;
        let rtt_gauge = register_gauge(registry, self.id, "atlas_sslcert_rtt", "Response time in ms")?;
        let connect_time =
            register_gauge(registry, self.id, "atlas_sslcert_connect_time", "Time to connect in ms")?;

        for (result, probe) in items {
            let values = common_label_values(result, probe);
            let labels: Vec<&str> = values.iter().map(String::as_str).collect();

            let Some(fields) = result.decode_fields::<SslCertFields>() else {
                continue;
            };

            let ok = fields.rt.unwrap_or(0.0) > 0.0 && fields.alert.is_none();
            success
                .with_label_values(&labels)
                .set(if ok { 1.0 } else { 0.0 });

            if let Some(rt) = fields.rt.filter(|rt| *rt > 0.0) {
                rtt_gauge.with_label_values(&labels).set(rt);
            }
            if let Some(ttc) = fields.ttc.filter(|ttc| *ttc > 0.0) {
                connect_time.with_label_values(&labels).set(ttc);
            }
        }

        Ok(())
    }
}

pub fn rtt(result: &MeasurementResult) -> Option<f64> {
    result
        .decode_fields::<SslCertFields>()
        .and_then(|f| f.rt)
        .filter(|rt| *rt > 0.0)
}
