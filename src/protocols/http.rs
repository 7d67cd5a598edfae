use super::{common_label_values, register_gauge, ExportItem};
use crate::types::{MeasurementId, MeasurementResult};
use prometheus::Registry;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct HttpFields {
    #[serde(default)]
    result: Vec<HttpRun>,
}

#[derive(Debug, Deserialize)]
struct HttpRun {
    /// HTTP status code
    #[serde(default)]
    res: Option<i64>,
    /// Total request time in ms
    #[serde(default)]
    rt: Option<f64>,
    #[serde(default)]
    bsize: Option<i64>,
    #[serde(default)]
    hsize: Option<i64>,
}

#[derive(Debug)]
pub struct HttpExporter {
    id: MeasurementId,
}

impl HttpExporter {
    pub fn new(id: MeasurementId) -> Self {
        Self { id }
    }

    pub fn export_into(&self, registry: &Registry, items: &[ExportItem]) -> prometheus::Result<()> {
        let success = register_gauge(
            registry,
            self.id,
            "atlas_http_success",
            "Request completed with a response",
        )?;
        let rtt_gauge =
            register_gauge(registry, self.id, "atlas_http_rtt", "Total request time in ms")?;
        let status = register_gauge(
            registry,
            self.id,
            "atlas_http_status",
            "HTTP status code of the response",
        )?;
        let body_size = register_gauge(
            registry,
            self.id,
            "atlas_http_body_size",
            "Response body size in bytes",
        )?;
        let header_size = register_gauge(
            registry,
            self.id,
            "atlas_http_header_size",
            "Response header size in bytes",
        )?;

        for (result, probe) in items {
            let values = common_label_values(result, probe);
            let labels: Vec<&str> = values.iter().map(String::as_str).collect();

            let run = result
                .decode_fields::<HttpFields>()
                .and_then(|f| f.result.into_iter().next());

            match run {
                Some(run) if run.rt.unwrap_or(0.0) > 0.0 => {
                    success.with_label_values(&labels).set(1.0);
                    rtt_gauge
                        .with_label_values(&labels)
                        .set(run.rt.unwrap_or(0.0));
                    if let Some(res) = run.res {
                        status.with_label_values(&labels).set(res as f64);
                    }
                    if let Some(bsize) = run.bsize {
                        body_size.with_label_values(&labels).set(bsize as f64);
                    }
                    if let Some(hsize) = run.hsize {
                        header_size.with_label_values(&labels).set(hsize as f64);
                    }
                }
                _ => {
                    success.with_label_values(&labels).set(0.0);
                }
            }
        }

        Ok(())
    }
}

pub fn rtt(result: &MeasurementResult) -> Option<f64> {
    result
        .decode_fields::<HttpFields>()
        .and_then(|f| f.result.into_iter().next())
        .and_then(|r| r.rt)
        .filter(|rt| *rt > 0.0)
}
