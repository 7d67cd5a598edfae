use super::{common_label_values, register_gauge, ExportItem};
use crate::types::{MeasurementId, MeasurementResult};
use prometheus::Registry;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct NtpFields {
    #[serde(default)]
    result: Vec<NtpRun>,
    #[serde(default)]
    poll: Option<f64>,
    #[serde(default)]
    precision: Option<f64>,
    #[serde(default, rename = "root-delay")]
    root_delay: Option<f64>,
    #[serde(default, rename = "root-dispersion")]
    root_dispersion: Option<f64>,
    #[serde(default)]
    stratum: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct NtpRun {
    #[serde(default)]
    offset: Option<f64>,
    #[serde(default)]
    rtt: Option<f64>,
}

#[derive(Debug)]
pub struct NtpExporter {
    id: MeasurementId,
}

impl NtpExporter {
    pub fn new(id: MeasurementId) -> Self {
        Self { id }
    }

    pub fn export_into(&self, registry: &Registry, items: &[ExportItem]) -> prometheus::Result<()> {
        let success = register_gauge(registry, self.id, "atlas_ntp_success", "NTP server responded")?;
        let rtt_gauge =
            register_gauge(registry, self.id, "atlas_ntp_rtt", "Roundtrip time in seconds")?;
        let offset =
            register_gauge(registry, self.id, "atlas_ntp_offset", "Clock offset in seconds")?;
        let poll = register_gauge(registry, self.id, "atlas_ntp_poll", "Poll interval in seconds")?;
        let precision = register_gauge(
            registry,
            self.id,
            "atlas_ntp_precision",
            "Server clock precision in seconds",
        )?;
        let root_delay =
            register_gauge(registry, self.id, "atlas_ntp_root_delay", "Root delay in seconds")?;
        let root_dispersion = register_gauge(
            registry,
            self.id,
            "atlas_ntp_root_dispersion",
            "Root dispersion in seconds",
        )?;
        let stratum =
            register_gauge(registry, self.id, "atlas_ntp_stratum", "Stratum of the NTP server")?;

        for (result, probe) in items {
            let values = common_label_values(result, probe);
            let labels: Vec<&str> = values.iter().map(String::as_str).collect();

            let Some(fields) = result.decode_fields::<NtpFields>() else {
                continue;
            };

            let run = fields.result.iter().find(|r| r.rtt.is_some());
            match run {
                Some(run) => {
                    success.with_label_values(&labels).set(1.0);
                    if let Some(rtt) = run.rtt {
                        rtt_gauge.with_label_values(&labels).set(rtt);
                    }
                    if let Some(off) = run.offset {
                        offset.with_label_values(&labels).set(off);
                    }
                }
                None => {
                    success.with_label_values(&labels).set(0.0);
                }
            }

            if let Some(v) = fields.poll {
                poll.with_label_values(&labels).set(v);
            }
            if let Some(v) = fields.precision {
                precision.with_label_values(&labels).set(v);
            }
            if let Some(v) = fields.root_delay {
                root_delay.with_label_values(&labels).set(v);
            }
            if let Some(v) = fields.root_dispersion {
                root_dispersion.with_label_values(&labels).set(v);
            }
            if let Some(v) = fields.stratum {
                stratum.with_label_values(&labels).set(v as f64);
            }
        }

        Ok(())
    }
}

pub fn rtt(result: &MeasurementResult) -> Option<f64> {
    result
        .decode_fields::<NtpFields>()
        .and_then(|f| f.result.into_iter().find_map(|r| r.rtt))
        .filter(|rtt| *rtt > 0.0)
}
