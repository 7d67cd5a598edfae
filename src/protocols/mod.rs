pub mod dns;
pub mod http;
pub mod ntp;
pub mod ping;
pub mod sslcert;
pub mod traceroute;

use crate::probes::Probe;
use crate::types::{MeasurementId, MeasurementKind, MeasurementResult};
use prometheus::{GaugeVec, Opts, Registry};
use std::sync::Arc;

/// One result/probe pair handed to an exporter at collect time
pub type ExportItem = (Arc<MeasurementResult>, Arc<Probe>);

/// Per-sample labels shared by all per-protocol metrics. The measurement
/// id is a const label on each gauge family instead, so stores of the
/// same kind register distinct collectors into one scrape registry and
/// their samples merge by family name at gather time.
const COMMON_LABELS: &[&str] = &[
    "probe",
    "dst_addr",
    "asn",
    "ip_version",
    "country_code",
    "lat",
    "long",
];

#[derive(Debug, thiserror::Error)]
#[error("no metric mapping for measurement type '{kind}' (measurement {id})")]
pub struct UnsupportedMeasurement {
    pub id: MeasurementId,
    pub kind: MeasurementKind,
}

/// Metric renderer for one measurement, fixed at store construction.
///
/// One variant per supported measurement kind; the selection happens once,
/// when the store for a measurement id is created.
#[derive(Debug)]
pub enum ProtocolExporter {
    Ping(ping::PingExporter),
    Dns(dns::DnsExporter),
    Http(http::HttpExporter),
    Ntp(ntp::NtpExporter),
    SslCert(sslcert::SslCertExporter),
    Traceroute(traceroute::TracerouteExporter),
}

impl ProtocolExporter {
    pub fn for_kind(
        kind: MeasurementKind,
        id: MeasurementId,
    ) -> Result<Self, UnsupportedMeasurement> {
        match kind {
            MeasurementKind::Ping => Ok(Self::Ping(ping::PingExporter::new(id))),
            MeasurementKind::Dns => Ok(Self::Dns(dns::DnsExporter::new(id))),
            MeasurementKind::Http => Ok(Self::Http(http::HttpExporter::new(id))),
            MeasurementKind::Ntp => Ok(Self::Ntp(ntp::NtpExporter::new(id))),
            MeasurementKind::Sslcert => Ok(Self::SslCert(sslcert::SslCertExporter::new(id))),
            MeasurementKind::Traceroute => {
                Ok(Self::Traceroute(traceroute::TracerouteExporter::new(id)))
            }
            MeasurementKind::Unsupported => Err(UnsupportedMeasurement { id, kind }),
        }
    }

    /// Render the snapshot into a per-scrape registry
    pub fn export_into(&self, registry: &Registry, items: &[ExportItem]) -> prometheus::Result<()> {
        match self {
            Self::Ping(e) => e.export_into(registry, items),
            Self::Dns(e) => e.export_into(registry, items),
            Self::Http(e) => e.export_into(registry, items),
            Self::Ntp(e) => e.export_into(registry, items),
            Self::SslCert(e) => e.export_into(registry, items),
            Self::Traceroute(e) => e.export_into(registry, items),
        }
    }
}

/// RTT sample a histogram accumulator should observe for this result
pub fn rtt_sample(kind: MeasurementKind, result: &MeasurementResult) -> Option<f64> {
    match kind {
        MeasurementKind::Ping => ping::rtt(result),
        MeasurementKind::Dns => dns::rtt(result),
        MeasurementKind::Http => http::rtt(result),
        MeasurementKind::Ntp => ntp::rtt(result),
        MeasurementKind::Sslcert => sslcert::rtt(result),
        MeasurementKind::Traceroute | MeasurementKind::Unsupported => None,
    }
}

fn common_label_values(result: &MeasurementResult, probe: &Probe) -> Vec<String> {
    vec![
        probe.id.to_string(),
        result.dst_addr().to_string(),
        probe
            .asn_for_af(result.af)
            .map(|a| a.to_string())
            .unwrap_or_default(),
        result.af.to_string(),
        probe.country_code().to_string(),
        probe.latitude(),
        probe.longitude(),
    ]
}

fn register_gauge(
    registry: &Registry,
    id: MeasurementId,
    name: &str,
    help: &str,
) -> prometheus::Result<GaugeVec> {
    let opts = Opts::new(name, help).const_label("measurement", id.to_string());
    let gauge = GaugeVec::new(opts, COMMON_LABELS)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_kind_fails_construction() {
        let err = ProtocolExporter::for_kind(MeasurementKind::Unsupported, 5).unwrap_err();
        assert_eq!(err.id, 5);
    }

    #[test]
    fn all_declared_kinds_have_an_exporter() {
        for kind in [
            MeasurementKind::Ping,
            MeasurementKind::Dns,
            MeasurementKind::Http,
            MeasurementKind::Ntp,
            MeasurementKind::Sslcert,
            MeasurementKind::Traceroute,
        ] {
            assert!(ProtocolExporter::for_kind(kind, 1).is_ok(), "{kind}");
        }
    }
}
