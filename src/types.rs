use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identifier of a configured measurement
pub type MeasurementId = u64;

/// Identifier of a probe reporting results
pub type ProbeId = i64;

/// Kind of a measurement as declared in the result envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    Ping,
    Traceroute,
    Dns,
    Http,
    Ntp,
    Sslcert,
    /// Any kind this exporter has no metric mapping for
    #[serde(other)]
    Unsupported,
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MeasurementKind::Ping => "ping",
            MeasurementKind::Traceroute => "traceroute",
            MeasurementKind::Dns => "dns",
            MeasurementKind::Http => "http",
            MeasurementKind::Ntp => "ntp",
            MeasurementKind::Sslcert => "sslcert",
            MeasurementKind::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// One reported outcome from one probe for one measurement.
///
/// Common envelope fields are typed; everything protocol-specific stays in
/// `fields` and is decoded by the matching protocol exporter.
#[derive(Debug, Clone, Deserialize)]
pub struct MeasurementResult {
    #[serde(rename = "msm_id")]
    pub measurement_id: MeasurementId,
    #[serde(rename = "prb_id")]
    pub probe_id: ProbeId,
    /// Address family (4 or 6)
    #[serde(default)]
    pub af: u8,
    /// Unix timestamp the probe reported the result at
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: MeasurementKind,
    #[serde(default)]
    pub dst_addr: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MeasurementResult {
    /// Decode the protocol-specific fields into a typed payload.
    pub fn decode_fields<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(Value::Object(self.fields.clone())).ok()
    }

    pub fn dst_addr(&self) -> &str {
        self.dst_addr.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_ping_result_envelope() {
        let r: MeasurementResult = serde_json::from_value(json!({
            "msm_id": 9001,
            "prb_id": 42,
            "af": 4,
            "timestamp": 1700000000,
            "type": "ping",
            "dst_addr": "193.0.14.129",
            "min": 9.5,
            "avg": 10.25,
            "max": 12.0,
            "sent": 3,
            "rcvd": 3
        }))
        .unwrap();

        assert_eq!(r.measurement_id, 9001);
        assert_eq!(r.probe_id, 42);
        assert_eq!(r.kind, MeasurementKind::Ping);
        assert_eq!(r.dst_addr(), "193.0.14.129");
        assert_eq!(r.fields.get("avg").and_then(|v| v.as_f64()), Some(10.25));
    }

    #[test]
    fn unknown_type_maps_to_unsupported() {
        let r: MeasurementResult = serde_json::from_value(json!({
            "msm_id": 1,
            "prb_id": 2,
            "timestamp": 1700000000,
            "type": "wifi"
        }))
        .unwrap();

        assert_eq!(r.kind, MeasurementKind::Unsupported);
    }
}
