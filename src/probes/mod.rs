pub mod cache;
pub mod lookup;

pub use cache::{spawn_cache_cleanup, ProbeCache};
pub use lookup::{AtlasProbeClient, ProbeLookup};

use crate::types::ProbeId;
use serde::Deserialize;

/// Errors that can occur while resolving probe metadata
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe lookup request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("probe lookup for {id} returned status {status}")]
    Status { id: ProbeId, status: u16 },

    #[error("probe lookup returned invalid data: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Metadata describing a measurement source, immutable after fetch
#[derive(Debug, Clone, Deserialize)]
pub struct Probe {
    pub id: ProbeId,
    #[serde(default)]
    pub asn_v4: Option<u32>,
    #[serde(default)]
    pub asn_v6: Option<u32>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

/// GeoJSON point, coordinates are [longitude, latitude]
#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

impl Probe {
    /// ASN the probe reports for the given address family, if any
    pub fn asn_for_af(&self, af: u8) -> Option<u32> {
        match af {
            4 => self.asn_v4,
            6 => self.asn_v6,
            _ => None,
        }
    }

    pub fn country_code(&self) -> &str {
        self.country_code.as_deref().unwrap_or("")
    }

    pub fn latitude(&self) -> String {
        self.coordinate(1)
    }

    pub fn longitude(&self) -> String {
        self.coordinate(0)
    }

    fn coordinate(&self, idx: usize) -> String {
        self.geometry
            .as_ref()
            .and_then(|g| g.coordinates.get(idx))
            .map(|c| c.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_probe_from_api_json() {
        let p: Probe = serde_json::from_value(json!({
            "id": 6042,
            "asn_v4": 3320,
            "asn_v6": null,
            "country_code": "DE",
            "geometry": { "type": "Point", "coordinates": [8.6821, 50.1109] }
        }))
        .unwrap();

        assert_eq!(p.id, 6042);
        assert_eq!(p.asn_for_af(4), Some(3320));
        assert_eq!(p.asn_for_af(6), None);
        assert_eq!(p.country_code(), "DE");
        assert_eq!(p.latitude(), "50.1109");
        assert_eq!(p.longitude(), "8.6821");
    }
}
