use super::{Probe, ProbeError};
use crate::types::ProbeId;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const PROBE_API_URL: &str = "https://atlas.ripe.net/api/v2/probes";
const LOOKUP_TIMEOUT_SECS: u64 = 30;

/// External probe metadata lookup
#[async_trait]
pub trait ProbeLookup: Send + Sync {
    /// Fetch metadata for a single probe
    async fn probe(&self, id: ProbeId) -> Result<Probe, ProbeError>;
}

/// Probe metadata client for the RIPE Atlas REST API
pub struct AtlasProbeClient {
    client: reqwest::Client,
    base_url: String,
}

impl AtlasProbeClient {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LOOKUP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: PROBE_API_URL.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_base_url(base_url: String) -> Result<Self, ProbeError> {
        let mut c = Self::new()?;
        c.base_url = base_url;
        Ok(c)
    }
}

#[async_trait]
impl ProbeLookup for AtlasProbeClient {
    async fn probe(&self, id: ProbeId) -> Result<Probe, ProbeError> {
        let url = format!("{}/{}/", self.base_url, id);
        debug!("Fetching probe metadata from {}", url);

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ProbeError::Status {
                id,
                status: resp.status().as_u16(),
            });
        }

        let probe = resp.json::<Probe>().await?;
        Ok(probe)
    }
}
