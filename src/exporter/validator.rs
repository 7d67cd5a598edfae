use crate::probes::Probe;
use crate::types::MeasurementResult;

/// Validates a result/probe pair before it reaches the store
pub trait ResultValidator: Send + Sync {
    fn is_valid(&self, result: &MeasurementResult, probe: &Probe) -> bool;
}

/// Rejects results whose address family the probe has no network identity
/// for (e.g. an IPv6 result from a probe without an IPv6 ASN)
pub struct AfCapabilityValidator;

impl ResultValidator for AfCapabilityValidator {
    fn is_valid(&self, result: &MeasurementResult, probe: &Probe) -> bool {
        probe.asn_for_af(result.af).is_some()
    }
}
