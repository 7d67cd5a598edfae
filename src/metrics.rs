use prometheus::proto::MetricFamily;
use prometheus::{Histogram, HistogramOpts, IntGaugeVec, Opts, Registry};

/// Exporter-internal metrics, constructed once at startup and shared via
/// the application context (no global registry).
pub struct ExporterMetrics {
    registry: Registry,
    /// 1 while the stream for a measurement is connected, 0 otherwise
    pub stream_connected: IntGaugeVec,
    /// Unix timestamp of the last result received per measurement
    pub last_data_timestamp: IntGaugeVec,
    /// Time to gather measurements and build the scrape registry
    pub scrape_build_duration: Histogram,
    build_info: IntGaugeVec,
}

impl ExporterMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let stream_connected = IntGaugeVec::new(
            Opts::new(
                "atlas_exporter_stream_connected",
                "Whether the result stream is connected (1) or not (0) for a measurement",
            ),
            &["measurement_id"],
        )?;
        registry.register(Box::new(stream_connected.clone()))?;

        let last_data_timestamp = IntGaugeVec::new(
            Opts::new(
                "atlas_exporter_last_data_timestamp",
                "Unix timestamp of when data was last received for a measurement",
            ),
            &["measurement_id"],
        )?;
        registry.register(Box::new(last_data_timestamp.clone()))?;

        let scrape_build_duration = Histogram::with_opts(HistogramOpts::new(
            "atlas_exporter_scrape_build_duration_seconds",
            "Time to gather measurements and build the metrics registry",
        ))?;
        registry.register(Box::new(scrape_build_duration.clone()))?;

        let build_info = IntGaugeVec::new(
            Opts::new(
                "atlas_exporter_build_info",
                "Build info. Value is always 1 with a version label",
            ),
            &["version"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry,
            stream_connected,
            last_data_timestamp,
            scrape_build_duration,
            build_info,
        })
    }

    pub fn set_build_info(&self, version: &str) {
        self.build_info.with_label_values(&[version]).set(1);
    }

    /// Current state of all internal metrics, merged into scrape output
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_metrics_appear_in_gather() {
        let metrics = ExporterMetrics::new().unwrap();
        metrics.set_build_info("0.1.0");
        metrics.stream_connected.with_label_values(&["9001"]).set(1);

        let names: Vec<String> = metrics
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();

        assert!(names.contains(&"atlas_exporter_build_info".to_string()));
        assert!(names.contains(&"atlas_exporter_stream_connected".to_string()));
    }
}
