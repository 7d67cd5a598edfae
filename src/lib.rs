pub mod config;
pub mod exporter;
pub mod health;
pub mod metrics;
pub mod probes;
pub mod protocols;
pub mod server;
pub mod stream;
pub mod types;

pub use config::{Cli, ConfigError, ExporterConfig};
pub use exporter::{Measurement, ResultValidator, RttHistogram};
pub use health::{HealthMonitor, StreamHealth};
pub use metrics::ExporterMetrics;
pub use probes::{AtlasProbeClient, Probe, ProbeCache, ProbeError, ProbeLookup};
pub use server::AppState;
pub use stream::{AtlasStreamFeed, ResultFeed, StrategySettings, StreamingStrategy};
pub use types::{MeasurementId, MeasurementKind, MeasurementResult, ProbeId};
