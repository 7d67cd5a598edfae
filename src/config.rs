use clap::Parser;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "ATLAS_";

/// Command line flags; any flag set here overrides file and environment
#[derive(Parser, Debug, Default)]
#[command(
    name = "atlas-exporter",
    about = "Prometheus exporter for RIPE Atlas measurement results"
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(long = "config.file")]
    pub config_file: Option<PathBuf>,

    /// Address on which to expose metrics and web interface
    #[arg(long = "web.listen-address")]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path")]
    pub telemetry_path: Option<String>,

    /// Probe cache time to live in seconds
    #[arg(long = "cache.ttl")]
    pub cache_ttl: Option<u64>,

    /// Interval for probe cache clean up in seconds
    #[arg(long = "cache.cleanup")]
    pub cache_cleanup: Option<u64>,

    /// Timeout for metrics requests in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Size of the shared result channel
    #[arg(long = "streaming.buffer-size")]
    pub buffer_size: Option<usize>,

    /// Max data age for the readiness check in seconds (0 = disabled)
    #[arg(long = "health.max-data-age")]
    pub health_max_data_age: Option<u64>,

    /// Skip results older than this many seconds at collect time (0 = disabled)
    #[arg(long = "max-result-age")]
    pub max_result_age: Option<u64>,

    /// Drop results whose address family the probe has no identity for
    #[arg(long = "filter-invalid-results")]
    pub filter_invalid_results: Option<bool>,

    /// Measurement id to subscribe to (repeatable)
    #[arg(long = "measurement")]
    pub measurements: Vec<u64>,

    /// Log level: trace|debug|info|warn|error
    #[arg(long = "log.level")]
    pub log_level: Option<String>,
}

/// Full exporter configuration.
///
/// Sources are merged once at startup with precedence
/// defaults < config file < environment < flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub web: WebConfig,
    pub cache: CacheConfig,
    pub timeout_seconds: u64,
    pub streaming: StreamingConfig,
    pub health: HealthConfig,
    pub max_result_age_seconds: u64,
    pub filter_invalid_results: bool,
    pub metrics: MetricsConfig,
    pub log: LogConfig,
    pub histogram_buckets: HistogramBuckets,
    pub measurements: Vec<MeasurementConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub listen_address: String,
    pub telemetry_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub cleanup_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub max_data_age_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub process_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

/// RTT histogram bucket boundaries per protocol; empty = library defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistogramBuckets {
    pub ping: Vec<f64>,
    pub dns: Vec<f64>,
    pub http: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeasurementConfig {
    pub id: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            cache: CacheConfig::default(),
            timeout_seconds: 60,
            streaming: StreamingConfig::default(),
            health: HealthConfig::default(),
            max_result_age_seconds: 0,
            filter_invalid_results: true,
            metrics: MetricsConfig::default(),
            log: LogConfig::default(),
            histogram_buckets: HistogramBuckets::default(),
            measurements: Vec::new(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:9400".to_string(),
            telemetry_path: "/metrics".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            cleanup_seconds: 300,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { buffer_size: 100 }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_data_age_seconds: 0,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            process_enabled: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ExporterConfig {
    /// Merge defaults, config file, environment and flags, in that order
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let file_path = cli
            .config_file
            .clone()
            .or_else(|| env::var(format!("{ENV_PREFIX}CONFIG_FILE")).ok().map(PathBuf::from));

        let mut config = match file_path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::File(path.display().to_string(), e.to_string()))?;
                serde_yaml::from_str(&raw)
                    .map_err(|e| ConfigError::File(path.display().to_string(), e.to_string()))?
            }
            None => Self::default(),
        };

        config.apply_env()?;
        config.apply_flags(cli);
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_string("LISTEN_ADDRESS") {
            self.web.listen_address = v;
        }
        if let Some(v) = env_string("TELEMETRY_PATH") {
            self.web.telemetry_path = v;
        }
        if let Some(v) = env_parse("CACHE_TTL")? {
            self.cache.ttl_seconds = v;
        }
        if let Some(v) = env_parse("CACHE_CLEANUP")? {
            self.cache.cleanup_seconds = v;
        }
        if let Some(v) = env_parse("TIMEOUT")? {
            self.timeout_seconds = v;
        }
        if let Some(v) = env_parse("STREAMING_BUFFER_SIZE")? {
            self.streaming.buffer_size = v;
        }
        if let Some(v) = env_parse("HEALTH_MAX_DATA_AGE")? {
            self.health.max_data_age_seconds = v;
        }
        if let Some(v) = env_parse("MAX_RESULT_AGE")? {
            self.max_result_age_seconds = v;
        }
        if let Some(v) = env_parse("FILTER_INVALID_RESULTS")? {
            self.filter_invalid_results = v;
        }
        if let Some(v) = env_string("LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(raw) = env_string("MEASUREMENTS") {
            let mut measurements = Vec::new();
            for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let id = part.parse().map_err(|_| {
                    ConfigError::InvalidValue(format!("{ENV_PREFIX}MEASUREMENTS: '{part}'"))
                })?;
                measurements.push(MeasurementConfig { id });
            }
            self.measurements = measurements;
        }
        Ok(())
    }

    fn apply_flags(&mut self, cli: &Cli) {
        if let Some(v) = &cli.listen_address {
            self.web.listen_address = v.clone();
        }
        if let Some(v) = &cli.telemetry_path {
            self.web.telemetry_path = v.clone();
        }
        if let Some(v) = cli.cache_ttl {
            self.cache.ttl_seconds = v;
        }
        if let Some(v) = cli.cache_cleanup {
            self.cache.cleanup_seconds = v;
        }
        if let Some(v) = cli.timeout {
            self.timeout_seconds = v;
        }
        if let Some(v) = cli.buffer_size {
            self.streaming.buffer_size = v;
        }
        if let Some(v) = cli.health_max_data_age {
            self.health.max_data_age_seconds = v;
        }
        if let Some(v) = cli.max_result_age {
            self.max_result_age_seconds = v;
        }
        if let Some(v) = cli.filter_invalid_results {
            self.filter_invalid_results = v;
        }
        if let Some(v) = &cli.log_level {
            self.log.level = v.clone();
        }
        if !cli.measurements.is_empty() {
            self.measurements = cli
                .measurements
                .iter()
                .map(|&id| MeasurementConfig { id })
                .collect();
        }
    }

    pub fn measurement_ids(&self) -> Vec<u64> {
        self.measurements.iter().map(|m| m.id).collect()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_seconds)
    }

    pub fn cache_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache.cleanup_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn health_max_data_age(&self) -> Option<Duration> {
        match self.health.max_data_age_seconds {
            0 => None,
            s => Some(Duration::from_secs(s)),
        }
    }

    pub fn max_result_age(&self) -> Option<Duration> {
        match self.max_result_age_seconds {
            0 => None,
            s => Some(Duration::from_secs(s)),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{key}")).ok()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{ENV_PREFIX}{key}: '{raw}'"))),
        None => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not load config file {0}: {1}")]
    File(String, String),
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}
