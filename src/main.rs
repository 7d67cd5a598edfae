use atlas_exporter::config::{Cli, ExporterConfig};
use atlas_exporter::metrics::ExporterMetrics;
use atlas_exporter::probes::{spawn_cache_cleanup, AtlasProbeClient, ProbeCache};
use atlas_exporter::server::{self, AppState};
use atlas_exporter::stream::{AtlasStreamFeed, StrategySettings, StreamingStrategy};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ExporterConfig::load(&cli)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("atlas_exporter={}", config.log.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting RIPE Atlas exporter {}", VERSION);

    let measurement_ids = config.measurement_ids();
    if measurement_ids.is_empty() {
        anyhow::bail!("no measurements configured, nothing to export");
    }
    info!("Subscribing to {} measurement(s)", measurement_ids.len());

    let cancel = CancellationToken::new();

    let metrics = Arc::new(ExporterMetrics::new()?);
    metrics.set_build_info(VERSION);

    let probes = Arc::new(ProbeCache::new(
        Arc::new(AtlasProbeClient::new()?),
        config.cache_ttl(),
    ));
    spawn_cache_cleanup(
        probes.clone(),
        config.cache_cleanup_interval(),
        cancel.clone(),
    );

    let strategy = StreamingStrategy::start(
        &measurement_ids,
        Arc::new(AtlasStreamFeed::default()),
        probes,
        metrics.clone(),
        StrategySettings {
            buffer_size: config.streaming.buffer_size,
            filter_invalid_results: config.filter_invalid_results,
            max_result_age: config.max_result_age(),
            health_max_data_age: config.health_max_data_age(),
            histogram_buckets: config.histogram_buckets.clone(),
        },
        cancel.clone(),
    );

    let state = AppState {
        strategy,
        metrics,
        measurement_ids: Arc::new(measurement_ids),
        telemetry_path: config.web.telemetry_path.clone(),
        scrape_timeout: config.request_timeout(),
        process_metrics: config.metrics.process_enabled,
    };
    let app = server::router(state);

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    server::serve(&config.web.listen_address, app, cancel.clone()).await?;

    cancel.cancel();
    info!("Exporter stopped");
    Ok(())
}
