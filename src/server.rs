use crate::metrics::ExporterMetrics;
use crate::stream::StreamingStrategy;
use crate::types::MeasurementId;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state for the scrape endpoints
#[derive(Clone)]
pub struct AppState {
    pub strategy: Arc<StreamingStrategy>,
    pub metrics: Arc<ExporterMetrics>,
    pub measurement_ids: Arc<Vec<MeasurementId>>,
    pub telemetry_path: String,
    pub scrape_timeout: Duration,
    pub process_metrics: bool,
}

pub fn router(state: AppState) -> Router {
    let telemetry_path = state.telemetry_path.clone();
    Router::new()
        .route("/", get(index))
        .route(&telemetry_path, get(scrape))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the cancellation token fires
pub async fn serve(
    listen_address: &str,
    app: Router,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr: SocketAddr = listen_address
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html><head><title>RIPE Atlas Exporter</title></head>\
         <body><h1>RIPE Atlas Exporter</h1>\
         <p><a href=\"{0}\">{0}</a></p></body></html>",
        state.telemetry_path
    ))
}

#[derive(Debug, Deserialize)]
struct ScrapeQuery {
    /// Comma separated measurement ids; absent means all configured
    measurement_id: Option<String>,
}

async fn scrape(State(state): State<AppState>, Query(query): Query<ScrapeQuery>) -> Response {
    let ids = match requested_ids(&query, &state.measurement_ids) {
        Ok(ids) => ids,
        Err(bad) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("invalid measurement_id: {bad}\n"),
            )
                .into_response()
        }
    };

    let build_state = state.clone();
    let build = task::spawn_blocking(move || build_scrape(&build_state, &ids));

    match time::timeout(state.scrape_timeout, build).await {
        Ok(Ok(Ok(body))) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type())],
            body,
        )
            .into_response(),
        Ok(Ok(Err(e))) => {
            error!("Scrape failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Ok(Err(e)) => {
            error!("Scrape task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(_) => {
            error!("Scrape timed out after {:?}", state.scrape_timeout);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn requested_ids(
    query: &ScrapeQuery,
    configured: &[MeasurementId],
) -> Result<Vec<MeasurementId>, String> {
    match &query.measurement_id {
        None => Ok(configured.to_vec()),
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<MeasurementId>().map_err(|_| s.to_string()))
            .collect(),
    }
}

/// Gather the requested measurements into a fresh registry and render it
/// in the text exposition format, followed by the exporter's own metrics.
fn build_scrape(state: &AppState, ids: &[MeasurementId]) -> prometheus::Result<Vec<u8>> {
    let timer = state.metrics.scrape_build_duration.start_timer();

    let registry = Registry::new();
    for store in state.strategy.measurement_results(ids) {
        store.collect_into(&registry)?;
    }

    #[cfg(target_os = "linux")]
    if state.process_metrics {
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;
    }

    timer.observe_duration();

    let mut families = registry.gather();
    families.extend(state.metrics.gather());

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    Ok(buffer)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<AppState>) -> Response {
    if state.strategy.is_healthy() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scrape_covers_all_configured_measurements() {
        let query = ScrapeQuery {
            measurement_id: None,
        };
        assert_eq!(requested_ids(&query, &[1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn scrape_can_be_narrowed_to_specific_measurements() {
        let query = ScrapeQuery {
            measurement_id: Some("9001, 9002".to_string()),
        };
        assert_eq!(requested_ids(&query, &[1, 2]).unwrap(), vec![9001, 9002]);
    }

    #[test]
    fn malformed_measurement_ids_are_rejected() {
        let query = ScrapeQuery {
            measurement_id: Some("9001,abc".to_string()),
        };
        assert_eq!(requested_ids(&query, &[]).unwrap_err(), "abc");
    }
}
