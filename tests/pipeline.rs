//! End-to-end pipeline tests: scripted feed -> workers -> fan-in ->
//! measurement stores -> scrape registry.

use async_trait::async_trait;
use atlas_exporter::metrics::ExporterMetrics;
use atlas_exporter::probes::{Probe, ProbeCache, ProbeError, ProbeLookup};
use atlas_exporter::stream::feed::{FeedError, FeedEvent, ResultFeed};
use atlas_exporter::stream::{StrategySettings, StreamingStrategy};
use atlas_exporter::types::{MeasurementId, MeasurementResult, ProbeId};
use parking_lot::Mutex;
use prometheus::Registry;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Delivers a scripted batch per measurement on first subscribe and keeps
/// the subscription open afterwards, so workers stay connected.
struct ScriptedFeed {
    batches: Mutex<HashMap<MeasurementId, Vec<FeedEvent>>>,
    open: Mutex<Vec<mpsc::Sender<FeedEvent>>>,
}

impl ScriptedFeed {
    fn new(batches: HashMap<MeasurementId, Vec<FeedEvent>>) -> Self {
        Self {
            batches: Mutex::new(batches),
            open: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResultFeed for ScriptedFeed {
    async fn subscribe(
        &self,
        measurement_id: MeasurementId,
    ) -> Result<mpsc::Receiver<FeedEvent>, FeedError> {
        let events = self
            .batches
            .lock()
            .remove(&measurement_id)
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.map_err(|e| {
                FeedError::Subscribe(e.to_string())
            })?;
        }
        // keep the sender alive so the stream does not close
        self.open.lock().push(tx);
        Ok(rx)
    }
}

struct StaticLookup;

#[async_trait]
impl ProbeLookup for StaticLookup {
    async fn probe(&self, id: ProbeId) -> Result<Probe, ProbeError> {
        serde_json::from_value(json!({
            "id": id,
            "asn_v4": 64500,
            "asn_v6": null,
            "country_code": "NL",
            "geometry": { "type": "Point", "coordinates": [4.9, 52.3] }
        }))
        .map_err(ProbeError::Decode)
    }
}

fn ping_event(measurement_id: u64, probe_id: i64, avg: f64) -> FeedEvent {
    let result: MeasurementResult = serde_json::from_value(json!({
        "msm_id": measurement_id, "prb_id": probe_id, "af": 4,
        "timestamp": chrono::Utc::now().timestamp(),
        "type": "ping", "dst_addr": "193.0.14.129",
        "min": avg - 1.0, "avg": avg, "max": avg + 1.0,
        "sent": 3, "rcvd": 3
    }))
    .unwrap();
    FeedEvent::Result(Box::new(result))
}

fn dns_event(measurement_id: u64, probe_id: i64, rt: f64) -> FeedEvent {
    let result: MeasurementResult = serde_json::from_value(json!({
        "msm_id": measurement_id, "prb_id": probe_id, "af": 4,
        "timestamp": chrono::Utc::now().timestamp(),
        "type": "dns",
        "result": { "rt": rt, "size": 42 }
    }))
    .unwrap();
    FeedEvent::Result(Box::new(result))
}

fn start(
    feed: Arc<dyn ResultFeed>,
    ids: &[MeasurementId],
    cancel: CancellationToken,
) -> Arc<StreamingStrategy> {
    let probes = Arc::new(ProbeCache::new(
        Arc::new(StaticLookup),
        Duration::from_secs(300),
    ));
    StreamingStrategy::start(
        ids,
        feed,
        probes,
        Arc::new(ExporterMetrics::new().unwrap()),
        StrategySettings {
            buffer_size: 16,
            filter_invalid_results: true,
            ..Default::default()
        },
        cancel,
    )
}

async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn gauge_value(registry: &Registry, family: &str, probe_id: i64) -> Option<f64> {
    let id = probe_id.to_string();
    registry
        .gather()
        .iter()
        .find(|f| f.get_name() == family)
        .and_then(|f| {
            f.get_metric()
                .iter()
                .find(|m| {
                    m.get_label()
                        .iter()
                        .any(|l| l.get_name() == "probe" && l.get_value() == id)
                })
                .map(|m| m.get_gauge().get_value())
        })
}

#[tokio::test]
async fn results_flow_from_feed_to_scrape_registry() {
    let mut batches = HashMap::new();
    batches.insert(
        1001,
        vec![
            ping_event(1001, 1, 10.0),
            ping_event(1001, 2, 50.0),
            ping_event(1001, 1, 20.0), // replaces the first result of probe 1
        ],
    );
    batches.insert(1002, vec![dns_event(1002, 3, 7.5)]);

    let cancel = CancellationToken::new();
    let strategy = start(
        Arc::new(ScriptedFeed::new(batches)),
        &[1001, 1002],
        cancel.clone(),
    );

    wait_for("both stores to fill", || {
        let stores = strategy.measurement_results(&[1001, 1002]);
        stores.len() == 2 && stores[0].probe_count() == 2 && stores[1].probe_count() == 1
    })
    .await;

    let registry = Registry::new();
    for store in strategy.measurement_results(&[1001, 1002]) {
        store.collect_into(&registry).unwrap();
    }

    assert_eq!(gauge_value(&registry, "atlas_ping_avg_latency", 1), Some(20.0));
    assert_eq!(gauge_value(&registry, "atlas_ping_avg_latency", 2), Some(50.0));
    assert_eq!(gauge_value(&registry, "atlas_dns_rtt", 3), Some(7.5));

    // probe metadata must be attached to every exported sample
    for family in registry.gather() {
        for metric in family.get_metric() {
            let labels: HashMap<&str, &str> = metric
                .get_label()
                .iter()
                .map(|l| (l.get_name(), l.get_value()))
                .collect();
            assert_eq!(labels.get("asn"), Some(&"64500"));
            assert_eq!(labels.get("country_code"), Some(&"NL"));
        }
    }

    cancel.cancel();
}

#[tokio::test]
async fn scrapes_can_request_a_subset_of_measurements() {
    let mut batches = HashMap::new();
    batches.insert(123, vec![ping_event(123, 1, 10.0)]);

    let cancel = CancellationToken::new();
    let strategy = start(Arc::new(ScriptedFeed::new(batches)), &[123], cancel.clone());

    wait_for("store for measurement 123", || {
        !strategy.measurement_results(&[123]).is_empty()
    })
    .await;

    // an id that was never configured is skipped rather than an error
    let stores = strategy.measurement_results(&[123, 999]);
    assert_eq!(stores.len(), 1);

    cancel.cancel();
}

#[tokio::test]
async fn readiness_follows_worker_connectivity() {
    let mut batches = HashMap::new();
    batches.insert(42, vec![ping_event(42, 1, 10.0)]);

    let cancel = CancellationToken::new();
    let strategy = start(Arc::new(ScriptedFeed::new(batches)), &[42], cancel.clone());

    // the feed holds the subscription open, so the worker stays connected
    wait_for("worker to connect", || strategy.is_healthy()).await;

    cancel.cancel();
}

#[tokio::test]
async fn no_workers_means_not_ready() {
    let cancel = CancellationToken::new();
    let strategy = start(
        Arc::new(ScriptedFeed::new(HashMap::new())),
        &[],
        cancel.clone(),
    );
    assert!(!strategy.is_healthy());
    cancel.cancel();
}
