use super::feed::{FeedEvent, ResultFeed};
use crate::health::StreamHealth;
use crate::metrics::ExporterMetrics;
use crate::types::{MeasurementId, MeasurementResult};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff with ±25% jitter.
///
/// Delay doubles per consecutive failure, capped at 60s; the jitter keeps
/// many workers from reconnecting in lockstep after a shared outage.
pub(crate) fn retry_delay(attempt: u32) -> Duration {
    let base = MIN_RETRY_DELAY
        .saturating_mul(1u32 << attempt.min(6))
        .min(MAX_RETRY_DELAY);
    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    base.mul_f64(jitter)
}

/// Maintains one live subscription to one measurement's result feed and
/// forwards everything it receives into the shared fan-in channel.
pub(crate) struct StreamWorker {
    measurement_id: MeasurementId,
    feed: Arc<dyn ResultFeed>,
    result_tx: mpsc::Sender<MeasurementResult>,
    health: Arc<StreamHealth>,
    metrics: Arc<ExporterMetrics>,
    retry_attempt: u32,
}

impl StreamWorker {
    pub(crate) fn new(
        measurement_id: MeasurementId,
        feed: Arc<dyn ResultFeed>,
        result_tx: mpsc::Sender<MeasurementResult>,
        health: Arc<StreamHealth>,
        metrics: Arc<ExporterMetrics>,
    ) -> Self {
        Self {
            measurement_id,
            feed,
            result_tx,
            health,
            metrics,
            retry_attempt: 0,
        }
    }

    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        loop {
            match self.feed.subscribe(self.measurement_id).await {
                Ok(events) => {
                    info!(
                        "Subscribed to results of measurement #{}",
                        self.measurement_id
                    );
                    self.retry_attempt = 0;
                    self.set_connected(true);
                    self.listen(events, &cancel).await;
                    self.set_connected(false);
                    self.retry_attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Subscribe failed for measurement #{}: {}",
                        self.measurement_id, e
                    );
                    self.retry_attempt += 1;
                }
            }

            if cancel.is_cancelled() {
                return;
            }

            let delay = retry_delay(self.retry_attempt);
            debug!(
                "Reconnection attempt {} for measurement #{}, waiting {:?}",
                self.retry_attempt, self.measurement_id, delay
            );
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = time::sleep(delay) => {}
            }
        }
    }

    async fn listen(&self, mut events: mpsc::Receiver<FeedEvent>, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                event = events.recv() => match event {
                    None => {
                        warn!("Stream closed for measurement #{}", self.measurement_id);
                        return;
                    }
                    Some(FeedEvent::Fatal(e)) => {
                        error!(
                            "Fatal stream error for measurement #{}: {}",
                            self.measurement_id, e
                        );
                        return;
                    }
                    Some(FeedEvent::Result(result)) => {
                        // forwarded unvalidated; validation is the store's job
                        if self.result_tx.send(*result).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    fn set_connected(&self, connected: bool) {
        let gauge = self
            .metrics
            .stream_connected
            .with_label_values(&[&self.measurement_id.to_string()]);
        if connected {
            self.health.worker_connected();
            gauge.set(1);
        } else {
            self.health.worker_disconnected();
            gauge.set(0);
        }
    }
}
