use crate::types::{MeasurementId, MeasurementResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

const ATLAS_STREAM_URL: &str = "wss://atlas-stream.ripe.net/stream/";
const FEED_CHANNEL_CAPACITY: usize = 32;

/// Errors raised by a result feed subscription
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("stream connection failed: {0}")]
    Connect(String),

    #[error("stream subscription failed: {0}")]
    Subscribe(String),

    #[error("stream protocol error: {0}")]
    Protocol(String),
}

/// One event from a live subscription.
///
/// The channel closing without a `Fatal` event means the feed ended
/// normally; a `Fatal` event signals a disconnect-class protocol error.
#[derive(Debug)]
pub enum FeedEvent {
    Result(Box<MeasurementResult>),
    Fatal(FeedError),
}

/// Push source of measurement results, one subscription per measurement
#[async_trait]
pub trait ResultFeed: Send + Sync {
    async fn subscribe(
        &self,
        measurement_id: MeasurementId,
    ) -> Result<mpsc::Receiver<FeedEvent>, FeedError>;
}

/// WebSocket client for the RIPE Atlas result stream.
///
/// Frames are JSON arrays of `[event, payload]`; results arrive as
/// `atlas_result` events after an `atlas_subscribe` request.
pub struct AtlasStreamFeed {
    url: String,
}

impl AtlasStreamFeed {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

impl Default for AtlasStreamFeed {
    fn default() -> Self {
        Self::new(ATLAS_STREAM_URL.to_string())
    }
}

#[async_trait]
impl ResultFeed for AtlasStreamFeed {
    async fn subscribe(
        &self,
        measurement_id: MeasurementId,
    ) -> Result<mpsc::Receiver<FeedEvent>, FeedError> {
        let (ws_stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let subscribe = json!([
            "atlas_subscribe",
            { "stream_type": "result", "msm": measurement_id }
        ]);
        write
            .send(Message::Text(subscribe.to_string().into()))
            .await
            .map_err(|e| FeedError::Subscribe(e.to_string()))?;

        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match decode_frame(&text) {
                        Frame::Result(result) => {
                            if tx.send(FeedEvent::Result(result)).await.is_err() {
                                return;
                            }
                        }
                        Frame::Fatal(reason) => {
                            let _ = tx
                                .send(FeedEvent::Fatal(FeedError::Protocol(reason)))
                                .await;
                            return;
                        }
                        Frame::Ignored => {}
                    },
                    Ok(Message::Close(_)) => {
                        debug!("Stream closed by server for measurement {}", measurement_id);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = tx
                            .send(FeedEvent::Fatal(FeedError::Protocol(e.to_string())))
                            .await;
                        return;
                    }
                }
            }
            // channel drops here, which the worker sees as normal closure
        });

        Ok(rx)
    }
}

enum Frame {
    Result(Box<MeasurementResult>),
    Fatal(String),
    Ignored,
}

fn decode_frame(text: &str) -> Frame {
    let (event, payload): (String, Value) = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Ignoring malformed stream frame: {}", e);
            return Frame::Ignored;
        }
    };

    match event.as_str() {
        "atlas_result" => match serde_json::from_value::<MeasurementResult>(payload) {
            Ok(result) => Frame::Result(Box::new(result)),
            Err(e) => {
                warn!("Ignoring unparsable result: {}", e);
                Frame::Ignored
            }
        },
        "atlas_error" => Frame::Fatal(payload.to_string()),
        other => {
            debug!("Ignoring stream event '{}'", other);
            Frame::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_result_frames() {
        let text = r#"["atlas_result", {
            "msm_id": 9001, "prb_id": 42, "af": 4,
            "timestamp": 1700000000, "type": "ping",
            "min": 9.0, "avg": 10.0, "max": 11.0, "sent": 3, "rcvd": 3
        }]"#;

        match decode_frame(text) {
            Frame::Result(result) => {
                assert_eq!(result.measurement_id, 9001);
                assert_eq!(result.probe_id, 42);
            }
            _ => panic!("expected a result frame"),
        }
    }

    #[test]
    fn error_frames_are_fatal() {
        let text = r#"["atlas_error", {"detail": "subscription limit reached"}]"#;
        assert!(matches!(decode_frame(text), Frame::Fatal(_)));
    }

    #[test]
    fn unknown_events_and_garbage_are_ignored() {
        assert!(matches!(
            decode_frame(r#"["atlas_metadata", {}]"#),
            Frame::Ignored
        ));
        assert!(matches!(decode_frame("not json"), Frame::Ignored));
        assert!(matches!(
            decode_frame(r#"["atlas_result", {"broken": true}]"#),
            Frame::Ignored
        ));
    }
}
