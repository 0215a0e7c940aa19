//! Result demultiplexer.
//!
//! Interprets each inbound message by field presence and routes it into the
//! shared state channels. This is the only writer of [`DetectionState`],
//! [`TelemetryHistory`], and the annotated-frame channel; it performs no
//! drawing and never throws on partial or malformed input.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::encode::decode_frame_payload;
use crate::inflight::InFlightSlot;
use crate::protocol::{RiskStatus, ServerUpdate};
use crate::state::{DetectionState, TelemetryHistory, wall_clock_ms};

/// Routes inbound result records into shared client state.
pub(crate) struct Demultiplexer {
    detection_tx: watch::Sender<DetectionState>,
    history_tx: watch::Sender<TelemetryHistory>,
    annotated_tx: watch::Sender<Option<Arc<[u8]>>>,
    slot: Arc<InFlightSlot>,
}

impl Demultiplexer {
    pub(crate) fn new(
        detection_tx: watch::Sender<DetectionState>,
        history_tx: watch::Sender<TelemetryHistory>,
        annotated_tx: watch::Sender<Option<Arc<[u8]>>>,
        slot: Arc<InFlightSlot>,
    ) -> Self {
        Self { detection_tx, history_tx, annotated_tx, slot }
    }

    /// Parse and route one inbound text message.
    pub(crate) fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ServerUpdate>(text) {
            Ok(update) => self.apply(update),
            Err(e) => warn!("Discarding malformed server message: {e}"),
        }
    }

    /// Route one parsed update.
    pub(crate) fn apply(&self, update: ServerUpdate) {
        self.apply_at(update, wall_clock_ms());
    }

    fn apply_at(&self, update: ServerUpdate, now_ms: u64) {
        // Any per-frame result (composited frame or detection metadata)
        // answers the frame currently in flight. Feature acks do not.
        let answers_frame =
            update.has_frame_payload() || update.has_telemetry() || update.detections.is_some();

        if let Some(payload) = &update.processed_frame {
            match decode_frame_payload(payload) {
                Ok(bytes) => {
                    self.annotated_tx.send_replace(Some(bytes));
                }
                Err(e) => warn!("Dropping undecodable processed frame: {e}"),
            }
        }

        let has_detection_update = update.has_telemetry()
            || update.status.is_some()
            || update.fps.is_some()
            || update.detections.is_some()
            || update.features.is_some();

        if has_detection_update {
            self.detection_tx.send_modify(|state| {
                if let Some(count) = update.count {
                    state.count = count;
                }
                if let Some(status) = &update.status {
                    state.risk = RiskStatus::classify(status);
                    state.status_text = status.clone();
                }
                if let Some(fps) = update.fps {
                    state.server_fps = Some(fps);
                }
                if let Some(boxes) = &update.detections {
                    state.boxes = boxes.clone();
                }
                if let Some(features) = &update.features {
                    // Last announcement wins per feature; flags the server
                    // stops mentioning keep their previous value.
                    for (name, on) in features {
                        state.features.insert(name.clone(), *on);
                    }
                }
            });
        }

        if let Some(count) = update.count {
            self.history_tx.send_modify(|history| history.append(now_ms, count));
        }

        if answers_frame {
            self.slot.clear();
            debug!("Frame result routed (count={:?})", update.count);
        }
    }
}
