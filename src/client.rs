//! Stream client: the composition root.
//!
//! [`StreamClient`] owns every spawned task (capture driver, transport
//! session, frame pacer, optional render loops) through one cancellation
//! token; there are no ambient globals. All shared state flows through
//! watch channels held here and handed to consumers as receivers.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::CaptureDriver;
use crate::config::ClientConfig;
use crate::demux::Demultiplexer;
use crate::encode::encode_frame;
use crate::error::Result;
use crate::inflight::InFlightSlot;
use crate::protocol::ClientCommand;
use crate::render::{RenderLoop, Surface};
use crate::session::{ConnectionState, Session};
use crate::source::{FrameSource, RawFrame};
use crate::state::{DetectionState, FeatureToggles, TelemetryHistory};
use crate::stream::PacedExt;
use crate::transport::{Connector, WsConnector};

/// Outbound queue depth. Sends are dropped, never buffered deeply, so this
/// only smooths the pacer/session handoff.
const OUTBOUND_QUEUE: usize = 16;

/// Handle to a running streaming client.
///
/// Dropping the handle cancels all tasks and closes the session.
pub struct StreamClient {
    config: ClientConfig,
    state_rx: watch::Receiver<ConnectionState>,
    detection_rx: watch::Receiver<DetectionState>,
    history_rx: watch::Receiver<TelemetryHistory>,
    annotated_rx: watch::Receiver<Option<Arc<[u8]>>>,
    frames_rx: watch::Receiver<Option<Arc<RawFrame>>>,
    toggles_tx: watch::Sender<FeatureToggles>,
    streaming_tx: watch::Sender<bool>,
    outbound_tx: mpsc::Sender<ClientCommand>,
    cancel: CancellationToken,
}

impl StreamClient {
    /// Start streaming to the endpoint derived from `config.base_url` over
    /// WebSocket.
    ///
    /// Returns immediately; connection establishment, pacing, and
    /// reconnection run in background tasks. Observe progress through
    /// [`StreamClient::state_updates`].
    pub async fn connect<S>(config: ClientConfig, source: S) -> Result<Self>
    where
        S: FrameSource,
    {
        Self::with_connector(config, WsConnector, source).await
    }

    /// Start streaming over a custom transport.
    pub async fn with_connector<C, S>(config: ClientConfig, connector: C, source: S) -> Result<Self>
    where
        C: Connector,
        S: FrameSource,
    {
        let endpoint = config.endpoint_url()?;
        info!("Starting stream client against {endpoint}");

        let cancel = CancellationToken::new();
        let slot = Arc::new(InFlightSlot::new());

        let (detection_tx, detection_rx) = watch::channel(DetectionState::default());
        let (history_tx, history_rx) =
            watch::channel(TelemetryHistory::new(config.history_capacity));
        let (annotated_tx, annotated_rx) = watch::channel(None);
        let (toggles_tx, _) = watch::channel(FeatureToggles::default());
        let (streaming_tx, _) = watch::channel(true);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);

        let demux =
            Demultiplexer::new(detection_tx, history_tx, annotated_tx, Arc::clone(&slot));

        let session = Session::spawn(
            connector,
            endpoint,
            config.connect_timeout,
            config.reconnect_delay,
            outbound_rx,
            demux,
            Arc::clone(&slot),
            cancel.clone(),
        );

        let capture = CaptureDriver::spawn(source, cancel.clone());

        Self::spawn_pacer(
            config.clone(),
            capture.frames.clone(),
            session.state.clone(),
            outbound_tx.clone(),
            Arc::clone(&slot),
            cancel.clone(),
        );

        Ok(Self {
            config,
            state_rx: session.state,
            detection_rx,
            history_rx,
            annotated_rx,
            frames_rx: capture.frames,
            toggles_tx,
            streaming_tx,
            outbound_tx,
            cancel,
        })
    }

    /// Frame pacer: camera watch channel -> paced/backpressured stream ->
    /// encode -> outbound queue.
    fn spawn_pacer(
        config: ClientConfig,
        frames_rx: watch::Receiver<Option<Arc<RawFrame>>>,
        state_rx: watch::Receiver<ConnectionState>,
        outbound_tx: mpsc::Sender<ClientCommand>,
        slot: Arc<InFlightSlot>,
        cancel: CancellationToken,
    ) {
        tokio::spawn(async move {
            let frames = WatchStream::new(frames_rx).filter_map(|opt| async move { opt });
            let mut paced = std::pin::pin!(frames.paced(
                config.pacing.interval(),
                Arc::clone(&slot),
                config.frame_watchdog,
            ));

            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = paced.next() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                // No frame send is attempted while the session is not open.
                // The slot was acquired on emission; give it back so pacing
                // resumes as soon as the session reopens.
                if !state_rx.borrow().is_open() {
                    slot.clear();
                    continue;
                }

                match encode_frame(&frame, config.format) {
                    Ok(image) => {
                        if outbound_tx.send(ClientCommand::ProcessFrame { image }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Frame encode failed, tick skipped: {e}");
                        slot.clear();
                    }
                }
            }
            debug!("Pacer task ended");
        });
    }

    /// Attach a drawing surface; spawns a render loop over the shared state.
    pub fn attach_surface<S>(&self, surface: S)
    where
        S: Surface,
    {
        RenderLoop::spawn(
            surface,
            self.config.clone(),
            self.frames_rx.clone(),
            self.annotated_rx.clone(),
            self.detection_rx.clone(),
            self.toggles_tx.subscribe(),
            self.streaming_tx.subscribe(),
            self.cancel.clone(),
        );
    }

    /// Record and transmit feature intent.
    ///
    /// Local intent is recorded regardless; the message itself is dropped
    /// with a warning when the session is not open, matching the send
    /// discipline everywhere else (drop, never buffer).
    pub fn toggle_feature(&self, feature: &str, value: bool) {
        self.toggles_tx.send_modify(|toggles| {
            toggles.set(feature, value);
        });

        if !self.state_rx.borrow().is_open() {
            warn!("Cannot toggle feature {feature:?}: session not open");
            return;
        }

        let command = ClientCommand::ToggleFeature { feature: feature.to_string(), value };
        match self.outbound_tx.try_send(command) {
            Ok(()) => debug!("Toggled {feature}: {value}"),
            Err(e) => warn!("Toggle message dropped: {e}"),
        }
    }

    /// Current connection lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Lifecycle transitions as a stream (yields the current state first).
    pub fn state_updates(&self) -> impl Stream<Item = ConnectionState> + 'static {
        WatchStream::new(self.state_rx.clone())
    }

    /// Snapshot of the latest detection state.
    pub fn detection(&self) -> DetectionState {
        self.detection_rx.borrow().clone()
    }

    /// Detection state changes as a stream.
    pub fn detection_updates(&self) -> impl Stream<Item = DetectionState> + 'static {
        WatchStream::new(self.detection_rx.clone())
    }

    /// Snapshot of the telemetry trend window.
    pub fn history(&self) -> TelemetryHistory {
        self.history_rx.borrow().clone()
    }

    /// Snapshot of last-sent feature intent.
    pub fn feature_toggles(&self) -> FeatureToggles {
        self.toggles_tx.borrow().clone()
    }

    /// Whether render loops are (still) running.
    pub fn is_streaming(&self) -> bool {
        *self.streaming_tx.borrow()
    }

    /// Stop render loops. Transport and telemetry keep running so state
    /// stays fresh if a surface is attached again later.
    pub fn stop_streaming(&self) {
        info!("Streaming stopped by request");
        self.streaming_tx.send_replace(false);
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        debug!("Dropping stream client");
        self.cancel.cancel();
    }
}
