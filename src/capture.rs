//! Capture driver: owns the frame source and publishes the latest frame.
//!
//! The driver task is the single producer for the raw-frame watch channel,
//! which both the frame pacer and the render loop consume with latest-value
//! semantics. Source failure ends the video path only; the rest of the
//! client (overlays, telemetry, transport) keeps running.

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use crate::source::{FrameSource, RawFrame};

/// Result of spawning the capture driver.
pub struct CaptureChannels {
    /// Receiver for the latest raw frame. `None` until the first frame
    /// arrives and again after the source ends.
    pub frames: watch::Receiver<Option<Arc<RawFrame>>>,
}

/// Spawns and manages the frame capture task.
pub struct CaptureDriver;

impl CaptureDriver {
    /// Spawn the capture task for the given source.
    pub fn spawn<S>(source: S, cancel: CancellationToken) -> CaptureChannels
    where
        S: FrameSource,
    {
        let (frame_tx, frame_rx) = watch::channel(None);

        tokio::spawn(async move {
            Self::capture_task(source, frame_tx, cancel).await;
        });

        CaptureChannels { frames: frame_rx }
    }

    async fn capture_task<S>(
        mut source: S,
        frame_tx: watch::Sender<Option<Arc<RawFrame>>>,
        cancel: CancellationToken,
    ) where
        S: FrameSource,
    {
        info!("Capture task started ({}Hz source)", source.frame_rate());
        let mut frame_count = 0u64;
        let mut error_count = 0u32;
        const MAX_ERRORS: u32 = 10;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Capture task cancelled");
                    break;
                }
                result = source.next_frame() => result,
            };

            match result {
                Ok(Some(frame)) => {
                    frame_count += 1;
                    error_count = 0;
                    trace!("Frame {}: seq={}", frame_count, frame.seq);

                    if frame_tx.send(Some(Arc::new(frame))).is_err() {
                        info!("Frame receivers dropped, stopping capture");
                        break;
                    }
                }
                Ok(None) => {
                    info!("Camera source ended after {} frames", frame_count);
                    let _ = frame_tx.send(None);
                    break;
                }
                Err(e) => {
                    // Transient capture hiccups retry with backoff; a run of
                    // them is treated as the camera going away for good.
                    error_count += 1;
                    warn!("Capture error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS {
                        error!("Camera source failed, video path stopped: {}", e);
                        let _ = frame_tx.send(None);
                        break;
                    }

                    let backoff = std::time::Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::test_utils::TestPatternSource;

    struct FailingSource {
        failures_left: u32,
    }

    #[async_trait::async_trait]
    impl FrameSource for FailingSource {
        async fn next_frame(&mut self) -> crate::Result<Option<RawFrame>> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(ClientError::capture_failed("device busy"));
            }
            Ok(None)
        }

        fn frame_rate(&self) -> f64 {
            30.0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_frames_until_source_ends() {
        let cancel = CancellationToken::new();
        let channels = CaptureDriver::spawn(TestPatternSource::new(4, 4, 3), cancel.clone());
        let mut frames = channels.frames;

        let mut seen = Vec::new();
        loop {
            frames.changed().await.expect("capture task should outlive the test loop");
            match frames.borrow_and_update().clone() {
                Some(frame) => seen.push(frame.seq),
                None => break,
            }
        }

        assert_eq!(seen, vec![0, 1, 2]);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_ends_only_the_video_path() {
        let cancel = CancellationToken::new();
        let channels = CaptureDriver::spawn(FailingSource { failures_left: 20 }, cancel.clone());
        let mut frames = channels.frames;

        // The driver gives up after MAX_ERRORS and publishes None.
        frames.changed().await.expect("driver should publish the terminal None");
        assert!(frames.borrow().is_none());
        cancel.cancel();
    }

    #[tokio::test]
    async fn cancellation_stops_the_task() {
        let cancel = CancellationToken::new();
        let channels = CaptureDriver::spawn(TestPatternSource::endless(4, 4), cancel.clone());
        cancel.cancel();

        // After cancellation the sender side is dropped eventually; the
        // receiver either sees a closed channel or no further updates.
        let mut frames = channels.frames;
        let _ = frames.changed().await;
    }
}
