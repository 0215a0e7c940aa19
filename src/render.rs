//! Scene planning and the render loop.
//!
//! The render loop is display-synchronized and decoupled from network
//! cadence: every tick it reads whatever shared state is current and builds
//! a declarative [`Scene`] for the [`Surface`] collaborator, which owns the
//! actual drawing primitives. Stale state renders unchanged through an
//! outage — the loop never stops because of transport state.
//!
//! Flashing elements are a pure function of wall-clock time modulo a fixed
//! period, so they carry no timer state and resume trivially.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::BoundingBox;
use crate::source::RawFrame;
use crate::state::{DetectionState, FeatureToggles, wall_clock_ms};

/// Drawing collaborator. Implementations own the canvas/backing store.
pub trait Surface: Send + 'static {
    /// Present one composed scene. Errors are logged by the render loop and
    /// the tick is skipped; they never propagate further.
    fn present(&mut self, scene: &Scene) -> Result<()>;
}

/// What fills the frame behind the overlays.
#[derive(Debug, Clone)]
pub enum BaseLayer {
    /// Latest raw camera frame (low-latency path).
    Live(Arc<RawFrame>),
    /// Last server-composited frame, as JPEG bytes.
    Composited(Arc<[u8]>),
    /// Nothing to show yet.
    Absent,
}

/// Overlay for a named feature toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureOverlay {
    NightVision,
    RegionOfInterest,
    HeatmapView,
    FlowArrows,
    SirenFlash,
    RecordIndicator,
    LoiteringScan,
    /// Fallback for features with no dedicated overlay.
    Label(String),
}

/// One overlay drawing instruction, back to front.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    CornerBrackets,
    Crosshair,
    Clock(String),
    CameraLabel(String),
    HudStats { count: u32, fps: Option<f64> },
    DetectionBox(BoundingBox),
    Feature(FeatureOverlay),
    WarningBorder,
    WarningBanner(String),
}

/// A fully planned frame: base layer plus ordered overlay ops.
#[derive(Debug, Clone)]
pub struct Scene {
    pub base: BaseLayer,
    pub ops: Vec<DrawOp>,
}

/// Flash phase for the given instant. On for the first half of each period.
pub fn flash_on(now_ms: u64, period: Duration) -> bool {
    let period_ms = (period.as_millis() as u64).max(1);
    (now_ms / period_ms) % 2 == 0
}

/// Build the scene for one render tick.
///
/// Pure: everything time-dependent comes in through `now_ms` and
/// `clock_text`.
pub fn plan_scene(
    detection: &DetectionState,
    toggles: &FeatureToggles,
    base: BaseLayer,
    camera_label: &str,
    clock_text: String,
    now_ms: u64,
    flash_period: Duration,
) -> Scene {
    let mut ops = vec![
        DrawOp::CornerBrackets,
        DrawOp::Crosshair,
        DrawOp::Clock(clock_text),
        DrawOp::CameraLabel(camera_label.to_string()),
        DrawOp::HudStats { count: detection.count, fps: detection.server_fps },
    ];

    for boxed in &detection.boxes {
        ops.push(DrawOp::DetectionBox(*boxed));
    }

    // Union of last-sent intent and server-announced flags; either side
    // turning a feature on shows its overlay.
    let mut active: BTreeSet<&str> = toggles.active().collect();
    active.extend(
        detection.features.iter().filter(|(_, on)| **on).map(|(name, _)| name.as_str()),
    );
    for name in active {
        if let Some(overlay) = feature_overlay(name, now_ms, flash_period) {
            ops.push(DrawOp::Feature(overlay));
        }
    }

    if detection.risk.is_warning() && flash_on(now_ms, flash_period) {
        ops.push(DrawOp::WarningBorder);
        ops.push(DrawOp::WarningBanner(detection.status_text.clone()));
    }

    Scene { base, ops }
}

fn feature_overlay(name: &str, now_ms: u64, flash_period: Duration) -> Option<FeatureOverlay> {
    match name {
        "Night Vision Mode" => Some(FeatureOverlay::NightVision),
        "Region of Interest" => Some(FeatureOverlay::RegionOfInterest),
        "Heatmap View" => Some(FeatureOverlay::HeatmapView),
        "Flow Analysis" => Some(FeatureOverlay::FlowArrows),
        "Siren Trigger" => flash_on(now_ms, flash_period).then_some(FeatureOverlay::SirenFlash),
        "Auto-Snapshot" => Some(FeatureOverlay::RecordIndicator),
        "Loitering Detection" => Some(FeatureOverlay::LoiteringScan),
        other => Some(FeatureOverlay::Label(other.to_string())),
    }
}

/// Spawns and manages the render loop task.
pub(crate) struct RenderLoop;

impl RenderLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn<S>(
        surface: S,
        config: ClientConfig,
        frames: watch::Receiver<Option<Arc<RawFrame>>>,
        annotated: watch::Receiver<Option<Arc<[u8]>>>,
        detection: watch::Receiver<DetectionState>,
        toggles: watch::Receiver<FeatureToggles>,
        streaming: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) where
        S: Surface,
    {
        tokio::spawn(async move {
            Self::render_task(surface, config, frames, annotated, detection, toggles, streaming, cancel)
                .await;
        });
    }

    #[allow(clippy::too_many_arguments)]
    async fn render_task<S>(
        mut surface: S,
        config: ClientConfig,
        frames: watch::Receiver<Option<Arc<RawFrame>>>,
        annotated: watch::Receiver<Option<Arc<[u8]>>>,
        detection: watch::Receiver<DetectionState>,
        toggles: watch::Receiver<FeatureToggles>,
        streaming: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) where
        S: Surface,
    {
        let mut ticker = tokio::time::interval(config.refresh_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Render loop started at {}Hz", config.refresh_hz);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // The loop ends only on the local streaming flag, never on
            // transport state; stale overlays keep rendering through outages.
            if !*streaming.borrow() {
                info!("Streaming stopped, render loop ending");
                break;
            }

            let base = if config.pacing.uses_processed_frames() {
                match annotated.borrow().clone() {
                    Some(bytes) => BaseLayer::Composited(bytes),
                    // No server frame yet; show the live feed rather than black.
                    None => live_or_absent(&frames),
                }
            } else {
                live_or_absent(&frames)
            };

            let detection_snapshot = detection.borrow().clone();
            let toggles_snapshot = toggles.borrow().clone();
            let clock_text = chrono::Local::now().format("%H:%M:%S").to_string();

            let scene = plan_scene(
                &detection_snapshot,
                &toggles_snapshot,
                base,
                &config.camera_label,
                clock_text,
                wall_clock_ms(),
                config.flash_period,
            );

            if let Err(e) = surface.present(&scene) {
                warn!("Surface present failed, tick skipped: {e}");
            }
        }
    }
}

fn live_or_absent(frames: &watch::Receiver<Option<Arc<RawFrame>>>) -> BaseLayer {
    match frames.borrow().clone() {
        Some(frame) => BaseLayer::Live(frame),
        None => BaseLayer::Absent,
    }
}
