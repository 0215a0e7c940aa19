//! Client configuration and pacing policy.
//!
//! All timing and encoding values are policy constants, never computed
//! adaptively. The defaults mirror the reference deployment: 3 s reconnect
//! delay, 5 s connect guard, 1 s frame watchdog, 480x360 JPEG at quality 50.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Frame pacing strategy.
///
/// The two variants correspond to the two coherent client modes: a low-rate
/// stream where the client renders detection metadata itself, and a
/// higher-rate stream where the server returns fully composited frames.
/// Both apply the same single-slot backpressure; the mode selects the tick
/// interval and which base layer the render loop composites.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PacingMode {
    /// Timestamp-gated low rate; overlays drawn client-side from metadata.
    Metadata { max_fps: u32 },

    /// In-flight locked higher rate; server-composited frames displayed.
    Composited { target_fps: u32 },
}

impl PacingMode {
    /// Tick interval for the pacing loop.
    pub fn interval(self) -> Duration {
        let fps = match self {
            PacingMode::Metadata { max_fps } => max_fps.max(1),
            PacingMode::Composited { target_fps } => target_fps.max(1),
        };
        Duration::from_secs_f64(1.0 / fps as f64)
    }

    /// Whether the render loop should composite server-returned frames
    /// instead of the live camera feed.
    pub fn uses_processed_frames(self) -> bool {
        matches!(self, PacingMode::Composited { .. })
    }
}

impl Default for PacingMode {
    fn default() -> Self {
        PacingMode::Metadata { max_fps: 5 }
    }
}

/// Fixed capture resolution and JPEG quality applied before transmission.
///
/// Fidelity is traded for bandwidth and server processing cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    /// JPEG quality factor, 1..=100.
    pub jpeg_quality: u8,
}

impl CaptureFormat {
    /// 480x360 at quality 50, the reference streaming format.
    pub const STANDARD: CaptureFormat = CaptureFormat { width: 480, height: 360, jpeg_quality: 50 };

    /// 320x240 at quality 50 for constrained links.
    pub const COMPACT: CaptureFormat = CaptureFormat { width: 320, height: 240, jpeg_quality: 50 };
}

impl Default for CaptureFormat {
    fn default() -> Self {
        CaptureFormat::STANDARD
    }
}

/// Configuration for a [`StreamClient`](crate::StreamClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base origin the client is served from, e.g. `https://host:8000`.
    /// The detection endpoint is derived from it (see [`ClientConfig::endpoint_url`]).
    pub base_url: String,

    /// Pacing strategy for outbound frames.
    pub pacing: PacingMode,

    /// Capture resolution and quality.
    pub format: CaptureFormat,

    /// Delay before a reconnect attempt after a lost connection.
    pub reconnect_delay: Duration,

    /// Guard window for a connect attempt to reach Open.
    pub connect_timeout: Duration,

    /// Watchdog window after a frame send before the in-flight slot is
    /// forcibly reclaimed.
    pub frame_watchdog: Duration,

    /// Render loop tick rate in Hz (display refresh).
    pub refresh_hz: u32,

    /// Period of the warning border/banner flash.
    pub flash_period: Duration,

    /// Capacity of the telemetry trend window.
    pub history_capacity: usize,

    /// Label drawn in the HUD corner.
    pub camera_label: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            pacing: PacingMode::default(),
            format: CaptureFormat::default(),
            reconnect_delay: Duration::from_millis(3000),
            connect_timeout: Duration::from_millis(5000),
            frame_watchdog: Duration::from_millis(1000),
            refresh_hz: 60,
            flash_period: Duration::from_millis(250),
            history_capacity: 20,
            camera_label: "CAM 01".to_string(),
        }
    }
}

impl ClientConfig {
    /// Derive the duplex endpoint from the base origin.
    ///
    /// The scheme mirrors the page scheme (`wss` iff the page is served
    /// encrypted) and the path is fixed at `/ws`.
    pub fn endpoint_url(&self) -> Result<String> {
        let (scheme, rest) = if let Some(rest) = self.base_url.strip_prefix("https://") {
            ("wss", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            ("ws", rest)
        } else {
            return Err(ClientError::transport_failed(format!(
                "base URL must be http(s): {}",
                self.base_url
            )));
        };

        let host = rest.trim_end_matches('/');
        if host.is_empty() {
            return Err(ClientError::transport_failed("base URL has no host"));
        }

        Ok(format!("{scheme}://{host}/ws"))
    }

    /// Interval between render loop ticks.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_hz.max(1) as f64)
    }
}
