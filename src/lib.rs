//! Async client for streaming camera frames to a remote detection service.
//!
//! Vigil connects to a detection endpoint over a persistent WebSocket,
//! paces outbound frames against the responder with single-slot
//! backpressure, and keeps a continuously consistent overlay state for a
//! display-synchronized render loop.
//!
//! # Features
//!
//! - **Flow control**: at most one frame in flight, with a watchdog that
//!   favors liveness when responses go missing
//! - **Lifecycle**: automatic reconnection with a fixed delay and a
//!   connect-timeout guard; state observable as a stream
//! - **Decoupled rendering**: the render loop composites whatever state is
//!   current at tick time, independent of message arrival
//! - **Tolerant protocol**: partial inbound updates are valid; malformed
//!   messages are dropped, never thrown
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use vigil::{ClientConfig, RawFrame, StreamClient};
//!
//! struct Webcam;
//!
//! #[async_trait::async_trait]
//! impl vigil::FrameSource for Webcam {
//!     async fn next_frame(&mut self) -> vigil::Result<Option<RawFrame>> {
//!         // acquire a frame from the device...
//!         Ok(None)
//!     }
//!
//!     fn frame_rate(&self) -> f64 {
//!         30.0
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> vigil::Result<()> {
//!     let config = ClientConfig {
//!         base_url: "https://cams.example.org".into(),
//!         ..Default::default()
//!     };
//!     let client = StreamClient::connect(config, Webcam).await?;
//!
//!     use futures::StreamExt;
//!     let mut updates = std::pin::pin!(client.detection_updates());
//!     while let Some(state) = updates.next().await {
//!         println!("count={} risk={:?}", state.count, state.risk);
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod capture;
mod client;
mod config;
mod demux;
mod encode;
mod error;
mod inflight;
mod render;
mod source;
mod state;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;

// Streaming protocol architecture
pub mod protocol;
pub mod session;
pub mod stream;
pub mod transport;

// Core exports
pub use client::StreamClient;
pub use config::{CaptureFormat, ClientConfig, PacingMode};
pub use encode::{DATA_URL_PREFIX, encode_frame};
pub use error::{ClientError, Result};
pub use inflight::{InFlightSlot, SlotAcquire};
pub use source::{FrameSource, RawFrame};
pub use state::{DetectionState, FeatureToggles, TelemetryHistory, TrendSample};

// Protocol exports
pub use protocol::{BoundingBox, ClientCommand, RiskStatus, ServerUpdate};

// Session exports
pub use session::{ConnectionState, SessionEvent};

// Render exports
pub use render::{BaseLayer, DrawOp, FeatureOverlay, Scene, Surface, flash_on, plan_scene};

// Transport exports
pub use transport::{Connection, Connector, WsConnector};

/// Unified entry point for streaming clients.
///
/// Thin facade over [`StreamClient`] for the common case.
///
/// # Example
///
/// ```rust,no_run
/// use vigil::{ClientConfig, Vigil};
/// # struct Webcam;
/// # #[async_trait::async_trait]
/// # impl vigil::FrameSource for Webcam {
/// #     async fn next_frame(&mut self) -> vigil::Result<Option<vigil::RawFrame>> { Ok(None) }
/// #     fn frame_rate(&self) -> f64 { 30.0 }
/// # }
///
/// #[tokio::main]
/// async fn main() -> vigil::Result<()> {
///     let client = Vigil::connect(ClientConfig::default(), Webcam).await?;
///     client.toggle_feature("Heatmap View", true);
///     Ok(())
/// }
/// ```
pub struct Vigil;

impl Vigil {
    /// Connect to the detection service over WebSocket.
    ///
    /// The endpoint is derived from `config.base_url`: scheme `ws`/`wss`
    /// mirroring the base scheme, path `/ws`. Returns immediately;
    /// connection establishment and retries run in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be turned into an endpoint.
    pub async fn connect<S>(config: ClientConfig, source: S) -> Result<StreamClient>
    where
        S: FrameSource,
    {
        StreamClient::connect(config, source).await
    }
}
