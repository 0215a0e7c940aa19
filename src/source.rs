//! Camera source trait.

use std::sync::Arc;

use crate::error::{ClientError, Result};

/// A raw captured frame, RGB8, row-major.
///
/// Pixel data is shared via `Arc` so the pacer and the render loop can hold
/// the same frame without copying.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
    /// Monotonic capture counter.
    pub seq: u64,
}

impl RawFrame {
    /// Create a frame, validating the buffer length against the dimensions.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, seq: u64) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(ClientError::capture_failed(format!(
                "frame buffer is {} bytes, expected {} for {}x{} RGB8",
                pixels.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self { width, height, pixels: pixels.into(), seq })
    }
}

/// Trait for camera/video sources.
///
/// Sources abstract over capture devices and handle their own timing
/// internally, yielding frames at their native rate.
#[async_trait::async_trait]
pub trait FrameSource: Send + 'static {
    /// Get the next captured frame.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - new frame available
    /// - `Ok(None)` - source ended (camera stopped, stream closed)
    /// - `Err(e)` - capture error; the driver decides whether to retry
    async fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// Native capture rate in Hz.
    fn frame_rate(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_buffer_length_is_validated() {
        assert!(RawFrame::new(2, 2, vec![0u8; 12], 0).is_ok());

        let err = RawFrame::new(2, 2, vec![0u8; 11], 0).unwrap_err();
        assert!(matches!(err, ClientError::Capture { .. }));
        assert!(!err.is_retryable());
    }
}
