//! Frame encoding for transmission.
//!
//! Frames are downscaled to the fixed capture format and JPEG-compressed at
//! a fixed quality before being wrapped in a base64 data URL. Both values
//! are policy constants from [`CaptureFormat`](crate::config::CaptureFormat),
//! never computed adaptively.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::{RgbImage, imageops::FilterType};
use std::sync::Arc;

use crate::config::CaptureFormat;
use crate::error::{ClientError, Result};
use crate::source::RawFrame;

/// Prefix of every outbound frame payload.
pub const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Encode a raw frame into the wire payload.
pub fn encode_frame(frame: &RawFrame, format: CaptureFormat) -> Result<String> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels.to_vec())
        .ok_or_else(|| ClientError::encode_failed("pixel buffer does not match dimensions"))?;

    let resized = if (frame.width, frame.height) == (format.width, format.height) {
        image
    } else {
        image::imageops::resize(&image, format.width, format.height, FilterType::Triangle)
    };

    let mut jpeg = Vec::new();
    let mut encoder =
        JpegEncoder::new_with_quality(&mut jpeg, format.jpeg_quality.clamp(1, 100));
    encoder
        .encode_image(&resized)
        .map_err(|e| ClientError::encode_failed(format!("jpeg encode: {e}")))?;

    Ok(format!("{DATA_URL_PREFIX}{}", BASE64_STANDARD.encode(&jpeg)))
}

/// Decode a server-composited frame payload (base64 JPEG) into raw JPEG
/// bytes for the render surface.
pub fn decode_frame_payload(payload: &str) -> Result<Arc<[u8]>> {
    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| ClientError::protocol_error(format!("processed_frame base64: {e}")))?;
    Ok(bytes.into())
}
