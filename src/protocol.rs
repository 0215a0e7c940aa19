//! Wire protocol for the detection endpoint.
//!
//! Outbound messages are tagged by an `action` field; inbound messages are
//! a single shape whose fields are all optional and freely combinable.
//! Classification of an inbound message happens by field presence, not by a
//! tagged type, so partial updates always deserialize.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Substring the server embeds in status text when risk is elevated.
pub const WARNING_MARKER: &str = "WARNING";

/// Outbound command sent to the detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    /// A single encoded still for analysis. `image` is a data-URL JPEG.
    ProcessFrame { image: String },

    /// Declare last-sent intent for a named feature.
    ToggleFeature { feature: String, value: bool },
}

/// Axis-aligned detection box in frame coordinates.
///
/// Serialized as the `[x1, y1, x2, y2]` array the service emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Inbound result record.
///
/// Every field is optional; absence means "no update for that field".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerUpdate {
    pub count: Option<u32>,
    pub status: Option<String>,
    pub fps: Option<f64>,
    pub detections: Option<Vec<BoundingBox>>,
    pub features: Option<BTreeMap<String, bool>>,
    /// Base64 JPEG of the server-composited frame.
    pub processed_frame: Option<String>,
}

impl ServerUpdate {
    /// Whether this message carries an annotated-frame payload.
    pub fn has_frame_payload(&self) -> bool {
        self.processed_frame.is_some()
    }

    /// Whether this message carries a count/status telemetry update.
    pub fn has_telemetry(&self) -> bool {
        self.count.is_some()
    }
}

/// Risk classification derived from server status text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskStatus {
    #[default]
    Normal,
    Warning,
}

impl RiskStatus {
    /// Classify a status string.
    ///
    /// The contract is a substring test against [`WARNING_MARKER`], not an
    /// exact match — the server sends richer text around the marker.
    pub fn classify(status: &str) -> Self {
        if status.contains(WARNING_MARKER) { RiskStatus::Warning } else { RiskStatus::Normal }
    }

    pub fn is_warning(self) -> bool {
        matches!(self, RiskStatus::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn process_frame_serializes_with_action_tag() {
        let cmd = ClientCommand::ProcessFrame { image: "data:image/jpeg;base64,AAAA".into() };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains(r#""action":"process_frame""#));
        assert!(json.contains(r#""image":"data:image/jpeg;base64,AAAA""#));
    }

    #[test]
    fn toggle_feature_serializes_with_action_tag() {
        let cmd = ClientCommand::ToggleFeature { feature: "Night Vision Mode".into(), value: true };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains(r#""action":"toggle_feature""#));
        assert!(json.contains(r#""feature":"Night Vision Mode""#));
        assert!(json.contains(r#""value":true"#));
    }

    #[test]
    fn update_with_all_fields_parses() {
        let json = r#"{
            "count": 12,
            "status": "WARNING: high density",
            "fps": 20.0,
            "detections": [[10, 20, 110, 220], [0, 0, 5, 5]],
            "features": {"Heatmap View": true},
            "processed_frame": "AAAA"
        }"#;
        let update: ServerUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.count, Some(12));
        assert!(update.has_frame_payload());
        assert!(update.has_telemetry());
        assert_eq!(
            update.detections.as_deref(),
            Some(&[BoundingBox::from([10, 20, 110, 220]), BoundingBox::from([0, 0, 5, 5])][..])
        );
    }

    #[test]
    fn partial_updates_are_valid() {
        let update: ServerUpdate = serde_json::from_str("{}").unwrap();
        assert_eq!(update, ServerUpdate::default());
        assert!(!update.has_frame_payload());
        assert!(!update.has_telemetry());

        let update: ServerUpdate = serde_json::from_str(r#"{"count": 3}"#).unwrap();
        assert_eq!(update.count, Some(3));
        assert!(update.status.is_none());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let update: ServerUpdate =
            serde_json::from_str(r#"{"count": 1, "debug_ts": 123456}"#).unwrap();
        assert_eq!(update.count, Some(1));
    }

    #[test]
    fn risk_classification_is_a_substring_test() {
        assert_eq!(RiskStatus::classify("WARNING: high density"), RiskStatus::Warning);
        assert_eq!(RiskStatus::classify("HIGH DENSITY WARNING"), RiskStatus::Warning);
        assert_eq!(RiskStatus::classify("OK"), RiskStatus::Normal);
        assert_eq!(RiskStatus::classify("Initializing..."), RiskStatus::Normal);
        // Case matters: the marker is uppercase.
        assert_eq!(RiskStatus::classify("warning: low light"), RiskStatus::Normal);
    }

    proptest! {
        #[test]
        fn risk_warning_iff_marker_present(status in ".*") {
            let classified = RiskStatus::classify(&status);
            prop_assert_eq!(classified.is_warning(), status.contains(WARNING_MARKER));
        }

        #[test]
        fn bounding_boxes_round_trip(coords in proptest::array::uniform4(any::<i32>())) {
            let boxed = BoundingBox::from(coords);
            let json = serde_json::to_string(&boxed).unwrap();
            let back: BoundingBox = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, boxed);
        }
    }
}
