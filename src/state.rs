//! Shared client state containers.
//!
//! [`DetectionState`] is mutated only by the result demultiplexer and read
//! everywhere else through watch channels, so readers always see a complete
//! (if slightly stale) snapshot. [`TelemetryHistory`] is the fixed-capacity
//! rolling window behind the trend chart. Both persist across reconnects so
//! the UI does not flicker to empty during brief outages.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::{BoundingBox, RiskStatus};

/// Wall-clock milliseconds since the Unix epoch, for history timestamps and
/// flash phase.
pub(crate) fn wall_clock_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}

/// Latest known detection results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionState {
    /// Most recent bounding boxes, in frame coordinates.
    pub boxes: Vec<BoundingBox>,

    /// Feature flags as announced by the server.
    pub features: BTreeMap<String, bool>,

    /// Aggregate object count.
    pub count: u32,

    /// Risk classification of the latest status text.
    pub risk: RiskStatus,

    /// Raw status text as received.
    pub status_text: String,

    /// Server-reported processing rate, if any.
    pub server_fps: Option<f64>,
}

impl Default for DetectionState {
    fn default() -> Self {
        Self {
            boxes: Vec::new(),
            features: BTreeMap::new(),
            count: 0,
            risk: RiskStatus::Normal,
            status_text: "Initializing...".to_string(),
            server_fps: None,
        }
    }
}

/// One point on the trend chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendSample {
    pub timestamp_ms: u64,
    pub count: u32,
}

/// Fixed-capacity FIFO window of `(timestamp, count)` samples.
///
/// Appending past capacity evicts the oldest entry; length never exceeds
/// capacity. Consumers redraw on every append with animation suppressed,
/// so appends must stay O(1) amortized.
#[derive(Debug, Clone)]
pub struct TelemetryHistory {
    samples: VecDeque<TrendSample>,
    capacity: usize,
}

impl TelemetryHistory {
    pub fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity.max(1)), capacity: capacity.max(1) }
    }

    /// Push a sample to the back, evicting from the front past capacity.
    pub fn append(&mut self, timestamp_ms: u64, count: u32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(TrendSample { timestamp_ms, count });
    }

    /// Samples oldest-first.
    pub fn samples(&self) -> impl Iterator<Item = &TrendSample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&TrendSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TelemetryHistory {
    fn default() -> Self {
        Self::new(20)
    }
}

/// Last-sent feature intent, owned by the client handle.
///
/// The server is the source of truth for how toggles affect processing;
/// this map only records what was last requested, so there is no
/// reconciliation against [`DetectionState::features`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureToggles {
    flags: BTreeMap<String, bool>,
}

impl FeatureToggles {
    /// Record intent for a feature. Returns the previous value, if any.
    pub fn set(&mut self, feature: impl Into<String>, value: bool) -> Option<bool> {
        self.flags.insert(feature.into(), value)
    }

    pub fn get(&self, feature: &str) -> Option<bool> {
        self.flags.get(feature).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &bool)> {
        self.flags.iter()
    }

    /// Features currently toggled on.
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().filter(|(_, on)| **on).map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_state_is_safe_before_first_message() {
        let state = DetectionState::default();
        assert!(state.boxes.is_empty());
        assert_eq!(state.count, 0);
        assert_eq!(state.risk, RiskStatus::Normal);
        assert_eq!(state.status_text, "Initializing...");
    }

    #[test]
    fn history_evicts_fifo_at_capacity() {
        let mut history = TelemetryHistory::new(20);
        for i in 1..=25u32 {
            history.append(u64::from(i) * 1000, i);
        }

        // After 25 appends with capacity 20, entries 6..=25 remain in order.
        assert_eq!(history.len(), 20);
        let counts: Vec<u32> = history.samples().map(|s| s.count).collect();
        assert_eq!(counts, (6..=25).collect::<Vec<u32>>());
        assert_eq!(history.latest().unwrap().count, 25);
    }

    #[test]
    fn history_append_at_capacity_evicts_exactly_one() {
        let mut history = TelemetryHistory::new(3);
        history.append(1, 10);
        history.append(2, 20);
        history.append(3, 30);
        history.append(4, 40);

        let counts: Vec<u32> = history.samples().map(|s| s.count).collect();
        assert_eq!(counts, vec![20, 30, 40]);
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let mut history = TelemetryHistory::new(0);
        history.append(1, 1);
        history.append(2, 2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().count, 2);
    }

    #[test]
    fn toggles_record_last_sent_intent() {
        let mut toggles = FeatureToggles::default();
        assert_eq!(toggles.set("Heatmap View", true), None);
        assert_eq!(toggles.set("Heatmap View", false), Some(true));
        assert_eq!(toggles.get("Heatmap View"), Some(false));

        toggles.set("Region of Interest", true);
        assert_eq!(toggles.active().collect::<Vec<_>>(), vec!["Region of Interest"]);
    }

    proptest! {
        #[test]
        fn history_never_exceeds_capacity(
            capacity in 1usize..64,
            counts in proptest::collection::vec(any::<u32>(), 0..200)
        ) {
            let mut history = TelemetryHistory::new(capacity);
            for (i, count) in counts.iter().enumerate() {
                history.append(i as u64, *count);
                prop_assert!(history.len() <= capacity);
            }

            // The window holds the most recent min(len, capacity) counts in order.
            let expected: Vec<u32> = counts
                .iter()
                .copied()
                .skip(counts.len().saturating_sub(capacity))
                .collect();
            let actual: Vec<u32> = history.samples().map(|s| s.count).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
