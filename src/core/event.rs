//! Input events and timelines.
//!
//! A timeline is an ordered list of frames; frame `k` holds every event observed at
//! timestep `k`, and each frame owns exactly one pose variable in the optimizer. Events are
//! tagged by a `type` field on the wire:
//!
//! ```json
//! [
//!   [{"type": "init", "pose": [0.0, 0.0, 0.0]}],
//!   [{"type": "control", "command": [1.0, 0.1], "alpha": [0.01, 0.0, 0.0, 0.01, 0.01, 0.01]},
//!    {"type": "point", "id": 7, "measurement": [2.0, 1.0], "Q": [0.1, 0.0, 0.0, 0.1]}]
//! ]
//! ```
//!
//! Events whose type is not understood decode as [`Event::Unknown`]; they carry no data but
//! still reset any builder that was waiting for its own event type.

use crate::core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// Stable identity of a landmark, as given by the observation source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LandmarkId {
    Index(u64),
    Name(String),
}

impl Display for LandmarkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LandmarkId::Index(index) => write!(f, "{index}"),
            LandmarkId::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<u64> for LandmarkId {
    fn from(index: u64) -> Self {
        LandmarkId::Index(index)
    }
}

impl From<&str> for LandmarkId {
    fn from(name: &str) -> Self {
        LandmarkId::Name(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// Absolute pose `(x, y, yaw)` for the current timestep; becomes a prior.
    Init { pose: [f64; 3] },
    /// Velocity command `(v, ω)` executed since the previous timestep, with the six
    /// motion-noise coefficients of the velocity motion model.
    Control { command: [f64; 2], alpha: [f64; 6] },
    /// Landmark position measured in the robot frame, with its flattened 2×2 covariance.
    #[serde(alias = "observation")]
    Point {
        id: LandmarkId,
        measurement: [f64; 2],
        #[serde(rename = "Q")]
        q: [f64; 4],
    },
    #[serde(other)]
    Unknown,
}

impl Event {
    pub fn init(x: f64, y: f64, yaw: f64) -> Self {
        Event::Init { pose: [x, y, yaw] }
    }

    pub fn control(v: f64, w: f64, alpha: [f64; 6]) -> Self {
        Event::Control {
            command: [v, w],
            alpha,
        }
    }

    pub fn point(id: impl Into<LandmarkId>, measurement: [f64; 2], q: [f64; 4]) -> Self {
        Event::Point {
            id: id.into(),
            measurement,
            q,
        }
    }

    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Init { .. } => "init",
            Event::Control { .. } => "control",
            Event::Point { .. } => "point",
            Event::Unknown => "unknown",
        }
    }
}

/// Ordered per-timestep event batches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    frames: Vec<Vec<Event>>,
}

impl Timeline {
    pub fn new(frames: Vec<Vec<Event>>) -> Self {
        Self { frames }
    }

    /// Decode a timeline from its JSON representation.
    pub fn from_json_str(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| CoreError::InvalidTimeline(e.to_string()).log_with_source(e))
    }

    pub fn to_json_string(&self) -> CoreResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::InvalidTimeline(e.to_string()).log_with_source(e))
    }

    pub fn frames(&self) -> &[Vec<Event>] {
        &self.frames
    }

    pub fn push_frame(&mut self, events: Vec<Event>) {
        self.frames.push(events);
    }

    /// Number of timesteps, which is also the number of pose variables.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn num_events(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }
}

impl From<Vec<Vec<Event>>> for Timeline {
    fn from(frames: Vec<Vec<Event>>) -> Self {
        Self::new(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_decode_tagged_events() -> TestResult {
        let timeline = Timeline::from_json_str(
            r#"[
                [{"type": "init", "pose": [1.0, 2.0, 0.5]}],
                [
                    {"type": "control", "command": [10.0, 0.0], "alpha": [0.001, 0.001, 0.001, 0.001, 0.001, 0.001]},
                    {"type": "point", "id": 3, "measurement": [5.0, 10.0], "Q": [4.0, 0.0, 0.0, 4.0]},
                    {"type": "observation", "id": "door", "measurement": [1.0, 0.0], "Q": [1.0, 0.0, 0.0, 1.0]}
                ]
            ]"#,
        )?;

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.num_events(), 4);
        assert_eq!(timeline.frames()[0][0], Event::init(1.0, 2.0, 0.5));
        assert_eq!(
            timeline.frames()[1][1],
            Event::point(3u64, [5.0, 10.0], [4.0, 0.0, 0.0, 4.0])
        );
        assert_eq!(
            timeline.frames()[1][2],
            Event::point("door", [1.0, 0.0], [1.0, 0.0, 0.0, 1.0])
        );
        Ok(())
    }

    #[test]
    fn test_unknown_event_type_is_tolerated() -> TestResult {
        let timeline =
            Timeline::from_json_str(r#"[[{"type": "gps", "position": [1.0, 2.0]}]]"#)?;
        assert_eq!(timeline.frames()[0][0], Event::Unknown);
        assert_eq!(timeline.frames()[0][0].kind(), "unknown");
        Ok(())
    }

    #[test]
    fn test_malformed_timeline_is_an_error() {
        let result = Timeline::from_json_str(r#"[[{"type": "init", "pose": [1.0, 2.0]}]]"#);
        assert!(matches!(result, Err(CoreError::InvalidTimeline(_))));
    }

    #[test]
    fn test_json_round_trip_preserves_landmark_ids() -> TestResult {
        let timeline = Timeline::new(vec![vec![
            Event::init(0.0, 0.0, 0.0),
            Event::point(42u64, [1.0, 1.0], [1.0, 0.0, 0.0, 1.0]),
            Event::point("tree", [2.0, 1.0], [1.0, 0.0, 0.0, 1.0]),
        ]]);
        let text = timeline.to_json_string()?;
        assert!(text.contains("\"Q\""));
        assert_eq!(Timeline::from_json_str(&text)?, timeline);
        Ok(())
    }
}
