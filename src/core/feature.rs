//! Landmark features and read-only graph snapshots.

use crate::core::edge::Edge;
use crate::core::event::LandmarkId;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    #[default]
    Undefined,
    Point,
    Line,
}

impl Display for FeatureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Undefined => write!(f, "undefined"),
            FeatureKind::Point => write!(f, "point"),
            FeatureKind::Line => write!(f, "line"),
        }
    }
}

/// One landmark together with every edge observing it.
///
/// Builders emit a feature per observation; the optimizer merges features sharing a
/// [`LandmarkId`] so that exactly one feature, and one landmark variable, exists per identity.
/// `initial_estimate` seeds that variable when the identity is first seen and is ignored for
/// later duplicates.
#[derive(Debug, Clone)]
pub struct Feature {
    id: LandmarkId,
    kind: FeatureKind,
    initial_estimate: Vector2<f64>,
    edges: Vec<Edge>,
}

impl Feature {
    pub fn new(
        id: LandmarkId,
        kind: FeatureKind,
        initial_estimate: Vector2<f64>,
        edges: Vec<Edge>,
    ) -> Self {
        Self {
            id,
            kind,
            initial_estimate,
            edges,
        }
    }

    pub fn id(&self) -> &LandmarkId {
        &self.id
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn initial_estimate(&self) -> &Vector2<f64> {
        &self.initial_estimate
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut [Edge] {
        &mut self.edges
    }

    /// Take over the edges of another feature of the same landmark.
    ///
    /// # Panics
    ///
    /// If the identities differ.
    pub fn absorb(&mut self, other: Feature) {
        assert_eq!(self.id, other.id, "cannot merge features of different landmarks");
        self.edges.extend(other.edges);
    }
}

/// Render-ready view of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub id: LandmarkId,
    pub kind: FeatureKind,
    /// `[x, y]` for points. Kinds without a renderable estimate carry `None`.
    pub visualization_data: Option<Vec<f64>>,
    pub observations: usize,
}

/// Pull-based export of the current estimate for plotting and reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// One `[x, y, yaw]` row per timestep.
    pub poses: Vec<[f64; 3]>,
    pub features: Vec<FeatureSnapshot>,
}

impl GraphSnapshot {
    /// Points of all point features, in feature order.
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.features
            .iter()
            .filter(|f| f.kind == FeatureKind::Point)
            .filter_map(|f| match f.visualization_data.as_deref() {
                Some([x, y]) => Some([*x, *y]),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::LandmarkObservationEdge;

    #[test]
    fn test_absorb_merges_edges() -> Result<(), Box<dyn std::error::Error>> {
        let factor = LandmarkObservationEdge::new(Vector2::new(1.0, 0.0), [1.0, 0.0, 0.0, 1.0])?;
        let id = LandmarkId::from(3u64);
        let mut first = Feature::new(
            id.clone(),
            FeatureKind::Point,
            Vector2::new(1.0, 0.0),
            vec![Edge::landmark_observation(0, id.clone(), factor.clone())],
        );
        let second = Feature::new(
            id.clone(),
            FeatureKind::Point,
            Vector2::new(9.0, 9.0),
            vec![Edge::landmark_observation(1, id, factor)],
        );
        first.absorb(second);

        assert_eq!(first.edges().len(), 2);
        assert_eq!(first.initial_estimate(), &Vector2::new(1.0, 0.0));
        Ok(())
    }

    #[test]
    fn test_snapshot_points_skip_non_point_features() {
        let snapshot = GraphSnapshot {
            poses: vec![[0.0, 0.0, 0.0]],
            features: vec![
                FeatureSnapshot {
                    id: LandmarkId::from(1u64),
                    kind: FeatureKind::Point,
                    visualization_data: Some(vec![2.0, 3.0]),
                    observations: 1,
                },
                FeatureSnapshot {
                    id: LandmarkId::from(2u64),
                    kind: FeatureKind::Undefined,
                    visualization_data: None,
                    observations: 4,
                },
            ],
        };
        assert_eq!(snapshot.points(), vec![[2.0, 3.0]]);
    }
}
