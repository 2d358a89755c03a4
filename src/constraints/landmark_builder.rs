use super::{BuildContext, Constraint, ConstraintBuilder};
use crate::core::edge::Edge;
use crate::core::event::Event;
use crate::core::feature::{Feature, FeatureKind};
use crate::core::{CoreError, CoreResult};
use crate::factors::LandmarkObservationEdge;
use crate::manifold::Transform2D;
use nalgebra::Vector2;
use tracing::trace;

/// Turns each `point` observation into a landmark edge wrapped in a point feature.
///
/// The feature's initial estimate is the measurement mapped into the world frame through
/// the observing pose's current estimate.
#[derive(Debug, Clone, Default)]
pub struct LandmarkConstraintBuilder {
    feature: Option<Feature>,
}

impl LandmarkConstraintBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConstraintBuilder for LandmarkConstraintBuilder {
    fn name(&self) -> &'static str {
        "landmark"
    }

    fn add_event(&mut self, context: &BuildContext<'_>, event: &Event) -> CoreResult<()> {
        self.feature = None;
        let Event::Point { id, measurement, q } = event else {
            return Ok(());
        };
        let measurement = Vector2::from(*measurement);
        let factor = LandmarkObservationEdge::new(measurement, *q).map_err(|source| {
            CoreError::InvalidEvent {
                step: context.step,
                source,
            }
        })?;
        let initial_estimate =
            Transform2D::from_pose_vector(&context.current_pose()).transform(&measurement);
        trace!(
            "landmark {} seen from pose {}, initial estimate {:?}",
            id,
            context.step,
            initial_estimate.as_slice()
        );

        let edge = Edge::landmark_observation(context.step, id.clone(), factor);
        self.feature = Some(Feature::new(
            id.clone(),
            FeatureKind::Point,
            initial_estimate,
            vec![edge],
        ));
        Ok(())
    }

    fn ready(&self) -> bool {
        self.feature.is_some()
    }

    fn build(&mut self) -> Constraint {
        let Some(feature) = self.feature.take() else {
            panic!("landmark builder: build() called while not ready");
        };
        Constraint::from_features(vec![feature])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::LandmarkId;
    use crate::core::variable::Variable;
    use std::f64::consts::FRAC_PI_2;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_observation_produces_point_feature() -> TestResult {
        let poses = vec![Variable::pose(100.0, 100.0, FRAC_PI_2)];
        let mut builder = LandmarkConstraintBuilder::new();
        builder.add_event(
            &BuildContext::new(0, &poses),
            &Event::point("tree", [5.0, 10.0], [4.0, 0.0, 0.0, 4.0]),
        )?;
        assert!(builder.ready());

        let constraint = builder.build();
        assert!(constraint.pose_edges.is_empty());
        let feature = &constraint.features[0];
        assert_eq!(feature.id(), &LandmarkId::from("tree"));
        assert_eq!(feature.kind(), FeatureKind::Point);
        assert!((feature.initial_estimate() - Vector2::new(90.0, 105.0)).norm() < 1e-9);
        assert_eq!(feature.edges().len(), 1);
        assert_eq!(feature.edges()[0].pose_index(0), 0);
        Ok(())
    }

    #[test]
    fn test_singular_covariance_is_reported() {
        let poses = vec![Variable::pose(0.0, 0.0, 0.0)];
        let mut builder = LandmarkConstraintBuilder::new();
        let result = builder.add_event(
            &BuildContext::new(0, &poses),
            &Event::point(1u64, [1.0, 1.0], [1.0, 2.0, 2.0, 4.0]),
        );
        assert!(matches!(result, Err(CoreError::InvalidEvent { step: 0, .. })));
    }

    #[test]
    #[should_panic(expected = "build() called while not ready")]
    fn test_build_when_idle_panics() {
        LandmarkConstraintBuilder::new().build();
    }
}
