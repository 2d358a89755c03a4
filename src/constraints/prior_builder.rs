use super::{BuildContext, Constraint, ConstraintBuilder};
use crate::core::edge::Edge;
use crate::core::event::Event;
use crate::core::{CoreError, CoreResult};
use crate::factors::PriorEdge;
use nalgebra::Vector3;
use tracing::trace;

/// Turns each `init` event into a prior on the pose of that timestep.
#[derive(Debug, Clone)]
pub struct PriorEdgeConstraintBuilder {
    covariance: Vector3<f64>,
    edge: Option<Edge>,
}

impl PriorEdgeConstraintBuilder {
    pub fn new(covariance: Vector3<f64>) -> Self {
        Self {
            covariance,
            edge: None,
        }
    }
}

impl ConstraintBuilder for PriorEdgeConstraintBuilder {
    fn name(&self) -> &'static str {
        "prior"
    }

    fn add_event(&mut self, context: &BuildContext<'_>, event: &Event) -> CoreResult<()> {
        self.edge = None;
        let Event::Init { pose } = event else {
            return Ok(());
        };
        let factor = PriorEdge::new(Vector3::from(*pose), self.covariance).map_err(|source| {
            CoreError::InvalidEvent {
                step: context.step,
                source,
            }
        })?;
        trace!("prior on pose {} at {:?}", context.step, pose);
        self.edge = Some(Edge::prior(context.step, factor));
        Ok(())
    }

    fn ready(&self) -> bool {
        self.edge.is_some()
    }

    fn build(&mut self) -> Constraint {
        let Some(edge) = self.edge.take() else {
            panic!("prior builder: build() called while not ready");
        };
        Constraint::from_pose_edges(vec![edge])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::variable::Variable;
    use crate::factors::EdgeKind;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_init_event_produces_prior() -> TestResult {
        let poses = vec![Variable::pose(0.0, 0.0, 0.0)];
        let mut builder = PriorEdgeConstraintBuilder::new(Vector3::new(0.1, 0.1, 0.1));
        builder.add_event(&BuildContext::new(0, &poses), &Event::init(1.0, 2.0, 0.3))?;
        assert!(builder.ready());

        let constraint = builder.build();
        assert!(!builder.ready());
        assert!(constraint.features.is_empty());
        assert_eq!(constraint.pose_edges.len(), 1);
        let edge = &constraint.pose_edges[0];
        assert_eq!(edge.pose_index(0), 0);
        match edge.kind() {
            EdgeKind::Prior(prior) => assert_eq!(prior.target(), &Vector3::new(1.0, 2.0, 0.3)),
            other => panic!("unexpected edge kind {}", other.name()),
        }
        Ok(())
    }

    #[test]
    fn test_foreign_event_discards_buffer() -> TestResult {
        let poses = vec![Variable::pose(0.0, 0.0, 0.0)];
        let context = BuildContext::new(0, &poses);
        let mut builder = PriorEdgeConstraintBuilder::new(Vector3::new(0.1, 0.1, 0.1));
        builder.add_event(&context, &Event::init(1.0, 2.0, 0.3))?;
        builder.add_event(&context, &Event::Unknown)?;
        assert!(!builder.ready());
        Ok(())
    }

    #[test]
    fn test_invalid_covariance_reports_step() {
        let poses = vec![Variable::pose(0.0, 0.0, 0.0)];
        let mut builder = PriorEdgeConstraintBuilder::new(Vector3::new(0.0, 0.1, 0.1));
        let result = builder.add_event(&BuildContext::new(0, &poses), &Event::init(0.0, 0.0, 0.0));
        assert!(matches!(result, Err(CoreError::InvalidEvent { step: 0, .. })));
        assert!(!builder.ready());
    }

    #[test]
    #[should_panic(expected = "build() called while not ready")]
    fn test_build_when_idle_panics() {
        let mut builder = PriorEdgeConstraintBuilder::new(Vector3::new(0.1, 0.1, 0.1));
        builder.build();
    }
}
