use super::{BuildContext, Constraint, ConstraintBuilder};
use crate::core::edge::Edge;
use crate::core::event::Event;
use crate::core::{CoreError, CoreResult};
use crate::factors::OdometryEdge;
use nalgebra::Vector2;
use tracing::{trace, warn};

/// Turns the `control` event of timestep `k` into an odometry edge from pose `k-1` to pose `k`.
///
/// A control in the very first frame has no preceding pose and is dropped with a warning.
#[derive(Debug, Clone)]
pub struct OdometryConstraintBuilder {
    min_variance: f64,
    edge: Option<Edge>,
}

impl OdometryConstraintBuilder {
    pub fn new(min_variance: f64) -> Self {
        Self {
            min_variance,
            edge: None,
        }
    }
}

impl ConstraintBuilder for OdometryConstraintBuilder {
    fn name(&self) -> &'static str {
        "odometry"
    }

    fn add_event(&mut self, context: &BuildContext<'_>, event: &Event) -> CoreResult<()> {
        self.edge = None;
        let Event::Control { command, alpha } = event else {
            return Ok(());
        };
        if context.step == 0 {
            warn!("control event in the first frame has no preceding pose; ignored");
            return Ok(());
        }
        let factor = OdometryEdge::new(Vector2::from(*command), *alpha, self.min_variance)
            .map_err(|source| CoreError::InvalidEvent {
                step: context.step,
                source,
            })?;
        trace!(
            "odometry {} -> {} with command {:?}",
            context.step - 1,
            context.step,
            command
        );
        self.edge = Some(Edge::odometry(context.step - 1, context.step, factor));
        Ok(())
    }

    fn ready(&self) -> bool {
        self.edge.is_some()
    }

    fn build(&mut self) -> Constraint {
        let Some(edge) = self.edge.take() else {
            panic!("odometry builder: build() called while not ready");
        };
        Constraint::from_pose_edges(vec![edge])
    }
}
