//! Residual models for the pose graph.
//!
//! Factors (also called constraints or error functions) turn the current values of the
//! variables they bind into a residual vector, and carry a constant information matrix
//! (inverse covariance) that weights it. Derivatives are not hand-written: every edge is
//! linearized by central differences in [`Edge::linearize`](crate::core::edge::Edge::linearize),
//! so a factor only has to evaluate its residual.
//!
//! # Factor Types
//!
//! - [`PriorEdge`]: anchors one pose to an absolute target, `e = target − pose`
//! - [`OdometryEdge`]: relates consecutive poses through a velocity command `(v, ω)`
//! - [`LandmarkObservationEdge`]: relates a pose and a landmark through a robot-frame
//!   measurement, `e = pose⁻¹·landmark − measurement`
//!
//! The objective contributed by each edge is the Mahalanobis norm `eᵀ·Ω·e`.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::error;

pub mod landmark_factor;
pub mod odometry_factor;
pub mod prior_factor;

pub use landmark_factor::LandmarkObservationEdge;
pub use odometry_factor::{CONTROL_INTERVAL, OdometryEdge, arc_motion};
pub use prior_factor::PriorEdge;

/// Factor-specific error types for graph-slam
#[derive(Debug, Clone, Error)]
pub enum FactorError {
    /// Covariance is not positive or not finite
    #[error("Invalid covariance: {0}")]
    InvalidCovariance(String),

    /// Covariance matrix cannot be inverted into an information matrix
    #[error("Singular covariance matrix: {0}")]
    SingularCovariance(String),

    /// Non-finite measurement, target or command
    #[error("Invalid parameter values: {0}")]
    InvalidParameters(String),
}

impl FactorError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for factor construction
pub type FactorResult<T> = Result<T, FactorError>;

/// Contract shared by all residual models.
///
/// `params` holds one parameter slice per bound variable, in the edge's vertex order.
pub trait Factor {
    /// Evaluate the residual at the given variable values.
    fn residual(&self, params: &[&[f64]]) -> DVector<f64>;

    /// Constant information matrix weighting the residual.
    fn information(&self) -> DMatrix<f64>;

    /// Residual dimension.
    fn dimension(&self) -> usize;

    /// Residual rows that hold angles and must be wrapped when differenced.
    fn angular_rows(&self) -> &'static [usize] {
        &[]
    }
}

/// Closed set of residual models an [`Edge`](crate::core::edge::Edge) can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    Prior(PriorEdge),
    Odometry(OdometryEdge),
    LandmarkObservation(LandmarkObservationEdge),
}

impl EdgeKind {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            EdgeKind::Prior(_) => "prior",
            EdgeKind::Odometry(_) => "odometry",
            EdgeKind::LandmarkObservation(_) => "landmark",
        }
    }

    /// Number of variables the model binds.
    pub fn arity(&self) -> usize {
        match self {
            EdgeKind::Prior(_) => 1,
            EdgeKind::Odometry(_) | EdgeKind::LandmarkObservation(_) => 2,
        }
    }
}

impl Factor for EdgeKind {
    fn residual(&self, params: &[&[f64]]) -> DVector<f64> {
        match self {
            EdgeKind::Prior(f) => f.residual(params),
            EdgeKind::Odometry(f) => f.residual(params),
            EdgeKind::LandmarkObservation(f) => f.residual(params),
        }
    }

    fn information(&self) -> DMatrix<f64> {
        match self {
            EdgeKind::Prior(f) => f.information(),
            EdgeKind::Odometry(f) => f.information(),
            EdgeKind::LandmarkObservation(f) => f.information(),
        }
    }

    fn dimension(&self) -> usize {
        match self {
            EdgeKind::Prior(f) => f.dimension(),
            EdgeKind::Odometry(f) => f.dimension(),
            EdgeKind::LandmarkObservation(f) => f.dimension(),
        }
    }

    fn angular_rows(&self) -> &'static [usize] {
        match self {
            EdgeKind::Prior(f) => f.angular_rows(),
            EdgeKind::Odometry(f) => f.angular_rows(),
            EdgeKind::LandmarkObservation(f) => f.angular_rows(),
        }
    }
}

impl From<PriorEdge> for EdgeKind {
    fn from(factor: PriorEdge) -> Self {
        EdgeKind::Prior(factor)
    }
}

impl From<OdometryEdge> for EdgeKind {
    fn from(factor: OdometryEdge) -> Self {
        EdgeKind::Odometry(factor)
    }
}

impl From<LandmarkObservationEdge> for EdgeKind {
    fn from(factor: LandmarkObservationEdge) -> Self {
        EdgeKind::LandmarkObservation(factor)
    }
}

/// Return `Err` if any value is NaN or infinite.
pub(crate) fn ensure_finite(values: &[f64], what: &str) -> FactorResult<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(FactorError::InvalidParameters(format!(
            "{what} contains non-finite values: {values:?}"
        ))
        .log())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Vector2, Vector3};

    #[test]
    fn test_edge_kind_dispatch() -> Result<(), FactorError> {
        let prior: EdgeKind =
            PriorEdge::new(Vector3::new(1.0, 2.0, 0.0), Vector3::new(0.5, 0.5, 0.5))?.into();
        assert_eq!(prior.name(), "prior");
        assert_eq!(prior.arity(), 1);
        assert_eq!(prior.dimension(), 3);
        assert_eq!(prior.angular_rows(), &[2]);

        let landmark: EdgeKind =
            LandmarkObservationEdge::new(Vector2::new(1.0, 0.0), [1.0, 0.0, 0.0, 1.0])?.into();
        assert_eq!(landmark.arity(), 2);
        assert_eq!(landmark.dimension(), 2);
        assert!(landmark.angular_rows().is_empty());
        Ok(())
    }

    #[test]
    fn test_ensure_finite() {
        assert!(ensure_finite(&[1.0, -2.0], "values").is_ok());
        assert!(matches!(
            ensure_finite(&[1.0, f64::NAN], "values"),
            Err(FactorError::InvalidParameters(_))
        ));
    }
}
