//! Landmark observation factor.

use super::{Factor, FactorError, FactorResult, ensure_finite};
use crate::manifold::Transform2D;
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

/// Pose–landmark constraint from a measurement taken in the robot frame.
///
/// # Mathematical Formulation
///
/// ```text
/// e = T(pose)⁻¹ · landmark − measurement
/// Ω = Q⁻¹
/// ```
///
/// Vertex order is fixed: the pose comes first and the landmark second. The optimizer relies
/// on this when it scatters the Jacobian blocks into `Hpp`, `Hpl` and `Hll`.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkObservationEdge {
    measurement: Vector2<f64>,
    covariance: Matrix2<f64>,
    information: Matrix2<f64>,
}

impl LandmarkObservationEdge {
    /// Create an observation factor; `q` is the row-major flattened 2×2 covariance.
    ///
    /// `q` must be symmetric positive-definite, otherwise the observation could lower χ².
    pub fn new(measurement: Vector2<f64>, q: [f64; 4]) -> FactorResult<Self> {
        ensure_finite(measurement.as_slice(), "landmark measurement")?;
        ensure_finite(&q, "measurement covariance")?;
        let covariance = Matrix2::from_row_slice(&q);
        let information = covariance.try_inverse().ok_or_else(|| {
            FactorError::SingularCovariance(format!("measurement covariance {q:?}")).log()
        })?;
        if !information.iter().all(|v| v.is_finite()) {
            return Err(
                FactorError::SingularCovariance(format!("measurement covariance {q:?}")).log(),
            );
        }
        let symmetric = (q[1] - q[2]).abs() <= 1e-9 * covariance.abs().max();
        if !symmetric || covariance.cholesky().is_none() {
            return Err(FactorError::InvalidCovariance(format!(
                "measurement covariance must be symmetric positive-definite, got {q:?}"
            ))
            .log());
        }
        Ok(Self {
            measurement,
            covariance,
            information,
        })
    }

    pub fn measurement(&self) -> &Vector2<f64> {
        &self.measurement
    }

    pub fn covariance(&self) -> &Matrix2<f64> {
        &self.covariance
    }
}

impl Factor for LandmarkObservationEdge {
    fn residual(&self, params: &[&[f64]]) -> DVector<f64> {
        let (pose, landmark) = (params[0], params[1]);
        assert!(
            pose.len() == 3 && landmark.len() == 2,
            "landmark edge must bind (pose, landmark) in that order"
        );
        let local = Transform2D::from_pose(pose[0], pose[1], pose[2])
            .inverse()
            .transform(&Vector2::new(landmark[0], landmark[1]));
        let error = local - self.measurement;
        DVector::from_column_slice(error.as_slice())
    }

    fn information(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(2, 2, self.information.as_slice())
    }

    fn dimension(&self) -> usize {
        2
    }
}
