//! Prior factor anchoring a pose to an absolute target.

use super::{Factor, FactorError, FactorResult, ensure_finite};
use crate::manifold::normalize_angle;
use nalgebra::{DMatrix, DVector, Vector3};

/// Unary constraint pulling one pose toward a known `(x, y, yaw)`.
///
/// # Mathematical Formulation
///
/// ```text
/// e = target − pose,   e_yaw wrapped to (-π, π]
/// Ω = diag(1 / σ²)
/// ```
///
/// Without at least one prior the pose graph is only defined up to a rigid motion, so the
/// first pose of every timeline is normally anchored with one of these.
///
/// # Example
///
/// ```
/// use graph_slam::factors::{Factor, PriorEdge};
/// use nalgebra::Vector3;
///
/// let prior = PriorEdge::new(Vector3::new(500.0, 500.0, 0.1), Vector3::new(0.1, 0.1, 0.1))?;
/// let error = prior.residual(&[&[100.0, 100.0, 0.1]]);
/// assert!((error[0] - 400.0).abs() < 1e-9);
/// # Ok::<(), graph_slam::factors::FactorError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PriorEdge {
    target: Vector3<f64>,
    covariance: Vector3<f64>,
}

impl PriorEdge {
    /// Create a prior from a target pose and the diagonal of its covariance.
    ///
    /// Every covariance entry must be strictly positive and finite.
    pub fn new(target: Vector3<f64>, covariance: Vector3<f64>) -> FactorResult<Self> {
        ensure_finite(target.as_slice(), "prior target")?;
        if covariance.iter().any(|&c| !(c.is_finite() && c > 0.0)) {
            return Err(FactorError::InvalidCovariance(format!(
                "prior covariance must be positive, got {:?}",
                covariance.as_slice()
            ))
            .log());
        }
        Ok(Self { target, covariance })
    }

    pub fn target(&self) -> &Vector3<f64> {
        &self.target
    }

    pub fn covariance(&self) -> &Vector3<f64> {
        &self.covariance
    }
}

impl Factor for PriorEdge {
    fn residual(&self, params: &[&[f64]]) -> DVector<f64> {
        let pose = params[0];
        assert_eq!(pose.len(), 3, "prior edge must bind a pose");
        DVector::from_vec(vec![
            self.target[0] - pose[0],
            self.target[1] - pose[1],
            normalize_angle(self.target[2] - pose[2]),
        ])
    }

    fn information(&self) -> DMatrix<f64> {
        DMatrix::from_diagonal(&DVector::from_iterator(
            3,
            self.covariance.iter().map(|c| 1.0 / c),
        ))
    }

    fn dimension(&self) -> usize {
        3
    }

    fn angular_rows(&self) -> &'static [usize] {
        &[2]
    }
}
