//! Optimization variables.
//!
//! The set of variable kinds is closed, so [`Variable`] is a tagged enum rather than a trait
//! object. Each variant owns a fixed-size parameter vector and knows how to absorb a local
//! increment:
//!
//! - **Pose** `(x, y, yaw)`: the increment `(dx, dy, dyaw)` lives in the body frame, so the
//!   translational part is rotated by the *current* yaw before being added, and `dyaw` is
//!   added as-is. Yaw is deliberately left unwrapped here; residuals wrap their own angles.
//! - **Landmark** `(x, y)`: plain addition in the world frame.
//!
//! The numerical Jacobians in [`Edge::linearize`](crate::core::edge::Edge::linearize) probe
//! through the same [`Variable::update`], so the linearization and the applied step always
//! agree on the parameterization.
//!
//! # Example
//!
//! ```
//! use graph_slam::core::variable::Variable;
//! use std::f64::consts::FRAC_PI_2;
//!
//! let mut pose = Variable::pose(1.0, 2.0, FRAC_PI_2);
//! pose.update(&[1.0, 0.0, 0.1]);
//! // Moving "forward" while facing +y moves along the world y axis.
//! assert!((pose.params()[0] - 1.0).abs() < 1e-12);
//! assert!((pose.params()[1] - 3.0).abs() < 1e-12);
//! ```

use nalgebra::{DVector, Vector2, Vector3};

/// Dimension of an SE(2) pose variable.
pub const POSE_DIM: usize = 3;

/// Dimension of a 2D landmark variable.
pub const LANDMARK_DIM: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Pose(Vector3<f64>),
    Landmark(Vector2<f64>),
}

impl Variable {
    pub fn pose(x: f64, y: f64, yaw: f64) -> Self {
        Variable::Pose(Vector3::new(x, y, yaw))
    }

    pub fn landmark(x: f64, y: f64) -> Self {
        Variable::Landmark(Vector2::new(x, y))
    }

    /// Number of parameters; constant for the lifetime of the variable.
    pub fn dim(&self) -> usize {
        match self {
            Variable::Pose(_) => POSE_DIM,
            Variable::Landmark(_) => LANDMARK_DIM,
        }
    }

    pub fn params(&self) -> &[f64] {
        match self {
            Variable::Pose(p) => p.as_slice(),
            Variable::Landmark(l) => l.as_slice(),
        }
    }

    pub fn to_dvector(&self) -> DVector<f64> {
        DVector::from_column_slice(self.params())
    }

    /// Overwrite the parameters.
    ///
    /// # Panics
    ///
    /// If `params.len() != self.dim()`.
    pub fn set_params(&mut self, params: &[f64]) {
        assert_eq!(
            params.len(),
            self.dim(),
            "parameter length does not match variable dimension"
        );
        match self {
            Variable::Pose(p) => p.copy_from_slice(params),
            Variable::Landmark(l) => l.copy_from_slice(params),
        }
    }

    /// Apply a local increment.
    ///
    /// # Panics
    ///
    /// If `delta.len() != self.dim()`.
    pub fn update(&mut self, delta: &[f64]) {
        assert_eq!(
            delta.len(),
            self.dim(),
            "update length does not match variable dimension"
        );
        match self {
            Variable::Pose(p) => {
                let (s, c) = p[2].sin_cos();
                p[0] += c * delta[0] - s * delta[1];
                p[1] += s * delta[0] + c * delta[1];
                p[2] += delta[2];
            }
            Variable::Landmark(l) => {
                l[0] += delta[0];
                l[1] += delta[1];
            }
        }
    }

    pub fn as_pose(&self) -> Option<&Vector3<f64>> {
        match self {
            Variable::Pose(p) => Some(p),
            Variable::Landmark(_) => None,
        }
    }

    pub fn as_landmark(&self) -> Option<&Vector2<f64>> {
        match self {
            Variable::Landmark(l) => Some(l),
            Variable::Pose(_) => None,
        }
    }

    pub fn is_pose(&self) -> bool {
        matches!(self, Variable::Pose(_))
    }
}

impl From<Vector3<f64>> for Variable {
    fn from(pose: Vector3<f64>) -> Self {
        Variable::Pose(pose)
    }
}

impl From<Vector2<f64>> for Variable {
    fn from(landmark: Vector2<f64>) -> Self {
        Variable::Landmark(landmark)
    }
}
