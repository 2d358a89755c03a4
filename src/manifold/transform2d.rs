//! SE(2) rigid transform stored as rotation matrix and translation.

use nalgebra::{Matrix2, Vector2, Vector3};
use std::{
    fmt,
    fmt::{Display, Formatter},
    ops::Mul,
};

/// Rigid 2D transform `p ↦ R·p + t`.
///
/// Composition follows the usual convention: `a * b` applies `b` first and then `a`,
/// so `from_pose(world_from_body) * from_pose(body_from_child)` yields `world_from_child`.
///
/// # Example
///
/// ```
/// use graph_slam::manifold::Transform2D;
/// use nalgebra::Vector2;
/// use std::f64::consts::FRAC_PI_2;
///
/// let robot = Transform2D::from_pose(1.0, 0.0, FRAC_PI_2);
/// let world = robot.transform(&Vector2::new(1.0, 0.0));
/// assert!((world - Vector2::new(1.0, 1.0)).norm() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    rotation: Matrix2<f64>,
    translation: Vector2<f64>,
}

impl Transform2D {
    pub fn new(rotation: Matrix2<f64>, translation: Vector2<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix2::identity(), Vector2::zeros())
    }

    /// Build the transform of a pose `(x, y, yaw)` expressed in the parent frame.
    pub fn from_pose(x: f64, y: f64, yaw: f64) -> Self {
        let (s, c) = yaw.sin_cos();
        Self::new(Matrix2::new(c, -s, s, c), Vector2::new(x, y))
    }

    pub fn from_pose_vector(pose: &Vector3<f64>) -> Self {
        Self::from_pose(pose[0], pose[1], pose[2])
    }

    pub fn rotation(&self) -> &Matrix2<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector2<f64> {
        &self.translation
    }

    /// Map a point from this transform's child frame into its parent frame.
    pub fn transform(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.rotation * point + self.translation
    }

    pub fn inverse(&self) -> Self {
        let rotation_t = self.rotation.transpose();
        Self::new(rotation_t, -(rotation_t * self.translation))
    }

    /// Recover `(x, y, yaw)`, with yaw in `(-π, π]`.
    pub fn to_pose(&self) -> Vector3<f64> {
        Vector3::new(
            self.translation.x,
            self.translation.y,
            self.rotation[(1, 0)].atan2(self.rotation[(0, 0)]),
        )
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Transform2D {
    type Output = Transform2D;

    fn mul(self, rhs: Transform2D) -> Transform2D {
        Transform2D::new(
            self.rotation * rhs.rotation,
            self.rotation * rhs.translation + self.translation,
        )
    }
}

impl Display for Transform2D {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let pose = self.to_pose();
        write!(
            f,
            "Transform2D(x: {:.4}, y: {:.4}, yaw: {:.4})",
            pose[0], pose[1], pose[2]
        )
    }
}
