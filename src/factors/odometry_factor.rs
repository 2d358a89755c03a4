//! Odometry factor for the velocity motion model.
//!
//! A control `(v, ω)` held for one control interval `Δt` moves the robot along a circular
//! arc (or a straight segment when `ω = 0`). The factor compares the commanded velocities
//! with the velocities that would explain the *estimated* relative motion between the two
//! poses it binds:
//!
//! ```text
//! (dx, dy, dθ) = pose_from⁻¹ · pose_to
//! s  = sign(dx)                          (backward motion flips the arc)
//! ω̂  = 2·atan2(s·dy, s·dx) / Δt          (chord direction is half the turn, 0 for a null chord)
//! v̂  = s·|(dx, dy)|·(ω̂Δt/2) / sin(ω̂Δt/2) / Δt
//! γ̂  = wrap(dθ − ω̂Δt) / Δt               (final in-place rotation)
//!
//! e = (v − v̂, ω − ω̂, γ̂)
//! ```
//!
//! The noise model is the classic velocity-proportional one: with `α` reshaped to a
//! 3×2 matrix, the residual variances are `α · (v², ω²)`, so faster commands are trusted
//! proportionally less.
//!
//! # References
//!
//! - Thrun, S., Burgard, W. & Fox, D. (2005). *Probabilistic Robotics*. Chapter 5.3.

use super::{Factor, FactorError, FactorResult, ensure_finite};
use crate::manifold::{Transform2D, normalize_angle};
use nalgebra::{DMatrix, DVector, Matrix3x2, Vector2, Vector3};

/// Length of one control interval, in the units of the velocity commands.
pub const CONTROL_INTERVAL: f64 = 1.0;

/// Below this turn rate the arc is treated as a straight segment.
const STRAIGHT_LINE_THRESHOLD: f64 = 1e-9;

/// Below this displacement the chord has no direction and the motion counts as a turn in place.
const STATIONARY_CHORD: f64 = 1e-6;

/// Relative transform produced by holding `command = (v, ω)` for `dt`.
///
/// Used both to seed pose estimates and as the forward model the factor inverts.
pub fn arc_motion(command: &Vector2<f64>, dt: f64) -> Transform2D {
    let (v, w) = (command[0], command[1]);
    let turn = w * dt;
    if w.abs() < STRAIGHT_LINE_THRESHOLD {
        return Transform2D::from_pose(v * dt, 0.0, 0.0);
    }
    let radius = v / w;
    Transform2D::from_pose(radius * turn.sin(), radius * (1.0 - turn.cos()), turn)
}

/// Velocities `(v̂, ω̂, γ̂)` explaining the relative motion `(dx, dy, dθ)` over `dt`.
fn velocities_from_motion(relative: &Vector3<f64>, dt: f64) -> Vector3<f64> {
    let (dx, dy, dtheta) = (relative[0], relative[1], relative[2]);
    let direction = if dx < 0.0 { -1.0 } else { 1.0 };
    let chord = dx.hypot(dy);
    let half_turn = if chord < STATIONARY_CHORD {
        0.0
    } else {
        (direction * dy).atan2(direction * dx)
    };
    let arc_ratio = if half_turn.abs() < STRAIGHT_LINE_THRESHOLD {
        1.0
    } else {
        half_turn / half_turn.sin()
    };
    let turn = 2.0 * half_turn;
    Vector3::new(
        direction * chord * arc_ratio / dt,
        turn / dt,
        normalize_angle(dtheta - turn) / dt,
    )
}

/// Relative-motion constraint between two consecutive poses.
///
/// # Example
///
/// ```
/// use graph_slam::factors::{Factor, OdometryEdge};
/// use nalgebra::Vector2;
///
/// let odometry = OdometryEdge::new(Vector2::new(1.0, 0.0), [0.01; 6], 1e-9)?;
/// // Moving exactly one unit forward matches the command.
/// let error = odometry.residual(&[&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]]);
/// assert!(error.norm() < 1e-12);
/// # Ok::<(), graph_slam::factors::FactorError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OdometryEdge {
    command: Vector2<f64>,
    alpha: Matrix3x2<f64>,
    variance: Vector3<f64>,
}

impl OdometryEdge {
    /// Create an odometry factor from a velocity command and its six noise coefficients.
    ///
    /// Variances below `min_variance` are clamped to it; a zero command would otherwise
    /// produce an infinite information matrix.
    pub fn new(command: Vector2<f64>, alpha: [f64; 6], min_variance: f64) -> FactorResult<Self> {
        ensure_finite(command.as_slice(), "control command")?;
        ensure_finite(&alpha, "motion noise coefficients")?;
        if alpha.iter().any(|&a| a < 0.0) {
            return Err(FactorError::InvalidCovariance(format!(
                "motion noise coefficients must be non-negative, got {alpha:?}"
            ))
            .log());
        }
        if !(min_variance.is_finite() && min_variance > 0.0) {
            return Err(FactorError::InvalidCovariance(format!(
                "minimum odometry variance must be positive, got {min_variance}"
            ))
            .log());
        }

        let alpha = Matrix3x2::from_row_slice(&alpha);
        let variance = (alpha * command.component_mul(&command)).map(|s| s.max(min_variance));
        Ok(Self {
            command,
            alpha,
            variance,
        })
    }

    pub fn command(&self) -> &Vector2<f64> {
        &self.command
    }

    pub fn alpha(&self) -> &Matrix3x2<f64> {
        &self.alpha
    }

    /// Relative transform this command predicts for one control interval.
    pub fn predicted_motion(&self) -> Transform2D {
        arc_motion(&self.command, CONTROL_INTERVAL)
    }
}

impl Factor for OdometryEdge {
    fn residual(&self, params: &[&[f64]]) -> DVector<f64> {
        let (from, to) = (params[0], params[1]);
        assert!(
            from.len() == 3 && to.len() == 3,
            "odometry edge must bind two poses"
        );
        let from = Transform2D::from_pose(from[0], from[1], from[2]);
        let to = Transform2D::from_pose(to[0], to[1], to[2]);
        let relative = (from.inverse() * to).to_pose();
        let estimated = velocities_from_motion(&relative, CONTROL_INTERVAL);

        DVector::from_vec(vec![
            self.command[0] - estimated[0],
            self.command[1] - estimated[1],
            estimated[2],
        ])
    }

    fn information(&self) -> DMatrix<f64> {
        DMatrix::from_diagonal(&DVector::from_iterator(
            3,
            self.variance.iter().map(|v| 1.0 / v),
        ))
    }

    fn dimension(&self) -> usize {
        3
    }

    fn angular_rows(&self) -> &'static [usize] {
        &[1, 2]
    }
}
