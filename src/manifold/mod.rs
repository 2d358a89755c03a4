//! Rigid-body geometry on the plane.
//!
//! The optimizer works with two kinds of state:
//!
//! Space         | params        | update rule
//! ------------- | ------------- | ------------------------------------------------
//! SE(2) pose    | (x, y, yaw)   | body-frame step: `t += R(yaw)·(dx, dy)`, `yaw += dyaw`
//! R² landmark   | (x, y)        | plain addition in the world frame
//!
//! [`Transform2D`] carries the group algebra used by the residual models
//! (composition, inversion, pose conversion), while [`normalize_angle`] keeps
//! angular quantities in the principal range `(-π, π]`.

use std::f64::consts::PI;

pub mod transform2d;

pub use transform2d::Transform2D;

/// Wrap an angle into `(-π, π]`.
///
/// Non-finite inputs are returned unchanged so callers can detect them downstream.
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }
    let wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}
