//! Constraint builders turning the event stream into edges and features.
//!
//! Each builder is a two-state machine, `idle → ready → idle`:
//!
//! 1. [`add_event`](ConstraintBuilder::add_event) receives every event in timeline order. An
//!    event of a foreign type drops whatever the builder had buffered and leaves it idle;
//!    an event it consumes is turned into a buffered [`Constraint`] and makes it ready.
//! 2. [`ready`](ConstraintBuilder::ready) reports whether a constraint is buffered.
//! 3. [`build`](ConstraintBuilder::build) hands the constraint over and returns to idle.
//!    Calling it while idle is a contract violation and panics.
//!
//! The driving loop feeds each event to every builder and harvests any builder that became
//! ready, which lets the prior, odometry and landmark builders run side by side over one
//! interleaved stream without sharing state.
//!
//! The set of builders is an explicit list chosen by the caller; [`default_builders`] returns
//! the three shipped with the crate.

use crate::core::CoreResult;
use crate::core::edge::Edge;
use crate::core::event::Event;
use crate::core::feature::Feature;
use crate::core::variable::Variable;
use nalgebra::Vector3;

pub mod landmark_builder;
pub mod odometry_builder;
pub mod prior_builder;

pub use landmark_builder::LandmarkConstraintBuilder;
pub use odometry_builder::OdometryConstraintBuilder;
pub use prior_builder::PriorEdgeConstraintBuilder;

/// Read-only view of the graph handed to builders with every event.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Timestep of the frame the event belongs to.
    pub step: usize,
    /// Initial pose estimates, one per timestep of the whole timeline.
    pub poses: &'a [Variable],
}

impl<'a> BuildContext<'a> {
    pub fn new(step: usize, poses: &'a [Variable]) -> Self {
        Self { step, poses }
    }

    /// Current estimate of the pose at this context's timestep.
    ///
    /// # Panics
    ///
    /// If the step is outside the pose list or the entry is not a pose.
    pub fn current_pose(&self) -> Vector3<f64> {
        self.poses
            .get(self.step)
            .and_then(Variable::as_pose)
            .copied()
            .unwrap_or_else(|| panic!("no pose for timestep {}", self.step))
    }
}

/// Bundle of pose edges and landmark features produced by one builder firing.
#[derive(Debug, Clone, Default)]
pub struct Constraint {
    pub pose_edges: Vec<Edge>,
    pub features: Vec<Feature>,
}

impl Constraint {
    pub fn from_pose_edges(pose_edges: Vec<Edge>) -> Self {
        Self {
            pose_edges,
            features: Vec::new(),
        }
    }

    pub fn from_features(features: Vec<Feature>) -> Self {
        Self {
            pose_edges: Vec::new(),
            features,
        }
    }
}

pub trait ConstraintBuilder {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Consume one event. Errors report event data the residual models reject.
    fn add_event(&mut self, context: &BuildContext<'_>, event: &Event) -> CoreResult<()>;

    fn ready(&self) -> bool;

    /// Take the buffered constraint.
    ///
    /// # Panics
    ///
    /// If the builder is not ready.
    fn build(&mut self) -> Constraint;
}

/// Noise settings used by the builders.
///
/// # Example
///
/// ```
/// use graph_slam::constraints::BuilderConfig;
/// use nalgebra::Vector3;
///
/// let config = BuilderConfig::new()
///     .with_prior_covariance(Vector3::new(0.01, 0.01, 0.001))
///     .with_min_odometry_variance(1e-6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderConfig {
    /// Diagonal covariance of the prior created from each `init` event
    pub prior_covariance: Vector3<f64>,
    /// Lower bound on odometry variances, keeps zero commands finite
    pub min_odometry_variance: f64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            prior_covariance: Vector3::new(0.1, 0.1, 0.1),
            min_odometry_variance: 1e-9,
        }
    }
}

impl BuilderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prior_covariance(mut self, prior_covariance: Vector3<f64>) -> Self {
        self.prior_covariance = prior_covariance;
        self
    }

    pub fn with_min_odometry_variance(mut self, min_odometry_variance: f64) -> Self {
        self.min_odometry_variance = min_odometry_variance;
        self
    }
}

/// Prior, odometry and landmark builders, each with its own fresh buffer.
pub fn default_builders(config: &BuilderConfig) -> Vec<Box<dyn ConstraintBuilder>> {
    vec![
        Box::new(PriorEdgeConstraintBuilder::new(config.prior_covariance)),
        Box::new(OdometryConstraintBuilder::new(config.min_odometry_variance)),
        Box::new(LandmarkConstraintBuilder::new()),
    ]
}
