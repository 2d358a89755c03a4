//! # Graph SLAM
//!
//! Sparse nonlinear least-squares backend for planar graph SLAM. A timeline of per-timestep
//! events (initial poses, velocity commands, landmark observations) is turned into a factor
//! graph over SE(2) poses and 2D landmarks, which is then refined with Levenberg-Marquardt.
//!
//! ## Features
//!
//! - **Event-driven graph construction**: pluggable [`ConstraintBuilder`]s turn events into
//!   prior, odometry and landmark observation edges
//! - **Numeric Jacobians**: every edge is linearized by central differences, with angular
//!   residuals wrapped so probes across ±π stay well behaved
//! - **Landmark elimination**: the 2×2 landmark blocks are removed through a Schur complement
//!   before the reduced pose system is solved
//! - **Selectable linear backend**: dense LU or sparse Cholesky on faer
//!
//! ## Example
//!
//! ```
//! use graph_slam::{Event, GraphOptimizer, Timeline};
//!
//! # fn main() -> Result<(), graph_slam::GraphSlamError> {
//! let alpha = [0.05, 0.0, 0.0, 0.05, 0.01, 0.01];
//! let q = [0.1, 0.0, 0.0, 0.1];
//! let timeline = Timeline::new(vec![
//!     vec![Event::init(0.0, 0.0, 0.0), Event::point(1u64, [2.0, 1.0], q)],
//!     vec![Event::control(1.0, 0.0, alpha), Event::point(1u64, [1.1, 1.0], q)],
//! ]);
//!
//! let mut optimizer = GraphOptimizer::new(&timeline)?;
//! let summary = optimizer.optimize_with_summary(100);
//! assert!(summary.final_chi2 <= summary.initial_chi2);
//! # Ok(())
//! # }
//! ```

pub mod constraints;
pub mod core;
pub mod error;
pub mod factors;
#[cfg(feature = "io")]
pub mod io;
pub mod linalg;
#[cfg(feature = "logging")]
pub mod logger;
pub mod manifold;
pub mod optimizer;

// Re-export core types
pub use core::event::{Event, LandmarkId, Timeline};
pub use core::feature::{Feature, FeatureKind, FeatureSnapshot, GraphSnapshot};
pub use core::variable::Variable;
pub use error::{GraphSlamError, GraphSlamResult};

pub use constraints::{BuilderConfig, ConstraintBuilder, default_builders};
pub use factors::{EdgeKind, Factor};
pub use linalg::{LinearSolver, LinearSolverType};
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
pub use manifold::Transform2D;
pub use optimizer::{
    GraphOptimizer, LevenbergMarquardtConfig, OptimizationStatus, OptimizationSummary,
};
