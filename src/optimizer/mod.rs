//! Levenberg-Marquardt optimization of a pose graph with landmark elimination.
//!
//! - [`GraphOptimizer`]: builds the graph from a timeline and runs the outer loop
//! - [`NormalEquations`]: assembly of the partitioned Gauss-Newton system and its damped solve
//! - [`levenberg_marquardt`]: damping control, step scaling and the iteration log table

use crate::core::CoreError;
use crate::factors::FactorError;
use crate::linalg;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::error;
use web_time::Duration;

pub mod graph_optimizer;
pub mod levenberg_marquardt;
pub mod normal_equations;

pub use graph_optimizer::GraphOptimizer;
pub use levenberg_marquardt::{DampingState, IterationStats, LevenbergMarquardtConfig};
pub use normal_equations::{DampedStep, NormalEquations};

/// Optimizer-specific error types
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// Graph construction from the timeline failed
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A residual model rejected its parameters
    #[error(transparent)]
    Factor(#[from] FactorError),

    /// Linear algebra operation failed
    #[error("Linear algebra error: {0}")]
    LinAlg(#[from] linalg::LinAlgError),

    /// Invalid optimization parameters provided
    #[error("Invalid optimization parameters: {0}")]
    InvalidParameters(String),
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| OptimizerError::from(e).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error from a third-party library
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Why an optimization run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// An iteration improved χ² by less than the convergence threshold
    Converged,
    /// The step budget ran out while χ² was still improving
    MaxIterationsReached,
    /// No damping trial of an iteration could solve the linear system
    SingularSystem,
    /// NaN or Inf in the objective
    InvalidNumericalValues,
}

impl OptimizationStatus {
    /// Whether `optimize` reports success for this status.
    pub fn is_converged(&self) -> bool {
        matches!(self, OptimizationStatus::Converged)
    }
}

impl Display for OptimizationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::Converged => write!(f, "Converged"),
            OptimizationStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            OptimizationStatus::SingularSystem => write!(f, "Singular linear system"),
            OptimizationStatus::InvalidNumericalValues => {
                write!(f, "Invalid numerical values (NaN/Inf) detected")
            }
        }
    }
}

/// Summary statistics of one optimization run.
#[derive(Debug, Clone)]
pub struct OptimizationSummary {
    pub initial_chi2: f64,
    pub final_chi2: f64,
    /// Outer iterations performed
    pub iterations: usize,
    /// Damping trials whose step was kept
    pub successful_trials: usize,
    /// Damping trials rolled back (rejected or unsolvable)
    pub unsuccessful_trials: usize,
    /// λ when the last iteration ended, `None` if it had been dropped
    pub final_damping: Option<f64>,
    /// Distinct landmarks whose `Hll` block needed the pseudo-inverse at least once
    pub degraded_landmarks: usize,
    pub total_time: Duration,
    pub status: OptimizationStatus,
}

impl Display for OptimizationSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph SLAM Optimization Result")?;
        if self.status.is_converged() {
            writeln!(f, "CONVERGED ({})", self.status)?;
        } else {
            writeln!(f, "DIVERGED ({})", self.status)?;
        }

        writeln!(f)?;
        writeln!(f, "Chi2:")?;
        writeln!(f, "  Initial:   {:.6e}", self.initial_chi2)?;
        writeln!(f, "  Final:     {:.6e}", self.final_chi2)?;
        writeln!(
            f,
            "  Reduction: {:.6e} ({:.2}%)",
            self.initial_chi2 - self.final_chi2,
            100.0 * (self.initial_chi2 - self.final_chi2) / self.initial_chi2.max(1e-12)
        )?;
        writeln!(f)?;
        writeln!(f, "Iterations:")?;
        writeln!(f, "  Total:                {}", self.iterations)?;
        let trials = (self.successful_trials + self.unsuccessful_trials).max(1) as f64;
        writeln!(
            f,
            "  Successful trials:    {} ({:.1}%)",
            self.successful_trials,
            100.0 * self.successful_trials as f64 / trials
        )?;
        writeln!(
            f,
            "  Unsuccessful trials:  {} ({:.1}%)",
            self.unsuccessful_trials,
            100.0 * self.unsuccessful_trials as f64 / trials
        )?;
        match self.final_damping {
            Some(lambda) => writeln!(f, "  Final damping:        {lambda:.2e}")?,
            None => writeln!(f, "  Final damping:        reset")?,
        }
        if self.degraded_landmarks > 0 {
            writeln!(f, "  Degraded landmarks:   {}", self.degraded_landmarks)?;
        }
        writeln!(f)?;
        writeln!(f, "Performance:")?;
        writeln!(
            f,
            "  Total time:             {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )?;
        writeln!(
            f,
            "  Average per iteration:  {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0 / self.iterations.max(1) as f64
        )?;

        Ok(())
    }
}
