//! Levenberg-Marquardt damping control.
//!
//! Each outer iteration solves the damped normal equations
//!
//! ```text
//! (H + λI)·Δ = −b
//! ```
//!
//! for up to [`max_damping_trials`](LevenbergMarquardtConfig::max_damping_trials) values of λ.
//!
//! ## Initial damping
//!
//! When no damping is carried over, λ is seeded from the assembled system:
//!
//! ```text
//! λ₀ = damping_scale · max(diag(Hpp), diag(Hll))
//! ```
//!
//! ## Step acceptance
//!
//! A trial is scored with the gain ratio
//!
//! ```text
//! ρ = (χ²_before − χ²_after) / (Δᵀ·(λΔ − b) + bias)
//! ```
//!
//! **Accepted** (`ρ > 0` and `χ²_after` finite), Nielsen's update:
//! ```text
//! λ ← λ · clamp(1 − (2ρ − 1)³, 1/3, 2/3),   ν ← 2
//! ```
//!
//! **Rejected**: the parameters are rolled back and
//! ```text
//! λ ← λ · ν,   ν ← 2ν
//! ```
//! Once λ exceeds [`max_damping`](LevenbergMarquardtConfig::max_damping) the damping is dropped,
//! to be reseeded from the next assembled system, and the iteration gives up.
//!
//! ## Step scaling
//!
//! Before a trial is applied the whole step is scaled so that no pose rotates by more than
//! [`max_angle_step`](LevenbergMarquardtConfig::max_angle_step):
//!
//! ```text
//! s = max_angle_step / max(max_angle_step, maxᵢ |Δyawᵢ|)
//! ```

use crate::core::variable::POSE_DIM;
use crate::linalg::LinearSolverType;
use nalgebra::DVector;
use tracing::debug;

/// Configuration parameters for the Levenberg-Marquardt loop.
///
/// ```
/// use graph_slam::linalg::LinearSolverType;
/// use graph_slam::optimizer::LevenbergMarquardtConfig;
///
/// let config = LevenbergMarquardtConfig::new()
///     .with_linear_solver_type(LinearSolverType::SparseCholesky)
///     .with_max_damping_trials(20)
///     .with_convergence_threshold(1e-6);
/// assert_eq!(config.max_damping_trials, 20);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LevenbergMarquardtConfig {
    /// Back end for the reduced pose system
    pub linear_solver_type: LinearSolverType,
    /// Damping values tried per outer iteration before giving up on it
    pub max_damping_trials: usize,
    /// Scale applied to the largest Hessian diagonal entry to seed λ
    pub damping_scale: f64,
    /// λ above which the damping is dropped and reseeded
    pub max_damping: f64,
    /// Growth factor ν applied to λ after the first rejected trial
    pub initial_damping_growth: f64,
    /// Minimum χ² decrease for an outer iteration to count as progress
    pub convergence_threshold: f64,
    /// Largest yaw change in radians any pose may receive from one trial
    pub max_angle_step: f64,
    /// Added to the predicted reduction so a zero step does not divide by zero
    pub predicted_reduction_bias: f64,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            linear_solver_type: LinearSolverType::default(),
            max_damping_trials: 10,
            damping_scale: 1e-5,
            max_damping: 1e15,
            initial_damping_growth: 2.0,
            convergence_threshold: 1e-3,
            max_angle_step: 0.01,
            predicted_reduction_bias: 1e-5,
        }
    }
}

impl LevenbergMarquardtConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_linear_solver_type(mut self, linear_solver_type: LinearSolverType) -> Self {
        self.linear_solver_type = linear_solver_type;
        self
    }

    pub fn with_max_damping_trials(mut self, max_damping_trials: usize) -> Self {
        self.max_damping_trials = max_damping_trials;
        self
    }

    pub fn with_damping_scale(mut self, damping_scale: f64) -> Self {
        self.damping_scale = damping_scale;
        self
    }

    pub fn with_max_damping(mut self, max_damping: f64) -> Self {
        self.max_damping = max_damping;
        self
    }

    pub fn with_initial_damping_growth(mut self, growth: f64) -> Self {
        self.initial_damping_growth = growth;
        self
    }

    pub fn with_convergence_threshold(mut self, convergence_threshold: f64) -> Self {
        self.convergence_threshold = convergence_threshold;
        self
    }

    pub fn with_max_angle_step(mut self, max_angle_step: f64) -> Self {
        self.max_angle_step = max_angle_step;
        self
    }

    pub fn with_predicted_reduction_bias(mut self, bias: f64) -> Self {
        self.predicted_reduction_bias = bias;
        self
    }

    /// Print configuration parameters (debug level only)
    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Solver:        Levenberg-Marquardt\n  Linear solver: {}\n  Damping:\n  Trials per iteration: {}\n  Seed scale:           {:.2e}\n  Max damping:          {:.2e}\n  Initial growth:       {:.2}\n  Step control:\n  Max angle step:       {:.2e} rad\n  Reduction bias:       {:.2e}\n  Convergence:\n  Chi2 threshold:       {:.2e}",
            self.linear_solver_type,
            self.max_damping_trials,
            self.damping_scale,
            self.max_damping,
            self.initial_damping_growth,
            self.max_angle_step,
            self.predicted_reduction_bias,
            self.convergence_threshold,
        );
    }
}

/// Adaptive damping λ and its growth factor ν.
///
/// `lambda` is `None` until seeded from an assembled system, and again after it blew past
/// `max_damping` or the optimization finished.
#[derive(Debug, Clone, PartialEq)]
pub struct DampingState {
    lambda: Option<f64>,
    growth: f64,
    initial_growth: f64,
}

impl DampingState {
    pub fn new(initial_growth: f64) -> Self {
        Self {
            lambda: None,
            growth: initial_growth,
            initial_growth,
        }
    }

    pub fn lambda(&self) -> Option<f64> {
        self.lambda
    }

    /// Current λ, seeding it as `scale · max_diagonal` if unset.
    pub fn get_or_seed(&mut self, max_diagonal: f64, scale: f64) -> f64 {
        *self.lambda.get_or_insert(max_diagonal * scale)
    }

    /// Shrink λ after an accepted step with gain ratio `rho`.
    ///
    /// Reference: Introduction to Optimization and Data Fitting, Algorithm 6.18
    pub fn accept(&mut self, rho: f64) {
        if let Some(lambda) = self.lambda.as_mut() {
            let coff = 2.0 * rho - 1.0;
            *lambda *= (1.0 - coff * coff * coff).clamp(1.0 / 3.0, 2.0 / 3.0);
        }
        self.growth = self.initial_growth;
    }

    /// Grow λ after a rejected step. Returns `false` once λ exceeded `max_damping`, in which
    /// case the damping has been dropped.
    pub fn reject(&mut self, max_damping: f64) -> bool {
        let Some(lambda) = self.lambda.as_mut() else {
            return false;
        };
        *lambda *= self.growth;
        self.growth *= 2.0;
        if *lambda > max_damping {
            self.reset();
            return false;
        }
        true
    }

    pub fn reset(&mut self) {
        self.lambda = None;
        self.growth = self.initial_growth;
    }
}

/// Factor keeping every pose's yaw step within `max_angle_step`.
pub fn angle_step_scale(update: &DVector<f64>, num_poses: usize, max_angle_step: f64) -> f64 {
    let max_yaw_step = (0..num_poses)
        .map(|i| update[POSE_DIM * i + 2].abs())
        .fold(0.0, f64::max);
    max_angle_step / max_angle_step.max(max_yaw_step)
}

/// Gain ratio of a trial step, `(χ²_before − χ²_after) / (Δᵀ(λΔ − b) + bias)`.
pub fn gain_ratio(
    chi2_before: f64,
    chi2_after: f64,
    update: &DVector<f64>,
    gradient: &DVector<f64>,
    lambda: f64,
    bias: f64,
) -> f64 {
    let predicted = update.dot(&(update * lambda - gradient)) + bias;
    (chi2_before - chi2_after) / predicted
}

/// Per-iteration statistics for the debug log table.
#[derive(Debug, Clone)]
pub struct IterationStats {
    pub iteration: usize,
    pub chi2: f64,
    /// Decrease of χ² over the iteration, positive when improving
    pub chi2_change: f64,
    /// λ after the iteration, `None` when it was dropped
    pub damping: Option<f64>,
    /// Damping trials spent in this iteration
    pub trials: usize,
    pub step_norm: f64,
    pub iter_time_ms: f64,
    pub total_time_ms: f64,
    pub accepted: bool,
}

impl IterationStats {
    pub fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>13}  {:>11}  {:>6}  {:>11}  {:>11}  {:>13}  {:>6}",
            "iter",
            "chi2",
            "chi2_change",
            "lambda",
            "trials",
            "|step|",
            "iter_time",
            "total_time",
            "status"
        );
    }

    pub fn print_line(&self) {
        let status = if self.accepted { "✓" } else { "✗" };
        let damping = self
            .damping
            .map_or_else(|| "-".to_string(), |lambda| format!("{lambda:.2e}"));
        debug!(
            "{:>4}  {:>13.6e}  {:>13.2e}  {:>11}  {:>6}  {:>11.2e}  {:>9.2}ms  {:>11.2}ms  {:>6}",
            self.iteration,
            self.chi2,
            self.chi2_change,
            damping,
            self.trials,
            self.step_norm,
            self.iter_time_ms,
            self.total_time_ms,
            status
        );
    }
}
