//! Graph construction from a timeline and the outer optimization loop.
//!
//! # Construction
//!
//! 1. One pose variable per frame. Pose 0 starts at the origin; a frame with an `init` event
//!    starts at that pose, otherwise the previous pose is composed with the arc driven by the
//!    frame's `control` command (or copied when there is none).
//! 2. Every event is fed, in order, to every constraint builder; whatever a builder has ready
//!    afterwards is harvested. Pose edges are kept as a flat list, features are merged by
//!    landmark identity and each new identity gets one landmark variable.
//!
//! # Optimization
//!
//! Each outer iteration linearizes every edge, assembles the partitioned normal equations and
//! runs the damped trial loop described in [`levenberg_marquardt`](super::levenberg_marquardt).
//! The run converges once an iteration improves χ² by less than the convergence threshold.
//!
//! # Example
//!
//! ```
//! use graph_slam::core::event::{Event, Timeline};
//! use graph_slam::optimizer::GraphOptimizer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let alpha = [0.01; 6];
//! let timeline = Timeline::new(vec![
//!     vec![Event::init(0.0, 0.0, 0.0)],
//!     vec![Event::control(1.0, 0.0, alpha)],
//!     vec![Event::control(1.0, 0.1, alpha)],
//! ]);
//!
//! let mut optimizer = GraphOptimizer::new(&timeline)?;
//! assert!(optimizer.optimize(100));
//! assert_eq!(optimizer.poses().len(), 3);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};

use nalgebra::{DVector, Vector2, Vector3};
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::constraints::{BuildContext, BuilderConfig, ConstraintBuilder, default_builders};
use crate::core::CoreError;
use crate::core::edge::{Edge, VertexId};
use crate::core::event::{Event, LandmarkId, Timeline};
use crate::core::feature::{Feature, FeatureKind, FeatureSnapshot, GraphSnapshot};
use crate::core::graph::Variables;
use crate::core::variable::{LANDMARK_DIM, POSE_DIM, Variable};
use crate::factors::{CONTROL_INTERVAL, arc_motion};
use crate::linalg::{LinearSolver, create_linear_solver};
use crate::manifold::Transform2D;
use crate::optimizer::levenberg_marquardt::{
    DampingState, IterationStats, LevenbergMarquardtConfig, angle_step_scale, gain_ratio,
};
use crate::optimizer::{
    NormalEquations, OptimizationStatus, OptimizationSummary, OptimizerError, OptimizerResult,
};

/// Result of the damped trial loop of one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StepOutcome {
    /// No pose edges, nothing to solve
    Skipped,
    Accepted { trials: usize, step_norm: f64 },
    /// Every trial was rolled back, or the damping blew past its ceiling
    Rejected { trials: usize },
    /// Every trial failed in the linear solver
    Singular { trials: usize },
}

#[derive(Debug, Default)]
struct RunCounters {
    successful_trials: usize,
    unsuccessful_trials: usize,
    degraded_slots: HashSet<usize>,
}

pub struct GraphOptimizer {
    variables: Variables,
    pose_edges: Vec<Edge>,
    /// Indexed by landmark slot.
    features: Vec<Feature>,
    config: LevenbergMarquardtConfig,
    solver: Box<dyn LinearSolver + Send>,
    damping: DampingState,
}

impl GraphOptimizer {
    /// Build the graph with the default builders and configuration.
    pub fn new(timeline: &Timeline) -> OptimizerResult<Self> {
        Self::with_config(
            timeline,
            &BuilderConfig::default(),
            LevenbergMarquardtConfig::default(),
        )
    }

    pub fn with_config(
        timeline: &Timeline,
        builder_config: &BuilderConfig,
        config: LevenbergMarquardtConfig,
    ) -> OptimizerResult<Self> {
        Self::with_builders(timeline, default_builders(builder_config), config)
    }

    /// Build the graph running exactly the given builders over the timeline.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EmptyTimeline`] if the timeline has no frames
    /// - [`CoreError::InvalidEvent`] if a builder rejects the data of an event
    pub fn with_builders(
        timeline: &Timeline,
        mut builders: Vec<Box<dyn ConstraintBuilder>>,
        config: LevenbergMarquardtConfig,
    ) -> OptimizerResult<Self> {
        if timeline.is_empty() {
            return Err(OptimizerError::from(CoreError::EmptyTimeline.log()));
        }

        let poses = initial_poses(timeline);
        let mut pose_edges = Vec::new();
        let mut harvested = Vec::new();
        for (step, frame) in timeline.frames().iter().enumerate() {
            let context = BuildContext::new(step, &poses);
            for event in frame {
                if matches!(event, Event::Unknown) {
                    warn!("ignoring event of unknown type at step {step}");
                }
                for builder in builders.iter_mut() {
                    builder.add_event(&context, event)?;
                    if !builder.ready() {
                        continue;
                    }
                    let constraint = builder.build();
                    pose_edges.extend(constraint.pose_edges);
                    harvested.extend(constraint.features);
                }
            }
        }

        let mut variables = Variables::new(poses);
        let features = merge_features(&mut variables, harvested);
        let landmark_edges: usize = features.iter().map(|f| f.edges().len()).sum();
        info!(
            "graph built: {} poses, {} landmarks, {} pose edges, {} landmark edges",
            variables.num_poses(),
            variables.num_landmarks(),
            pose_edges.len(),
            landmark_edges
        );

        let solver = create_linear_solver(config.linear_solver_type);
        let damping = DampingState::new(config.initial_damping_growth);
        Ok(Self {
            variables,
            pose_edges,
            features,
            config,
            solver,
            damping,
        })
    }

    pub fn config(&self) -> &LevenbergMarquardtConfig {
        &self.config
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Current `(x, y, yaw)` of every pose, in timestep order.
    pub fn poses(&self) -> Vec<Vector3<f64>> {
        self.variables
            .poses()
            .iter()
            .filter_map(Variable::as_pose)
            .copied()
            .collect()
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn pose_edges(&self) -> &[Edge] {
        &self.pose_edges
    }

    pub fn num_landmarks(&self) -> usize {
        self.variables.num_landmarks()
    }

    /// Current estimate of a landmark.
    pub fn landmark(&self, id: &LandmarkId) -> Option<Vector2<f64>> {
        self.variables.landmark(id)
    }

    pub fn all_params(&self) -> DVector<f64> {
        self.variables.all_params()
    }

    /// Overwrite every estimate. Cached errors go stale until [`compute_errors`](Self::compute_errors).
    pub fn set_all_params(&mut self, params: &DVector<f64>) -> OptimizerResult<()> {
        self.variables.set_all_params(params)?;
        Ok(())
    }

    /// Read-only view of the current estimate for plotting.
    pub fn snapshot(&self) -> GraphSnapshot {
        let poses = self.poses().iter().map(|p| [p.x, p.y, p.z]).collect();
        let features = self
            .features
            .iter()
            .map(|feature| {
                let visualization_data = match feature.kind() {
                    FeatureKind::Point => self
                        .variables
                        .landmark(feature.id())
                        .map(|p| vec![p.x, p.y]),
                    FeatureKind::Line | FeatureKind::Undefined => None,
                };
                FeatureSnapshot {
                    id: feature.id().clone(),
                    kind: feature.kind(),
                    visualization_data,
                    observations: feature.edges().len(),
                }
            })
            .collect();
        GraphSnapshot { poses, features }
    }

    fn all_edges(&self) -> impl Iterator<Item = &Edge> {
        self.pose_edges
            .iter()
            .chain(self.features.iter().flat_map(|f| f.edges()))
    }

    /// Refresh the cached error of every edge.
    pub fn compute_errors(&mut self) {
        let variables = &self.variables;
        for edge in self.pose_edges.iter_mut() {
            edge.compute_error(variables);
        }
        for edge in self.features.iter_mut().flat_map(|f| f.edges_mut().iter_mut()) {
            edge.compute_error(variables);
        }
    }

    /// Total χ² over the cached errors.
    pub fn chi2(&self) -> f64 {
        self.all_edges().map(Edge::chi2).sum()
    }

    /// Recompute every Jacobian at the current estimate.
    pub fn linearize(&mut self) {
        let variables = &mut self.variables;
        for edge in self.pose_edges.iter_mut() {
            edge.linearize(variables);
        }
        for edge in self.features.iter_mut().flat_map(|f| f.edges_mut().iter_mut()) {
            edge.linearize(variables);
        }
    }

    /// Normal equations of the last linearization.
    pub fn assemble(&self) -> NormalEquations {
        NormalEquations::assemble(
            &self.variables,
            &self.pose_edges,
            self.features.iter().flat_map(|f| f.edges()),
        )
    }

    fn vertex_step(&self, id: &VertexId, update: &DVector<f64>) -> DVector<f64> {
        match id {
            VertexId::Pose(step) => update
                .rows(Variables::pose_offset(*step), POSE_DIM)
                .into_owned(),
            VertexId::Landmark(landmark) => {
                let slot = self
                    .variables
                    .landmark_slot(landmark)
                    .unwrap_or_else(|| panic!("unknown landmark {landmark}"));
                update
                    .rows(self.variables.landmark_offset(slot), LANDMARK_DIM)
                    .into_owned()
            }
        }
    }

    /// χ² predicted by the linearized model after applying `update`, over pose and landmark
    /// edges alike.
    pub fn linearized_chi2(&self, update: &DVector<f64>) -> f64 {
        self.all_edges()
            .map(|edge| {
                let steps: Vec<_> = edge
                    .vertices()
                    .iter()
                    .map(|id| self.vertex_step(id, update))
                    .collect();
                let error = edge.linearized_error(&steps);
                error.dot(&(edge.information() * &error))
            })
            .sum()
    }

    fn note_degraded(&self, slots: &[usize], counters: &mut RunCounters) {
        for &slot in slots {
            if counters.degraded_slots.insert(slot) {
                warn!(
                    "landmark {} has a singular information block; using its pseudo-inverse",
                    self.features[slot].id()
                );
            }
        }
    }

    /// Damped trial loop of one outer iteration.
    fn solve_and_update(
        &mut self,
        system: &NormalEquations,
        counters: &mut RunCounters,
    ) -> StepOutcome {
        if self.pose_edges.is_empty() {
            return StepOutcome::Skipped;
        }
        self.damping
            .get_or_seed(system.max_diagonal(), self.config.damping_scale);

        self.compute_errors();
        let chi2_before = self.chi2();
        let gradient = system.gradient();
        let num_poses = self.variables.num_poses();
        let mut trials = 0;
        let mut solve_failures = 0;

        while trials < self.config.max_damping_trials {
            let Some(lambda) = self.damping.lambda() else {
                break;
            };
            trials += 1;

            let step = match system.solve_damped(lambda, self.solver.as_mut()) {
                Ok(step) => step,
                Err(e) => {
                    warn!(
                        "L: {} linear solve failed at lambda {:.3e}: {}",
                        trials - 1,
                        lambda,
                        e
                    );
                    solve_failures += 1;
                    counters.unsuccessful_trials += 1;
                    if !self.damping.reject(self.config.max_damping) {
                        break;
                    }
                    continue;
                }
            };
            self.note_degraded(&step.degraded_landmarks, counters);

            let scale = angle_step_scale(&step.update, num_poses, self.config.max_angle_step);
            let update = step.update * scale;
            if tracing::enabled!(tracing::Level::DEBUG) {
                debug!(
                    "L: {} angle induced scale: {:.3e}, predicted chi2: {:.6e}",
                    trials - 1,
                    scale,
                    self.linearized_chi2(&update)
                );
            }

            let previous = self.variables.all_params();
            self.variables.apply_update_unchecked(&update);
            self.compute_errors();
            let chi2_after = self.chi2();
            let rho = gain_ratio(
                chi2_before,
                chi2_after,
                &update,
                &gradient,
                lambda,
                self.config.predicted_reduction_bias,
            );
            debug!(
                "L: {} chi2: {:.6e}, lambda: {:.3e}, rho: {:.3e}",
                trials - 1,
                chi2_after,
                lambda,
                rho
            );

            if rho > 0.0 && chi2_after.is_finite() {
                self.damping.accept(rho);
                counters.successful_trials += 1;
                return StepOutcome::Accepted {
                    trials,
                    step_norm: update.norm(),
                };
            }

            self.variables.set_all_params_unchecked(&previous);
            self.compute_errors();
            counters.unsuccessful_trials += 1;
            if !self.damping.reject(self.config.max_damping) {
                debug!("damping exceeded {:.1e}; reset", self.config.max_damping);
                break;
            }
        }

        if trials > 0 && solve_failures == trials {
            return StepOutcome::Singular { trials };
        }
        if trials == self.config.max_damping_trials {
            warn!("could not improve chi2 in {trials} damping trials");
        }
        StepOutcome::Rejected { trials }
    }

    /// Run at most `max_steps` outer iterations. Returns `true` on convergence.
    pub fn optimize(&mut self, max_steps: usize) -> bool {
        self.optimize_with_summary(max_steps).status.is_converged()
    }

    /// [`optimize`](Self::optimize) with the full run statistics.
    pub fn optimize_with_summary(&mut self, max_steps: usize) -> OptimizationSummary {
        let start = Instant::now();
        self.compute_errors();
        let initial_chi2 = self.chi2();
        info!("initial chi2: {initial_chi2:.6e}");

        let mut counters = RunCounters::default();
        let mut iterations = 0;
        let mut status = OptimizationStatus::MaxIterationsReached;
        let mut last_chi2 = initial_chi2;

        if !initial_chi2.is_finite() {
            status = OptimizationStatus::InvalidNumericalValues;
        } else {
            if tracing::enabled!(tracing::Level::DEBUG) {
                self.config.print_configuration();
                IterationStats::print_header();
            }

            while iterations < max_steps {
                let iteration_start = Instant::now();
                self.linearize();
                let system = self.assemble();
                let outcome = self.solve_and_update(&system, &mut counters);
                self.compute_errors();
                let current_chi2 = self.chi2();
                iterations += 1;

                if tracing::enabled!(tracing::Level::DEBUG) {
                    let (trials, step_norm, accepted) = match outcome {
                        StepOutcome::Skipped => (0, 0.0, false),
                        StepOutcome::Accepted { trials, step_norm } => (trials, step_norm, true),
                        StepOutcome::Rejected { trials } | StepOutcome::Singular { trials } => {
                            (trials, 0.0, false)
                        }
                    };
                    IterationStats {
                        iteration: iterations - 1,
                        chi2: current_chi2,
                        chi2_change: last_chi2 - current_chi2,
                        damping: self.damping.lambda(),
                        trials,
                        step_norm,
                        iter_time_ms: iteration_start.elapsed().as_secs_f64() * 1000.0,
                        total_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                        accepted,
                    }
                    .print_line();
                }

                if matches!(outcome, StepOutcome::Singular { .. }) {
                    warn!("linear system is singular for every damping value; stopping");
                    status = OptimizationStatus::SingularSystem;
                    break;
                }
                if last_chi2 - current_chi2 >= self.config.convergence_threshold {
                    last_chi2 = current_chi2;
                    continue;
                }
                status = OptimizationStatus::Converged;
                break;
            }
        }

        let final_damping = self.damping.lambda();
        self.damping.reset();
        let summary = OptimizationSummary {
            initial_chi2,
            final_chi2: self.chi2(),
            iterations,
            successful_trials: counters.successful_trials,
            unsuccessful_trials: counters.unsuccessful_trials,
            final_damping,
            degraded_landmarks: counters.degraded_slots.len(),
            total_time: start.elapsed(),
            status,
        };
        info!(
            "final chi2: {:.6e} after {} iterations ({})",
            summary.final_chi2, summary.iterations, summary.status
        );
        summary
    }
}

/// Initial pose estimates, one per frame.
fn initial_poses(timeline: &Timeline) -> Vec<Variable> {
    let mut current = Transform2D::identity();
    let mut poses = Vec::with_capacity(timeline.len());
    for (step, frame) in timeline.frames().iter().enumerate() {
        let init = frame.iter().find_map(|event| match event {
            Event::Init { pose } => Some(*pose),
            _ => None,
        });
        let command = frame.iter().find_map(|event| match event {
            Event::Control { command, .. } => Some(Vector2::from(*command)),
            _ => None,
        });

        if let Some([x, y, yaw]) = init {
            current = Transform2D::from_pose(x, y, yaw);
        } else if step > 0
            && let Some(command) = command
        {
            current = current * arc_motion(&command, CONTROL_INTERVAL);
        }
        poses.push(Variable::from(current.to_pose()));
    }
    poses
}

/// Merge harvested features by identity, registering a landmark variable for each new one.
///
/// The returned order matches the landmark slots of `variables`.
fn merge_features(variables: &mut Variables, harvested: Vec<Feature>) -> Vec<Feature> {
    let mut features: Vec<Feature> = Vec::new();
    let mut index: HashMap<LandmarkId, usize> = HashMap::new();
    for feature in harvested {
        if let Some(&slot) = index.get(feature.id()) {
            features[slot].absorb(feature);
            continue;
        }
        let slot = variables.insert_landmark(feature.id().clone(), *feature.initial_estimate());
        debug_assert_eq!(slot, features.len());
        index.insert(feature.id().clone(), slot);
        features.push(feature);
    }
    features
}
