//! Edges connecting residual models to the variables they constrain.
//!
//! An [`Edge`] owns a residual model ([`EdgeKind`]), the ordered list of variables it binds,
//! its constant information matrix, and two caches:
//!
//! - `error`: the residual at the variable values seen by the last
//!   [`compute_error`](Edge::compute_error) (or [`linearize`](Edge::linearize)) call;
//! - `jacobians`: one dense block per bound variable, produced by `linearize`.
//!
//! Both caches go stale as soon as any variable moves. Refreshing them is the caller's job;
//! the optimizer recomputes every error after each update and relinearizes every edge at the
//! start of each outer iteration.
//!
//! # Numerical Jacobians
//!
//! Column `d` of the block for variable `v` is the symmetric difference
//!
//! ```text
//! J[:, d] = (e(v ⊞ ε·u_d) − e(v ⊞ −ε·u_d)) / 2ε,     ε = 1e-9
//! ```
//!
//! where `⊞` is [`Variable::update`], so the derivative is taken with respect to the same
//! local parameterization the solver steps in. Rows holding angles are wrapped before the
//! division so a probe straddling ±π does not produce a spurious 2π jump.

use crate::core::event::LandmarkId;
use crate::core::variable::Variable;
use crate::factors::{EdgeKind, Factor};
use crate::manifold::normalize_angle;
use nalgebra::{DMatrix, DVector};

/// Probe step of the central-difference Jacobian.
pub const JACOBIAN_STEP: f64 = 1e-9;

/// Key of a variable inside a [`VariableStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VertexId {
    /// Pose at the given timestep.
    Pose(usize),
    /// Landmark with the given identity.
    Landmark(LandmarkId),
}

/// Access to the variables edges are evaluated against.
///
/// Implementations panic when asked for a vertex they do not hold; an edge pointing at a
/// missing variable is a construction bug, not a runtime condition.
pub trait VariableStore {
    fn variable(&self, id: &VertexId) -> &Variable;
    fn variable_mut(&mut self, id: &VertexId) -> &mut Variable;
}

#[derive(Debug, Clone)]
pub struct Edge {
    vertices: Vec<VertexId>,
    kind: EdgeKind,
    information: DMatrix<f64>,
    error: DVector<f64>,
    jacobians: Vec<DMatrix<f64>>,
}

impl Edge {
    /// Bind `kind` to `vertices`.
    ///
    /// # Panics
    ///
    /// If the number of vertices does not match the model's arity.
    pub fn new(kind: EdgeKind, vertices: Vec<VertexId>) -> Self {
        assert_eq!(
            vertices.len(),
            kind.arity(),
            "{} edge binds {} variables",
            kind.name(),
            kind.arity()
        );
        let information = kind.information();
        let dimension = kind.dimension();
        Self {
            vertices,
            kind,
            information,
            error: DVector::zeros(dimension),
            jacobians: Vec::new(),
        }
    }

    pub fn prior(pose: usize, factor: impl Into<EdgeKind>) -> Self {
        Self::new(factor.into(), vec![VertexId::Pose(pose)])
    }

    pub fn odometry(from: usize, to: usize, factor: impl Into<EdgeKind>) -> Self {
        Self::new(factor.into(), vec![VertexId::Pose(from), VertexId::Pose(to)])
    }

    pub fn landmark_observation(
        pose: usize,
        landmark: LandmarkId,
        factor: impl Into<EdgeKind>,
    ) -> Self {
        Self::new(
            factor.into(),
            vec![VertexId::Pose(pose), VertexId::Landmark(landmark)],
        )
    }

    pub fn kind(&self) -> &EdgeKind {
        &self.kind
    }

    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    pub fn information(&self) -> &DMatrix<f64> {
        &self.information
    }

    /// Residual cached by the last evaluation.
    pub fn error(&self) -> &DVector<f64> {
        &self.error
    }

    /// Timestep of the `index`-th vertex.
    ///
    /// # Panics
    ///
    /// If that vertex is not a pose.
    pub fn pose_index(&self, index: usize) -> usize {
        match &self.vertices[index] {
            VertexId::Pose(step) => *step,
            VertexId::Landmark(id) => {
                panic!("vertex {index} of {} edge is landmark {id}", self.kind.name())
            }
        }
    }

    /// Jacobian block with respect to the `index`-th vertex.
    ///
    /// # Panics
    ///
    /// If the edge has not been linearized.
    pub fn jacobian(&self, index: usize) -> &DMatrix<f64> {
        assert!(
            index < self.jacobians.len(),
            "edge has no Jacobian for vertex {index}; call linearize() first"
        );
        &self.jacobians[index]
    }

    /// Evaluate the residual without touching the cache.
    pub fn evaluate(&self, store: &impl VariableStore) -> DVector<f64> {
        let params: Vec<&[f64]> = self
            .vertices
            .iter()
            .map(|id| store.variable(id).params())
            .collect();
        self.kind.residual(&params)
    }

    /// Refresh the cached residual.
    pub fn compute_error(&mut self, store: &impl VariableStore) {
        self.error = self.evaluate(store);
    }

    /// Recompute every Jacobian block by central differences.
    ///
    /// Every probed variable is restored to its exact starting parameters, and the cached
    /// error is refreshed at that point before returning.
    pub fn linearize(&mut self, store: &mut impl VariableStore) {
        let angular_rows = self.kind.angular_rows();
        let mut jacobians = Vec::with_capacity(self.vertices.len());

        for id in &self.vertices {
            let start = store.variable(id).params().to_vec();
            let dim = start.len();
            let mut jacobian = DMatrix::zeros(self.kind.dimension(), dim);
            let mut delta = vec![0.0; dim];

            for d in 0..dim {
                delta[d] = JACOBIAN_STEP;
                store.variable_mut(id).update(&delta);
                let plus = self.evaluate(store);
                store.variable_mut(id).set_params(&start);

                delta[d] = -JACOBIAN_STEP;
                store.variable_mut(id).update(&delta);
                let minus = self.evaluate(store);
                store.variable_mut(id).set_params(&start);
                delta[d] = 0.0;

                let mut difference = plus - minus;
                for &row in angular_rows {
                    difference[row] = normalize_angle(difference[row]);
                }
                jacobian.set_column(d, &(difference / (2.0 * JACOBIAN_STEP)));
            }
            jacobians.push(jacobian);
        }

        self.jacobians = jacobians;
        self.compute_error(store);
    }

    /// Mahalanobis-weighted squared error `eᵀ·Ω·e` of the cached residual.
    pub fn chi2(&self) -> f64 {
        self.error.dot(&(&self.information * &self.error))
    }

    /// Cached residual advanced along the linear model, `e + Σ J_i·δ_i`.
    ///
    /// `steps` holds one local increment per vertex, in vertex order.
    pub fn linearized_error(&self, steps: &[DVector<f64>]) -> DVector<f64> {
        steps
            .iter()
            .enumerate()
            .fold(self.error.clone(), |acc, (i, step)| {
                acc + self.jacobian(i) * step
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::Variables;
    use crate::factors::{LandmarkObservationEdge, OdometryEdge, PriorEdge};
    use nalgebra::{Matrix2, Vector2, Vector3};
    use std::f64::consts::PI;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_prior_jacobian_is_negative_identity() -> TestResult {
        let mut store = Variables::new(vec![Variable::pose(1.0, 2.0, 0.3)]);
        let mut edge = Edge::prior(
            0,
            PriorEdge::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0))?,
        );
        edge.linearize(&mut store);

        // Translation steps are taken in the body frame, so the block is -R(yaw) there.
        let (s, c) = 0.3_f64.sin_cos();
        let expected = DMatrix::from_row_slice(3, 3, &[-c, s, 0.0, -s, -c, 0.0, 0.0, 0.0, -1.0]);
        assert!((edge.jacobian(0) - expected).abs().max() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_linearize_restores_variables_and_refreshes_error() -> TestResult {
        let mut store = Variables::new(vec![
            Variable::pose(0.0, 0.0, 0.1),
            Variable::pose(1.0, 0.2, 0.3),
        ]);
        let before = store.all_params();
        let factor = OdometryEdge::new(Vector2::new(1.0, 0.2), [0.01; 6], 1e-9)?;
        let mut edge = Edge::odometry(0, 1, factor);
        edge.linearize(&mut store);

        assert_eq!(store.all_params(), before);
        assert_eq!(edge.error(), &edge.evaluate(&store));
        Ok(())
    }

    #[test]
    fn test_landmark_jacobians_match_analytic_blocks() -> TestResult {
        let yaw = 0.8_f64;
        let mut store = Variables::new(vec![Variable::pose(1.0, -2.0, yaw)]);
        let id = LandmarkId::Index(4);
        store.insert_landmark(id.clone(), Vector2::new(3.0, 1.5));
        let mut edge = Edge::landmark_observation(
            0,
            id,
            LandmarkObservationEdge::new(Vector2::new(1.0, 1.0), [1.0, 0.0, 0.0, 1.0])?,
        );
        edge.linearize(&mut store);

        let (s, c) = yaw.sin_cos();
        let rotation_t = Matrix2::new(c, s, -s, c);
        let offset = Vector2::new(3.0 - 1.0, 1.5 + 2.0);
        let d_yaw = Matrix2::new(-s, c, -c, -s) * offset;
        let expected_pose =
            DMatrix::from_row_slice(2, 3, &[-1.0, 0.0, d_yaw[0], 0.0, -1.0, d_yaw[1]]);
        let expected_landmark = DMatrix::from_column_slice(2, 2, rotation_t.as_slice());

        assert!((edge.jacobian(0) - expected_pose).abs().max() < 1e-5);
        assert!((edge.jacobian(1) - expected_landmark).abs().max() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_angular_rows_are_wrapped_across_pi() -> TestResult {
        let mut store = Variables::new(vec![Variable::pose(0.0, 0.0, 0.0)]);
        let mut edge = Edge::prior(
            0,
            PriorEdge::new(Vector3::new(0.0, 0.0, PI), Vector3::new(1.0, 1.0, 1.0))?,
        );
        edge.linearize(&mut store);
        assert!((edge.jacobian(0)[(2, 2)] + 1.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_stationary_odometry_jacobians_stay_bounded() -> TestResult {
        let mut store = Variables::new(vec![
            Variable::pose(2.0, -1.0, 0.0),
            Variable::pose(2.0, -1.0, 0.0),
        ]);
        let factor = OdometryEdge::new(Vector2::zeros(), [0.01; 6], 1e-9)?;
        let mut edge = Edge::odometry(0, 1, factor);
        edge.linearize(&mut store);

        let from = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.0]);
        let to = DMatrix::from_row_slice(3, 3, &[-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        assert!((edge.jacobian(0) - from).abs().max() < 1e-5, "{}", edge.jacobian(0));
        assert!((edge.jacobian(1) - to).abs().max() < 1e-5, "{}", edge.jacobian(1));
        Ok(())
    }

    #[test]
    fn test_chi2_is_idempotent() -> TestResult {
        let store = Variables::new(vec![Variable::pose(100.0, 100.0, 0.1)]);
        let mut edge = Edge::prior(
            0,
            PriorEdge::new(Vector3::new(500.0, 500.0, 0.1), Vector3::new(0.1, 0.1, 0.1))?,
        );
        edge.compute_error(&store);
        let first = edge.chi2();
        edge.compute_error(&store);
        assert_eq!(first, edge.chi2());
        assert!((first - 3.2e6).abs() < 1e-6);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "call linearize() first")]
    fn test_jacobian_before_linearize_panics() {
        let factor = PriorEdge::new(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0))
            .expect("valid prior");
        let edge = Edge::new(EdgeKind::Prior(factor), vec![VertexId::Pose(0)]);
        let _ = edge.jacobian(0);
    }
}
