//! Gauss-Newton normal equations partitioned into pose and landmark blocks.
//!
//! Every edge contributes `Jᵢᵀ Ω Jⱼ` to the Hessian block of each vertex pair and `Jᵢᵀ Ω e` to
//! the gradient of each vertex. Pose-only edges land in `Hpp`/`bp`; a landmark observation
//! additionally fills its landmark's 2×2 `Hll` block, the `Hpl` coupling columns and `bl`.

use crate::core::edge::{Edge, VertexId};
use crate::core::graph::Variables;
use crate::core::variable::{LANDMARK_DIM, POSE_DIM};
use crate::linalg::schur::{self, LandmarkBlockInverses};
use crate::linalg::{LinAlgResult, LinearSolver};
use nalgebra::{DMatrix, DVector, Matrix2};

#[derive(Debug, Clone)]
pub struct NormalEquations {
    pub hpp: DMatrix<f64>,
    pub bp: DVector<f64>,
    /// One block per landmark slot.
    pub hll: Vec<Matrix2<f64>>,
    /// Pose rows by `2 · num_landmarks` columns.
    pub hpl: DMatrix<f64>,
    pub bl: DVector<f64>,
}

/// Solution of one damped system.
#[derive(Debug, Clone)]
pub struct DampedStep {
    /// Stacked pose then landmark increment.
    pub update: DVector<f64>,
    /// Landmark slots whose block needed the pseudo-inverse.
    pub degraded_landmarks: Vec<usize>,
}

impl NormalEquations {
    /// Accumulate the linearized edges.
    ///
    /// # Panics
    ///
    /// If an edge was not linearized, a pose edge binds a landmark, a landmark edge is not
    /// ordered (pose, landmark), or a vertex is missing from `variables`.
    pub fn assemble<'a>(
        variables: &Variables,
        pose_edges: &[Edge],
        landmark_edges: impl IntoIterator<Item = &'a Edge>,
    ) -> Self {
        let pose_dim = variables.pose_dim();
        let num_landmarks = variables.num_landmarks();
        let mut system = Self {
            hpp: DMatrix::zeros(pose_dim, pose_dim),
            bp: DVector::zeros(pose_dim),
            hll: vec![Matrix2::zeros(); num_landmarks],
            hpl: DMatrix::zeros(pose_dim, LANDMARK_DIM * num_landmarks),
            bl: DVector::zeros(LANDMARK_DIM * num_landmarks),
        };

        for edge in pose_edges {
            system.add_pose_edge(edge);
        }
        for edge in landmark_edges {
            system.add_landmark_edge(variables, edge);
        }
        system
    }

    fn add_pose_edge(&mut self, edge: &Edge) {
        let omega = edge.information();
        for i in 0..edge.vertices().len() {
            let row = Variables::pose_offset(edge.pose_index(i));
            let jt_omega = edge.jacobian(i).transpose() * omega;
            for j in 0..edge.vertices().len() {
                let col = Variables::pose_offset(edge.pose_index(j));
                let block = &jt_omega * edge.jacobian(j);
                let mut target = self.hpp.fixed_view_mut::<POSE_DIM, POSE_DIM>(row, col);
                target += block;
            }
            let mut target = self.bp.fixed_rows_mut::<POSE_DIM>(row);
            target += &jt_omega * edge.error();
        }
    }

    fn add_landmark_edge(&mut self, variables: &Variables, edge: &Edge) {
        let VertexId::Landmark(id) = &edge.vertices()[1] else {
            panic!("landmark edge must bind (pose, landmark)");
        };
        let slot = variables
            .landmark_slot(id)
            .unwrap_or_else(|| panic!("unknown landmark {id}"));
        let pose_row = Variables::pose_offset(edge.pose_index(0));
        let landmark_col = LANDMARK_DIM * slot;

        let omega = edge.information();
        let jp = edge.jacobian(0);
        let jl = edge.jacobian(1);
        let jp_t_omega = jp.transpose() * omega;
        let jl_t_omega = jl.transpose() * omega;

        let mut hpp = self.hpp.fixed_view_mut::<POSE_DIM, POSE_DIM>(pose_row, pose_row);
        hpp += &jp_t_omega * jp;
        let hll = &jl_t_omega * jl;
        self.hll[slot] += hll.fixed_view::<LANDMARK_DIM, LANDMARK_DIM>(0, 0);
        let mut hpl = self
            .hpl
            .fixed_view_mut::<POSE_DIM, LANDMARK_DIM>(pose_row, landmark_col);
        hpl += &jp_t_omega * jl;

        let mut bp = self.bp.fixed_rows_mut::<POSE_DIM>(pose_row);
        bp += &jp_t_omega * edge.error();
        let mut bl = self.bl.fixed_rows_mut::<LANDMARK_DIM>(landmark_col);
        bl += &jl_t_omega * edge.error();
    }

    pub fn num_landmarks(&self) -> usize {
        self.hll.len()
    }

    /// Largest diagonal entry over `Hpp` and all `Hll` blocks.
    pub fn max_diagonal(&self) -> f64 {
        let poses = self.hpp.diagonal().iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.hll
            .iter()
            .flat_map(|block| [block[(0, 0)], block[(1, 1)]])
            .fold(poses, f64::max)
    }

    /// Stacked gradient `[bp; bl]`.
    pub fn gradient(&self) -> DVector<f64> {
        let mut gradient = DVector::zeros(self.bp.len() + self.bl.len());
        gradient.rows_mut(0, self.bp.len()).copy_from(&self.bp);
        gradient.rows_mut(self.bp.len(), self.bl.len()).copy_from(&self.bl);
        gradient
    }

    /// Joint Hessian over poses and landmarks, undamped.
    pub fn full_hessian(&self) -> DMatrix<f64> {
        let p = self.hpp.nrows();
        let n = p + self.bl.len();
        let mut h = DMatrix::zeros(n, n);
        h.view_mut((0, 0), (p, p)).copy_from(&self.hpp);
        h.view_mut((0, p), (p, self.hpl.ncols())).copy_from(&self.hpl);
        h.view_mut((p, 0), (self.hpl.ncols(), p))
            .copy_from(&self.hpl.transpose());
        for (slot, block) in self.hll.iter().enumerate() {
            let offset = p + LANDMARK_DIM * slot;
            h.fixed_view_mut::<LANDMARK_DIM, LANDMARK_DIM>(offset, offset)
                .copy_from(block);
        }
        h
    }

    /// Solve `(H + λI) Δ = −b`, eliminating landmarks first when there are any.
    pub fn solve_damped(
        &self,
        damping: f64,
        solver: &mut dyn LinearSolver,
    ) -> LinAlgResult<DampedStep> {
        let pose_dim = self.hpp.nrows();
        let damped_hpp = &self.hpp + DMatrix::identity(pose_dim, pose_dim) * damping;

        if self.hll.is_empty() {
            let update = solver.solve(&damped_hpp, &(-&self.bp))?;
            return Ok(DampedStep {
                update,
                degraded_landmarks: Vec::new(),
            });
        }

        let LandmarkBlockInverses {
            inverses,
            degraded,
        } = schur::invert_landmark_blocks(&self.hll, damping);
        let (reduced_hessian, reduced_gradient) =
            schur::reduce(&damped_hpp, &self.hpl, &self.bp, &self.bl, &inverses);
        let pose_update = solver.solve(&reduced_hessian, &(-reduced_gradient))?;
        let landmark_update = schur::back_substitute(&self.hpl, &self.bl, &inverses, &pose_update);

        let mut update = DVector::zeros(pose_dim + landmark_update.len());
        update.rows_mut(0, pose_dim).copy_from(&pose_update);
        update
            .rows_mut(pose_dim, landmark_update.len())
            .copy_from(&landmark_update);
        Ok(DampedStep {
            update,
            degraded_landmarks: degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::LandmarkId;
    use crate::core::variable::Variable;
    use crate::factors::{LandmarkObservationEdge, PriorEdge};
    use crate::linalg::DenseLuSolver;
    use nalgebra::{Vector2, Vector3};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn prior(step: usize, x: f64, y: f64) -> Result<Edge, Box<dyn std::error::Error>> {
        let factor = PriorEdge::new(Vector3::new(x, y, 0.0), Vector3::new(0.1, 0.1, 0.1))?;
        Ok(Edge::prior(step, factor))
    }

    #[test]
    fn test_prior_blocks_land_on_diagonal() -> TestResult {
        let mut variables = Variables::new(vec![
            Variable::pose(0.0, 0.0, 0.0),
            Variable::pose(1.0, 0.0, 0.0),
        ]);
        let mut edges = vec![prior(1, 2.0, 0.0)?];
        edges[0].linearize(&mut variables);

        let system = NormalEquations::assemble(&variables, &edges, []);
        assert!(system.hpp.view((0, 0), (3, 3)).iter().all(|v| *v == 0.0));
        assert!((system.hpp[(3, 3)] - 10.0).abs() < 1e-4);
        // e = target - pose = (1, 0, 0), J = -I, so b = Jᵀ Ω e = (-10, 0, 0).
        assert!((system.bp[3] + 10.0).abs() < 1e-4);
        assert!((system.max_diagonal() - 10.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_landmark_edge_fills_coupling() -> TestResult {
        let mut variables = Variables::new(vec![Variable::pose(0.0, 0.0, 0.0)]);
        let id = LandmarkId::from("lamp");
        variables.insert_landmark(id.clone(), Vector2::new(2.0, 1.0));
        let mut edge = Edge::landmark_observation(
            0,
            id,
            LandmarkObservationEdge::new(Vector2::new(2.0, 1.0), [0.5, 0.0, 0.0, 0.5])?,
        );
        edge.linearize(&mut variables);

        let system = NormalEquations::assemble(&variables, &[], [&edge]);
        assert_eq!(system.num_landmarks(), 1);
        assert_eq!(system.hpl.shape(), (3, 2));
        // At yaw 0 the landmark Jacobian is the identity, so Hll = Ω.
        assert!((system.hll[0] - Matrix2::identity() * 2.0).norm() < 1e-4);
        assert!(system.bl.norm() < 1e-9);

        let full = system.full_hessian();
        assert_eq!(full.shape(), (5, 5));
        assert!((&full - full.transpose()).norm() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_damped_solve_without_landmarks() -> TestResult {
        let mut variables = Variables::new(vec![Variable::pose(0.0, 0.0, 0.0)]);
        let mut edges = vec![prior(0, 1.0, -1.0)?];
        edges[0].linearize(&mut variables);
        let system = NormalEquations::assemble(&variables, &edges, []);

        let step = system.solve_damped(0.0, &mut DenseLuSolver::new())?;
        assert!((step.update - DVector::from_vec(vec![1.0, -1.0, 0.0])).norm() < 1e-4);
        assert!(step.degraded_landmarks.is_empty());
        Ok(())
    }
}
