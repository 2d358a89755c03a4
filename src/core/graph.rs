//! Variable storage for one pose graph.
//!
//! Poses are indexed by timestep. Landmarks are indexed by their [`LandmarkId`] through an
//! explicit identity map, and keep the order in which they were first inserted. That order
//! defines the landmark slots used by the normal equations: the stacked parameter vector is
//!
//! ```text
//! [ pose_0 (3) | pose_1 (3) | … | pose_{N-1} (3) | landmark_0 (2) | … | landmark_{M-1} (2) ]
//! ```

use crate::core::edge::{VariableStore, VertexId};
use crate::core::event::LandmarkId;
use crate::core::variable::{LANDMARK_DIM, POSE_DIM, Variable};
use crate::core::{CoreError, CoreResult};
use nalgebra::{DVector, Vector2, Vector3};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Variables {
    poses: Vec<Variable>,
    landmarks: Vec<Variable>,
    landmark_slots: HashMap<LandmarkId, usize>,
}

impl Variables {
    /// Create a store holding the given poses and no landmarks.
    ///
    /// # Panics
    ///
    /// If any entry is not a pose.
    pub fn new(poses: Vec<Variable>) -> Self {
        assert!(
            poses.iter().all(Variable::is_pose),
            "pose list contains a landmark variable"
        );
        Self {
            poses,
            landmarks: Vec::new(),
            landmark_slots: HashMap::new(),
        }
    }

    pub fn poses(&self) -> &[Variable] {
        &self.poses
    }

    pub fn num_poses(&self) -> usize {
        self.poses.len()
    }

    pub fn num_landmarks(&self) -> usize {
        self.landmarks.len()
    }

    /// Pose parameters at a timestep.
    pub fn pose(&self, step: usize) -> Option<Vector3<f64>> {
        self.poses.get(step).and_then(Variable::as_pose).copied()
    }

    pub fn landmark(&self, id: &LandmarkId) -> Option<Vector2<f64>> {
        self.landmark_slots
            .get(id)
            .and_then(|&slot| self.landmarks[slot].as_landmark())
            .copied()
    }

    pub fn landmark_slot(&self, id: &LandmarkId) -> Option<usize> {
        self.landmark_slots.get(id).copied()
    }

    /// Register a landmark, returning its slot. An identity that already exists keeps its
    /// current estimate and slot.
    pub fn insert_landmark(&mut self, id: LandmarkId, position: Vector2<f64>) -> usize {
        if let Some(&slot) = self.landmark_slots.get(&id) {
            return slot;
        }
        let slot = self.landmarks.len();
        self.landmarks.push(Variable::Landmark(position));
        self.landmark_slots.insert(id, slot);
        slot
    }

    /// Total number of parameters.
    pub fn dim(&self) -> usize {
        self.pose_dim() + LANDMARK_DIM * self.landmarks.len()
    }

    /// Number of pose parameters, which is also the offset of the first landmark.
    pub fn pose_dim(&self) -> usize {
        POSE_DIM * self.poses.len()
    }

    pub fn pose_offset(step: usize) -> usize {
        POSE_DIM * step
    }

    pub fn landmark_offset(&self, slot: usize) -> usize {
        self.pose_dim() + LANDMARK_DIM * slot
    }

    fn all_variables(&self) -> impl Iterator<Item = &Variable> {
        self.poses.iter().chain(self.landmarks.iter())
    }

    fn all_variables_mut(&mut self) -> impl Iterator<Item = &mut Variable> {
        self.poses.iter_mut().chain(self.landmarks.iter_mut())
    }

    /// Stacked parameters of all poses followed by all landmarks.
    pub fn all_params(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.dim(),
            self.all_variables()
                .flat_map(|v| v.params().iter().copied()),
        )
    }

    /// Overwrite every variable from a stacked parameter vector.
    pub fn set_all_params(&mut self, params: &DVector<f64>) -> CoreResult<()> {
        self.check_length(params.len())?;
        self.set_all_params_unchecked(params);
        Ok(())
    }

    /// Apply a stacked local increment through each variable's own update rule.
    pub fn apply_update(&mut self, update: &DVector<f64>) -> CoreResult<()> {
        self.check_length(update.len())?;
        self.apply_update_unchecked(update);
        Ok(())
    }

    /// [`set_all_params`](Self::set_all_params) for vectors sized from this store.
    pub(crate) fn set_all_params_unchecked(&mut self, params: &DVector<f64>) {
        let mut offset = 0;
        for variable in self.all_variables_mut() {
            let dim = variable.dim();
            variable.set_params(&params.as_slice()[offset..offset + dim]);
            offset += dim;
        }
    }

    /// [`apply_update`](Self::apply_update) for vectors sized from this store.
    pub(crate) fn apply_update_unchecked(&mut self, update: &DVector<f64>) {
        let mut offset = 0;
        for variable in self.all_variables_mut() {
            let dim = variable.dim();
            variable.update(&update.as_slice()[offset..offset + dim]);
            offset += dim;
        }
    }

    fn check_length(&self, actual: usize) -> CoreResult<()> {
        let expected = self.dim();
        if actual == expected {
            Ok(())
        } else {
            Err(CoreError::DimensionMismatch { expected, actual }.log())
        }
    }
}

impl VariableStore for Variables {
    fn variable(&self, id: &VertexId) -> &Variable {
        match id {
            VertexId::Pose(step) => self
                .poses
                .get(*step)
                .unwrap_or_else(|| panic!("no pose at timestep {step}")),
            VertexId::Landmark(landmark) => {
                let slot = self
                    .landmark_slot(landmark)
                    .unwrap_or_else(|| panic!("unknown landmark {landmark}"));
                &self.landmarks[slot]
            }
        }
    }

    fn variable_mut(&mut self, id: &VertexId) -> &mut Variable {
        match id {
            VertexId::Pose(step) => self
                .poses
                .get_mut(*step)
                .unwrap_or_else(|| panic!("no pose at timestep {step}")),
            VertexId::Landmark(landmark) => {
                let slot = self
                    .landmark_slot(landmark)
                    .unwrap_or_else(|| panic!("unknown landmark {landmark}"));
                &mut self.landmarks[slot]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn sample() -> Variables {
        let mut variables = Variables::new(vec![
            Variable::pose(0.0, 0.0, 0.0),
            Variable::pose(1.0, 0.0, std::f64::consts::FRAC_PI_2),
        ]);
        variables.insert_landmark(LandmarkId::from(7u64), Vector2::new(5.0, 5.0));
        variables.insert_landmark(LandmarkId::from("door"), Vector2::new(-1.0, 2.0));
        variables
    }

    #[test]
    fn test_layout_and_offsets() {
        let variables = sample();
        assert_eq!(variables.dim(), 10);
        assert_eq!(variables.pose_dim(), 6);
        assert_eq!(Variables::pose_offset(1), 3);
        assert_eq!(variables.landmark_offset(1), 8);
        assert_eq!(
            variables.all_params().as_slice(),
            &[0.0, 0.0, 0.0, 1.0, 0.0, std::f64::consts::FRAC_PI_2, 5.0, 5.0, -1.0, 2.0]
        );
    }

    #[test]
    fn test_landmarks_are_deduplicated_by_identity() {
        let mut variables = sample();
        let slot = variables.insert_landmark(LandmarkId::from(7u64), Vector2::new(100.0, 100.0));
        assert_eq!(slot, 0);
        assert_eq!(variables.num_landmarks(), 2);
        assert_eq!(
            variables.landmark(&LandmarkId::from(7u64)),
            Some(Vector2::new(5.0, 5.0))
        );
    }

    #[test]
    fn test_apply_update_uses_variable_rules() -> TestResult {
        let mut variables = sample();
        let update = DVector::from_vec(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        variables.apply_update(&update)?;
        let pose = variables.pose(1).ok_or("missing pose")?;
        // Facing +y, a forward step moves along world y.
        assert!((pose - Vector3::new(1.0, 1.0, std::f64::consts::FRAC_PI_2)).norm() < 1e-12);
        assert_eq!(
            variables.landmark(&LandmarkId::from(7u64)),
            Some(Vector2::new(6.0, 6.0))
        );
        Ok(())
    }

    #[test]
    fn test_set_all_params_round_trip() -> TestResult {
        let mut variables = sample();
        let mut params = variables.all_params();
        params[0] += 1000.5;
        variables.set_all_params(&params)?;
        assert_eq!(variables.all_params(), params);
        Ok(())
    }

    #[test]
    fn test_length_mismatch_is_reported() {
        let mut variables = sample();
        let result = variables.apply_update(&DVector::zeros(3));
        assert!(matches!(
            result,
            Err(CoreError::DimensionMismatch {
                expected: 10,
                actual: 3
            })
        ));
    }

    #[test]
    #[should_panic(expected = "unknown landmark")]
    fn test_unknown_landmark_panics() {
        let variables = sample();
        let _ = variables.variable(&VertexId::Landmark(LandmarkId::from(99u64)));
    }
}
