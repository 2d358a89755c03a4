use nalgebra::{DMatrix, DVector};

use crate::linalg::{LinAlgError, LinAlgResult, LinearSolver, check_shapes};

/// Dense LU with partial pivoting.
#[derive(Debug, Clone, Default)]
pub struct DenseLuSolver;

impl DenseLuSolver {
    pub fn new() -> Self {
        DenseLuSolver
    }
}

impl LinearSolver for DenseLuSolver {
    fn solve(&mut self, lhs: &DMatrix<f64>, rhs: &DVector<f64>) -> LinAlgResult<DVector<f64>> {
        check_shapes(lhs, rhs)?;
        if lhs.iter().any(|v| !v.is_finite()) {
            return Err(
                LinAlgError::FactorizationFailed("matrix has non-finite entries".to_string()).log(),
            );
        }

        let solution = lhs
            .clone()
            .lu()
            .solve(rhs)
            .ok_or_else(|| LinAlgError::SingularMatrix.log())?;

        // A tiny pivot passes the exact-zero test but floods the result with inf/NaN.
        if solution.iter().all(|v| v.is_finite()) {
            Ok(solution)
        } else {
            Err(LinAlgError::SingularMatrix.log())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_solves_non_symmetric_system() -> TestResult {
        let lhs = DMatrix::from_row_slice(2, 2, &[0.0, 2.0, 1.0, 1.0]);
        let rhs = DVector::from_vec(vec![4.0, 3.0]);
        let x = DenseLuSolver::new().solve(&lhs, &rhs)?;
        assert!((x - DVector::from_vec(vec![1.0, 2.0])).norm() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_singular_matrix_is_reported() {
        let lhs = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let rhs = DVector::from_vec(vec![1.0, 1.0]);
        let result = DenseLuSolver::new().solve(&lhs, &rhs);
        assert!(matches!(result, Err(LinAlgError::SingularMatrix)));
    }

    #[test]
    fn test_non_finite_matrix_is_reported() {
        let lhs = DMatrix::from_row_slice(2, 2, &[f64::NAN, 0.0, 0.0, 1.0]);
        let rhs = DVector::from_vec(vec![1.0, 1.0]);
        let result = DenseLuSolver::new().solve(&lhs, &rhs);
        assert!(matches!(result, Err(LinAlgError::FactorizationFailed(_))));
    }
}
