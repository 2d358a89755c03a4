//! Linear solvers for the damped normal equations.
//!
//! The optimizer eliminates landmarks with a Schur complement ([`schur`]) and hands the reduced
//! pose system to a [`LinearSolver`]. Two back ends are available:
//!
//! - [`DenseLuSolver`]: nalgebra LU with partial pivoting, works for any non-singular matrix.
//! - [`SparseCholeskySolver`]: faer supernodal Cholesky, caches the symbolic factorization
//!   across iterations. Requires the matrix to be symmetric positive definite.

pub mod cholesky;
pub mod lu;
pub mod schur;

use nalgebra::{DMatrix, DVector};
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::error;

pub use cholesky::SparseCholeskySolver;
pub use lu::DenseLuSolver;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverType {
    #[default]
    DenseLu,
    SparseCholesky,
}

impl Display for LinearSolverType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LinearSolverType::DenseLu => write!(f, "Dense LU"),
            LinearSolverType::SparseCholesky => write!(f, "Sparse Cholesky"),
        }
    }
}

/// Linear algebra specific error types
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// Matrix factorization failed (LU, Cholesky)
    #[error("Matrix factorization failed: {0}")]
    FactorizationFailed(String),

    /// Singular or near-singular matrix detected
    #[error("Singular matrix detected (matrix is not invertible)")]
    SingularMatrix,

    /// Failed to create sparse matrix from triplets
    #[error("Failed to create sparse matrix: {0}")]
    SparseMatrixCreation(String),

    /// Operand shapes do not fit together
    #[error("Matrix conversion failed: {0}")]
    MatrixConversion(String),
}

impl LinAlgError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the underlying error of a third-party library
    /// (e.g. faer's `LltError` or `CreationError`).
    ///
    /// # Example
    /// ```ignore
    /// SymbolicLlt::try_new(matrix.symbolic(), Side::Lower)
    ///     .map_err(|e| {
    ///         LinAlgError::FactorizationFailed("Symbolic Cholesky decomposition failed".into())
    ///             .log_with_source(e)
    ///     })?;
    /// ```
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Solver for square systems `lhs * x = rhs`.
pub trait LinearSolver {
    /// # Errors
    /// Returns `LinAlgError` if:
    /// - the shapes of `lhs` and `rhs` do not match
    /// - the factorization fails or the matrix is singular
    /// - the solution contains non-finite values
    fn solve(&mut self, lhs: &DMatrix<f64>, rhs: &DVector<f64>) -> LinAlgResult<DVector<f64>>;
}

/// Instantiate the solver for `solver_type`.
pub fn create_linear_solver(solver_type: LinearSolverType) -> Box<dyn LinearSolver + Send> {
    match solver_type {
        LinearSolverType::DenseLu => Box::new(DenseLuSolver::new()),
        LinearSolverType::SparseCholesky => Box::new(SparseCholeskySolver::new()),
    }
}

pub(crate) fn check_shapes(lhs: &DMatrix<f64>, rhs: &DVector<f64>) -> LinAlgResult<()> {
    if lhs.nrows() != lhs.ncols() || lhs.nrows() != rhs.len() {
        return Err(LinAlgError::MatrixConversion(format!(
            "cannot solve a {}x{} system with a right-hand side of length {}",
            lhs.nrows(),
            lhs.ncols(),
            rhs.len()
        ))
        .log());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn spd_system() -> (DMatrix<f64>, DVector<f64>) {
        let lhs = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 0.5, 0.0, 0.5, 2.0]);
        let rhs = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        (lhs, rhs)
    }

    #[test]
    fn test_backends_agree_on_spd_system() -> TestResult {
        let (lhs, rhs) = spd_system();
        let mut lu = create_linear_solver(LinearSolverType::DenseLu);
        let mut cholesky = create_linear_solver(LinearSolverType::SparseCholesky);

        let x_lu = lu.solve(&lhs, &rhs)?;
        let x_cholesky = cholesky.solve(&lhs, &rhs)?;

        assert!((&lhs * &x_lu - &rhs).norm() < 1e-12);
        assert!((x_lu - x_cholesky).norm() < 1e-10);
        Ok(())
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let (lhs, _) = spd_system();
        let rhs = DVector::from_vec(vec![1.0, 2.0]);
        let result = DenseLuSolver::new().solve(&lhs, &rhs);
        assert!(matches!(result, Err(LinAlgError::MatrixConversion(_))));
    }

    #[test]
    fn test_solver_type_display() {
        assert_eq!(LinearSolverType::default(), LinearSolverType::DenseLu);
        assert_eq!(LinearSolverType::SparseCholesky.to_string(), "Sparse Cholesky");
    }
}
