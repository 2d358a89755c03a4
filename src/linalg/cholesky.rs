use faer::{
    Mat, Side,
    linalg::solvers::Solve,
    sparse::linalg::solvers::{Llt, SymbolicLlt},
    sparse::{SparseColMat, Triplet},
};
use nalgebra::{DMatrix, DVector};

use crate::linalg::{LinAlgError, LinAlgResult, LinearSolver, check_shapes};

/// Sparse Cholesky on faer.
///
/// The lower triangle of `lhs` is converted to compressed columns, dropping exact zeros but
/// keeping the full diagonal. The symbolic factorization depends only on that pattern and is
/// reused while it stays unchanged, which is the common case across LM iterations since the
/// graph topology is fixed.
#[derive(Debug, Clone, Default)]
pub struct SparseCholeskySolver {
    /// Pattern `(row, col)` the cached symbolic factorization was computed for.
    pattern: Vec<(usize, usize)>,
    symbolic_factorization: Option<SymbolicLlt<usize>>,
}

impl SparseCholeskySolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a symbolic factorization is currently cached.
    pub fn has_symbolic(&self) -> bool {
        self.symbolic_factorization.is_some()
    }

    fn lower_triplets(lhs: &DMatrix<f64>) -> Vec<Triplet<usize, usize, f64>> {
        let n = lhs.nrows();
        let mut triplets = Vec::new();
        for col in 0..n {
            for row in col..n {
                let value = lhs[(row, col)];
                if row == col || value != 0.0 {
                    triplets.push(Triplet::new(row, col, value));
                }
            }
        }
        triplets
    }

    fn symbolic_for(
        &mut self,
        matrix: &SparseColMat<usize, f64>,
        pattern: Vec<(usize, usize)>,
    ) -> LinAlgResult<SymbolicLlt<usize>> {
        if let Some(cached) = &self.symbolic_factorization
            && self.pattern == pattern
        {
            // SymbolicLlt is reference counted, the clone is O(1).
            return Ok(cached.clone());
        }

        let symbolic = SymbolicLlt::try_new(matrix.symbolic(), Side::Lower).map_err(|e| {
            LinAlgError::FactorizationFailed("Symbolic Cholesky decomposition failed".to_string())
                .log_with_source(e)
        })?;
        self.pattern = pattern;
        self.symbolic_factorization = Some(symbolic.clone());
        Ok(symbolic)
    }
}

impl LinearSolver for SparseCholeskySolver {
    fn solve(&mut self, lhs: &DMatrix<f64>, rhs: &DVector<f64>) -> LinAlgResult<DVector<f64>> {
        check_shapes(lhs, rhs)?;
        let n = lhs.nrows();
        if n == 0 {
            return Ok(DVector::zeros(0));
        }

        let triplets = Self::lower_triplets(lhs);
        let pattern: Vec<_> = triplets.iter().map(|t| (t.row, t.col)).collect();
        let matrix = SparseColMat::try_new_from_triplets(n, n, &triplets).map_err(|e| {
            LinAlgError::SparseMatrixCreation("Failed to create lower triangle".to_string())
                .log_with_source(e)
        })?;

        let symbolic = self.symbolic_for(&matrix, pattern)?;
        let cholesky = Llt::try_new_with_symbolic(symbolic, matrix.as_ref(), Side::Lower)
            .map_err(|e| LinAlgError::SingularMatrix.log_with_source(e))?;

        let b = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let x = cholesky.solve(&b);
        let solution = DVector::from_fn(n, |i, _| x[(i, 0)]);
        if solution.iter().all(|v| v.is_finite()) {
            Ok(solution)
        } else {
            Err(LinAlgError::SingularMatrix.log())
        }
    }
}
