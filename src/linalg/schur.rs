//! Landmark elimination for the damped normal equations.
//!
//! With poses `p` and landmarks `l` the system
//!
//! ```text
//! | Hpp   Hpl | |Δp|     |bp|
//! | Hplᵀ  Hll | |Δl| = − |bl|
//! ```
//!
//! has a block-diagonal `Hll` (one 2×2 block per landmark, since landmark edges never couple two
//! landmarks). Eliminating `Δl` leaves the reduced pose system
//!
//! ```text
//! (Hpp − Hpl Hll⁻¹ Hplᵀ) Δp = −(bp − Hpl Hll⁻¹ bl)
//! ```
//!
//! and the landmark update follows by back substitution, `Δl = −Hll⁻¹ (bl + Hplᵀ Δp)`.

use nalgebra::{DMatrix, DVector, Matrix2};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Blocks whose condition number exceeds this are inverted through the SVD pseudo-inverse.
pub const MAX_BLOCK_CONDITION: f64 = 1e12;

/// Relative singular value cutoff of the pseudo-inverse fallback.
pub const PSEUDO_INVERSE_TOLERANCE: f64 = 1e-12;

/// Inverses of the damped landmark blocks.
#[derive(Debug, Clone, Default)]
pub struct LandmarkBlockInverses {
    pub inverses: Vec<Matrix2<f64>>,
    /// Slots that were singular or ill-conditioned and got a pseudo-inverse instead.
    pub degraded: Vec<usize>,
}

/// Invert a single block, returning the inverse and whether the fallback was taken.
fn invert_block(block: &Matrix2<f64>) -> (Matrix2<f64>, bool) {
    if block.iter().any(|v| !v.is_finite()) {
        return (Matrix2::zeros(), true);
    }

    let svd = block.svd(true, true);
    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();
    if min_sv * MAX_BLOCK_CONDITION > max_sv
        && let Some(inverse) = block.try_inverse()
        && inverse.iter().all(|v| v.is_finite())
    {
        return (inverse, false);
    }

    let inverse = svd
        .pseudo_inverse(PSEUDO_INVERSE_TOLERANCE * max_sv)
        .unwrap_or_else(|_| Matrix2::zeros());
    (inverse, true)
}

/// Invert every `Hll` block after adding `damping` to its diagonal.
pub fn invert_landmark_blocks(blocks: &[Matrix2<f64>], damping: f64) -> LandmarkBlockInverses {
    let damp = |block: &Matrix2<f64>| invert_block(&(block + Matrix2::identity() * damping));

    #[cfg(feature = "parallel")]
    let results: Vec<(Matrix2<f64>, bool)> = blocks.par_iter().map(damp).collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<(Matrix2<f64>, bool)> = blocks.iter().map(damp).collect();

    let mut inverted = LandmarkBlockInverses {
        inverses: Vec::with_capacity(results.len()),
        degraded: Vec::new(),
    };
    for (slot, (inverse, degraded)) in results.into_iter().enumerate() {
        if degraded {
            inverted.degraded.push(slot);
        }
        inverted.inverses.push(inverse);
    }
    inverted
}

/// Reduced pose system: returns `(Hpp − Hpl Hll⁻¹ Hplᵀ, bp − Hpl Hll⁻¹ bl)`.
///
/// `hpp` must already carry the damping term.
pub fn reduce(
    hpp: &DMatrix<f64>,
    hpl: &DMatrix<f64>,
    bp: &DVector<f64>,
    bl: &DVector<f64>,
    hll_inverses: &[Matrix2<f64>],
) -> (DMatrix<f64>, DVector<f64>) {
    // W = Hpl · blockdiag(Hll⁻¹)
    let mut w = DMatrix::zeros(hpl.nrows(), hpl.ncols());
    for (slot, inverse) in hll_inverses.iter().enumerate() {
        let coupling = hpl.fixed_columns::<2>(2 * slot) * inverse;
        w.fixed_columns_mut::<2>(2 * slot).copy_from(&coupling);
    }

    let reduced_hessian = hpp - &w * hpl.transpose();
    let reduced_gradient = bp - &w * bl;
    (reduced_hessian, reduced_gradient)
}

/// Landmark update for a solved pose update, `Δl = −Hll⁻¹ (bl + Hplᵀ Δp)`.
pub fn back_substitute(
    hpl: &DMatrix<f64>,
    bl: &DVector<f64>,
    hll_inverses: &[Matrix2<f64>],
    pose_update: &DVector<f64>,
) -> DVector<f64> {
    let mut landmark_update = DVector::zeros(bl.len());
    for (slot, inverse) in hll_inverses.iter().enumerate() {
        let coupled =
            bl.fixed_rows::<2>(2 * slot) + hpl.fixed_columns::<2>(2 * slot).tr_mul(pose_update);
        landmark_update
            .fixed_rows_mut::<2>(2 * slot)
            .copy_from(&(-(inverse * coupled)));
    }
    landmark_update
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed SPD system with 2 poses (6 dims) and 2 landmarks observed by disjoint rows.
    fn joint_system() -> (DMatrix<f64>, DVector<f64>) {
        let j = DMatrix::from_fn(14, 10, |r, c| {
            let observes = match c {
                6 | 7 => r < 7,
                8 | 9 => r >= 7,
                _ => true,
            };
            if observes {
                ((r * 7 + c * 3) % 11) as f64 / 5.0 - 1.0
            } else {
                0.0
            }
        });
        let h = j.transpose() * &j + DMatrix::identity(10, 10) * 0.5;
        let b = DVector::from_fn(10, |i, _| (i as f64 * 0.7).cos());
        (h, b)
    }

    #[test]
    fn test_schur_matches_joint_solve() {
        let (h, b) = joint_system();
        let hpp = h.view((0, 0), (6, 6)).into_owned();
        let hpl = h.view((0, 6), (6, 4)).into_owned();
        let blocks = [
            h.fixed_view::<2, 2>(6, 6).into_owned(),
            h.fixed_view::<2, 2>(8, 8).into_owned(),
        ];
        let bp = b.rows(0, 6).into_owned();
        let bl = b.rows(6, 4).into_owned();

        let inverted = invert_landmark_blocks(&blocks, 0.0);
        assert!(inverted.degraded.is_empty());
        let (reduced_h, reduced_b) = reduce(&hpp, &hpl, &bp, &bl, &inverted.inverses);
        let pose_update = reduced_h.lu().solve(&(-reduced_b)).expect("reduced system is regular");
        let landmark_update = back_substitute(&hpl, &bl, &inverted.inverses, &pose_update);

        let joint = h.lu().solve(&(-&b)).expect("joint system is regular");
        assert!((joint.rows(0, 6) - &pose_update).norm() < 1e-9);
        assert!((joint.rows(6, 4) - &landmark_update).norm() < 1e-9);
    }

    #[test]
    fn test_damping_is_added_to_blocks() {
        let blocks = [Matrix2::new(2.0, 0.0, 0.0, 4.0)];
        let inverted = invert_landmark_blocks(&blocks, 2.0);
        assert!((inverted.inverses[0] - Matrix2::new(0.25, 0.0, 0.0, 1.0 / 6.0)).norm() < 1e-12);
    }

    #[test]
    fn test_singular_block_uses_pseudo_inverse() {
        let blocks = [Matrix2::new(1.0, 1.0, 1.0, 1.0), Matrix2::identity()];
        let inverted = invert_landmark_blocks(&blocks, 0.0);
        assert_eq!(inverted.degraded, vec![0]);

        // Pseudo-inverse of [[1,1],[1,1]] is [[1,1],[1,1]] / 4.
        let expected = Matrix2::new(0.25, 0.25, 0.25, 0.25);
        assert!((inverted.inverses[0] - expected).norm() < 1e-9);
        assert_eq!(inverted.inverses[1], Matrix2::identity());
    }

    #[test]
    fn test_non_finite_block_is_zeroed() {
        let blocks = [Matrix2::new(f64::NAN, 0.0, 0.0, 1.0)];
        let inverted = invert_landmark_blocks(&blocks, 1.0);
        assert_eq!(inverted.degraded, vec![0]);
        assert_eq!(inverted.inverses[0], Matrix2::zeros());
    }
}
