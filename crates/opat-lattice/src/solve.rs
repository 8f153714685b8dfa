//! Small dense linear solves

use nalgebra::{DMatrix, DVector};

use crate::{Error, Result};

/// Pivots smaller than this are treated as zero
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve `A x = b` by LU factorization with partial pivoting
///
/// Sized for the small systems this crate produces (N <= 8 in practice).
///
/// # Errors
///
/// - [`Error::DimensionMismatch`] when `A` is not square or `b` does not
///   match it
/// - [`Error::Singular`] when any pivot falls below tolerance
pub fn solve(a: DMatrix<f64>, b: DVector<f64>) -> Result<DVector<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(Error::DimensionMismatch {
            expected: n,
            actual: a.ncols(),
        });
    }
    if b.len() != n {
        return Err(Error::DimensionMismatch {
            expected: n,
            actual: b.len(),
        });
    }

    let lu = a.lu();
    let u = lu.u();
    for i in 0..n {
        if u[(i, i)].abs() < PIVOT_TOLERANCE {
            return Err(Error::Singular);
        }
    }
    lu.solve(&b).ok_or(Error::Singular)
}
