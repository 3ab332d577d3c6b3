//! ndarray-facing wrapper around faer's LLT factorization.
//!
//! The IRLS loop solves one small symmetric positive-definite system per
//! iteration (the penalized normal equations, at most a few dozen columns
//! wide). The matrices involved are tiny, so conversion copies into `faer`
//! storage rather than borrowing.

use faer::linalg::solvers::{self, Solve};
use faer::{Mat, Side};
use ndarray::{Array1, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("Cholesky factorization failed; the matrix is not positive definite ({0:?})")]
    NotPositiveDefinite(solvers::LltError),
}

/// A successful LLT factorization of a symmetric positive-definite matrix.
pub struct CholeskyFactor {
    factor: solvers::Llt<f64>,
}

impl CholeskyFactor {
    /// Solves `A x = rhs` for `x` using the stored factorization.
    pub fn solve_vec(&self, rhs: &Array1<f64>) -> Array1<f64> {
        let rhs_mat = Mat::from_fn(rhs.len(), 1, |i, _| rhs[i]);
        let solution = self.factor.solve(rhs_mat.as_ref());
        Array1::from_shape_fn(rhs.len(), |i| solution[(i, 0)])
    }
}

/// Cholesky factorization for `ndarray` matrices, backed by faer.
pub trait CholeskySolve {
    fn cholesky(&self) -> Result<CholeskyFactor, LinalgError>;
}

impl<S: Data<Elem = f64>> CholeskySolve for ArrayBase<S, Ix2> {
    fn cholesky(&self) -> Result<CholeskyFactor, LinalgError> {
        let mat = Mat::from_fn(self.nrows(), self.ncols(), |i, j| self[(i, j)]);
        let factor = mat
            .as_ref()
            .llt(Side::Lower)
            .map_err(LinalgError::NotPositiveDefinite)?;
        Ok(CholeskyFactor { factor })
    }
}
