//! # Logistic Regression via Iteratively Reweighted Least Squares
//!
//! Fits the binary classifier on a reconciled feature matrix by minimizing
//! the L2-regularized negative log-likelihood with Newton steps: each
//! iteration forms the working response and weights, then solves the
//! penalized normal equations with a Cholesky factorization. The intercept
//! is never penalized.
//!
//! Exhausting the iteration budget is a soft failure: the model keeps its
//! best-effort coefficients and records [`FitStatus::MaxIterationsReached`],
//! which callers can inspect. Only numeric breakdown (non-finite linear
//! predictor, typically perfect separation at zero regularization) or a
//! non-positive-definite system is a hard error.

use crate::features::FeatureMatrix;
use crate::linalg::{CholeskySolve, LinalgError};
use ndarray::{Array1, Array2};
use thiserror::Error;

/// Probabilities are clamped away from 0/1 before taking logs.
const PROB_EPS: f64 = 1e-10;
/// Floor on the IRLS weights, preventing division blow-ups near saturation.
const WEIGHT_FLOOR: f64 = 1e-10;

#[derive(Error, Debug)]
pub enum EstimationError {
    #[error("The feature matrix has {rows} rows but the label vector has {labels} entries.")]
    DimensionMismatch { rows: usize, labels: usize },
    #[error("Cannot fit a model on an empty feature matrix.")]
    NoSamples,
    #[error(
        "The fit became numerically unstable at iteration {iteration} (non-finite values in the linear predictor). This usually indicates perfect separation; increase the L2 penalty."
    )]
    PerfectSeparation { iteration: usize },
    #[error("The penalized normal equations could not be solved: {0}")]
    Linalg(#[from] LinalgError),
    #[error(
        "The feature columns do not match the columns the model was fitted on. Expected {expected:?}, found {found:?}."
    )]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// Solver settings for the IRLS loop.
#[derive(Debug, Clone, Copy)]
pub struct FitConfig {
    /// L2 penalty strength applied to every coefficient except the intercept.
    pub l2: f64,
    pub max_iterations: usize,
    /// Relative penalized-deviance change below which the fit is converged.
    pub tolerance: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            l2: 1.0,
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

/// Convergence outcome of a fit. Non-convergence is a warning value, not an
/// error: the coefficients from the last iteration are still usable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitStatus {
    Converged { iterations: usize },
    MaxIterationsReached { iterations: usize, last_change: f64 },
}

impl FitStatus {
    pub fn converged(&self) -> bool {
        matches!(self, FitStatus::Converged { .. })
    }
}

/// A fitted binary logistic regression model, tied to the exact feature
/// column set it was trained on.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    pub columns: Vec<String>,
    pub intercept: f64,
    pub coefficients: Array1<f64>,
    pub status: FitStatus,
}

impl LogisticModel {
    /// Per-row survival probabilities. The feature columns must match the
    /// training columns exactly, order included; reconcile first.
    pub fn predict_proba(&self, features: &FeatureMatrix) -> Result<Array1<f64>, EstimationError> {
        if features.columns != self.columns {
            return Err(EstimationError::ColumnMismatch {
                expected: self.columns.clone(),
                found: features.columns.clone(),
            });
        }
        let eta = features.values.dot(&self.coefficients) + self.intercept;
        Ok(eta.mapv(sigmoid))
    }

    /// Hard 0/1 predictions: probability strictly above one half maps to 1.
    pub fn predict(&self, features: &FeatureMatrix) -> Result<Array1<i64>, EstimationError> {
        let proba = self.predict_proba(features)?;
        Ok(proba.mapv(|p| if p > 0.5 { 1 } else { 0 }))
    }
}

fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

/// -2 * log-likelihood of the Bernoulli model, with clamped probabilities.
fn deviance(y: &Array1<f64>, mu: &Array1<f64>) -> f64 {
    let mut total = 0.0;
    for (&yi, &mui) in y.iter().zip(mu.iter()) {
        let p = mui.clamp(PROB_EPS, 1.0 - PROB_EPS);
        total += yi * p.ln() + (1.0 - yi) * (1.0 - p).ln();
    }
    -2.0 * total
}

/// Fits the classifier. `y` must contain only 0.0 and 1.0.
pub fn fit(
    features: &FeatureMatrix,
    y: &Array1<f64>,
    config: &FitConfig,
) -> Result<LogisticModel, EstimationError> {
    let n = features.nrows();
    let p = features.ncols();
    if n == 0 {
        return Err(EstimationError::NoSamples);
    }
    if y.len() != n {
        return Err(EstimationError::DimensionMismatch {
            rows: n,
            labels: y.len(),
        });
    }

    log::info!(
        "Fitting logistic regression on {n} samples x {p} features (l2 = {}, max {} iterations)",
        config.l2,
        config.max_iterations
    );

    // Augmented design: intercept column first, then the features.
    let mut x = Array2::<f64>::zeros((n, p + 1));
    for row in 0..n {
        x[[row, 0]] = 1.0;
        for col in 0..p {
            x[[row, col + 1]] = features.values[[row, col]];
        }
    }

    let mut beta = Array1::<f64>::zeros(p + 1);
    let mut eta = x.dot(&beta);
    let mut mu = eta.mapv(sigmoid);
    let mut last_objective = penalized_deviance(y, &mu, &beta, config.l2);
    let mut last_change = f64::INFINITY;

    for iteration in 1..=config.max_iterations {
        let weights = mu.mapv(|m| (m * (1.0 - m)).max(WEIGHT_FLOOR));
        // Working response z = eta + (y - mu) / w.
        let z = &eta + &((y - &mu) / &weights);

        // Row-scaled design W X, then the penalized normal equations
        // (X'WX + lambda * D) beta = X'Wz, with D zeroing the intercept.
        let mut xw = x.clone();
        for (mut row, &wi) in xw.outer_iter_mut().zip(weights.iter()) {
            row *= wi;
        }
        let mut lhs = x.t().dot(&xw);
        for j in 1..=p {
            lhs[[j, j]] += config.l2;
        }
        let rhs = xw.t().dot(&z);

        beta = lhs.cholesky()?.solve_vec(&rhs);
        eta = x.dot(&beta);
        if eta.iter().any(|v| !v.is_finite()) || beta.iter().any(|v| !v.is_finite()) {
            return Err(EstimationError::PerfectSeparation { iteration });
        }
        mu = eta.mapv(sigmoid);

        let objective = penalized_deviance(y, &mu, &beta, config.l2);
        last_change = (last_objective - objective).abs() / (objective.abs() + 0.1);
        log::debug!(
            "IRLS iteration {iteration}: penalized deviance {objective:.6} (relative change {last_change:.3e})"
        );
        last_objective = objective;

        if last_change < config.tolerance {
            log::info!("IRLS converged after {iteration} iterations (deviance {objective:.6})");
            return Ok(build_model(
                features,
                &beta,
                FitStatus::Converged { iterations: iteration },
            ));
        }
    }

    log::warn!(
        "IRLS did not converge within {} iterations (last relative change {last_change:.3e}); keeping best-effort coefficients",
        config.max_iterations
    );
    Ok(build_model(
        features,
        &beta,
        FitStatus::MaxIterationsReached {
            iterations: config.max_iterations,
            last_change,
        },
    ))
}

fn penalized_deviance(y: &Array1<f64>, mu: &Array1<f64>, beta: &Array1<f64>, l2: f64) -> f64 {
    let penalty: f64 = beta.iter().skip(1).map(|b| b * b).sum();
    deviance(y, mu) + l2 * penalty
}

fn build_model(features: &FeatureMatrix, beta: &Array1<f64>, status: FitStatus) -> LogisticModel {
    LogisticModel {
        columns: features.columns.clone(),
        intercept: beta[0],
        coefficients: beta.slice(ndarray::s![1..]).to_owned(),
        status,
    }
}
