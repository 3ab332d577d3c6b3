//! End-to-end orchestration: ingestion, preprocessing, training, inference,
//! output, in that order, single-threaded and single-pass. Soft failures
//! (optimizer non-convergence, unseen categories, reconciliation drift) are
//! collected into the [`PipelineReport`] instead of aborting the run.

use crate::data::{self, DataError};
use crate::features::{
    self, FeatureError, FeaturePlan, ImputePolicy, ReconcileReport, TableRole,
};
use crate::model::{self, EstimationError, FitConfig, FitStatus};
use crate::output::{self, OutputError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Everything a single run needs. No config files and no environment
/// variables; the CLI maps its flags straight onto this struct.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub output_path: PathBuf,
    pub impute_policy: ImputePolicy,
    pub fit: FitConfig,
}

/// Summary of one completed run, including the soft failures.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub train_rows_read: usize,
    /// Training rows removed because their `Age` was missing.
    pub train_rows_dropped: usize,
    pub test_rows: usize,
    pub feature_columns: Vec<String>,
    pub fit_status: FitStatus,
    /// Test-table category values never seen during fitting, with row counts.
    pub unseen_categories: BTreeMap<String, usize>,
    pub reconcile: ReconcileReport,
}

/// Runs the whole pipeline once and writes the prediction CSV.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    // Ingestion.
    let train_raw = data::load_training_table(&config.train_path.to_string_lossy())?;
    let train_rows_read = train_raw.len();

    // Preprocessing, training path: filter, then fit the plan on the
    // filtered table so the dropped rows never touch the imputation means.
    let train_filtered = features::drop_missing_age(&train_raw);
    let train_rows_dropped = train_rows_read - train_filtered.len();
    log::info!(
        "Dropped {train_rows_dropped} of {train_rows_read} training rows with missing Age"
    );

    let plan = FeaturePlan::fit(&train_filtered, config.impute_policy)?;
    let (train_matrix, _) = plan.transform(&train_filtered, TableRole::Training)?;
    let y = features::labels(&train_filtered)?;

    // Training.
    let trained = model::fit(&train_matrix, &y, &config.fit)?;

    // Preprocessing, test path: no row is ever dropped here, every test
    // record must receive a prediction.
    let test_raw = data::load_test_table(&config.test_path.to_string_lossy())?;
    let (test_matrix, encoding_report) = plan.transform(&test_raw, TableRole::Test)?;
    let (aligned, reconcile_report) = features::reconcile(&train_matrix.columns, &test_matrix);

    // Inference and output.
    let predictions = trained.predict(&aligned)?;
    output::write_predictions(&config.output_path, &test_raw.ids, &predictions)?;

    Ok(PipelineReport {
        train_rows_read,
        train_rows_dropped,
        test_rows: test_raw.len(),
        feature_columns: train_matrix.columns,
        fit_status: trained.status,
        unseen_categories: encoding_report.unseen,
        reconcile: reconcile_report,
    })
}
