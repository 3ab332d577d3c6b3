use clap::{Parser, ValueEnum};
use lifeboat::features::ImputePolicy;
use lifeboat::model::{FitConfig, FitStatus};
use lifeboat::pipeline::{self, PipelineConfig};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "lifeboat",
    about = "Train a logistic survival model on a passenger manifest and predict the test set",
    long_about = "Reads a training and a test passenger CSV, applies the same deterministic \
                  preprocessing to each (missing-Age row drop on training, mean imputation, \
                  one-hot encoding), fits a logistic regression classifier, and writes \
                  per-passenger survival predictions to a CSV file."
)]
struct Cli {
    /// Path to the training CSV (must contain the Survived column)
    train_data: PathBuf,

    /// Path to the test CSV (Survived not required)
    test_data: PathBuf,

    /// Where to write the PassengerId,Survived prediction CSV
    #[arg(long, default_value = "predictions.csv")]
    output: PathBuf,

    /// How missing Age/Fare values are filled on the test path
    #[arg(long, value_enum, default_value = "per-table")]
    impute: ImputeArg,

    /// L2 penalty strength (the intercept is never penalized)
    #[arg(long, default_value = "1.0")]
    l2: f64,

    /// Maximum number of IRLS iterations
    #[arg(long, default_value = "100")]
    max_iter: usize,

    /// Relative deviance-change convergence tolerance for IRLS
    #[arg(long, default_value = "1e-8")]
    tolerance: f64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ImputeArg {
    /// Each table is imputed with its own column means
    PerTable,
    /// The test table reuses the training-set means
    FromTraining,
}

impl From<ImputeArg> for ImputePolicy {
    fn from(arg: ImputeArg) -> Self {
        match arg {
            ImputeArg::PerTable => ImputePolicy::PerTable,
            ImputeArg::FromTraining => ImputePolicy::FromTraining,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = PipelineConfig {
        train_path: cli.train_data,
        test_path: cli.test_data,
        output_path: cli.output,
        impute_policy: cli.impute.into(),
        fit: FitConfig {
            l2: cli.l2,
            max_iterations: cli.max_iter,
            tolerance: cli.tolerance,
        },
    };

    let report = match pipeline::run(&config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    println!(
        "Trained on {} rows ({} dropped for missing Age), {} feature columns.",
        report.train_rows_read - report.train_rows_dropped,
        report.train_rows_dropped,
        report.feature_columns.len()
    );
    match report.fit_status {
        FitStatus::Converged { iterations } => {
            println!("IRLS converged after {iterations} iterations.");
        }
        FitStatus::MaxIterationsReached { iterations, last_change } => {
            println!(
                "Warning: IRLS stopped after {iterations} iterations without converging \
                 (last relative change {last_change:.3e}); predictions use best-effort coefficients."
            );
        }
    }
    if !report.unseen_categories.is_empty() {
        println!("Warning: test rows carried category values never seen in training:");
        for (value, count) in &report.unseen_categories {
            println!("  {value}: {count} row(s)");
        }
    }
    if !report.reconcile.dropped.is_empty() || !report.reconcile.zero_filled.is_empty() {
        println!(
            "Column reconciliation: dropped {:?}, zero-filled {:?}.",
            report.reconcile.dropped, report.reconcile.zero_filled
        );
    }
    println!(
        "Predicted {} test rows -> '{}'.",
        report.test_rows,
        config.output_path.display()
    );
}
