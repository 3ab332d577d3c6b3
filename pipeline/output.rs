//! Prediction CSV writer: `PassengerId,Survived`, one row per test record,
//! in the same order as the input test table.

use ndarray::Array1;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error while writing predictions: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error while writing predictions: {0}")]
    Csv(#[from] csv::Error),
    #[error("Cannot write predictions: {ids} passenger ids but {predictions} predictions.")]
    LengthMismatch { ids: usize, predictions: usize },
}

/// Writes the `(PassengerId, Survived)` pairs to `path`, preserving row order.
pub fn write_predictions(
    path: &Path,
    ids: &[i64],
    predictions: &Array1<i64>,
) -> Result<(), OutputError> {
    if ids.len() != predictions.len() {
        return Err(OutputError::LengthMismatch {
            ids: ids.len(),
            predictions: predictions.len(),
        });
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["PassengerId", "Survived"])?;
    for (id, prediction) in ids.iter().zip(predictions.iter()) {
        writer.write_record([id.to_string(), prediction.to_string()])?;
    }
    writer.flush()?;

    log::info!("Wrote {} predictions to '{}'", ids.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn writes_header_and_ordered_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        write_predictions(&path, &[892, 893, 894], &array![0, 1, 0]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["PassengerId,Survived", "892,0", "893,1", "894,0"]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        let err = write_predictions(&path, &[1, 2], &array![0]).unwrap_err();
        assert!(matches!(
            err,
            OutputError::LengthMismatch { ids: 2, predictions: 1 }
        ));
    }
}
