//! # Passenger Manifest Loading and Validation
//!
//! This module is the exclusive entry point for user-provided data. It reads
//! the train/test passenger CSV files, validates them against the fixed
//! Titanic manifest schema, and produces the column-oriented owned tables the
//! rest of the pipeline works with.
//!
//! - Strict Schema: Column names are not configurable. The module enforces
//!   the canonical manifest headers (`PassengerId`, `Pclass`, `Sex`, `Age`,
//!   `SibSp`, `Parch`, `Fare`, `Embarked`, plus `Survived` for training).
//!   Columns the pipeline never uses (`Name`, `Ticket`, `Cabin`) are left
//!   untouched in the frame and discarded with it.
//! - User-Centric Errors: Failures are assumed to be user-input errors. The
//!   `DataError` enum is designed to give clear, actionable feedback.
//! - Polars stays here: everything downstream of this module works on plain
//!   `Vec`s and `ndarray` structures, never on a `DataFrame`.

use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Column-oriented owned view of one raw passenger manifest.
///
/// All vectors are row-aligned. `Age`, `Fare`, `Sex` and `Embarked` may
/// contain missing values in real manifests and are therefore carried as
/// `Option`s; the identifier and count columns must be complete.
#[derive(Debug, Clone)]
pub struct PassengerTable {
    pub ids: Vec<i64>,
    /// Binary survival label. Present only for training tables.
    pub survived: Option<Vec<i64>>,
    pub pclass: Vec<i64>,
    pub sex: Vec<Option<String>>,
    pub age: Vec<Option<f64>>,
    pub sibsp: Vec<i64>,
    pub parch: Vec<i64>,
    pub fare: Vec<Option<f64>>,
    pub embarked: Vec<Option<String>>,
}

impl PassengerTable {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A comprehensive error type for all manifest loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}', which must be complete."
    )]
    MissingValuesFound(String),
    #[error(
        "The 'Survived' label must be 0 or 1, but row {row} contains the value {value}."
    )]
    LabelNotBinary { value: i64, row: usize },
    #[error("The input file '{0}' contains a header but no data rows.")]
    EmptyTable(String),
}

/// Loads and validates a training manifest. The `Survived` column is required
/// and must be strictly binary.
pub fn load_training_table(path: &str) -> Result<PassengerTable, DataError> {
    internal::load_table(path, true)
}

/// Loads and validates a test manifest. `Survived` is not required and is
/// ignored if present.
pub fn load_test_table(path: &str) -> Result<PassengerTable, DataError> {
    internal::load_table(path, false)
}

/// Internal module for shared loading logic.
mod internal {
    use super::*;

    /// Extracts a complete integer column. Null entries are a hard error:
    /// identifiers, counts and labels must never be missing.
    fn extract_int_column(df: &DataFrame, column_name: &str) -> Result<Vec<i64>, DataError> {
        let column = df.column(column_name)?;
        if column.null_count() > 0 {
            return Err(DataError::MissingValuesFound(column_name.to_string()));
        }
        let casted = column.cast(&DataType::Int64).map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "i64 (integer)",
            found_type: format!("{:?}", column.dtype()),
        })?;
        if casted.null_count() > 0 {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "i64 (integer)",
                found_type: format!("{:?}", column.dtype()),
            });
        }
        let chunked = casted.i64()?.rechunk();
        Ok(chunked.into_no_null_iter().collect())
    }

    /// Extracts a numeric column that is allowed to contain missing values.
    fn extract_optional_float_column(
        df: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<Option<f64>>, DataError> {
        let column = df.column(column_name)?;
        let casted = column.cast(&DataType::Float64).map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", column.dtype()),
        })?;
        // A cast that manufactures nulls means the source held non-numeric text.
        if casted.null_count() > column.null_count() {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", column.dtype()),
            });
        }
        let chunked = casted.f64()?;
        Ok(chunked.into_iter().collect())
    }

    /// Extracts a categorical text column that is allowed to contain missing
    /// values. Empty strings are treated as missing.
    fn extract_optional_string_column(
        df: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<Option<String>>, DataError> {
        let column = df.column(column_name)?;
        let casted = column.cast(&DataType::String).map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "string (categorical)",
            found_type: format!("{:?}", column.dtype()),
        })?;
        let chunked = casted.str()?;
        Ok(chunked
            .into_iter()
            .map(|value| match value {
                Some(text) if !text.is_empty() => Some(text.to_string()),
                _ => None,
            })
            .collect())
    }

    /// The single, unified loading function behind both public entry points.
    pub(super) fn load_table(path: &str, include_label: bool) -> Result<PassengerTable, DataError> {
        log::info!("Loading passenger manifest from '{path}'");

        let df = CsvReader::new(File::open(Path::new(path))?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_parse_options(CsvParseOptions::default().with_separator(b',')),
            )
            .finish()?;

        if df.height() == 0 {
            return Err(DataError::EmptyTable(path.to_string()));
        }

        // Verify every required column exists before touching any of them.
        let mut required: Vec<&str> = vec![
            "PassengerId",
            "Pclass",
            "Sex",
            "Age",
            "SibSp",
            "Parch",
            "Fare",
            "Embarked",
        ];
        if include_label {
            required.push("Survived");
        }
        let present: HashSet<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        for column_name in &required {
            if !present.contains(*column_name) {
                return Err(DataError::ColumnNotFound(column_name.to_string()));
            }
        }

        let ids = extract_int_column(&df, "PassengerId")?;
        let survived = if include_label {
            let labels = extract_int_column(&df, "Survived")?;
            for (row, &value) in labels.iter().enumerate() {
                if value != 0 && value != 1 {
                    return Err(DataError::LabelNotBinary { value, row });
                }
            }
            Some(labels)
        } else {
            None
        };

        let table = PassengerTable {
            ids,
            survived,
            pclass: extract_int_column(&df, "Pclass")?,
            sex: extract_optional_string_column(&df, "Sex")?,
            age: extract_optional_float_column(&df, "Age")?,
            sibsp: extract_int_column(&df, "SibSp")?,
            parch: extract_int_column(&df, "Parch")?,
            fare: extract_optional_float_column(&df, "Fare")?,
            embarked: extract_optional_string_column(&df, "Embarked")?,
        };

        log::info!(
            "Loaded {} rows from '{path}' ({} missing Age, {} missing Fare, {} missing Embarked)",
            table.len(),
            table.age.iter().filter(|v| v.is_none()).count(),
            table.fare.iter().filter(|v| v.is_none()).count(),
            table.embarked.iter().filter(|v| v.is_none()).count(),
        );

        Ok(table)
    }
}
