//! # Preprocessing: Imputation, One-Hot Encoding, Reconciliation
//!
//! Turns a raw [`PassengerTable`] into the numeric feature matrix the
//! classifier consumes. The whole transform is captured by a [`FeaturePlan`]
//! fitted once on the training table and then applied to both tables, so the
//! category-to-indicator mapping is an explicit, serializable artifact rather
//! than something re-derived per call.
//!
//! Two behaviors are deliberately asymmetric between the training and test
//! paths and must stay that way:
//!
//! - Rows with missing `Age` are dropped from training only
//!   ([`drop_missing_age`]). Test rows must all be predicted, so they keep a
//!   mean-imputed `Age` instead.
//! - Category values unseen at fit time activate no indicator column. The
//!   row's information for that field is silently lost from the model input;
//!   the loss is surfaced as a logged warning and a counter in the
//!   [`EncodingReport`], never as an error.

use crate::data::PassengerTable;
use itertools::Itertools;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// How missing `Age`/`Fare` values are filled on the test path.
///
/// `PerTable` recomputes the means on whichever table is being transformed,
/// so the test table is imputed with its own statistics. That is a
/// leakage-shaped choice, but it is the default behavior of this pipeline;
/// `FromTraining` freezes the training means instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImputePolicy {
    PerTable,
    FromTraining,
}

/// Which path a table is being transformed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    Training,
    Test,
}

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Cannot compute a mean for '{0}': every value in the column is missing.")]
    AllValuesMissing(&'static str),
    #[error("The table has a header but no rows; nothing to fit or transform.")]
    EmptyTable,
    #[error("The table carries no 'Survived' column; cannot build a label vector.")]
    LabelMissing,
}

/// Per-column means computed over the observed (non-missing) values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImputeStats {
    pub age_mean: f64,
    pub fare_mean: f64,
}

impl ImputeStats {
    /// Computes means from one table. Fails if a column has no observed value,
    /// since the fill would otherwise be undefined.
    pub fn fit(table: &PassengerTable) -> Result<Self, FeatureError> {
        Ok(ImputeStats {
            age_mean: observed_mean(&table.age, "Age")?,
            fare_mean: observed_mean(&table.fare, "Fare")?,
        })
    }
}

fn observed_mean(values: &[Option<f64>], column: &'static str) -> Result<f64, FeatureError> {
    let observed: Vec<f64> = values.iter().flatten().copied().collect();
    if observed.is_empty() {
        return Err(FeatureError::AllValuesMissing(column));
    }
    Ok(observed.iter().sum::<f64>() / observed.len() as f64)
}

/// Replaces each missing entry with the given mean. Applying this to an
/// already-complete column is a no-op.
fn fill_missing(values: &[Option<f64>], mean: f64) -> Vec<f64> {
    values.iter().map(|v| v.unwrap_or(mean)).collect()
}

/// The five manifest fields treated as categorical. `Pclass`, `SibSp` and
/// `Parch` are integers in the raw data but are reinterpreted as discrete,
/// finite-valued categories here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoricalField {
    Sex,
    Embarked,
    Pclass,
    SibSp,
    Parch,
}

impl CategoricalField {
    pub const ALL: [CategoricalField; 5] = [
        CategoricalField::Sex,
        CategoricalField::Embarked,
        CategoricalField::Pclass,
        CategoricalField::SibSp,
        CategoricalField::Parch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CategoricalField::Sex => "Sex",
            CategoricalField::Embarked => "Embarked",
            CategoricalField::Pclass => "Pclass",
            CategoricalField::SibSp => "SibSp",
            CategoricalField::Parch => "Parch",
        }
    }

    /// Row-aligned values of this field as optional category labels.
    fn values(&self, table: &PassengerTable) -> Vec<Option<String>> {
        fn from_ints(values: &[i64]) -> Vec<Option<String>> {
            values.iter().map(|v| Some(v.to_string())).collect()
        }
        match self {
            CategoricalField::Sex => table.sex.clone(),
            CategoricalField::Embarked => table.embarked.clone(),
            CategoricalField::Pclass => from_ints(&table.pclass),
            CategoricalField::SibSp => from_ints(&table.sibsp),
            CategoricalField::Parch => from_ints(&table.parch),
        }
    }

    /// Sorted distinct observed values. Integer-backed fields sort
    /// numerically so `SibSp_10` would land after `SibSp_2`, not before.
    fn observed_levels(&self, table: &PassengerTable) -> Vec<String> {
        match self {
            CategoricalField::Sex | CategoricalField::Embarked => self
                .values(table)
                .into_iter()
                .flatten()
                .sorted()
                .dedup()
                .collect(),
            CategoricalField::Pclass => sorted_int_levels(&table.pclass),
            CategoricalField::SibSp => sorted_int_levels(&table.sibsp),
            CategoricalField::Parch => sorted_int_levels(&table.parch),
        }
    }
}

fn sorted_int_levels(values: &[i64]) -> Vec<String> {
    values
        .iter()
        .copied()
        .sorted()
        .dedup()
        .map(|v| v.to_string())
        .collect()
}

/// One categorical field together with the indicator levels it produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CategoryGroup {
    field: CategoricalField,
    levels: Vec<String>,
}

/// Counts of category values that matched no fitted indicator, keyed as
/// `"<field>=<value>"`. Missing source values are not unseen; they simply
/// activate no indicator.
#[derive(Debug, Clone, Default)]
pub struct EncodingReport {
    pub unseen: BTreeMap<String, usize>,
}

impl EncodingReport {
    pub fn total_unseen(&self) -> usize {
        self.unseen.values().sum()
    }
}

/// Explicit category -> indicator-column mapping, fitted once on the training
/// table. Each observed level of each categorical field becomes one binary
/// column named `<field>_<level>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    groups: Vec<CategoryGroup>,
}

impl OneHotEncoder {
    pub fn fit(table: &PassengerTable) -> Self {
        let groups = CategoricalField::ALL
            .iter()
            .map(|&field| CategoryGroup {
                field,
                levels: field.observed_levels(table),
            })
            .collect();
        OneHotEncoder { groups }
    }

    /// Names of the indicator columns, in group order then level order.
    pub fn column_names(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|group| {
                group
                    .levels
                    .iter()
                    .map(move |level| format!("{}_{}", group.field.name(), level))
            })
            .collect()
    }

    pub fn width(&self) -> usize {
        self.groups.iter().map(|group| group.levels.len()).sum()
    }

    /// Builds the indicator block for one table. Each row activates at most
    /// one column per group; unseen values are tallied in the report.
    pub fn transform(&self, table: &PassengerTable) -> (Array2<f64>, EncodingReport) {
        let n = table.len();
        let mut block = Array2::<f64>::zeros((n, self.width()));
        let mut report = EncodingReport::default();

        let mut offset = 0;
        for group in &self.groups {
            let values = group.field.values(table);
            for (row, value) in values.iter().enumerate() {
                match value {
                    Some(label) => match group.levels.iter().position(|l| l == label) {
                        Some(idx) => block[[row, offset + idx]] = 1.0,
                        None => {
                            let key = format!("{}={}", group.field.name(), label);
                            *report.unseen.entry(key).or_insert(0) += 1;
                        }
                    },
                    // Missing values get an all-zero group, matching the
                    // behavior of indicator expansion on incomplete columns.
                    None => {}
                }
            }
            offset += group.levels.len();
        }

        for (key, count) in &report.unseen {
            log::warn!(
                "Category value {key} was never seen during fitting; {count} row(s) lose this field from the model input"
            );
        }

        (block, report)
    }
}

/// A named, row-aligned numeric feature table: `Age` and `Fare` first, then
/// the indicator block.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }
}

/// The complete fitted preprocessing artifact: impute policy, training-set
/// means, and the one-hot mapping. Serializable so the encoding can be
/// inspected or persisted alongside a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturePlan {
    pub impute_policy: ImputePolicy,
    pub train_stats: ImputeStats,
    pub encoder: OneHotEncoder,
}

impl FeaturePlan {
    /// Fits the plan on the (already age-filtered) training table.
    pub fn fit(table: &PassengerTable, impute_policy: ImputePolicy) -> Result<Self, FeatureError> {
        if table.is_empty() {
            return Err(FeatureError::EmptyTable);
        }
        Ok(FeaturePlan {
            impute_policy,
            train_stats: ImputeStats::fit(table)?,
            encoder: OneHotEncoder::fit(table),
        })
    }

    /// The full feature column set this plan produces, in order.
    pub fn column_names(&self) -> Vec<String> {
        let mut columns = vec!["Age".to_string(), "Fare".to_string()];
        columns.extend(self.encoder.column_names());
        columns
    }

    /// Applies the plan to one table. The training path always uses the
    /// frozen training means; the test path picks means per the policy.
    pub fn transform(
        &self,
        table: &PassengerTable,
        role: TableRole,
    ) -> Result<(FeatureMatrix, EncodingReport), FeatureError> {
        if table.is_empty() {
            return Err(FeatureError::EmptyTable);
        }
        let stats = match (role, self.impute_policy) {
            (TableRole::Training, _) | (TableRole::Test, ImputePolicy::FromTraining) => {
                self.train_stats
            }
            (TableRole::Test, ImputePolicy::PerTable) => ImputeStats::fit(table)?,
        };

        let age = fill_missing(&table.age, stats.age_mean);
        let fare = fill_missing(&table.fare, stats.fare_mean);
        let (block, report) = self.encoder.transform(table);

        let n = table.len();
        let mut values = Array2::<f64>::zeros((n, 2 + block.ncols()));
        for row in 0..n {
            values[[row, 0]] = age[row];
            values[[row, 1]] = fare[row];
            for col in 0..block.ncols() {
                values[[row, 2 + col]] = block[[row, col]];
            }
        }

        Ok((
            FeatureMatrix {
                columns: self.column_names(),
                values,
            },
            report,
        ))
    }
}

/// Removes every row whose `Age` is missing, keeping all parallel columns
/// aligned. Training-path only: the training means are computed on this
/// filtered table, so no dropped row ever contributes to a mean.
pub fn drop_missing_age(table: &PassengerTable) -> PassengerTable {
    let keep: Vec<usize> = table
        .age
        .iter()
        .enumerate()
        .filter_map(|(i, age)| age.is_some().then_some(i))
        .collect();

    fn select<T: Clone>(values: &[T], keep: &[usize]) -> Vec<T> {
        keep.iter().map(|&i| values[i].clone()).collect()
    }

    PassengerTable {
        ids: select(&table.ids, &keep),
        survived: table.survived.as_ref().map(|s| select(s, &keep)),
        pclass: select(&table.pclass, &keep),
        sex: select(&table.sex, &keep),
        age: select(&table.age, &keep),
        sibsp: select(&table.sibsp, &keep),
        parch: select(&table.parch, &keep),
        fare: select(&table.fare, &keep),
        embarked: select(&table.embarked, &keep),
    }
}

/// Row-aligned 0/1 label vector from a training table.
pub fn labels(table: &PassengerTable) -> Result<Array1<f64>, FeatureError> {
    let survived = table.survived.as_ref().ok_or(FeatureError::LabelMissing)?;
    Ok(survived.iter().map(|&v| v as f64).collect())
}

/// Columns dropped from / zero-filled into a test matrix during alignment.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub dropped: Vec<String>,
    pub zero_filled: Vec<String>,
}

/// Aligns a feature matrix to exactly the training column set: test-only
/// columns are dropped, training-only columns are zero-filled, and the
/// result uses the training order. With a shared [`FeaturePlan`] both lists
/// are empty by construction; the operation exists as an explicit policy
/// step so any drift is observable rather than silent.
pub fn reconcile(
    train_columns: &[String],
    matrix: &FeatureMatrix,
) -> (FeatureMatrix, ReconcileReport) {
    let mut report = ReconcileReport::default();
    let n = matrix.nrows();
    let mut values = Array2::<f64>::zeros((n, train_columns.len()));

    for (out_col, name) in train_columns.iter().enumerate() {
        match matrix.columns.iter().position(|c| c == name) {
            Some(in_col) => {
                for row in 0..n {
                    values[[row, out_col]] = matrix.values[[row, in_col]];
                }
            }
            None => report.zero_filled.push(name.clone()),
        }
    }
    for name in &matrix.columns {
        if !train_columns.contains(name) {
            report.dropped.push(name.clone());
        }
    }

    if !report.dropped.is_empty() {
        log::warn!("Reconciliation dropped test-only columns: {:?}", report.dropped);
    }
    if !report.zero_filled.is_empty() {
        log::warn!(
            "Reconciliation zero-filled training-only columns: {:?}",
            report.zero_filled
        );
    }

    (
        FeatureMatrix {
            columns: train_columns.to_vec(),
            values,
        },
        report,
    )
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// A small hand-built manifest; `survived` rows align with `ids`.
    fn table(
        ids: Vec<i64>,
        survived: Option<Vec<i64>>,
        age: Vec<Option<f64>>,
        fare: Vec<Option<f64>>,
        sex: Vec<&str>,
        embarked: Vec<Option<&str>>,
        pclass: Vec<i64>,
    ) -> PassengerTable {
        let n = ids.len();
        PassengerTable {
            ids,
            survived,
            pclass,
            sex: sex.into_iter().map(|s| Some(s.to_string())).collect(),
            age,
            sibsp: vec![0; n],
            parch: vec![0; n],
            fare,
            embarked: embarked
                .into_iter()
                .map(|e| e.map(|s| s.to_string()))
                .collect(),
        }
    }

    fn three_row_training() -> PassengerTable {
        table(
            vec![1, 2, 3],
            Some(vec![0, 1, 1]),
            vec![Some(22.0), None, Some(38.0)],
            vec![Some(7.25), Some(8.0), Some(71.28)],
            vec!["male", "female", "female"],
            vec![Some("S"), Some("C"), Some("C")],
            vec![3, 1, 1],
        )
    }

    #[test]
    fn drop_missing_age_removes_exactly_the_null_rows() {
        let raw = three_row_training();
        let filtered = drop_missing_age(&raw);

        let missing = raw.age.iter().filter(|a| a.is_none()).count();
        assert_eq!(filtered.len(), raw.len() - missing);
        assert!(filtered.age.iter().all(|a| a.is_some()));
        assert_eq!(filtered.ids, vec![1, 3]);
        assert_eq!(filtered.survived.as_deref(), Some(&[0, 1][..]));
    }

    #[test]
    fn training_mean_never_sees_the_dropped_row() {
        // Age = [22, NaN, 38]: the mean must be (22 + 38) / 2, with the
        // dropped row contributing nothing.
        let filtered = drop_missing_age(&three_row_training());
        let stats = ImputeStats::fit(&filtered).unwrap();
        assert_abs_diff_eq!(stats.age_mean, 30.0, epsilon = 1e-12);
    }

    #[test]
    fn mean_fill_is_idempotent() {
        let values = vec![Some(10.0), None, Some(20.0)];
        let mean = observed_mean(&values, "Age").unwrap();
        let filled = fill_missing(&values, mean);
        let refilled = fill_missing(&filled.iter().map(|&v| Some(v)).collect::<Vec<_>>(), mean);
        assert_eq!(filled, refilled);
        assert_abs_diff_eq!(filled[1], 15.0, epsilon = 1e-12);
    }

    #[test]
    fn all_missing_column_is_an_error() {
        let mut t = three_row_training();
        t.fare = vec![None, None, None];
        let err = ImputeStats::fit(&t).unwrap_err();
        match err {
            FeatureError::AllValuesMissing(col) => assert_eq!(col, "Fare"),
            other => panic!("Expected AllValuesMissing(Fare), got {:?}", other),
        }
    }

    #[test]
    fn one_hot_groups_sum_to_one_when_value_is_seen() {
        let t = drop_missing_age(&three_row_training());
        let plan = FeaturePlan::fit(&t, ImputePolicy::PerTable).unwrap();
        let (matrix, report) = plan.transform(&t, TableRole::Training).unwrap();
        assert_eq!(report.total_unseen(), 0);

        // Columns: Age, Fare, then Sex/Embarked/Pclass/SibSp/Parch groups.
        let sex_cols: Vec<usize> = matrix
            .columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.starts_with("Sex_").then_some(i))
            .collect();
        assert_eq!(sex_cols.len(), 2);
        for row in 0..matrix.nrows() {
            let sum: f64 = sex_cols.iter().map(|&c| matrix.values[[row, c]]).sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn missing_embarked_activates_no_indicator() {
        let t = table(
            vec![1, 2],
            Some(vec![0, 1]),
            vec![Some(20.0), Some(30.0)],
            vec![Some(5.0), Some(6.0)],
            vec!["male", "female"],
            vec![Some("S"), None],
            vec![3, 1],
        );
        let plan = FeaturePlan::fit(&t, ImputePolicy::PerTable).unwrap();
        let (matrix, report) = plan.transform(&t, TableRole::Training).unwrap();
        assert_eq!(report.total_unseen(), 0);

        let embarked_cols: Vec<usize> = matrix
            .columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.starts_with("Embarked_").then_some(i))
            .collect();
        assert_eq!(embarked_cols.len(), 1); // only "S" was observed
        let row1_sum: f64 = embarked_cols.iter().map(|&c| matrix.values[[1, c]]).sum();
        assert_abs_diff_eq!(row1_sum, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn unseen_category_is_counted_and_loses_its_field() {
        let train = drop_missing_age(&three_row_training());
        let plan = FeaturePlan::fit(&train, ImputePolicy::PerTable).unwrap();

        // Test table embarks from "Q", never observed during fitting.
        let test = table(
            vec![10],
            None,
            vec![Some(40.0)],
            vec![Some(9.0)],
            vec!["male"],
            vec![Some("Q")],
            vec![3],
        );
        let (matrix, report) = plan.transform(&test, TableRole::Test).unwrap();

        assert_eq!(report.unseen.get("Embarked=Q"), Some(&1));
        assert!(!matrix.columns.iter().any(|c| c == "Embarked_Q"));
        let embarked_cols: Vec<usize> = matrix
            .columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.starts_with("Embarked_").then_some(i))
            .collect();
        let sum: f64 = embarked_cols.iter().map(|&c| matrix.values[[0, c]]).sum();
        assert_abs_diff_eq!(sum, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn per_table_policy_recomputes_test_means() {
        let train = drop_missing_age(&three_row_training());
        let test = table(
            vec![10, 11],
            None,
            vec![Some(60.0), None],
            vec![Some(10.0), Some(20.0)],
            vec!["male", "male"],
            vec![Some("S"), Some("S")],
            vec![3, 3],
        );

        let per_table = FeaturePlan::fit(&train, ImputePolicy::PerTable).unwrap();
        let (m, _) = per_table.transform(&test, TableRole::Test).unwrap();
        // The test table's own Age mean is 60, so the gap is filled with 60.
        assert_abs_diff_eq!(m.values[[1, 0]], 60.0, epsilon = 1e-12);

        let frozen = FeaturePlan::fit(&train, ImputePolicy::FromTraining).unwrap();
        let (m, _) = frozen.transform(&test, TableRole::Test).unwrap();
        // Training Age mean over [22, 38] is 30.
        assert_abs_diff_eq!(m.values[[1, 0]], 30.0, epsilon = 1e-12);
    }

    #[test]
    fn reconcile_aligns_to_training_columns() {
        let train_columns: Vec<String> = ["Age", "Fare", "Sex_female", "Sex_male", "Embarked_S"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let test_matrix = FeatureMatrix {
            columns: ["Age", "Fare", "Sex_male", "Embarked_Q"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            values: Array2::from_shape_vec((1, 4), vec![40.0, 9.0, 1.0, 1.0]).unwrap(),
        };

        let (aligned, report) = reconcile(&train_columns, &test_matrix);

        assert_eq!(aligned.columns, train_columns);
        assert_eq!(report.dropped, vec!["Embarked_Q".to_string()]);
        assert_eq!(
            report.zero_filled,
            vec!["Sex_female".to_string(), "Embarked_S".to_string()]
        );
        // Test columns are now a subset of (here: exactly) the training set.
        assert!(aligned.columns.iter().all(|c| train_columns.contains(c)));
        assert_abs_diff_eq!(aligned.values[[0, 0]], 40.0, epsilon = 1e-12);
        assert_abs_diff_eq!(aligned.values[[0, 2]], 0.0, epsilon = 1e-12); // Sex_female
        assert_abs_diff_eq!(aligned.values[[0, 3]], 1.0, epsilon = 1e-12); // Sex_male
        assert_abs_diff_eq!(aligned.values[[0, 4]], 0.0, epsilon = 1e-12); // Embarked_S
    }

    #[test]
    fn feature_plan_round_trips_through_json() {
        let train = drop_missing_age(&three_row_training());
        let plan = FeaturePlan::fit(&train, ImputePolicy::FromTraining).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let restored: FeaturePlan = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.column_names(), plan.column_names());
        assert_abs_diff_eq!(
            restored.train_stats.age_mean,
            plan.train_stats.age_mean,
            epsilon = 1e-12
        );
    }

    #[test]
    fn labels_require_the_survived_column() {
        let train = three_row_training();
        let y = labels(&train).unwrap();
        assert_eq!(y.len(), 3);
        assert_abs_diff_eq!(y[1], 1.0, epsilon = 1e-12);

        let mut test = train.clone();
        test.survived = None;
        assert!(matches!(labels(&test), Err(FeatureError::LabelMissing)));
    }
}
