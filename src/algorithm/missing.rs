//! Missing-value policy
//!
//! Fills or drops the null cells left after mapping. Numeric columns include
//! booleans, treated as 0/1. Integer columns receive the rounded statistic.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::compute::filter_record_batch;
use arrow::compute::kernels::cast;
use arrow::datatypes::{DataType, Float64Type, Int32Type, Int64Type};
use arrow::record_batch::RecordBatch;
use log::{debug, info};

use crate::error::{Result, VulnError};
use crate::schema::columns;
use crate::utils::arrow::replace_column;

/// Strategy used to treat null cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum MissingValueStrategy {
    /// Fill numeric columns with the column median
    #[default]
    Median,
    /// Fill numeric columns with the column mean
    Mean,
    /// Fill every column with its most frequent value
    Mode,
    /// Remove rows holding a null in any column
    Drop,
}

impl MissingValueStrategy {
    /// Convert `MissingValueStrategy` to static string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::Mean => "mean",
            Self::Mode => "mode",
            Self::Drop => "drop",
        }
    }
}

impl fmt::Display for MissingValueStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingValueStrategy {
    type Err = VulnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "median" | "mediana" => Ok(Self::Median),
            "mean" | "media" | "média" => Ok(Self::Mean),
            "mode" | "moda" => Ok(Self::Mode),
            "drop" | "remover" => Ok(Self::Drop),
            _ => Err(VulnError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Counts of one policy application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MissingValueReport {
    /// Null cells replaced
    pub cells_filled: usize,
    /// Rows removed by [`MissingValueStrategy::Drop`]
    pub rows_dropped: usize,
    /// `household_size` values raised to 1
    pub sizes_floored: usize,
}

impl MissingValueReport {
    /// Accumulate another batch's counts
    pub fn merge(&mut self, other: &Self) {
        self.cells_filled += other.cells_filled;
        self.rows_dropped += other.rows_dropped;
        self.sizes_floored += other.sizes_floored;
    }
}

/// Value a column's nulls are replaced with
#[derive(Debug, Clone, PartialEq)]
enum FillValue {
    Number(f64),
    Text(String),
}

fn is_numeric(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int32 | DataType::Int64 | DataType::Float64 | DataType::Boolean
    )
}

/// Non-null values of a numeric column as `f64`
fn numeric_values(array: &ArrayRef, name: &str) -> Result<Vec<f64>> {
    let converted = cast::cast(array, &DataType::Float64)?;
    let values = converted
        .as_primitive_opt::<Float64Type>()
        .ok_or_else(|| VulnError::column_type(name, "Float64"))?;
    Ok(values.iter().flatten().collect())
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Most frequent value; ties resolve to the smallest
fn numeric_mode(values: &mut [f64]) -> Option<f64> {
    values.sort_by(f64::total_cmp);
    let mut best: Option<(f64, usize)> = None;
    for run in values.chunk_by(|a, b| a.total_cmp(b).is_eq()) {
        if best.is_none_or(|(_, count)| run.len() > count) {
            best = Some((run[0], run.len()));
        }
    }
    best.map(|(value, _)| value)
}

fn text_mode(array: &StringArray) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in array.iter().flatten() {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

/// Statistic used to fill `array`, or `None` when the strategy leaves it alone
fn fill_value(
    array: &ArrayRef,
    name: &str,
    strategy: MissingValueStrategy,
) -> Result<Option<FillValue>> {
    let numeric = is_numeric(array.data_type());
    let fill = match strategy {
        MissingValueStrategy::Drop => None,
        MissingValueStrategy::Median if numeric => {
            Some(FillValue::Number(median(&mut numeric_values(array, name)?).unwrap_or(0.0)))
        }
        MissingValueStrategy::Mean if numeric => {
            Some(FillValue::Number(mean(&numeric_values(array, name)?).unwrap_or(0.0)))
        }
        MissingValueStrategy::Mode if numeric => {
            Some(FillValue::Number(numeric_mode(&mut numeric_values(array, name)?).unwrap_or(0.0)))
        }
        MissingValueStrategy::Mode => {
            let text = cast::cast(array, &DataType::Utf8)?;
            let text = text
                .as_string_opt::<i32>()
                .ok_or_else(|| VulnError::column_type(name, "Utf8"))?;
            Some(FillValue::Text(text_mode(text).unwrap_or_else(|| "0".to_string())))
        }
        MissingValueStrategy::Median | MissingValueStrategy::Mean => None,
    };
    Ok(fill)
}

/// Replace the nulls of `array` with `fill`, keeping the column type
fn fill_nulls(array: &ArrayRef, name: &str, fill: &FillValue) -> Result<ArrayRef> {
    let filled: ArrayRef = match (array.data_type(), fill) {
        (DataType::Int32, FillValue::Number(value)) => {
            let values = array
                .as_primitive_opt::<Int32Type>()
                .ok_or_else(|| VulnError::column_type(name, "Int32"))?;
            let value = value.round() as i32;
            Arc::new(values.iter().map(|v| Some(v.unwrap_or(value))).collect::<Int32Array>())
        }
        (DataType::Int64, FillValue::Number(value)) => {
            let values = array
                .as_primitive_opt::<Int64Type>()
                .ok_or_else(|| VulnError::column_type(name, "Int64"))?;
            let value = value.round() as i64;
            Arc::new(values.iter().map(|v| Some(v.unwrap_or(value))).collect::<Int64Array>())
        }
        (DataType::Float64, FillValue::Number(value)) => {
            let values = array
                .as_primitive_opt::<Float64Type>()
                .ok_or_else(|| VulnError::column_type(name, "Float64"))?;
            Arc::new(values.iter().map(|v| Some(v.unwrap_or(*value))).collect::<Float64Array>())
        }
        (DataType::Boolean, FillValue::Number(value)) => {
            let values = array
                .as_boolean_opt()
                .ok_or_else(|| VulnError::column_type(name, "Boolean"))?;
            let value = *value >= 0.5;
            Arc::new(values.iter().map(|v| Some(v.unwrap_or(value))).collect::<BooleanArray>())
        }
        (DataType::Utf8, FillValue::Text(value)) => {
            let values = array
                .as_string_opt::<i32>()
                .ok_or_else(|| VulnError::column_type(name, "Utf8"))?;
            Arc::new(
                values
                    .iter()
                    .map(|v| Some(v.unwrap_or(value.as_str())))
                    .collect::<StringArray>(),
            )
        }
        (data_type, FillValue::Text(value)) => {
            // Text mode of a non-text column: fill as text and cast back
            let text = cast::cast(array, &DataType::Utf8)?;
            let text = text
                .as_string_opt::<i32>()
                .ok_or_else(|| VulnError::column_type(name, "Utf8"))?;
            let filled: ArrayRef = Arc::new(
                text.iter()
                    .map(|v| Some(v.unwrap_or(value.as_str())))
                    .collect::<StringArray>(),
            );
            cast::cast(&filled, data_type)?
        }
        (_, FillValue::Number(_)) => return Err(VulnError::column_type(name, "numeric")),
    };
    Ok(filled)
}

fn drop_incomplete_rows(batch: &RecordBatch) -> Result<RecordBatch> {
    let keep: BooleanArray = (0..batch.num_rows())
        .map(|row| Some(batch.columns().iter().all(|column| column.is_valid(row))))
        .collect();
    Ok(filter_record_batch(batch, &keep)?)
}

/// Raise `household_size` values below 1 to 1
fn floor_household_size(batch: &RecordBatch) -> Result<(RecordBatch, usize)> {
    let Some(column) = batch.column_by_name(columns::HOUSEHOLD_SIZE) else {
        return Ok((batch.clone(), 0));
    };
    let sizes = cast::cast(column, &DataType::Int32)?;
    let sizes = sizes
        .as_primitive_opt::<Int32Type>()
        .ok_or_else(|| VulnError::column_type(columns::HOUSEHOLD_SIZE, "Int32"))?;

    let floored = sizes.iter().flatten().filter(|size| *size < 1).count();
    if floored == 0 {
        return Ok((batch.clone(), 0));
    }
    let values: ArrayRef = Arc::new(
        sizes
            .iter()
            .map(|v| v.map(|size| size.max(1)))
            .collect::<Int32Array>(),
    );
    let values = cast::cast(&values, column.data_type())?;
    Ok((replace_column(batch, columns::HOUSEHOLD_SIZE, values)?, floored))
}

/// Apply a missing-value strategy to a batch
///
/// Median and mean only touch numeric columns; mode fills every column and
/// falls back to 0 (false, `"0"`) for a column that is entirely null. As a
/// final step `household_size` is floored at 1. Applying the policy to its
/// own output changes nothing.
pub fn apply_missing_value_policy(
    batch: &RecordBatch,
    strategy: MissingValueStrategy,
) -> Result<(RecordBatch, MissingValueReport)> {
    let mut report = MissingValueReport::default();

    let treated = if strategy == MissingValueStrategy::Drop {
        let kept = drop_incomplete_rows(batch)?;
        report.rows_dropped = batch.num_rows() - kept.num_rows();
        kept
    } else {
        let schema = batch.schema();
        let mut columns = Vec::with_capacity(batch.num_columns());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let nulls = array.null_count();
            let fill = if nulls > 0 {
                fill_value(array, field.name(), strategy)?
            } else {
                None
            };
            match fill {
                Some(fill) => {
                    debug!("Filling {nulls} nulls in '{}' with {fill:?}", field.name());
                    report.cells_filled += nulls;
                    columns.push(fill_nulls(array, field.name(), &fill)?);
                }
                None => columns.push(array.clone()),
            }
        }
        RecordBatch::try_new(schema, columns)?
    };

    let (treated, floored) = floor_household_size(&treated)?;
    report.sizes_floored = floored;

    if report != MissingValueReport::default() {
        info!(
            "Missing-value policy '{strategy}': {} cells filled, {} rows dropped, {} sizes floored",
            report.cells_filled, report.rows_dropped, report.sizes_floored
        );
    }
    Ok((treated, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, Schema};

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("age", DataType::Int32, true),
            Field::new("income", DataType::Float64, true),
            Field::new("water", DataType::Boolean, true),
            Field::new("sex", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![Some(20), None, Some(40), Some(41)])),
                Arc::new(Float64Array::from(vec![Some(100.0), Some(300.0), None, Some(300.0)])),
                Arc::new(BooleanArray::from(vec![Some(true), None, Some(true), Some(false)])),
                Arc::new(StringArray::from(vec![Some("F"), Some("M"), None, Some("M")])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_strategy_names() {
        assert_eq!("median".parse::<MissingValueStrategy>().unwrap(), MissingValueStrategy::Median);
        assert_eq!("Moda".parse::<MissingValueStrategy>().unwrap(), MissingValueStrategy::Mode);
        assert_eq!("remover".parse::<MissingValueStrategy>().unwrap(), MissingValueStrategy::Drop);
        assert!(matches!(
            "interpolate".parse::<MissingValueStrategy>(),
            Err(VulnError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_median_fills_numeric_only() {
        let (filled, report) =
            apply_missing_value_policy(&sample_batch(), MissingValueStrategy::Median).unwrap();
        let age = filled.column(0).as_primitive::<Int32Type>();
        assert_eq!(age.value(1), 40);
        let income = filled.column(1).as_primitive::<Float64Type>();
        assert_eq!(income.value(2), 300.0);
        let water = filled.column(2).as_boolean();
        assert!(water.value(1));
        assert_eq!(filled.column(3).null_count(), 1);
        assert_eq!(report.cells_filled, 3);
    }

    #[test]
    fn test_mean_rounds_integers() {
        let (filled, _) =
            apply_missing_value_policy(&sample_batch(), MissingValueStrategy::Mean).unwrap();
        let age = filled.column(0).as_primitive::<Int32Type>();
        // (20 + 40 + 41) / 3 = 33.67
        assert_eq!(age.value(1), 34);
    }

    #[test]
    fn test_mode_fills_every_column() {
        let (filled, report) =
            apply_missing_value_policy(&sample_batch(), MissingValueStrategy::Mode).unwrap();
        for column in filled.columns() {
            assert_eq!(column.null_count(), 0);
        }
        // ties resolve to the smallest value
        let age = filled.column(0).as_primitive::<Int32Type>();
        assert_eq!(age.value(1), 20);
        assert_eq!(filled.column(3).as_string::<i32>().value(2), "M");
        assert_eq!(report.cells_filled, 4);
    }

    #[test]
    fn test_drop_removes_incomplete_rows() {
        let (kept, report) =
            apply_missing_value_policy(&sample_batch(), MissingValueStrategy::Drop).unwrap();
        assert_eq!(kept.num_rows(), 2);
        assert_eq!(report.rows_dropped, 2);
    }

    #[test]
    fn test_all_null_column_falls_back_to_zero() {
        let batch = RecordBatch::try_from_iter(vec![(
            "x",
            Arc::new(Float64Array::from(vec![None, None])) as ArrayRef,
        )])
        .unwrap();
        let (filled, _) = apply_missing_value_policy(&batch, MissingValueStrategy::Mode).unwrap();
        assert_eq!(
            filled.column(0).as_primitive::<Float64Type>().values().to_vec(),
            vec![0.0, 0.0]
        );
    }

    #[test]
    fn test_household_size_is_floored() {
        let batch = RecordBatch::try_from_iter(vec![(
            columns::HOUSEHOLD_SIZE,
            Arc::new(Int32Array::from(vec![Some(0), None, Some(4)])) as ArrayRef,
        )])
        .unwrap();
        let (filled, report) =
            apply_missing_value_policy(&batch, MissingValueStrategy::Median).unwrap();
        let sizes = filled.column(0).as_primitive::<Int32Type>();
        assert_eq!(sizes.values().to_vec(), vec![1, 2, 4]);
        assert_eq!(report.sizes_floored, 1);
    }

    #[test]
    fn test_policy_is_idempotent() {
        let (once, _) =
            apply_missing_value_policy(&sample_batch(), MissingValueStrategy::Mode).unwrap();
        let (twice, report) =
            apply_missing_value_policy(&once, MissingValueStrategy::Mode).unwrap();
        assert_eq!(once, twice);
        assert_eq!(report, MissingValueReport::default());
    }
}
