//! Feature deriver
//!
//! Derived columns are declared once in [`DERIVED_FIELDS`] with their
//! dependencies and compute function. The engine appends each one that the
//! batch does not already carry, so derivation can run on its own output.

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use log::debug;

use crate::error::{Result, VulnError};
use crate::schema::columns;
use crate::utils::arrow::{append_column, column_as_bool, column_as_f64, column_as_i64, has_column};

/// Age below which a respondent is flagged
pub const MIN_ADULT_AGE: i64 = 18;
/// Age above which a respondent is flagged
pub const MAX_WORKING_AGE: i64 = 65;
/// Education levels at or below this are low
pub const LOW_EDUCATION_MAX_LEVEL: i64 = 2;
/// Employment statuses at or below this are precarious
pub const PRECARIOUS_EMPLOYMENT_MAX_STATUS: i64 = 1;
/// Households larger than this are overcrowded
pub const OVERCROWDING_MIN_SIZE: i64 = 5;

/// A derived column definition
#[derive(Debug)]
pub struct DerivedField {
    /// Column name
    pub name: &'static str,
    /// Arrow type of the column
    pub data_type: DataType,
    /// Columns that must be present before computing
    pub dependencies: &'static [&'static str],
    /// Compute function
    pub compute: fn(&RecordBatch) -> Result<ArrayRef>,
}

/// Derived columns, in the order they are appended
pub static DERIVED_FIELDS: [DerivedField; 6] = [
    DerivedField {
        name: columns::INCOME_PER_CAPITA,
        data_type: DataType::Float64,
        dependencies: &[columns::HOUSEHOLD_INCOME, columns::HOUSEHOLD_SIZE],
        compute: income_per_capita,
    },
    DerivedField {
        name: columns::AGE_VULNERABILITY_FLAG,
        data_type: DataType::Boolean,
        dependencies: &[columns::RESPONDENT_AGE],
        compute: age_vulnerability,
    },
    DerivedField {
        name: columns::ADEQUATE_INFRASTRUCTURE_FLAG,
        data_type: DataType::Boolean,
        dependencies: &[columns::HAS_WATER_ACCESS, columns::HAS_SEWAGE_ACCESS],
        compute: adequate_infrastructure,
    },
    DerivedField {
        name: columns::LOW_EDUCATION_FLAG,
        data_type: DataType::Boolean,
        dependencies: &[columns::EDUCATION_LEVEL],
        compute: low_education,
    },
    DerivedField {
        name: columns::PRECARIOUS_EMPLOYMENT_FLAG,
        data_type: DataType::Boolean,
        dependencies: &[columns::EMPLOYMENT_STATUS],
        compute: precarious_employment,
    },
    DerivedField {
        name: columns::OVERCROWDING_FLAG,
        data_type: DataType::Boolean,
        dependencies: &[columns::HOUSEHOLD_SIZE],
        compute: overcrowding,
    },
];

/// Per-capita income
///
/// Sizes below 1 (including 0) divide as 1. This clamp guards the division
/// only; it does not mark the row as suspect. Negative incomes count as 0.
fn income_per_capita(batch: &RecordBatch) -> Result<ArrayRef> {
    let income = column_as_f64(batch, columns::HOUSEHOLD_INCOME)?;
    let size = column_as_i64(batch, columns::HOUSEHOLD_SIZE)?;
    Ok(Arc::new(
        income
            .iter()
            .zip(size.iter())
            .map(|(income, size)| Some(income?.max(0.0) / size?.max(1) as f64))
            .collect::<Float64Array>(),
    ))
}

fn int_flag(batch: &RecordBatch, column: &str, flag: impl Fn(i64) -> bool) -> Result<ArrayRef> {
    let values = column_as_i64(batch, column)?;
    Ok(Arc::new(
        values
            .iter()
            .map(|value| value.map(&flag))
            .collect::<BooleanArray>(),
    ))
}

fn age_vulnerability(batch: &RecordBatch) -> Result<ArrayRef> {
    int_flag(batch, columns::RESPONDENT_AGE, |age| {
        !(MIN_ADULT_AGE..=MAX_WORKING_AGE).contains(&age)
    })
}

fn adequate_infrastructure(batch: &RecordBatch) -> Result<ArrayRef> {
    let water = column_as_bool(batch, columns::HAS_WATER_ACCESS)?;
    let sewage = column_as_bool(batch, columns::HAS_SEWAGE_ACCESS)?;
    Ok(Arc::new(arrow::compute::and(&water, &sewage)?))
}

fn low_education(batch: &RecordBatch) -> Result<ArrayRef> {
    int_flag(batch, columns::EDUCATION_LEVEL, |level| {
        level <= LOW_EDUCATION_MAX_LEVEL
    })
}

fn precarious_employment(batch: &RecordBatch) -> Result<ArrayRef> {
    int_flag(batch, columns::EMPLOYMENT_STATUS, |status| {
        status <= PRECARIOUS_EMPLOYMENT_MAX_STATUS
    })
}

fn overcrowding(batch: &RecordBatch) -> Result<ArrayRef> {
    int_flag(batch, columns::HOUSEHOLD_SIZE, |size| size > OVERCROWDING_MIN_SIZE)
}

/// Append every derived column the batch lacks
///
/// # Errors
/// Returns `ColumnNotFound` when a dependency of a missing derived column is absent
pub fn derive_features(batch: &RecordBatch) -> Result<RecordBatch> {
    let mut derived = batch.clone();

    for field in &DERIVED_FIELDS {
        if has_column(&derived, field.name) {
            debug!("'{}' already present, skipping", field.name);
            continue;
        }
        if let Some(missing) = field
            .dependencies
            .iter()
            .find(|dependency| !has_column(&derived, dependency))
        {
            return Err(VulnError::column_not_found(*missing));
        }

        let array = (field.compute)(&derived)?;
        derived = append_column(
            &derived,
            Field::new(field.name, field.data_type.clone(), true),
            array,
        )?;
        debug!("Derived '{}'", field.name);
    }

    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray, Int32Array};
    use arrow::datatypes::Float64Type;

    fn canonical_rows() -> RecordBatch {
        RecordBatch::try_from_iter(vec![
            (
                columns::HOUSEHOLD_INCOME,
                Arc::new(Float64Array::from(vec![900.0, 500.0, 1200.0])) as ArrayRef,
            ),
            (
                columns::HOUSEHOLD_SIZE,
                Arc::new(Int32Array::from(vec![3, 0, 6])) as ArrayRef,
            ),
            (
                columns::RESPONDENT_AGE,
                Arc::new(Int32Array::from(vec![17, 18, 66])) as ArrayRef,
            ),
            (
                columns::HAS_WATER_ACCESS,
                Arc::new(BooleanArray::from(vec![true, true, false])) as ArrayRef,
            ),
            (
                columns::HAS_SEWAGE_ACCESS,
                Arc::new(BooleanArray::from(vec![true, false, false])) as ArrayRef,
            ),
            (
                columns::EDUCATION_LEVEL,
                Arc::new(Int32Array::from(vec![2, 3, 0])) as ArrayRef,
            ),
            (
                columns::EMPLOYMENT_STATUS,
                Arc::new(Int32Array::from(vec![1, 2, 0])) as ArrayRef,
            ),
        ])
        .unwrap()
    }

    fn flags(batch: &RecordBatch, name: &str) -> Vec<bool> {
        batch
            .column_by_name(name)
            .unwrap()
            .as_boolean()
            .iter()
            .map(Option::unwrap)
            .collect()
    }

    #[test]
    fn test_derives_all_fields() {
        let derived = derive_features(&canonical_rows()).unwrap();
        assert_eq!(derived.num_columns(), 7 + DERIVED_FIELDS.len());

        let per_capita = derived
            .column_by_name(columns::INCOME_PER_CAPITA)
            .unwrap()
            .as_primitive::<Float64Type>();
        assert_eq!(per_capita.values().to_vec(), vec![300.0, 500.0, 200.0]);

        assert_eq!(flags(&derived, columns::AGE_VULNERABILITY_FLAG), vec![true, false, true]);
        assert_eq!(
            flags(&derived, columns::ADEQUATE_INFRASTRUCTURE_FLAG),
            vec![true, false, false]
        );
        assert_eq!(flags(&derived, columns::LOW_EDUCATION_FLAG), vec![true, false, true]);
        assert_eq!(flags(&derived, columns::PRECARIOUS_EMPLOYMENT_FLAG), vec![true, false, true]);
        assert_eq!(flags(&derived, columns::OVERCROWDING_FLAG), vec![false, false, true]);
    }

    #[test]
    fn test_present_columns_are_kept() {
        let preset = append_column(
            &canonical_rows(),
            Field::new(columns::OVERCROWDING_FLAG, DataType::Boolean, true),
            Arc::new(BooleanArray::from(vec![true, true, true])),
        )
        .unwrap();
        let derived = derive_features(&preset).unwrap();
        assert_eq!(flags(&derived, columns::OVERCROWDING_FLAG), vec![true, true, true]);
        assert_eq!(derived.num_columns(), 7 + DERIVED_FIELDS.len());
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let once = derive_features(&canonical_rows()).unwrap();
        let twice = derive_features(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_dependency() {
        let batch = canonical_rows().project(&[0]).unwrap();
        let err = derive_features(&batch).unwrap_err();
        assert!(matches!(
            err,
            VulnError::ColumnNotFound { column } if column == columns::HOUSEHOLD_SIZE
        ));
        assert_eq!(batch.column(0).null_count(), 0);
    }
}
