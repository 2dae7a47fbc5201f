//! Utilities for working with Arrow arrays.
//!
//! Raw register extracts are read as text columns; these helpers clean and
//! parse their cells and give typed access to canonical columns regardless of
//! the exact numeric type a table was stored with.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::kernels::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::{Result, VulnError};

/// Normalize a raw header name: strip quotes, trim, lower-case and replace
/// inner whitespace with underscores
#[must_use]
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .trim_matches('"')
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Trim a raw cell and strip surrounding quotes; empty cells become `None`
#[must_use]
pub fn clean_cell(raw: &str) -> Option<&str> {
    let cell = raw.trim().trim_matches('"').trim();
    if cell.is_empty() { None } else { Some(cell) }
}

/// Parse a raw cell as a decimal number, accepting a decimal comma
///
/// `"1234,56"` and `"1.234,56"` both parse as 1234.56. Non-finite values are
/// treated as missing.
#[must_use]
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cell = clean_cell(raw)?;
    let normalized = if cell.contains(',') {
        cell.replace('.', "").replace(',', ".")
    } else {
        cell.to_string()
    };
    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parse a raw cell as an integer code; `"1.0"` is accepted as 1
#[must_use]
pub fn parse_int(raw: &str) -> Option<i64> {
    let cell = clean_cell(raw)?;
    if let Ok(value) = cell.parse::<i64>() {
        return Some(value);
    }
    parse_decimal(cell)
        .filter(|value| value.fract() == 0.0 && value.abs() < i64::MAX as f64)
        .map(|value| value as i64)
}

/// Get a text column by name
#[must_use]
pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|column| column.as_any().downcast_ref::<StringArray>())
}

/// Get the first of several alternative text columns that is present
#[must_use]
pub fn first_string_column<'a>(batch: &'a RecordBatch, names: &[&str]) -> Option<&'a StringArray> {
    names.iter().find_map(|name| string_column(batch, name))
}

/// Whether the batch has a column with this name
#[must_use]
pub fn has_column(batch: &RecordBatch, name: &str) -> bool {
    batch.schema().index_of(name).is_ok()
}

fn required_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| VulnError::column_not_found(name))
}

/// Read a column as `Float64`, casting numeric and boolean columns
pub fn column_as_f64(batch: &RecordBatch, name: &str) -> Result<Float64Array> {
    let column = required_column(batch, name)?;
    let converted = cast::cast(column, &DataType::Float64)?;
    converted
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| VulnError::column_type(name, "Float64"))
}

/// Read a column as `Int64`, casting other integer and decimal columns
pub fn column_as_i64(batch: &RecordBatch, name: &str) -> Result<Int64Array> {
    let column = required_column(batch, name)?;
    let converted = cast::cast(column, &DataType::Int64)?;
    converted
        .as_any()
        .downcast_ref::<Int64Array>()
        .cloned()
        .ok_or_else(|| VulnError::column_type(name, "Int64"))
}

/// Read a column as `Boolean`; numeric columns map nonzero to true
pub fn column_as_bool(batch: &RecordBatch, name: &str) -> Result<BooleanArray> {
    let column = required_column(batch, name)?;
    let converted = cast::cast(column, &DataType::Boolean)?;
    converted
        .as_any()
        .downcast_ref::<BooleanArray>()
        .cloned()
        .ok_or_else(|| VulnError::column_type(name, "Boolean"))
}

/// Fail with `NullValues` if the column contains nulls
pub fn ensure_no_nulls(batch: &RecordBatch, name: &str) -> Result<()> {
    let nulls = required_column(batch, name)?.null_count();
    if nulls > 0 {
        return Err(VulnError::NullValues {
            column: name.to_string(),
            nulls,
        });
    }
    Ok(())
}

/// Append a column to a record batch
pub fn append_column(batch: &RecordBatch, field: Field, array: ArrayRef) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<_> = schema.fields().iter().cloned().collect();
    fields.push(Arc::new(field));
    let mut columns = batch.columns().to_vec();
    columns.push(array);
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Replace an existing column, keeping its position and field metadata
pub fn replace_column(batch: &RecordBatch, name: &str, array: ArrayRef) -> Result<RecordBatch> {
    let index = batch
        .schema()
        .index_of(name)
        .map_err(|_| VulnError::column_not_found(name))?;
    let mut columns = batch.columns().to_vec();
    columns[index] = array;
    Ok(RecordBatch::try_new(batch.schema(), columns)?)
}
