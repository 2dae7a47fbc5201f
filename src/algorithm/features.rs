//! ML feature selection
//!
//! Downstream tier models are trained on a fixed set of numeric columns.
//! Changing [`MODEL_FEATURE_COLUMNS`] means retraining them.

use std::sync::Arc;

use arrow::array::{ArrayRef, UInt8Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use super::tier::batch_tiers;
use crate::error::Result;
use crate::schema::columns;
use crate::utils::arrow::{column_as_f64, has_column};

/// Feature columns every model row carries, in order
pub const MODEL_FEATURE_COLUMNS: [&str; 14] = [
    columns::RESPONDENT_AGE,
    columns::EDUCATION_LEVEL,
    columns::INCOME_PER_CAPITA,
    columns::HOUSEHOLD_SIZE,
    columns::HAS_DISABILITY,
    columns::EMPLOYMENT_STATUS,
    columns::HOUSING_TYPE,
    columns::HAS_WATER_ACCESS,
    columns::HAS_SEWAGE_ACCESS,
    columns::AGE_VULNERABILITY_FLAG,
    columns::ADEQUATE_INFRASTRUCTURE_FLAG,
    columns::LOW_EDUCATION_FLAG,
    columns::PRECARIOUS_EMPLOYMENT_FLAG,
    columns::OVERCROWDING_FLAG,
];

/// Feature appended when the batch carries it
pub const OPTIONAL_MODEL_FEATURE: &str = columns::RECEIVES_CASH_TRANSFER;

/// Names of the feature columns selected for `batch`
#[must_use]
pub fn model_feature_names(batch: &RecordBatch) -> Vec<&'static str> {
    let mut names = MODEL_FEATURE_COLUMNS.to_vec();
    if has_column(batch, OPTIONAL_MODEL_FEATURE) {
        names.push(OPTIONAL_MODEL_FEATURE);
    }
    names
}

/// Project a derived batch onto the model features, cast to `Float64`
///
/// # Errors
/// Returns `ColumnNotFound` when a required feature column is absent
pub fn select_model_features(batch: &RecordBatch) -> Result<RecordBatch> {
    let names = model_feature_names(batch);
    let arrays = names
        .iter()
        .map(|name| column_as_f64(batch, name).map(|values| Arc::new(values) as ArrayRef))
        .collect::<Result<Vec<_>>>()?;
    let schema = Schema::new(
        names
            .iter()
            .map(|name| Field::new(*name, DataType::Float64, true))
            .collect::<Vec<_>>(),
    );
    Ok(RecordBatch::try_new(Arc::new(schema), arrays)?)
}

/// Tier ordinal codes (0..3) of a classified batch
pub fn model_target(batch: &RecordBatch) -> Result<UInt8Array> {
    Ok(batch_tiers(batch)?.iter().map(|tier| tier.code()).collect())
}

/// Features and target of a classified batch
pub fn prepare_training_data(batch: &RecordBatch) -> Result<(RecordBatch, UInt8Array)> {
    Ok((select_model_features(batch)?, model_target(batch)?))
}
