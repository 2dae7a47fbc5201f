//! Family register mapping
//!
//! Maps raw family-level rows onto the canonical household schema. Columns
//! the extract does not carry receive their canonical default; respondent
//! fields always do, since they come from the person register.

use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::record_batch::RecordBatch;
use log::debug;

use super::codes;
use crate::error::Result;
use crate::schema::canonical::CANONICAL_FIELDS;
use crate::schema::{FieldDefinition, canonical_schema, columns};
use crate::utils::arrow::{clean_cell, first_string_column, string_column};

/// Raw columns holding the family identifier, in preference order
pub const FAMILY_ID_COLUMNS: [&str; 2] = ["id_familia", "cod_familiar_fam"];

/// Raw column holding the IBGE municipality code
pub const MUNICIPALITY_COLUMN: &str = "cd_ibge";

/// Map one raw family batch to the canonical schema
///
/// # Arguments
/// * `raw` - All-text batch with normalized column names
/// * `row_offset` - Ordinal of the first row within the source file, used for
///   generated household identifiers
pub fn map_family_batch(raw: &RecordBatch, row_offset: usize) -> Result<RecordBatch> {
    let mut defaulted = Vec::new();
    let columns: Vec<ArrayRef> = CANONICAL_FIELDS
        .iter()
        .map(|field| {
            map_family_column(raw, field.name, row_offset).unwrap_or_else(|| {
                defaulted.push(field.name);
                field.default_array(raw.num_rows(), row_offset)
            })
        })
        .collect();

    debug!(
        "Mapped {} family rows, defaulted columns: {:?}",
        raw.num_rows(),
        defaulted
    );
    Ok(RecordBatch::try_new(canonical_schema(), columns)?)
}

fn map_family_column(raw: &RecordBatch, name: &str, row_offset: usize) -> Option<ArrayRef> {
    let column = |raw_name: &str| string_column(raw, raw_name);

    match name {
        columns::HOUSEHOLD_ID => {
            first_string_column(raw, &FAMILY_ID_COLUMNS).map(|ids| household_ids(ids, row_offset))
        }
        columns::MUNICIPALITY_CODE => column(MUNICIPALITY_COLUMN).map(codes::map_int64),
        columns::HOUSEHOLD_INCOME => column("vlr_renda_media_fam").map(codes::map_decimal),
        columns::HOUSEHOLD_SIZE => {
            column("qtde_pessoas").map(|raw| codes::map_int32(raw, |size| i32::try_from(size).ok()))
        }
        columns::HOUSING_TYPE => column("cod_material_domic_fam")
            .map(|raw| codes::map_int32(raw, |code| Some(codes::housing_material_bucket(code)))),
        columns::HAS_WATER_ACCESS => column("cod_abaste_agua_domic_fam")
            .map(|raw| codes::map_bool(raw, |code| Some(codes::water_supply_adequate(code)))),
        columns::HAS_SEWAGE_ACCESS => column("cod_escoa_sanitario_domic_fam")
            .map(|raw| codes::map_bool(raw, |code| Some(codes::sewage_disposal_adequate(code)))),
        columns::HAS_ELECTRICITY => column("cod_iluminacao_domic_fam")
            .map(|raw| codes::map_bool(raw, |code| Some(codes::has_electric_lighting(code)))),
        columns::HAS_GARBAGE_COLLECTION => column("cod_destino_lixo_domic_fam")
            .map(|raw| codes::map_bool(raw, |code| Some(codes::garbage_collected(code)))),
        columns::RECEIVES_CASH_TRANSFER => {
            column("marc_pbf").map(|raw| codes::map_bool(raw, |flag| Some(flag != 0)))
        }
        _ => None,
    }
}

/// Household identifiers; empty cells fall back to the row ordinal
fn household_ids(raw: &StringArray, row_offset: usize) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(raw.iter().enumerate().map(
        |(row, cell)| match cell.and_then(clean_cell) {
            Some(id) => id.to_string(),
            None => format!("row-{}", row_offset + row),
        },
    )))
}

/// Canonical fields a family extract can never provide
#[must_use]
pub fn respondent_fields() -> Vec<&'static FieldDefinition> {
    CANONICAL_FIELDS
        .iter()
        .filter(|field| {
            matches!(
                field.name,
                columns::RESPONDENT_AGE
                    | columns::RESPONDENT_SEX
                    | columns::EDUCATION_LEVEL
                    | columns::EMPLOYMENT_STATUS
                    | columns::HAS_DISABILITY
            )
        })
        .collect()
}
