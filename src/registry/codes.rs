//! Administrative code tables of the CadÚnico extracts
//!
//! Each function maps one raw register code onto its canonical value. Codes
//! outside the documented domain map to the canonical fallback; empty cells
//! never reach these functions and stay null.

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, StringArray};

use crate::utils::arrow::{clean_cell, parse_decimal, parse_int};

/// `cod_abaste_agua_domic_fam`: 1 = general distribution network
#[must_use]
pub const fn water_supply_adequate(code: i64) -> bool {
    code == 1
}

/// `cod_escoa_sanitario_domic_fam`: 1 = collection network, 2 = septic tank
#[must_use]
pub const fn sewage_disposal_adequate(code: i64) -> bool {
    matches!(code, 1 | 2)
}

/// `cod_iluminacao_domic_fam`: 1 = electricity with its own meter
#[must_use]
pub const fn has_electric_lighting(code: i64) -> bool {
    code == 1
}

/// `cod_destino_lixo_domic_fam`: 1 = collected directly
#[must_use]
pub const fn garbage_collected(code: i64) -> bool {
    code == 1
}

/// `cod_material_domic_fam` bucketed into the housing scale
///
/// 2 = finished masonry, 1 = unfinished masonry, dressed wood or coated rammed
/// earth, 0 = uncoated rammed earth, salvaged wood, straw or other.
#[must_use]
pub const fn housing_material_bucket(code: i64) -> i32 {
    match code {
        1 => 2,
        5..=8 => 0,
        _ => 1,
    }
}

/// `cod_sexo_pessoa`: 1 = male, 2 = female
#[must_use]
pub const fn sex_label(code: i64) -> Option<&'static str> {
    match code {
        1 => Some("M"),
        2 => Some("F"),
        _ => None,
    }
}

/// Course attended (`cod_curso_frequentou_pessoa_memb` family of columns) to
/// the 0..5 education scale
#[must_use]
pub const fn education_level(code: i64) -> Option<i32> {
    match code {
        1 | 2 => Some(0),
        3 => Some(1),
        4 | 7 => Some(2),
        5 | 8 => Some(3),
        6 => Some(5),
        _ => None,
    }
}

/// Worked in the reference week: 1 = yes (informal), 2 = no (unemployed)
#[must_use]
pub const fn employment_status(code: i64) -> Option<i32> {
    match code {
        1 => Some(1),
        2 => Some(0),
        _ => None,
    }
}

/// `cod_deficiencia_memb`: 1 = has a disability, 2 = does not
#[must_use]
pub const fn disability(code: i64) -> Option<bool> {
    match code {
        1 => Some(true),
        2 => Some(false),
        _ => None,
    }
}

/// `cod_parentesco_rf_pessoa`: 1 = household reference person
#[must_use]
pub const fn is_reference_person(code: i64) -> bool {
    code == 1
}

/// Normalize an identifier used as a join key: trimmed, unquoted, leading
/// zeros removed (NIS and family codes are zero padded inconsistently)
#[must_use]
pub fn normalize_key(raw: &str) -> Option<String> {
    let cell = clean_cell(raw)?;
    let cell = cell.strip_suffix(".0").unwrap_or(cell);
    let trimmed = cell.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
}

/// Map a text column of codes through `map` into an `Int32` column
pub fn map_int32(raw: &StringArray, map: impl Fn(i64) -> Option<i32>) -> ArrayRef {
    Arc::new(
        raw.iter()
            .map(|cell| cell.and_then(parse_int).and_then(&map))
            .collect::<Int32Array>(),
    )
}

/// Parse a text column of codes into an `Int64` column
pub fn map_int64(raw: &StringArray) -> ArrayRef {
    Arc::new(raw.iter().map(|cell| cell.and_then(parse_int)).collect::<Int64Array>())
}

/// Map a text column of codes through `map` into a `Boolean` column
pub fn map_bool(raw: &StringArray, map: impl Fn(i64) -> Option<bool>) -> ArrayRef {
    Arc::new(
        raw.iter()
            .map(|cell| cell.and_then(parse_int).and_then(&map))
            .collect::<BooleanArray>(),
    )
}

/// Parse a text column of decimals into a `Float64` column
pub fn map_decimal(raw: &StringArray) -> ArrayRef {
    Arc::new(raw.iter().map(|cell| cell.and_then(parse_decimal)).collect::<Float64Array>())
}

/// Map a text column of codes through `map` into a text column
pub fn map_label(raw: &StringArray, map: impl Fn(i64) -> Option<&'static str>) -> ArrayRef {
    Arc::new(
        raw.iter()
            .map(|cell| cell.and_then(parse_int).and_then(&map))
            .collect::<StringArray>(),
    )
}
