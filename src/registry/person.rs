//! Person register mapping
//!
//! Only household reference persons are kept. Their attributes become the
//! respondent fields of the household they head.

use arrow::array::{Array, StringArray};
use arrow::record_batch::RecordBatch;
use log::debug;

use super::codes;
use crate::error::Result;
use crate::schema::{DefaultValue, canonical_field, columns};
use crate::utils::arrow::{clean_cell, first_string_column, parse_int, string_column};

/// Raw columns holding the household identifier, in preference order
pub const PERSON_HOUSEHOLD_ID_COLUMNS: [&str; 3] =
    ["id_familia", "cod_familiar_fam", "cod_familiar_pes"];

/// Raw columns holding the age, in preference order
pub const AGE_COLUMNS: [&str; 2] = ["idade", "idade_pessoa"];

/// Raw columns holding the course attended, in preference order
pub const EDUCATION_COLUMNS: [&str; 3] = [
    "cod_curso_frequentou_pessoa_memb",
    "cod_curso_frequenta_memb",
    "cod_curso_frequenta_pessoa",
];

/// Raw columns holding the work indicator, in preference order
pub const EMPLOYMENT_COLUMNS: [&str; 2] = ["cod_trabalhou_memb", "cod_trabalho_12_meses_pessoa"];

/// Raw column holding the kinship code
pub const PARENTAGE_COLUMN: &str = "cod_parentesco_rf_pessoa";

/// Raw column holding the social identification number
pub const NIS_COLUMN: &str = "num_nis_pessoa_atual";

/// Respondent attributes of one reference person
///
/// `None` fields are cells that were present in the extract but empty; they
/// are left for the missing-value policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RespondentRecord {
    /// Household identifier as written in the extract
    pub household_id: String,
    /// Normalized NIS, used to link benefit payments
    pub nis: Option<String>,
    /// Age in years
    pub age: Option<i32>,
    /// `M` or `F`
    pub sex: Option<String>,
    /// Education level on the 0..5 scale
    pub education_level: Option<i32>,
    /// Employment status
    pub employment_status: Option<i32>,
    /// Disability indicator
    pub has_disability: Option<bool>,
    /// Row ordinal within the person extract
    pub source_row: usize,
}

impl RespondentRecord {
    /// Names of the respondent fields on which two records differ
    #[must_use]
    pub fn conflicting_fields(&self, other: &Self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.age != other.age {
            fields.push(columns::RESPONDENT_AGE);
        }
        if self.sex != other.sex {
            fields.push(columns::RESPONDENT_SEX);
        }
        if self.education_level != other.education_level {
            fields.push(columns::EDUCATION_LEVEL);
        }
        if self.employment_status != other.employment_status {
            fields.push(columns::EMPLOYMENT_STATUS);
        }
        if self.has_disability != other.has_disability {
            fields.push(columns::HAS_DISABILITY);
        }
        fields
    }
}

fn int_default(name: &str) -> Option<i32> {
    match canonical_field(name).and_then(|field| field.default.as_ref()) {
        Some(DefaultValue::Int(value)) => i32::try_from(*value).ok(),
        _ => None,
    }
}

fn bool_default(name: &str) -> Option<bool> {
    match canonical_field(name).and_then(|field| field.default.as_ref()) {
        Some(DefaultValue::Bool(value)) => Some(*value),
        _ => None,
    }
}

fn text_default(name: &str) -> Option<String> {
    match canonical_field(name).and_then(|field| field.default.as_ref()) {
        Some(DefaultValue::Text(value)) => Some((*value).to_string()),
        _ => None,
    }
}

/// Read a code cell: an absent column yields the default, an empty cell yields `None`
fn code_cell<T>(
    column: Option<&StringArray>,
    row: usize,
    map: impl Fn(i64) -> Option<T>,
    default: impl FnOnce() -> Option<T>,
) -> Option<T> {
    match column {
        Some(column) if column.is_valid(row) => parse_int(column.value(row)).and_then(map),
        Some(_) => None,
        None => default(),
    }
}

/// Map one raw person batch to the reference persons it contains, in row order
///
/// Rows without a household identifier cannot be joined and are skipped. When
/// the kinship column is absent every row is a candidate.
pub fn map_person_batch(raw: &RecordBatch, row_offset: usize) -> Result<Vec<RespondentRecord>> {
    let ids = first_string_column(raw, &PERSON_HOUSEHOLD_ID_COLUMNS);
    let parentage = string_column(raw, PARENTAGE_COLUMN);
    let nis = string_column(raw, NIS_COLUMN);
    let age = first_string_column(raw, &AGE_COLUMNS);
    let sex = string_column(raw, "cod_sexo_pessoa");
    let education = first_string_column(raw, &EDUCATION_COLUMNS);
    let employment = first_string_column(raw, &EMPLOYMENT_COLUMNS);
    let disability = string_column(raw, "cod_deficiencia_memb");

    let Some(ids) = ids else {
        debug!("Person batch has no household identifier column, skipping {} rows", raw.num_rows());
        return Ok(Vec::new());
    };

    let mut skipped = 0usize;
    let mut respondents = Vec::new();
    for row in 0..raw.num_rows() {
        let is_reference = parentage.is_none_or(|column| {
            column.is_valid(row)
                && parse_int(column.value(row)).is_some_and(codes::is_reference_person)
        });
        if !is_reference {
            continue;
        }

        let Some(household_id) = ids
            .is_valid(row)
            .then(|| clean_cell(ids.value(row)))
            .flatten()
        else {
            skipped += 1;
            continue;
        };

        respondents.push(RespondentRecord {
            household_id: household_id.to_string(),
            nis: nis
                .filter(|column| column.is_valid(row))
                .and_then(|column| codes::normalize_key(column.value(row))),
            age: code_cell(
                age,
                row,
                |years| i32::try_from(years).ok().filter(|years| *years >= 0),
                || int_default(columns::RESPONDENT_AGE),
            ),
            // Sex is categorical and never imputed downstream, so unknown codes
            // and blank cells take the default as well
            sex: code_cell(sex, row, |code| codes::sex_label(code).map(str::to_string), || None)
                .or_else(|| text_default(columns::RESPONDENT_SEX)),
            education_level: code_cell(education, row, codes::education_level, || {
                int_default(columns::EDUCATION_LEVEL)
            }),
            employment_status: code_cell(employment, row, codes::employment_status, || {
                int_default(columns::EMPLOYMENT_STATUS)
            }),
            has_disability: code_cell(disability, row, codes::disability, || {
                bool_default(columns::HAS_DISABILITY)
            }),
            source_row: row_offset + row,
        });
    }

    debug!(
        "Mapped {} reference persons from {} person rows ({} without household id)",
        respondents.len(),
        raw.num_rows(),
        skipped
    );
    Ok(respondents)
}
