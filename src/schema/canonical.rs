//! The canonical household schema
//!
//! Every source layout is mapped onto these columns. Derived columns are
//! appended by the feature deriver, scorer and classifier.

use std::sync::{Arc, LazyLock};

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use super::field::{DefaultValue, FieldDefinition, FieldType};

/// Canonical and derived column names
pub mod columns {
    pub const HOUSEHOLD_ID: &str = "household_id";
    pub const MUNICIPALITY_CODE: &str = "municipality_code";
    pub const RESPONDENT_AGE: &str = "respondent_age";
    pub const RESPONDENT_SEX: &str = "respondent_sex";
    pub const EDUCATION_LEVEL: &str = "education_level";
    pub const HOUSEHOLD_INCOME: &str = "household_income";
    pub const HOUSEHOLD_SIZE: &str = "household_size";
    pub const HAS_DISABILITY: &str = "has_disability";
    pub const EMPLOYMENT_STATUS: &str = "employment_status";
    pub const HOUSING_TYPE: &str = "housing_type";
    pub const HAS_WATER_ACCESS: &str = "has_water_access";
    pub const HAS_SEWAGE_ACCESS: &str = "has_sewage_access";
    pub const HAS_ELECTRICITY: &str = "has_electricity";
    pub const HAS_GARBAGE_COLLECTION: &str = "has_garbage_collection";
    pub const RECEIVES_CASH_TRANSFER: &str = "receives_cash_transfer";
    pub const BENEFIT_AMOUNT: &str = "benefit_amount";

    pub const INCOME_PER_CAPITA: &str = "income_per_capita";
    pub const AGE_VULNERABILITY_FLAG: &str = "age_vulnerability_flag";
    pub const ADEQUATE_INFRASTRUCTURE_FLAG: &str = "adequate_infrastructure_flag";
    pub const LOW_EDUCATION_FLAG: &str = "low_education_flag";
    pub const PRECARIOUS_EMPLOYMENT_FLAG: &str = "precarious_employment_flag";
    pub const OVERCROWDING_FLAG: &str = "overcrowding_flag";
    pub const VULNERABILITY_SCORE: &str = "vulnerability_score";
    pub const VULNERABILITY_TIER: &str = "vulnerability_tier";
}

use columns::*;

/// Sentinel for "municipality unknown". IBGE codes are positive seven-digit numbers.
pub const UNKNOWN_MUNICIPALITY_CODE: i64 = 0;

/// Canonical field definitions, in column order
pub static CANONICAL_FIELDS: LazyLock<Vec<FieldDefinition>> = LazyLock::new(|| {
    vec![
        FieldDefinition::new(
            HOUSEHOLD_ID,
            "Household identifier within the source file",
            FieldType::Identifier,
        )
        .with_default(DefaultValue::RowOrdinal),
        FieldDefinition::new(MUNICIPALITY_CODE, "IBGE municipality code", FieldType::Code)
            .with_default(DefaultValue::Int(UNKNOWN_MUNICIPALITY_CODE)),
        FieldDefinition::new(
            RESPONDENT_AGE,
            "Age of the household reference person",
            FieldType::Integer,
        )
        .with_default(DefaultValue::Int(35)),
        // Women are the statistical majority of reference persons in the register
        FieldDefinition::new(RESPONDENT_SEX, "Sex of the reference person (M/F)", FieldType::Text)
            .with_default(DefaultValue::Text("F")),
        FieldDefinition::new(
            EDUCATION_LEVEL,
            "Education level, 0 (illiterate) to 5 (higher education)",
            FieldType::Integer,
        )
        .with_default(DefaultValue::Int(2)),
        FieldDefinition::new(HOUSEHOLD_INCOME, "Total household income", FieldType::Decimal)
            .with_default(DefaultValue::Float(0.0)),
        FieldDefinition::new(
            HOUSEHOLD_SIZE,
            "Number of people in the household",
            FieldType::Integer,
        )
        .with_default(DefaultValue::Int(1)),
        FieldDefinition::new(
            HAS_DISABILITY,
            "Reference person has a disability",
            FieldType::Boolean,
        )
        .with_default(DefaultValue::Bool(false)),
        FieldDefinition::new(
            EMPLOYMENT_STATUS,
            "0 unemployed, 1 informal, 2 formal, 3 retired",
            FieldType::Integer,
        )
        .with_default(DefaultValue::Int(0)),
        FieldDefinition::new(HOUSING_TYPE, "Housing quality bucket", FieldType::Integer)
            .with_default(DefaultValue::Int(1)),
        FieldDefinition::new(
            HAS_WATER_ACCESS,
            "Supplied by the general distribution network",
            FieldType::Boolean,
        )
        .with_default(DefaultValue::Bool(false)),
        FieldDefinition::new(
            HAS_SEWAGE_ACCESS,
            "Collection network or septic tank",
            FieldType::Boolean,
        )
        .with_default(DefaultValue::Bool(false)),
        FieldDefinition::new(HAS_ELECTRICITY, "Electric lighting", FieldType::Boolean)
            .with_default(DefaultValue::Bool(false)),
        FieldDefinition::new(
            HAS_GARBAGE_COLLECTION,
            "Refuse collected by a public service",
            FieldType::Boolean,
        )
        .with_default(DefaultValue::Bool(false)),
        FieldDefinition::new(
            RECEIVES_CASH_TRANSFER,
            "Household receives Bolsa Família",
            FieldType::Boolean,
        )
        .with_default(DefaultValue::Bool(false)),
        FieldDefinition::new(BENEFIT_AMOUNT, "Sum of Bolsa Família instalments", FieldType::Decimal)
            .with_default(DefaultValue::Float(0.0)),
    ]
});

/// Derived field definitions, in the order they are appended
pub static DERIVED_FIELD_DEFINITIONS: LazyLock<Vec<FieldDefinition>> = LazyLock::new(|| {
    vec![
        FieldDefinition::new(
            INCOME_PER_CAPITA,
            "household_income / max(household_size, 1)",
            FieldType::Decimal,
        ),
        FieldDefinition::new(
            AGE_VULNERABILITY_FLAG,
            "respondent_age < 18 or > 65",
            FieldType::Boolean,
        ),
        FieldDefinition::new(
            ADEQUATE_INFRASTRUCTURE_FLAG,
            "water and sewage access",
            FieldType::Boolean,
        ),
        FieldDefinition::new(LOW_EDUCATION_FLAG, "education_level <= 2", FieldType::Boolean),
        FieldDefinition::new(
            PRECARIOUS_EMPLOYMENT_FLAG,
            "employment_status <= 1",
            FieldType::Boolean,
        ),
        FieldDefinition::new(OVERCROWDING_FLAG, "household_size > 5", FieldType::Boolean),
        FieldDefinition::new(
            VULNERABILITY_SCORE,
            "Weighted vulnerability score",
            FieldType::Decimal,
        ),
        FieldDefinition::new(VULNERABILITY_TIER, "Low, Medium, High or VeryHigh", FieldType::Text),
    ]
});

static CANONICAL_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(
        CANONICAL_FIELDS
            .iter()
            .map(FieldDefinition::to_arrow_field)
            .collect::<Vec<_>>(),
    ))
});

static SCORED_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(
        CANONICAL_FIELDS
            .iter()
            .chain(DERIVED_FIELD_DEFINITIONS.iter())
            .map(FieldDefinition::to_arrow_field)
            .collect::<Vec<_>>(),
    ))
});

/// Schema of a mapped household table before derivation
#[must_use]
pub fn canonical_schema() -> SchemaRef {
    CANONICAL_SCHEMA.clone()
}

/// Schema of a fully scored household table
#[must_use]
pub fn scored_schema() -> SchemaRef {
    SCORED_SCHEMA.clone()
}

/// Look up a canonical field definition by name
#[must_use]
pub fn canonical_field(name: &str) -> Option<&'static FieldDefinition> {
    CANONICAL_FIELDS.iter().find(|field| field.name == name)
}

/// Arrow type of a known canonical or derived column
#[must_use]
pub fn known_column_type(name: &str) -> Option<DataType> {
    CANONICAL_FIELDS
        .iter()
        .chain(DERIVED_FIELD_DEFINITIONS.iter())
        .find(|field| field.name == name)
        .map(|field| field.field_type.to_arrow_type())
}

/// Arrow field for a column read back from storage: known columns get their
/// canonical type, anything else is kept as text
#[must_use]
pub fn storage_field(name: &str) -> Field {
    Field::new(
        name,
        known_column_type(name).unwrap_or(DataType::Utf8),
        true,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scored_schema_extends_canonical() {
        let canonical = canonical_schema();
        let scored = scored_schema();
        assert_eq!(scored.fields().len(), canonical.fields().len() + 8);
        for (a, b) in canonical.fields().iter().zip(scored.fields().iter()) {
            assert_eq!(a.name(), b.name());
        }
        assert_eq!(
            scored.field(scored.fields().len() - 1).name(),
            VULNERABILITY_TIER
        );
    }

    #[test]
    fn test_every_canonical_field_has_default() {
        assert!(CANONICAL_FIELDS.iter().all(|field| field.default.is_some()));
    }

    #[test]
    fn test_storage_field_types() {
        assert_eq!(storage_field(HAS_WATER_ACCESS).data_type(), &DataType::Boolean);
        assert_eq!(storage_field(MUNICIPALITY_CODE).data_type(), &DataType::Int64);
        assert_eq!(storage_field("extra_column").data_type(), &DataType::Utf8);
    }
}
