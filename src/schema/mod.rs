//! Canonical household schema and schema compatibility checks.

pub mod canonical;
pub mod field;

pub use canonical::{
    UNKNOWN_MUNICIPALITY_CODE, canonical_field, canonical_schema, columns, known_column_type,
    scored_schema, storage_field,
};
pub use field::{DefaultValue, FieldDefinition, FieldType};

use arrow::datatypes::Schema;

/// A struct that represents the compatibility of a table with the canonical schema
#[derive(Debug)]
pub struct SchemaCompatibilityReport {
    /// Whether every canonical column is present with its canonical type
    pub compatible: bool,
    /// List of incompatibility issues, if any
    pub issues: Vec<SchemaIssue>,
}

/// A schema compatibility issue
#[derive(Debug)]
pub struct SchemaIssue {
    /// The column concerned
    pub column: String,
    /// Description of the incompatibility
    pub description: String,
}

/// Compare a table schema against the canonical household schema
///
/// Missing columns and type mismatches are reported; extra columns are allowed.
#[must_use]
pub fn check_canonical_compatibility(schema: &Schema) -> SchemaCompatibilityReport {
    let mut issues = Vec::new();

    for expected in canonical_schema().fields() {
        match schema.field_with_name(expected.name()) {
            Ok(actual) if actual.data_type() != expected.data_type() => issues.push(SchemaIssue {
                column: expected.name().clone(),
                description: format!(
                    "Field type mismatch for '{}': {:?} vs {:?}",
                    expected.name(),
                    actual.data_type(),
                    expected.data_type()
                ),
            }),
            Ok(_) => {}
            Err(_) => issues.push(SchemaIssue {
                column: expected.name().clone(),
                description: format!("Missing canonical column '{}'", expected.name()),
            }),
        }
    }

    SchemaCompatibilityReport {
        compatible: issues.is_empty(),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field};

    #[test]
    fn test_canonical_schema_is_compatible_with_itself() {
        let report = check_canonical_compatibility(&canonical_schema());
        assert!(report.compatible);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_reports_missing_and_mistyped_columns() {
        let schema = Schema::new(vec![
            Field::new(columns::HOUSEHOLD_ID, DataType::Utf8, true),
            Field::new(columns::HOUSEHOLD_SIZE, DataType::Utf8, true),
        ]);
        let report = check_canonical_compatibility(&schema);
        assert!(!report.compatible);
        assert!(
            report
                .issues
                .iter()
                .any(|issue| issue.column == columns::HOUSEHOLD_SIZE
                    && issue.description.contains("mismatch"))
        );
        assert!(
            report
                .issues
                .iter()
                .any(|issue| issue.column == columns::RESPONDENT_AGE)
        );
    }
}
