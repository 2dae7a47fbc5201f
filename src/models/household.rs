//! Typed household records
//!
//! A `HouseholdRecord` is one row of a fully scored household table. It is
//! used where rows are handled individually, such as explanation prompts and
//! assessments; bulk processing stays columnar.

use arrow::datatypes::FieldRef;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::algorithm::VulnerabilityTier;
use crate::error::{Result, VulnError};
use crate::schema::{columns, scored_schema};

/// One scored household
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdRecord {
    /// Household identifier
    pub household_id: String,
    /// IBGE municipality code, 0 when unknown
    pub municipality_code: i64,
    /// Age of the reference person
    pub respondent_age: i32,
    /// Sex of the reference person, if recorded
    pub respondent_sex: Option<String>,
    /// Education level (0..5)
    pub education_level: i32,
    /// Total household income
    pub household_income: f64,
    /// Number of people
    pub household_size: i32,
    /// Reference person has a disability
    pub has_disability: bool,
    /// Employment status
    pub employment_status: i32,
    /// Housing bucket
    pub housing_type: i32,
    /// Water from the distribution network
    pub has_water_access: bool,
    /// Sewage network or septic tank
    pub has_sewage_access: bool,
    /// Electric lighting
    pub has_electricity: bool,
    /// Refuse collection
    pub has_garbage_collection: bool,
    /// Receives Bolsa Família
    pub receives_cash_transfer: bool,
    /// Summed Bolsa Família instalments
    pub benefit_amount: f64,
    /// Income per person
    pub income_per_capita: f64,
    /// Respondent younger than 18 or older than 65
    pub age_vulnerability_flag: bool,
    /// Water and sewage access
    pub adequate_infrastructure_flag: bool,
    /// Education level at most 2
    pub low_education_flag: bool,
    /// Unemployed or informal
    pub precarious_employment_flag: bool,
    /// More than five people
    pub overcrowding_flag: bool,
    /// Weighted vulnerability score
    pub vulnerability_score: f64,
    /// Tier label
    pub vulnerability_tier: String,
}

impl HouseholdRecord {
    /// Parsed tier of this household
    ///
    /// # Errors
    /// Returns `ColumnType` when the stored label is not a tier label
    pub fn tier(&self) -> Result<VulnerabilityTier> {
        VulnerabilityTier::from_label(&self.vulnerability_tier)
            .ok_or_else(|| VulnError::column_type(columns::VULNERABILITY_TIER, "tier label"))
    }

    /// Read the records of a scored batch
    ///
    /// Columns are matched by name; extra columns are ignored.
    pub fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let schema = scored_schema();
        let indices = schema
            .fields()
            .iter()
            .map(|field| {
                batch
                    .schema()
                    .index_of(field.name())
                    .map_err(|_| VulnError::column_not_found(field.name()))
            })
            .collect::<Result<Vec<_>>>()?;
        let projected = batch.project(&indices)?;
        Ok(serde_arrow::from_record_batch(&projected)?)
    }

    /// Build a scored batch from records
    pub fn to_batch(records: &[Self]) -> Result<RecordBatch> {
        let fields: Vec<FieldRef> = scored_schema().fields().iter().cloned().collect();
        Ok(serde_arrow::to_record_batch(&fields, &records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::VulnerabilityPipeline;
    use crate::utils::synthetic::SyntheticHouseholds;

    #[test]
    fn test_records_from_scored_batch() {
        let batch = SyntheticHouseholds::new(11).generate(30).unwrap();
        let scored = VulnerabilityPipeline::default().process_batch(&batch).unwrap();

        let records = HouseholdRecord::from_batch(&scored).unwrap();
        assert_eq!(records.len(), 30);
        assert!(records.iter().all(|record| record.tier().is_ok()));
        assert!(records.iter().all(|record| record.household_size >= 1));

        let rebuilt = HouseholdRecord::to_batch(&records).unwrap();
        assert_eq!(rebuilt.schema(), scored_schema());
        assert_eq!(HouseholdRecord::from_batch(&rebuilt).unwrap(), records);
    }

    #[test]
    fn test_unscored_batch_is_rejected() {
        let batch = SyntheticHouseholds::new(11).generate(5).unwrap();
        assert!(matches!(
            HouseholdRecord::from_batch(&batch),
            Err(VulnError::ColumnNotFound { .. })
        ));
    }
}
