//! Household joins
//!
//! A household takes its respondent attributes from exactly one reference
//! person. Benefit payments are linked through the respondent's NIS.

use std::collections::hash_map::Entry;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, BooleanArray, Float64Array, Int32Array, StringArray};
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;
use log::{debug, warn};
use rustc_hash::FxHashMap;

use super::benefit::BenefitPayment;
use super::codes::normalize_key;
use super::person::RespondentRecord;
use crate::error::{Result, VulnError};
use crate::schema::columns;
use crate::utils::arrow::{column_as_bool, column_as_f64, replace_column, string_column};

/// Policy applied when several persons claim to be the reference person of
/// the same household
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum ReferenceTieBreak {
    /// Keep the first reference person in file order
    #[default]
    FirstByOrder,
    /// Fail the load on the first duplicate
    ErrorOnDuplicate,
    /// Keep the first reference person and report every duplicate with the
    /// fields on which they disagree
    MergeWithConflictReport,
}

impl ReferenceTieBreak {
    /// Convert `ReferenceTieBreak` to static string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FirstByOrder => "first",
            Self::ErrorOnDuplicate => "error",
            Self::MergeWithConflictReport => "merge",
        }
    }
}

impl FromStr for ReferenceTieBreak {
    type Err = VulnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "first" | "first_by_order" => Ok(Self::FirstByOrder),
            "error" | "error_on_duplicate" => Ok(Self::ErrorOnDuplicate),
            "merge" | "merge_with_conflict_report" => Ok(Self::MergeWithConflictReport),
            other => Err(VulnError::InvalidConfig(format!(
                "unknown reference tie-break '{other}' (expected first, error or merge)"
            ))),
        }
    }
}

/// Duplicate reference persons found for one household
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DuplicateReference {
    /// Household identifier of the first reference person
    pub household_id: String,
    /// Number of reference-person rows seen for the household
    pub count: usize,
    /// Respondent fields on which the duplicates disagree with the kept record
    pub conflicting_fields: Vec<&'static str>,
}

/// Reference persons keyed by normalized household identifier
#[derive(Debug, Default)]
pub struct ReferencePersonIndex {
    tie_break: ReferenceTieBreak,
    respondents: FxHashMap<String, RespondentRecord>,
    conflicts: FxHashMap<String, DuplicateReference>,
    duplicate_rows: usize,
}

impl ReferencePersonIndex {
    /// Create an empty index applying `tie_break` to duplicates
    #[must_use]
    pub fn new(tie_break: ReferenceTieBreak) -> Self {
        Self {
            tie_break,
            ..Self::default()
        }
    }

    /// Build an index from respondents in file order
    pub fn build(
        respondents: impl IntoIterator<Item = RespondentRecord>,
        tie_break: ReferenceTieBreak,
    ) -> Result<Self> {
        let mut index = Self::new(tie_break);
        index.extend(respondents)?;
        Ok(index)
    }

    /// Add respondents in file order
    pub fn extend(
        &mut self,
        respondents: impl IntoIterator<Item = RespondentRecord>,
    ) -> Result<()> {
        respondents
            .into_iter()
            .try_for_each(|respondent| self.insert(respondent))
    }

    /// Add one respondent, applying the tie-break policy if its household
    /// already has a reference person
    pub fn insert(&mut self, respondent: RespondentRecord) -> Result<()> {
        let Some(key) = normalize_key(&respondent.household_id) else {
            return Ok(());
        };

        match self.respondents.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(respondent);
            }
            Entry::Occupied(entry) => {
                self.duplicate_rows += 1;
                match self.tie_break {
                    ReferenceTieBreak::FirstByOrder => {
                        debug!(
                            "Household {}: extra reference person at row {}, keeping the first",
                            respondent.household_id, respondent.source_row
                        );
                    }
                    ReferenceTieBreak::ErrorOnDuplicate => {
                        return Err(VulnError::DuplicateReferencePerson {
                            household_id: respondent.household_id,
                            count: 2,
                        });
                    }
                    ReferenceTieBreak::MergeWithConflictReport => {
                        let kept = entry.get();
                        let report = self
                            .conflicts
                            .entry(entry.key().clone())
                            .or_insert_with(|| DuplicateReference {
                                household_id: kept.household_id.clone(),
                                count: 1,
                                conflicting_fields: Vec::new(),
                            });
                        report.count += 1;
                        for field in kept.conflicting_fields(&respondent) {
                            if !report.conflicting_fields.contains(&field) {
                                report.conflicting_fields.push(field);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Look up the reference person of a household
    #[must_use]
    pub fn get(&self, household_id: &str) -> Option<&RespondentRecord> {
        normalize_key(household_id).and_then(|key| self.respondents.get(&key))
    }

    /// Number of households with a reference person
    #[must_use]
    pub fn len(&self) -> usize {
        self.respondents.len()
    }

    /// Whether the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.respondents.is_empty()
    }

    /// Number of reference-person rows that lost the tie-break
    #[must_use]
    pub const fn duplicate_rows(&self) -> usize {
        self.duplicate_rows
    }

    /// Conflict reports, sorted by household identifier
    ///
    /// Only filled under [`ReferenceTieBreak::MergeWithConflictReport`].
    #[must_use]
    pub fn duplicate_reports(&self) -> Vec<DuplicateReference> {
        let mut reports: Vec<_> = self.conflicts.values().cloned().collect();
        reports.sort_by(|a, b| a.household_id.cmp(&b.household_id));
        reports
    }
}

/// Benefit totals for one recipient
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BenefitTotal {
    /// Sum of the parseable instalments
    pub amount: f64,
    /// Number of instalments
    pub payments: usize,
}

/// Benefit payments summed per normalized NIS
#[derive(Debug, Default)]
pub struct BenefitIndex {
    totals: FxHashMap<String, BenefitTotal>,
}

impl BenefitIndex {
    /// Build an index from payments
    #[must_use]
    pub fn build(payments: impl IntoIterator<Item = BenefitPayment>) -> Self {
        let mut index = Self::default();
        index.extend(payments);
        index
    }

    /// Add payments
    pub fn extend(&mut self, payments: impl IntoIterator<Item = BenefitPayment>) {
        for payment in payments {
            let total = self.totals.entry(payment.nis).or_default();
            total.amount += payment.amount.unwrap_or(0.0);
            total.payments += 1;
        }
    }

    /// Totals paid to a recipient
    #[must_use]
    pub fn get(&self, nis: &str) -> Option<&BenefitTotal> {
        self.totals.get(nis)
    }

    /// Number of distinct recipients
    #[must_use]
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    /// Whether the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

/// Row counts of one join
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct JoinReport {
    /// Family rows entering the join
    pub households_in: usize,
    /// Households matched to a reference person
    pub households_joined: usize,
    /// Households dropped for lack of a reference person
    pub households_without_reference: usize,
    /// Joined households whose respondent received benefit payments
    pub benefit_matches: usize,
}

impl JoinReport {
    /// Accumulate another chunk's counts
    pub fn merge(&mut self, other: &Self) {
        self.households_in += other.households_in;
        self.households_joined += other.households_joined;
        self.households_without_reference += other.households_without_reference;
        self.benefit_matches += other.benefit_matches;
    }
}

/// Inner join of a canonical family batch with its reference persons
///
/// Respondent columns are replaced by the reference person's attributes; a
/// null attribute stays null for the missing-value policy. When `benefits` is
/// given, households whose respondent NIS received payments are marked as
/// cash-transfer recipients with the summed amount.
pub fn join_households(
    family: &RecordBatch,
    persons: &ReferencePersonIndex,
    benefits: Option<&BenefitIndex>,
) -> Result<(RecordBatch, JoinReport)> {
    let ids = string_column(family, columns::HOUSEHOLD_ID)
        .ok_or_else(|| VulnError::column_not_found(columns::HOUSEHOLD_ID))?;

    let mut matched: Vec<&RespondentRecord> = Vec::with_capacity(family.num_rows());
    let mask: BooleanArray = (0..family.num_rows())
        .map(|row| {
            let respondent = ids
                .is_valid(row)
                .then(|| persons.get(ids.value(row)))
                .flatten();
            if let Some(respondent) = respondent {
                matched.push(respondent);
            }
            Some(respondent.is_some())
        })
        .collect();

    let mut joined = filter_record_batch(family, &mask)?;
    joined = replace_column(
        &joined,
        columns::RESPONDENT_AGE,
        Arc::new(matched.iter().map(|r| r.age).collect::<Int32Array>()),
    )?;
    joined = replace_column(
        &joined,
        columns::RESPONDENT_SEX,
        Arc::new(matched.iter().map(|r| r.sex.as_deref()).collect::<StringArray>()),
    )?;
    joined = replace_column(
        &joined,
        columns::EDUCATION_LEVEL,
        Arc::new(matched.iter().map(|r| r.education_level).collect::<Int32Array>()),
    )?;
    joined = replace_column(
        &joined,
        columns::EMPLOYMENT_STATUS,
        Arc::new(matched.iter().map(|r| r.employment_status).collect::<Int32Array>()),
    )?;
    joined = replace_column(
        &joined,
        columns::HAS_DISABILITY,
        Arc::new(matched.iter().map(|r| r.has_disability).collect::<BooleanArray>()),
    )?;

    let mut report = JoinReport {
        households_in: family.num_rows(),
        households_joined: joined.num_rows(),
        households_without_reference: family.num_rows() - joined.num_rows(),
        benefit_matches: 0,
    };

    if let Some(benefits) = benefits {
        let (batch, matches) = apply_benefits(&joined, &matched, benefits)?;
        joined = batch;
        report.benefit_matches = matches;
    }

    if report.households_without_reference > 0 {
        warn!(
            "{} of {} households have no reference person and were dropped",
            report.households_without_reference, report.households_in
        );
    }
    Ok((joined, report))
}

fn apply_benefits(
    joined: &RecordBatch,
    respondents: &[&RespondentRecord],
    benefits: &BenefitIndex,
) -> Result<(RecordBatch, usize)> {
    let transfer = column_as_bool(joined, columns::RECEIVES_CASH_TRANSFER)?;
    let amount = column_as_f64(joined, columns::BENEFIT_AMOUNT)?;

    let mut matches = 0usize;
    let (flags, amounts): (Vec<Option<bool>>, Vec<Option<f64>>) = respondents
        .iter()
        .enumerate()
        .map(|(row, respondent)| {
            match respondent.nis.as_deref().and_then(|nis| benefits.get(nis)) {
                Some(total) => {
                    matches += 1;
                    (Some(true), Some(total.amount))
                }
                None => (
                    transfer.is_valid(row).then(|| transfer.value(row)),
                    amount.is_valid(row).then(|| amount.value(row)),
                ),
            }
        })
        .unzip();

    let batch = replace_column(
        joined,
        columns::RECEIVES_CASH_TRANSFER,
        Arc::new(BooleanArray::from(flags)),
    )?;
    let batch = replace_column(
        &batch,
        columns::BENEFIT_AMOUNT,
        Arc::new(Float64Array::from(amounts)),
    )?;
    debug!("Linked benefit payments to {matches} households");
    Ok((batch, matches))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn respondent(household_id: &str, age: i32, row: usize) -> RespondentRecord {
        RespondentRecord {
            household_id: household_id.to_string(),
            nis: Some(format!("9{row}")),
            age: Some(age),
            sex: Some("F".to_string()),
            education_level: Some(2),
            employment_status: Some(0),
            has_disability: Some(false),
            source_row: row,
        }
    }

    #[test]
    fn test_first_by_order_keeps_first() {
        let index = ReferencePersonIndex::build(
            vec![respondent("7", 40, 0), respondent("007", 50, 1)],
            ReferenceTieBreak::FirstByOrder,
        )
        .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("7").unwrap().age, Some(40));
        assert_eq!(index.duplicate_rows(), 1);
        assert!(index.duplicate_reports().is_empty());
    }

    #[test]
    fn test_error_on_duplicate() {
        let err = ReferencePersonIndex::build(
            vec![respondent("7", 40, 0), respondent("7", 50, 1)],
            ReferenceTieBreak::ErrorOnDuplicate,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            VulnError::DuplicateReferencePerson { count: 2, .. }
        ));
    }

    #[test]
    fn test_merge_reports_conflicts() {
        let index = ReferencePersonIndex::build(
            vec![
                respondent("7", 40, 0),
                respondent("7", 50, 1),
                respondent("7", 40, 2),
            ],
            ReferenceTieBreak::MergeWithConflictReport,
        )
        .unwrap();
        let reports = index.duplicate_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].count, 3);
        assert_eq!(reports[0].conflicting_fields, vec![columns::RESPONDENT_AGE]);
        assert_eq!(index.get("7").unwrap().age, Some(40));
    }

    #[test]
    fn test_tie_break_parsing() {
        assert_eq!(
            "merge".parse::<ReferenceTieBreak>().unwrap(),
            ReferenceTieBreak::MergeWithConflictReport
        );
        assert!("random".parse::<ReferenceTieBreak>().is_err());
    }

    #[test]
    fn test_benefit_index_sums_instalments() {
        let index = BenefitIndex::build(vec![
            BenefitPayment {
                nis: "1".to_string(),
                amount: Some(100.0),
            },
            BenefitPayment {
                nis: "1".to_string(),
                amount: None,
            },
            BenefitPayment {
                nis: "1".to_string(),
                amount: Some(50.5),
            },
        ]);
        let total = index.get("1").unwrap();
        assert_eq!(total.payments, 3);
        assert!((total.amount - 150.5).abs() < 1e-9);
    }
}
