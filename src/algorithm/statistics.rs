//! Household statistics and summaries
//!
//! This module aggregates classified household batches into a summary of the
//! tier distribution, income and cash-transfer coverage, overall and per
//! municipality.

use std::collections::BTreeMap;

use arrow::array::{Array, Float64Array, Int64Array};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use rustc_hash::FxHashMap;

use super::tier::{VulnerabilityTier, batch_tiers};
use crate::error::Result;
use crate::registry::municipality_name;
use crate::schema::{UNKNOWN_MUNICIPALITY_CODE, columns};
use crate::utils::arrow::{column_as_bool, column_as_f64, column_as_i64, has_column};

/// Aggregates of one municipality
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MunicipalitySummary {
    /// IBGE code
    pub code: i64,
    /// Display name
    pub name: String,
    /// Number of households
    pub households: usize,
    /// Mean vulnerability score
    pub mean_score: f64,
    /// Most frequent tier; ties resolve to the more vulnerable tier
    pub dominant_tier: VulnerabilityTier,
}

/// Summary of a set of classified households
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchSummary {
    /// Time the summary was produced
    pub generated_at: DateTime<Utc>,
    /// Number of households
    pub total_households: usize,
    /// Households per tier
    pub tier_counts: BTreeMap<VulnerabilityTier, usize>,
    /// Mean per-capita income
    pub mean_income_per_capita: f64,
    /// Share of households receiving a cash transfer (0..1)
    pub cash_transfer_share: f64,
    /// Municipalities ordered by household count, largest first
    pub municipalities: Vec<MunicipalitySummary>,
}

#[derive(Debug, Default, Clone)]
struct MunicipalityAccumulator {
    households: usize,
    score_sum: f64,
    tiers: [usize; 4],
}

/// Incremental builder for [`BatchSummary`]
#[derive(Debug, Default)]
pub struct SummaryAccumulator {
    households: usize,
    tiers: [usize; 4],
    income_sum: f64,
    transfers: usize,
    municipalities: FxHashMap<i64, MunicipalityAccumulator>,
}

impl SummaryAccumulator {
    /// Add a classified batch
    ///
    /// # Errors
    /// Returns an error when the batch lacks the score, tier or per-capita income
    pub fn add_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let tiers = batch_tiers(batch)?;
        let scores = column_as_f64(batch, columns::VULNERABILITY_SCORE)?;
        let income = column_as_f64(batch, columns::INCOME_PER_CAPITA)?;
        let transfers = if has_column(batch, columns::RECEIVES_CASH_TRANSFER) {
            Some(column_as_bool(batch, columns::RECEIVES_CASH_TRANSFER)?)
        } else {
            None
        };
        let municipalities: Int64Array = if has_column(batch, columns::MUNICIPALITY_CODE) {
            column_as_i64(batch, columns::MUNICIPALITY_CODE)?
        } else {
            Int64Array::from(vec![UNKNOWN_MUNICIPALITY_CODE; batch.num_rows()])
        };

        for (row, tier) in tiers.iter().enumerate() {
            let code = usize::from(tier.code());
            self.households += 1;
            self.tiers[code] += 1;
            self.income_sum += value_or_zero(&income, row);
            if transfers
                .as_ref()
                .is_some_and(|flags| flags.is_valid(row) && flags.value(row))
            {
                self.transfers += 1;
            }

            let municipality = if municipalities.is_valid(row) {
                municipalities.value(row)
            } else {
                UNKNOWN_MUNICIPALITY_CODE
            };
            let entry = self.municipalities.entry(municipality).or_default();
            entry.households += 1;
            entry.score_sum += value_or_zero(&scores, row);
            entry.tiers[code] += 1;
        }
        Ok(())
    }

    /// Households added so far
    #[must_use]
    pub const fn households(&self) -> usize {
        self.households
    }

    /// Build the summary
    #[must_use]
    pub fn finish(&self) -> BatchSummary {
        let share = |count: usize| {
            if self.households == 0 {
                0.0
            } else {
                count as f64 / self.households as f64
            }
        };

        let municipalities = self
            .municipalities
            .iter()
            .map(|(code, acc)| MunicipalitySummary {
                code: *code,
                name: municipality_name(*code),
                households: acc.households,
                mean_score: acc.score_sum / acc.households.max(1) as f64,
                dominant_tier: dominant_tier(&acc.tiers),
            })
            .sorted_by(|a, b| b.households.cmp(&a.households).then(a.code.cmp(&b.code)))
            .collect();

        BatchSummary {
            generated_at: Utc::now(),
            total_households: self.households,
            tier_counts: VulnerabilityTier::ALL
                .into_iter()
                .map(|tier| (tier, self.tiers[usize::from(tier.code())]))
                .collect(),
            mean_income_per_capita: if self.households == 0 {
                0.0
            } else {
                self.income_sum / self.households as f64
            },
            cash_transfer_share: share(self.transfers),
            municipalities,
        }
    }
}

fn value_or_zero(values: &Float64Array, row: usize) -> f64 {
    if values.is_valid(row) { values.value(row) } else { 0.0 }
}

fn dominant_tier(counts: &[usize; 4]) -> VulnerabilityTier {
    VulnerabilityTier::ALL
        .into_iter()
        .max_by_key(|tier| counts[usize::from(tier.code())])
        .unwrap_or(VulnerabilityTier::Low)
}

impl BatchSummary {
    /// Summarize classified batches
    pub fn from_batches(batches: &[RecordBatch]) -> Result<Self> {
        let mut accumulator = SummaryAccumulator::default();
        for batch in batches {
            accumulator.add_batch(batch)?;
        }
        Ok(accumulator.finish())
    }

    /// Share of households in `tier` (0..1)
    #[must_use]
    pub fn tier_share(&self, tier: VulnerabilityTier) -> f64 {
        if self.total_households == 0 {
            return 0.0;
        }
        self.tier_counts.get(&tier).copied().unwrap_or(0) as f64 / self.total_households as f64
    }

    /// Render a text report, listing at most `max_municipalities` municipalities
    #[must_use]
    pub fn render(&self, max_municipalities: usize) -> String {
        let mut summary = String::new();
        summary.push_str("Household Vulnerability Summary:\n");
        summary.push_str(&format!(
            "  Generated: {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        summary.push_str(&format!("  Total Households: {}\n", self.total_households));
        summary.push_str(&format!(
            "  Mean Per-Capita Income: R$ {:.2}\n",
            self.mean_income_per_capita
        ));
        summary.push_str(&format!(
            "  Receiving Cash Transfer: {:.1}%\n",
            self.cash_transfer_share * 100.0
        ));

        summary.push_str("\nDistribution by Tier:\n");
        for tier in VulnerabilityTier::ALL {
            let count = self.tier_counts.get(&tier).copied().unwrap_or(0);
            summary.push_str(&format!(
                "    {} ({}): {count} ({:.1}%)\n",
                tier.label(),
                tier.localized_label(),
                self.tier_share(tier) * 100.0
            ));
        }

        if !self.municipalities.is_empty() {
            summary.push_str("\nMunicipalities:\n");
            for municipality in self.municipalities.iter().take(max_municipalities) {
                summary.push_str(&format!(
                    "    {}: {} households, mean score {:.3}, dominant tier {}\n",
                    municipality.name,
                    municipality.households,
                    municipality.mean_score,
                    municipality.dominant_tier.localized_label()
                ));
            }
            if self.municipalities.len() > max_municipalities {
                summary.push_str(&format!(
                    "    ... and {} more\n",
                    self.municipalities.len() - max_municipalities
                ));
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{ArrayRef, BooleanArray, StringArray};

    fn classified() -> RecordBatch {
        RecordBatch::try_from_iter(vec![
            (
                columns::MUNICIPALITY_CODE,
                Arc::new(Int64Array::from(vec![2304400, 2304400, 3550308, 0])) as ArrayRef,
            ),
            (
                columns::INCOME_PER_CAPITA,
                Arc::new(Float64Array::from(vec![100.0, 200.0, 300.0, 400.0])) as ArrayRef,
            ),
            (
                columns::RECEIVES_CASH_TRANSFER,
                Arc::new(BooleanArray::from(vec![true, true, false, false])) as ArrayRef,
            ),
            (
                columns::VULNERABILITY_SCORE,
                Arc::new(Float64Array::from(vec![0.8, 0.6, -0.2, -0.9])) as ArrayRef,
            ),
            (
                columns::VULNERABILITY_TIER,
                Arc::new(StringArray::from(vec![
                    "VeryHigh", "VeryHigh", "Medium", "Low",
                ])) as ArrayRef,
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_summary_counts() {
        let summary = BatchSummary::from_batches(&[classified()]).unwrap();
        assert_eq!(summary.total_households, 4);
        assert_eq!(summary.tier_counts[&VulnerabilityTier::VeryHigh], 2);
        assert_eq!(summary.tier_counts[&VulnerabilityTier::High], 0);
        assert!((summary.mean_income_per_capita - 250.0).abs() < 1e-9);
        assert!((summary.cash_transfer_share - 0.5).abs() < 1e-9);

        let fortaleza = &summary.municipalities[0];
        assert_eq!(fortaleza.name, "Fortaleza/CE");
        assert_eq!(fortaleza.households, 2);
        assert_eq!(fortaleza.dominant_tier, VulnerabilityTier::VeryHigh);
        assert!((fortaleza.mean_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_render_mentions_tiers_and_municipalities() {
        let summary = BatchSummary::from_batches(&[classified()]).unwrap();
        let text = summary.render(2);
        assert!(text.contains("Total Households: 4"));
        assert!(text.contains("VeryHigh (Muito Alta): 2 (50.0%)"));
        assert!(text.contains("Fortaleza/CE"));
        assert!(text.contains("... and 1 more"));
    }

    #[test]
    fn test_dominant_tier_prefers_more_vulnerable_on_ties() {
        assert_eq!(dominant_tier(&[1, 0, 1, 0]), VulnerabilityTier::High);
    }
}
