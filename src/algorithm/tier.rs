//! Tier classifier

use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, StringArray};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use log::debug;

use crate::error::{Result, VulnError};
use crate::schema::columns;
use crate::utils::arrow::{append_column, column_as_f64, ensure_no_nulls, has_column};

/// Upper bounds (inclusive) of Low, Medium and High
pub const TIER_CUT_POINTS: [f64; 3] = [-0.5, 0.0, 0.5];

/// Ordered vulnerability tiers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum VulnerabilityTier {
    /// Score in (-inf, -0.5]
    Low,
    /// Score in (-0.5, 0]
    Medium,
    /// Score in (0, 0.5]
    High,
    /// Score in (0.5, +inf)
    VeryHigh,
}

impl VulnerabilityTier {
    /// All tiers in ascending order
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::VeryHigh];

    /// Classify a score; `None` for NaN
    #[must_use]
    pub fn from_score(score: f64) -> Option<Self> {
        if score.is_nan() {
            return None;
        }
        let tier = if score <= TIER_CUT_POINTS[0] {
            Self::Low
        } else if score <= TIER_CUT_POINTS[1] {
            Self::Medium
        } else if score <= TIER_CUT_POINTS[2] {
            Self::High
        } else {
            Self::VeryHigh
        };
        Some(tier)
    }

    /// Label stored in output tables
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::VeryHigh => "VeryHigh",
        }
    }

    /// Portuguese label used in reports and explanations
    #[must_use]
    pub const fn localized_label(&self) -> &'static str {
        match self {
            Self::Low => "Baixa",
            Self::Medium => "Média",
            Self::High => "Alta",
            Self::VeryHigh => "Muito Alta",
        }
    }

    /// Ordinal code, 0 for Low to 3 for VeryHigh
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::VeryHigh => 3,
        }
    }

    /// Tier from its ordinal code
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Low),
            1 => Some(Self::Medium),
            2 => Some(Self::High),
            3 => Some(Self::VeryHigh),
            _ => None,
        }
    }

    /// Parse either the stored or the localized label
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|tier| tier.label() == label || tier.localized_label() == label)
    }
}

impl fmt::Display for VulnerabilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Append `vulnerability_tier` to a scored batch
///
/// A batch that already carries the tier is returned unchanged.
///
/// # Errors
/// * `NullValues` when the score column holds nulls
/// * `NonFiniteScore` for a NaN score
pub fn classify_batch(batch: &RecordBatch) -> Result<RecordBatch> {
    if has_column(batch, columns::VULNERABILITY_TIER) {
        debug!("'{}' already present, skipping", columns::VULNERABILITY_TIER);
        return Ok(batch.clone());
    }
    ensure_no_nulls(batch, columns::VULNERABILITY_SCORE)?;

    let scores = column_as_f64(batch, columns::VULNERABILITY_SCORE)?;
    let labels = scores
        .values()
        .iter()
        .enumerate()
        .map(|(row, score)| {
            VulnerabilityTier::from_score(*score)
                .map(|tier| tier.label())
                .ok_or(VulnError::NonFiniteScore { row })
        })
        .collect::<Result<Vec<_>>>()?;

    append_column(
        batch,
        Field::new(columns::VULNERABILITY_TIER, DataType::Utf8, true),
        Arc::new(StringArray::from(labels)),
    )
}

/// Tiers of a classified batch, in row order
pub fn batch_tiers(batch: &RecordBatch) -> Result<Vec<VulnerabilityTier>> {
    let labels = crate::utils::arrow::string_column(batch, columns::VULNERABILITY_TIER)
        .ok_or_else(|| VulnError::column_not_found(columns::VULNERABILITY_TIER))?;
    (0..labels.len())
        .map(|row| {
            labels
                .is_valid(row)
                .then(|| VulnerabilityTier::from_label(labels.value(row)))
                .flatten()
                .ok_or_else(|| VulnError::column_type(columns::VULNERABILITY_TIER, "tier label"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Float64Array};

    #[test]
    fn test_cut_points_are_right_closed() {
        let cases = [
            (-0.6, VulnerabilityTier::Low),
            (-0.5, VulnerabilityTier::Low),
            (-0.4, VulnerabilityTier::Medium),
            (0.0, VulnerabilityTier::Medium),
            (0.1, VulnerabilityTier::High),
            (0.5, VulnerabilityTier::High),
            (0.6, VulnerabilityTier::VeryHigh),
            (f64::INFINITY, VulnerabilityTier::VeryHigh),
            (f64::NEG_INFINITY, VulnerabilityTier::Low),
        ];
        for (score, expected) in cases {
            assert_eq!(VulnerabilityTier::from_score(score), Some(expected), "score {score}");
        }
        assert_eq!(VulnerabilityTier::from_score(f64::NAN), None);
    }

    #[test]
    fn test_labels_round_trip() {
        for tier in VulnerabilityTier::ALL {
            assert_eq!(VulnerabilityTier::from_label(tier.label()), Some(tier));
            assert_eq!(VulnerabilityTier::from_label(tier.localized_label()), Some(tier));
            assert_eq!(VulnerabilityTier::from_code(tier.code()), Some(tier));
        }
        assert_eq!(VulnerabilityTier::VeryHigh.localized_label(), "Muito Alta");
    }

    #[test]
    fn test_classify_batch() {
        let batch = RecordBatch::try_from_iter(vec![(
            columns::VULNERABILITY_SCORE,
            Arc::new(Float64Array::from(vec![-1.0, 0.85])) as ArrayRef,
        )])
        .unwrap();
        let classified = classify_batch(&batch).unwrap();
        assert_eq!(
            batch_tiers(&classified).unwrap(),
            vec![VulnerabilityTier::Low, VulnerabilityTier::VeryHigh]
        );
        assert_eq!(classify_batch(&classified).unwrap(), classified);
    }

    #[test]
    fn test_nan_score_is_rejected() {
        let batch = RecordBatch::try_from_iter(vec![(
            columns::VULNERABILITY_SCORE,
            Arc::new(Float64Array::from(vec![0.1, f64::NAN])) as ArrayRef,
        )])
        .unwrap();
        assert!(matches!(
            classify_batch(&batch),
            Err(VulnError::NonFiniteScore { row: 1 })
        ));
    }
}
