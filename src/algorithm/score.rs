//! Vulnerability scorer
//!
//! The score is a fixed weighted sum of the derived flags and the z-score of
//! per-capita income. The z-score is relative to the statistics it is computed
//! with: per batch by default, so the same household can score differently
//! next to a different population. Global or persisted reference statistics
//! remove that dependence.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, Float64Array};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use log::{debug, warn};

use crate::error::{Result, VulnError};
use crate::schema::columns;
use crate::utils::arrow::{
    append_column, column_as_bool, column_as_f64, ensure_no_nulls, has_column,
};

/// Score weights. Not configurable: models are trained against them.
pub mod weights {
    /// Per-capita income z-score
    pub const INCOME_PER_CAPITA_Z: f64 = -0.30;
    /// Respondent younger than 18 or older than 65
    pub const AGE_VULNERABILITY: f64 = 0.20;
    /// Water and sewage access
    pub const ADEQUATE_INFRASTRUCTURE: f64 = -0.15;
    /// Education level at most 2
    pub const LOW_EDUCATION: f64 = 0.15;
    /// Unemployed or informal
    pub const PRECARIOUS_EMPLOYMENT: f64 = 0.20;
    /// More than five people
    pub const OVERCROWDING: f64 = 0.10;
    /// Respondent has a disability
    pub const DISABILITY: f64 = 0.10;
}

/// Columns the scorer reads
pub const SCORE_INPUT_COLUMNS: [&str; 7] = [
    columns::INCOME_PER_CAPITA,
    columns::AGE_VULNERABILITY_FLAG,
    columns::ADEQUATE_INFRASTRUCTURE_FLAG,
    columns::LOW_EDUCATION_FLAG,
    columns::PRECARIOUS_EMPLOYMENT_FLAG,
    columns::OVERCROWDING_FLAG,
    columns::HAS_DISABILITY,
];

/// Mean and sample standard deviation of per-capita income
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormalizationStats {
    /// Mean
    pub mean: f64,
    /// Sample standard deviation (n - 1)
    pub std_dev: f64,
    /// Number of observations
    pub count: usize,
}

impl NormalizationStats {
    /// Fixed reference statistics, e.g. persisted from an earlier run
    #[must_use]
    pub const fn reference(mean: f64, std_dev: f64, count: usize) -> Self {
        Self {
            mean,
            std_dev,
            count,
        }
    }

    /// Statistics of a slice of values
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        let mut accumulator = StatsAccumulator::default();
        values.iter().for_each(|value| accumulator.push(*value));
        accumulator.finish()
    }

    /// Whether a z-score cannot be formed from these statistics
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.count < 2 || !self.std_dev.is_finite() || self.std_dev <= 0.0 || !self.mean.is_finite()
    }

    /// Z-score of `value`
    #[must_use]
    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.std_dev
    }
}

/// Streaming mean/variance accumulator (Welford)
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsAccumulator {
    count: usize,
    mean: f64,
    m2: f64,
}

impl StatsAccumulator {
    /// Add one observation
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Add every non-null value of a column
    pub fn push_array(&mut self, values: &Float64Array) {
        values.iter().flatten().for_each(|value| self.push(value));
    }

    /// Observations seen so far
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Final statistics; the standard deviation is 0 below two observations
    #[must_use]
    pub fn finish(&self) -> NormalizationStats {
        let std_dev = if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        };
        NormalizationStats {
            mean: self.mean,
            std_dev,
            count: self.count,
        }
    }
}

/// What to do when per-capita income has no usable variance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum DegenerateVariancePolicy {
    /// Fail with `DivisionDegenerate`
    #[default]
    Error,
    /// Use a z-score of 0 for every household
    ClampToZero,
}

impl DegenerateVariancePolicy {
    /// Convert `DegenerateVariancePolicy` to static string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::ClampToZero => "clamp",
        }
    }
}

impl FromStr for DegenerateVariancePolicy {
    type Err = VulnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "clamp" | "clamp_to_zero" | "zero" => Ok(Self::ClampToZero),
            other => Err(VulnError::InvalidConfig(format!(
                "unknown degenerate-variance policy '{other}' (expected error or clamp)"
            ))),
        }
    }
}

/// Where income normalization statistics come from
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub enum NormalizationStrategy {
    /// Statistics of each processed batch. Chunked and whole-file runs may
    /// tier borderline households differently.
    #[default]
    PerBatch,
    /// Statistics of the whole input, computed in a first pass
    Global,
    /// Fixed statistics supplied by the caller
    Reference(NormalizationStats),
}

impl NormalizationStrategy {
    /// Short name used in logs and configuration
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PerBatch => "batch",
            Self::Global => "global",
            Self::Reference(_) => "reference",
        }
    }
}

impl fmt::Display for NormalizationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference(stats) => {
                write!(f, "reference(mean={}, sd={})", stats.mean, stats.std_dev)
            }
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for NormalizationStrategy {
    type Err = VulnError;

    /// Parses `batch`, `global` or `reference:<mean>:<std_dev>`
    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim().to_lowercase();
        match value.as_str() {
            "batch" | "per_batch" => return Ok(Self::PerBatch),
            "global" => return Ok(Self::Global),
            _ => {}
        }

        let invalid = || VulnError::InvalidConfig(format!("invalid normalization strategy '{s}'"));
        let mut parts = value.split(':');
        if parts.next() != Some("reference") {
            return Err(invalid());
        }
        let mean = parts.next().and_then(|part| part.parse::<f64>().ok()).ok_or_else(invalid)?;
        let std_dev = parts.next().and_then(|part| part.parse::<f64>().ok()).ok_or_else(invalid)?;
        Ok(Self::Reference(NormalizationStats::reference(mean, std_dev, usize::MAX)))
    }
}

/// Scoring inputs of one household
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreInputs {
    /// Per-capita income z-score
    pub income_per_capita_z: f64,
    /// Age vulnerability flag
    pub age_vulnerability: bool,
    /// Adequate infrastructure flag
    pub adequate_infrastructure: bool,
    /// Low education flag
    pub low_education: bool,
    /// Precarious employment flag
    pub precarious_employment: bool,
    /// Overcrowding flag
    pub overcrowding: bool,
    /// Disability
    pub has_disability: bool,
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

/// Weighted vulnerability score; unbounded
#[must_use]
pub fn weighted_score(inputs: &ScoreInputs) -> f64 {
    weights::INCOME_PER_CAPITA_Z * inputs.income_per_capita_z
        + weights::AGE_VULNERABILITY * flag(inputs.age_vulnerability)
        + weights::ADEQUATE_INFRASTRUCTURE * flag(inputs.adequate_infrastructure)
        + weights::LOW_EDUCATION * flag(inputs.low_education)
        + weights::PRECARIOUS_EMPLOYMENT * flag(inputs.precarious_employment)
        + weights::OVERCROWDING * flag(inputs.overcrowding)
        + weights::DISABILITY * flag(inputs.has_disability)
}

/// Append `vulnerability_score` to a derived batch
///
/// With `stats` set the z-score uses them; otherwise the batch's own mean and
/// sample standard deviation. A batch that already carries the score is
/// returned unchanged.
///
/// # Errors
/// * `NullValues` when an input column holds nulls
/// * `DivisionDegenerate` when the statistics have no usable variance and the
///   policy is [`DegenerateVariancePolicy::Error`]
pub fn score_batch(
    batch: &RecordBatch,
    stats: Option<&NormalizationStats>,
    degenerate: DegenerateVariancePolicy,
) -> Result<RecordBatch> {
    if has_column(batch, columns::VULNERABILITY_SCORE) {
        debug!("'{}' already present, skipping", columns::VULNERABILITY_SCORE);
        return Ok(batch.clone());
    }
    for column in SCORE_INPUT_COLUMNS {
        ensure_no_nulls(batch, column)?;
    }

    let income = column_as_f64(batch, columns::INCOME_PER_CAPITA)?;
    let stats = stats
        .copied()
        .unwrap_or_else(|| NormalizationStats::from_values(income.values()));

    let clamp = batch.num_rows() > 0 && stats.is_degenerate();
    if clamp {
        match degenerate {
            DegenerateVariancePolicy::Error => {
                return Err(VulnError::DivisionDegenerate {
                    column: columns::INCOME_PER_CAPITA.to_string(),
                    rows: batch.num_rows(),
                });
            }
            DegenerateVariancePolicy::ClampToZero => warn!(
                "No usable variance in '{}' over {} rows (sd={}), using z = 0",
                columns::INCOME_PER_CAPITA,
                stats.count,
                stats.std_dev
            ),
        }
    }

    let age = column_as_bool(batch, columns::AGE_VULNERABILITY_FLAG)?;
    let infrastructure = column_as_bool(batch, columns::ADEQUATE_INFRASTRUCTURE_FLAG)?;
    let education = column_as_bool(batch, columns::LOW_EDUCATION_FLAG)?;
    let employment = column_as_bool(batch, columns::PRECARIOUS_EMPLOYMENT_FLAG)?;
    let overcrowding = column_as_bool(batch, columns::OVERCROWDING_FLAG)?;
    let disability = column_as_bool(batch, columns::HAS_DISABILITY)?;

    let scores: Float64Array = (0..batch.num_rows())
        .map(|row| {
            let inputs = ScoreInputs {
                income_per_capita_z: if clamp { 0.0 } else { stats.z_score(income.value(row)) },
                age_vulnerability: age.value(row),
                adequate_infrastructure: infrastructure.value(row),
                low_education: education.value(row),
                precarious_employment: employment.value(row),
                overcrowding: overcrowding.value(row),
                has_disability: disability.value(row),
            };
            weighted_score(&inputs)
        })
        .collect();

    debug!(
        "Scored {} households (income mean={:.2}, sd={:.2})",
        scores.len(),
        stats.mean,
        stats.std_dev
    );
    append_column(
        batch,
        Field::new(columns::VULNERABILITY_SCORE, DataType::Float64, true),
        Arc::new(scores),
    )
}
