//! Household vulnerability algorithms
//!
//! This module contains the per-batch transformations of the pipeline, in the
//! order they run: missing-value treatment, feature derivation, scoring and
//! tier classification. It also holds the model feature projection and the
//! summary statistics computed over classified households.

pub mod derive;
pub mod features;
pub mod missing;
pub mod score;
pub mod statistics;
pub mod tier;

pub use derive::{DERIVED_FIELDS, DerivedField, derive_features};
pub use features::{
    MODEL_FEATURE_COLUMNS, model_target, prepare_training_data, select_model_features,
};
pub use missing::{MissingValueReport, MissingValueStrategy, apply_missing_value_policy};
pub use score::{
    DegenerateVariancePolicy, NormalizationStats, NormalizationStrategy, ScoreInputs,
    StatsAccumulator, score_batch, weighted_score,
};
pub use statistics::{BatchSummary, MunicipalitySummary, SummaryAccumulator};
pub use tier::{VulnerabilityTier, batch_tiers, classify_batch};
