//! Configuration for the vulnerability pipeline.

use std::str::FromStr;

use log::debug;

use crate::algorithm::{DegenerateVariancePolicy, MissingValueStrategy, NormalizationStrategy};
use crate::error::{Result, VulnError};
use crate::registry::ReferenceTieBreak;

/// Default number of rows per processed chunk
pub const DEFAULT_CHUNK_SIZE: usize = 16384;

/// Default number of data rows parsed per detection candidate
pub const DEFAULT_DETECTION_SAMPLE_ROWS: usize = 100;

/// Environment variable overriding the chunk size
pub const ENV_CHUNK_SIZE: &str = "CADUNICO_CHUNK_SIZE";
/// Environment variable overriding the missing-value strategy
pub const ENV_MISSING_STRATEGY: &str = "CADUNICO_MISSING_STRATEGY";
/// Environment variable overriding the reference tie-break
pub const ENV_TIE_BREAK: &str = "CADUNICO_TIE_BREAK";
/// Environment variable overriding the normalization strategy
pub const ENV_NORMALIZATION: &str = "CADUNICO_NORMALIZATION";
/// Environment variable overriding the degenerate-variance policy
pub const ENV_DEGENERATE_VARIANCE: &str = "CADUNICO_DEGENERATE_VARIANCE";

/// Configuration for the `VulnerabilityPipeline`
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PipelineConfig {
    /// Rows per chunk when streaming source files
    pub chunk_size: usize,
    /// Data rows parsed per candidate during format detection
    pub detection_sample_rows: usize,
    /// Strategy for remaining null cells
    pub missing_strategy: MissingValueStrategy,
    /// Policy for households with several reference persons
    pub tie_break: ReferenceTieBreak,
    /// Source of income normalization statistics
    pub normalization: NormalizationStrategy,
    /// Behaviour when income has no usable variance
    pub degenerate_variance: DegenerateVariancePolicy,
    /// Show a progress spinner while streaming
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            detection_sample_rows: DEFAULT_DETECTION_SAMPLE_ROWS,
            missing_strategy: MissingValueStrategy::default(),
            tie_break: ReferenceTieBreak::default(),
            normalization: NormalizationStrategy::default(),
            degenerate_variance: DegenerateVariancePolicy::default(),
            show_progress: false,
        }
    }
}

fn env_override<T: FromStr<Err = VulnError>>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            debug!("Configuration override from {name}: {value}");
            value.parse::<T>().map(Some)
        }
        _ => Ok(None),
    }
}

impl PipelineConfig {
    /// Default configuration with environment overrides applied
    ///
    /// # Errors
    /// Returns an error when an override variable holds an invalid value
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var(ENV_CHUNK_SIZE) {
            let chunk_size = value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| VulnError::InvalidConfig(format!("{ENV_CHUNK_SIZE}={value}")))?;
            config.chunk_size = chunk_size;
        }
        if let Some(strategy) = env_override(ENV_MISSING_STRATEGY)? {
            config.missing_strategy = strategy;
        }
        if let Some(tie_break) = env_override(ENV_TIE_BREAK)? {
            config.tie_break = tie_break;
        }
        if let Some(normalization) = env_override(ENV_NORMALIZATION)? {
            config.normalization = normalization;
        }
        if let Some(policy) = env_override(ENV_DEGENERATE_VARIANCE)? {
            config.degenerate_variance = policy;
        }

        Ok(config)
    }

    /// Set the chunk size (at least 1)
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the detection sample size
    #[must_use]
    pub const fn with_detection_sample_rows(mut self, rows: usize) -> Self {
        self.detection_sample_rows = rows;
        self
    }

    /// Set the missing-value strategy
    #[must_use]
    pub const fn with_missing_strategy(mut self, strategy: MissingValueStrategy) -> Self {
        self.missing_strategy = strategy;
        self
    }

    /// Set the reference tie-break
    #[must_use]
    pub const fn with_tie_break(mut self, tie_break: ReferenceTieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Set the normalization strategy
    #[must_use]
    pub const fn with_normalization(mut self, normalization: NormalizationStrategy) -> Self {
        self.normalization = normalization;
        self
    }

    /// Set the degenerate-variance policy
    #[must_use]
    pub const fn with_degenerate_variance(mut self, policy: DegenerateVariancePolicy) -> Self {
        self.degenerate_variance = policy;
        self
    }

    /// Enable or disable the progress spinner
    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.missing_strategy, MissingValueStrategy::Median);
        assert_eq!(config.tie_break, ReferenceTieBreak::FirstByOrder);
        assert_eq!(config.normalization, NormalizationStrategy::PerBatch);
        assert_eq!(config.degenerate_variance, DegenerateVariancePolicy::Error);
    }

    #[test]
    fn test_builder_methods() {
        let config = PipelineConfig::default()
            .with_chunk_size(0)
            .with_missing_strategy(MissingValueStrategy::Drop)
            .with_normalization(NormalizationStrategy::Global);
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.missing_strategy, MissingValueStrategy::Drop);
        assert_eq!(config.normalization, NormalizationStrategy::Global);
    }
}
