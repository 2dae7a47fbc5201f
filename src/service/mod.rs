//! Assessment service
//!
//! Combines the rule-based pipeline with external collaborators: tier models
//! (e.g. trained ensembles) that predict a tier per feature row, and an
//! optional text service that writes explanations. The service is an explicit
//! object built through [`VulnerabilityServiceBuilder`]; it holds no global
//! state.

pub mod explain;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;

use crate::algorithm::{VulnerabilityTier, select_model_features};
use crate::config::PipelineConfig;
use crate::error::{Result, VulnError};
use crate::models::HouseholdRecord;
use crate::pipeline::VulnerabilityPipeline;

/// Tier predicted by a model for one household
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierPrediction {
    /// Predicted tier
    pub tier: VulnerabilityTier,
    /// Probability of the predicted tier (0..1)
    pub confidence: f64,
}

/// External tier model
///
/// `predict` receives the model feature table (all `Float64`, columns in the
/// order of [`crate::algorithm::MODEL_FEATURE_COLUMNS`]) and returns one
/// prediction per row.
pub trait TierModel: Send + Sync {
    /// Name used in assessments and reports
    fn name(&self) -> &str;

    /// Predict a tier for every feature row
    ///
    /// # Errors
    /// Returns an error if the model cannot score the table
    fn predict(&self, features: &RecordBatch) -> Result<Vec<TierPrediction>>;
}

/// External text generation service
pub trait TextGenerator: Send + Sync {
    /// Generate text for a prompt
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// A model's prediction for one household
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPrediction {
    /// Model name
    pub model: String,
    /// Predicted tier
    pub tier: VulnerabilityTier,
    /// Confidence of the prediction
    pub confidence: f64,
}

/// Assessment of one household
#[derive(Debug, Clone, Serialize)]
pub struct HouseholdAssessment {
    /// Scored household
    pub household: HouseholdRecord,
    /// Rule-based tier
    pub tier: VulnerabilityTier,
    /// Predictions of every model that could score the batch
    pub predictions: Vec<ModelPrediction>,
    /// Prompt sent to the text service
    pub prompt: String,
    /// Generated explanation, if a generator is configured and succeeded
    pub explanation: Option<String>,
    /// Time of the assessment
    pub assessed_at: DateTime<Utc>,
}

impl HouseholdAssessment {
    /// Serialize to pretty-printed JSON
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Tier distribution of one model
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelDistribution {
    /// Households per predicted tier
    pub tiers: BTreeMap<VulnerabilityTier, usize>,
    /// Mean confidence
    pub mean_confidence: f64,
    /// Share of households where the model agrees with the rule-based tier
    pub agreement: f64,
}

/// Consolidated report over a set of assessments
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidatedReport {
    /// Time the report was produced
    pub generated_at: DateTime<Utc>,
    /// Households assessed
    pub households: usize,
    /// Households per rule-based tier
    pub rule_tiers: BTreeMap<VulnerabilityTier, usize>,
    /// Distributions per model, by model name
    pub models: BTreeMap<String, ModelDistribution>,
    /// Assessments carrying an explanation
    pub explanations: usize,
}

/// Builder for [`VulnerabilityService`]
#[derive(Default)]
pub struct VulnerabilityServiceBuilder {
    config: PipelineConfig,
    models: Vec<Arc<dyn TierModel>>,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl VulnerabilityServiceBuilder {
    /// Start with the default pipeline configuration and no collaborators
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline configuration used for scoring
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a tier model
    #[must_use]
    pub fn model(mut self, model: Arc<dyn TierModel>) -> Self {
        self.models.push(model);
        self
    }

    /// Set the text generator
    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the service
    ///
    /// # Errors
    /// Returns `InvalidConfig` when two models share a name
    pub fn build(self) -> Result<VulnerabilityService> {
        let mut names: Vec<&str> = self.models.iter().map(|model| model.name()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(VulnError::InvalidConfig(format!(
                "tier model '{}' registered twice",
                pair[0]
            )));
        }

        Ok(VulnerabilityService {
            pipeline: Arc::new(VulnerabilityPipeline::new(self.config)),
            models: self.models,
            generator: self.generator,
        })
    }
}

/// Scores households and gathers model predictions and explanations
pub struct VulnerabilityService {
    pipeline: Arc<VulnerabilityPipeline>,
    models: Vec<Arc<dyn TierModel>>,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl VulnerabilityService {
    /// Start building a service
    #[must_use]
    pub fn builder() -> VulnerabilityServiceBuilder {
        VulnerabilityServiceBuilder::new()
    }

    /// Pipeline used for scoring
    #[must_use]
    pub fn pipeline(&self) -> &VulnerabilityPipeline {
        &self.pipeline
    }

    /// Assess a canonical household batch
    ///
    /// The pipeline runs on a blocking task. A model that fails or returns the
    /// wrong number of predictions is left out of the assessments with a
    /// warning; likewise a failed explanation leaves `explanation` empty.
    ///
    /// # Errors
    /// Returns pipeline errors, or `Model` if the scoring task panics
    pub async fn assess(&self, batch: RecordBatch) -> Result<Vec<HouseholdAssessment>> {
        let pipeline = Arc::clone(&self.pipeline);
        let scored = tokio::task::spawn_blocking(move || pipeline.process_batch(&batch))
            .await
            .map_err(|e| VulnError::Model(format!("scoring task failed: {e}")))??;

        let records = HouseholdRecord::from_batch(&scored)?;
        let features = select_model_features(&scored)?;
        let per_model = self.predict_all(&features, records.len());

        let assessed_at = Utc::now();
        let mut assessments = records
            .into_iter()
            .enumerate()
            .map(|(row, household)| {
                let tier = household.tier()?;
                let predictions: Vec<ModelPrediction> = per_model
                    .iter()
                    .map(|(model, predictions)| ModelPrediction {
                        model: model.clone(),
                        tier: predictions[row].tier,
                        confidence: predictions[row].confidence,
                    })
                    .collect();
                let prompt = explain::build_prompt(&household, tier, &predictions);
                Ok(HouseholdAssessment {
                    household,
                    tier,
                    predictions,
                    prompt,
                    explanation: None,
                    assessed_at,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(generator) = &self.generator {
            let explanations = join_all(
                assessments
                    .iter()
                    .map(|assessment| generator.generate(&assessment.prompt)),
            )
            .await;
            for (assessment, explanation) in assessments.iter_mut().zip(explanations) {
                match explanation {
                    Ok(text) => assessment.explanation = Some(text),
                    Err(e) => warn!(
                        "No explanation for household {}: {e}",
                        assessment.household.household_id
                    ),
                }
            }
        }

        info!(
            "Assessed {} households with {} models",
            assessments.len(),
            per_model.len()
        );
        Ok(assessments)
    }

    /// Query every model, keeping those that return one prediction per row
    fn predict_all(
        &self,
        features: &RecordBatch,
        rows: usize,
    ) -> Vec<(String, Vec<TierPrediction>)> {
        self.models
            .iter()
            .filter_map(|model| match model.predict(features) {
                Ok(predictions) if predictions.len() == rows => {
                    debug!("Model {} scored {rows} households", model.name());
                    Some((model.name().to_string(), predictions))
                }
                Ok(predictions) => {
                    warn!(
                        "Model {} returned {} predictions for {rows} households, ignoring it",
                        model.name(),
                        predictions.len()
                    );
                    None
                }
                Err(e) => {
                    warn!("Model {} failed: {e}", model.name());
                    None
                }
            })
            .collect()
    }
}

/// Build the per-model tier distribution report
#[must_use]
pub fn consolidate(assessments: &[HouseholdAssessment]) -> ConsolidatedReport {
    let mut rule_tiers = BTreeMap::new();
    let mut sums: BTreeMap<String, (ModelDistribution, f64, usize, usize)> = BTreeMap::new();

    for assessment in assessments {
        *rule_tiers.entry(assessment.tier).or_insert(0) += 1;
        for prediction in &assessment.predictions {
            let (distribution, confidence, agreeing, total) =
                sums.entry(prediction.model.clone()).or_default();
            *distribution.tiers.entry(prediction.tier).or_insert(0) += 1;
            *confidence += prediction.confidence;
            *total += 1;
            if prediction.tier == assessment.tier {
                *agreeing += 1;
            }
        }
    }

    let models = sums
        .into_iter()
        .map(|(name, (mut distribution, confidence, agreeing, total))| {
            distribution.mean_confidence = confidence / total as f64;
            distribution.agreement = agreeing as f64 / total as f64;
            (name, distribution)
        })
        .collect();

    ConsolidatedReport {
        generated_at: Utc::now(),
        households: assessments.len(),
        rule_tiers,
        models,
        explanations: assessments
            .iter()
            .filter(|assessment| assessment.explanation.is_some())
            .count(),
    }
}
