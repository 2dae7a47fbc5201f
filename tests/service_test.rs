use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrow::array::{ArrayRef, StringArray};
use arrow::record_batch::RecordBatch;
use cadunico_vuln::algorithm::MODEL_FEATURE_COLUMNS;
use cadunico_vuln::schema::columns;
use cadunico_vuln::service::{
    TextGenerator, TierModel, TierPrediction, VulnerabilityService, consolidate,
};
use cadunico_vuln::utils::synthetic::SyntheticHouseholds;
use cadunico_vuln::{Result, VulnError, VulnerabilityTier};

/// Predicts the same tier for every row
struct ConstantModel {
    name: &'static str,
    tier: VulnerabilityTier,
}

impl TierModel for ConstantModel {
    fn name(&self) -> &str {
        self.name
    }

    fn predict(&self, features: &RecordBatch) -> Result<Vec<TierPrediction>> {
        assert!(features.num_columns() >= MODEL_FEATURE_COLUMNS.len());
        Ok(vec![
            TierPrediction {
                tier: self.tier,
                confidence: 0.8,
            };
            features.num_rows()
        ])
    }
}

struct FailingModel;

impl TierModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    fn predict(&self, _features: &RecordBatch) -> Result<Vec<TierPrediction>> {
        Err(VulnError::Model("weights not loaded".to_string()))
    }
}

/// Echoes the prompt length; fails on every third call
#[derive(Default)]
struct FlakyGenerator {
    calls: AtomicUsize,
}

impl TextGenerator for FlakyGenerator {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call % 3 == 2 {
                Err(VulnError::Model("service unavailable".to_string()))
            } else {
                Ok(format!("análise de {} caracteres", prompt.chars().count()))
            }
        })
    }
}

fn households(rows: usize) -> RecordBatch {
    SyntheticHouseholds::new(77).with_missing_rate(0.05).generate(rows).unwrap()
}

#[tokio::test]
async fn test_assess_collects_model_predictions() {
    let service = VulnerabilityService::builder()
        .model(Arc::new(ConstantModel {
            name: "floresta",
            tier: VulnerabilityTier::High,
        }))
        .model(Arc::new(FailingModel))
        .build()
        .unwrap();

    let assessments = service.assess(households(12)).await.unwrap();
    assert_eq!(assessments.len(), 12);
    for assessment in &assessments {
        assert_eq!(assessment.predictions.len(), 1);
        assert_eq!(assessment.predictions[0].model, "floresta");
        assert_eq!(assessment.tier, assessment.household.tier().unwrap());
        assert!(assessment.explanation.is_none());
        assert!(assessment.prompt.contains(assessment.tier.localized_label()));
    }

    let json = assessments[0].to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["predictions"][0]["tier"], "High");
}

#[tokio::test]
async fn test_generator_failures_leave_explanation_empty() {
    let generator = Arc::new(FlakyGenerator::default());
    let service = VulnerabilityService::builder()
        .model(Arc::new(ConstantModel {
            name: "reforco",
            tier: VulnerabilityTier::Low,
        }))
        .generator(generator.clone())
        .build()
        .unwrap();

    let assessments = service.assess(households(9)).await.unwrap();
    assert_eq!(generator.calls.load(Ordering::SeqCst), 9);
    let explained = assessments
        .iter()
        .filter(|assessment| assessment.explanation.is_some())
        .count();
    assert_eq!(explained, 6);

    let report = consolidate(&assessments);
    assert_eq!(report.households, 9);
    assert_eq!(report.explanations, 6);
    let model = &report.models["reforco"];
    assert_eq!(model.tiers[&VulnerabilityTier::Low], 9);
    assert!((model.mean_confidence - 0.8).abs() < 1e-12);
    let rule_low = report.rule_tiers.get(&VulnerabilityTier::Low).copied().unwrap_or(0);
    assert!((model.agreement - rule_low as f64 / 9.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_pipeline_errors_propagate() {
    let service = VulnerabilityService::builder().build().unwrap();
    let err = service.assess(households(1)).await.unwrap_err();
    assert!(matches!(err, VulnError::DivisionDegenerate { .. }));
}

#[test]
fn test_duplicate_model_names_are_rejected() {
    let model = || {
        Arc::new(ConstantModel {
            name: "floresta",
            tier: VulnerabilityTier::Medium,
        })
    };
    let result = VulnerabilityService::builder().model(model()).model(model()).build();
    assert!(matches!(result, Err(VulnError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_blank_sex_does_not_fail_the_batch() {
    let batch = SyntheticHouseholds::new(5).generate(6).unwrap();
    let index = batch.schema().index_of(columns::RESPONDENT_SEX).unwrap();
    let mut columns_with_blank = batch.columns().to_vec();
    columns_with_blank[index] = Arc::new(StringArray::from(vec![
        None,
        Some("M"),
        Some("F"),
        Some("F"),
        Some("M"),
        Some("F"),
    ])) as ArrayRef;
    let batch = RecordBatch::try_new(batch.schema(), columns_with_blank).unwrap();

    let service = VulnerabilityService::builder()
        .model(Arc::new(ConstantModel {
            name: "floresta",
            tier: VulnerabilityTier::Medium,
        }))
        .build()
        .unwrap();

    let assessments = service.assess(batch).await.unwrap();
    assert_eq!(assessments.len(), 6);
    assert_eq!(assessments[0].household.respondent_sex, None);
    assert!(assessments[0].prompt.contains("Sexo: não informado"));
    assert_eq!(assessments[1].household.respondent_sex.as_deref(), Some("M"));
}
