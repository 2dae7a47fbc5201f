//! Explanation prompts
//!
//! Prompts are written in Portuguese for the external text service and name
//! tiers by their localized labels, so the generated text uses the same
//! vocabulary as the reports.

use std::fmt::Write;

use crate::algorithm::VulnerabilityTier;
use crate::models::HouseholdRecord;
use crate::registry::municipality_name;

use super::ModelPrediction;

/// System context prepended to every prompt
pub const SYSTEM_CONTEXT: &str =
    "Você é um especialista em vulnerabilidade social e políticas públicas brasileiras.";

const fn yes_no(value: bool) -> &'static str {
    if value { "Sim" } else { "Não" }
}

fn tier_scale() -> String {
    VulnerabilityTier::ALL
        .iter()
        .map(VulnerabilityTier::localized_label)
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the explanation prompt for one assessed household
#[must_use]
pub fn build_prompt(
    household: &HouseholdRecord,
    tier: VulnerabilityTier,
    predictions: &[ModelPrediction],
) -> String {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(SYSTEM_CONTEXT);
    prompt.push_str("\n\nAnalise o perfil socioeconômico a seguir e forneça ");
    prompt.push_str("uma avaliação da vulnerabilidade social.\n\n");

    // Writing to a String cannot fail
    let _ = writeln!(prompt, "DADOS DO DOMICÍLIO ({}):", household.household_id);
    let _ = writeln!(prompt, "- Município: {}", municipality_name(household.municipality_code));
    let _ = writeln!(prompt, "- Idade do responsável: {} anos", household.respondent_age);
    let _ = writeln!(
        prompt,
        "- Sexo: {}",
        household.respondent_sex.as_deref().unwrap_or("não informado")
    );
    let _ = writeln!(
        prompt,
        "- Escolaridade: nível {} (0=analfabeto, 5=superior)",
        household.education_level
    );
    let _ = writeln!(prompt, "- Renda familiar: R$ {:.2}", household.household_income);
    let _ = writeln!(prompt, "- Pessoas no domicílio: {}", household.household_size);
    let _ = writeln!(prompt, "- Renda per capita: R$ {:.2}", household.income_per_capita);
    let _ = writeln!(prompt, "- Possui deficiência: {}", yes_no(household.has_disability));
    let _ = writeln!(
        prompt,
        "- Situação de trabalho: {} (0=desempregado, 1=informal, 2=formal, 3=aposentado)",
        household.employment_status
    );
    let _ = writeln!(prompt, "- Acesso à água: {}", yes_no(household.has_water_access));
    let _ = writeln!(prompt, "- Acesso ao esgoto: {}", yes_no(household.has_sewage_access));
    let _ = writeln!(
        prompt,
        "- Recebe Bolsa Família: {}",
        yes_no(household.receives_cash_transfer)
    );
    let _ = writeln!(
        prompt,
        "\nÍNDICE DE VULNERABILIDADE: {:.3} (nível {})",
        household.vulnerability_score,
        tier.localized_label()
    );

    if !predictions.is_empty() {
        prompt.push_str("\nPREDIÇÕES DOS MODELOS:\n");
        for prediction in predictions {
            let _ = writeln!(
                prompt,
                "- {}: {} (confiança: {:.1}%)",
                prediction.model,
                prediction.tier.localized_label(),
                prediction.confidence * 100.0
            );
        }
    }

    let _ = write!(
        prompt,
        "\nForneça uma análise estruturada contendo:\n\
         1. Classificação final de vulnerabilidade ({}) e justificativa\n\
         2. Fatores de risco identificados, priorizando os mais críticos\n\
         3. Fatores protetivos\n\
         4. Recomendações de políticas públicas\n\
         5. Indicadores para monitoramento\n\n\
         Seja específico e considere o contexto socioeconômico brasileiro.\n",
        tier_scale()
    );
    prompt
}
