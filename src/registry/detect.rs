//! Source layout detection
//!
//! Each government extract is recognized by characteristic column names.
//! Detection is purely name based; delimiter and encoding are resolved by the
//! reader before the signatures are consulted.

use log::debug;

/// Columns marking a person-level register extract
pub const PERSON_SIGNATURE: [&str; 3] =
    ["cod_parentesco_rf_pessoa", "cod_familiar_pes", "nom_pessoa"];

/// Columns marking a family-level register extract
pub const FAMILY_SIGNATURE: [&str; 2] = ["cd_ibge", "cod_familiar_fam"];

/// Columns that must all be present in a benefit payment extract
pub const BENEFIT_SIGNATURE: [&str; 2] = ["uf", "valor_parcela"];

/// Known source layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum SourceLayout {
    /// One row per family
    FamilyRegister,
    /// One row per person, several per family
    PersonRegister,
    /// One row per benefit instalment
    BenefitPayments,
}

impl SourceLayout {
    /// Convert `SourceLayout` to static string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FamilyRegister => "family register",
            Self::PersonRegister => "person register",
            Self::BenefitPayments => "benefit payments",
        }
    }

    /// Detect the layout from normalized column names
    ///
    /// Person extracts also carry family columns such as `cd_ibge`, so the
    /// person signature is checked first.
    #[must_use]
    pub fn from_columns<S: AsRef<str>>(columns: &[S]) -> Option<Self> {
        let has = |name: &str| columns.iter().any(|column| column.as_ref() == name);

        let layout = if PERSON_SIGNATURE.iter().any(|name| has(name)) {
            Some(Self::PersonRegister)
        } else if FAMILY_SIGNATURE.iter().any(|name| has(name)) {
            Some(Self::FamilyRegister)
        } else if BENEFIT_SIGNATURE.iter().all(|name| has(name)) {
            Some(Self::BenefitPayments)
        } else {
            None
        };

        debug!(
            "Layout signature check over {} columns: {}",
            columns.len(),
            layout.map_or("no match", |layout| layout.as_str())
        );
        layout
    }
}

impl std::fmt::Display for SourceLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
