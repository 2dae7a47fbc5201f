//! Source layouts of the Brazilian social-welfare registers
//!
//! This module maps the raw extracts of the CadÚnico family and person
//! registers and the Bolsa Família payment register onto the canonical
//! household schema, and joins them into one row per household.
//!
//! Available layouts:
//! - Family register: one row per family, infrastructure and income
//! - Person register: one row per person, respondent attributes
//! - Benefit payments: one row per instalment, keyed by NIS

pub mod benefit;
pub mod codes;
pub mod detect;
pub mod family;
pub mod join;
pub mod municipality;
pub mod person;

pub use benefit::{BenefitPayment, map_benefit_batch};
pub use detect::SourceLayout;
pub use family::map_family_batch;
pub use join::{
    BenefitIndex, DuplicateReference, JoinReport, ReferencePersonIndex, ReferenceTieBreak,
    join_households,
};
pub use municipality::municipality_name;
pub use person::{RespondentRecord, map_person_batch};
