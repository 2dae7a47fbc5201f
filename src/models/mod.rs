//! Typed models over household tables.

pub mod household;

pub use household::HouseholdRecord;
