//! Household vulnerability scoring over Brazilian social-welfare registers.
//!
//! Reads CadÚnico family and person extracts and Bolsa Família payment
//! extracts, maps them onto a canonical household table, and scores every
//! household into one of four vulnerability tiers. Tables are Arrow record
//! batches throughout.

pub mod algorithm;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod schema;
pub mod service;
pub mod utils;
pub mod writer;

// Core types
pub use config::PipelineConfig;
pub use error::{Result, VulnError};
pub use pipeline::{RunSummary, SourceSet, VulnerabilityPipeline};
pub use schema::{SchemaCompatibilityReport, SchemaIssue, canonical_schema, scored_schema};

// Arrow types
pub use arrow::datatypes::Schema as ArrowSchema;
pub use arrow::record_batch::RecordBatch;

// Algorithms
pub use algorithm::{
    BatchSummary, DegenerateVariancePolicy, MissingValueStrategy, NormalizationStats,
    NormalizationStrategy, VulnerabilityTier, apply_missing_value_policy, classify_batch,
    derive_features, prepare_training_data, score_batch, select_model_features,
};

// Sources and sinks
pub use reader::{DetectedFormat, TextEncoding, detect_format, read_household_table};
pub use registry::{ReferenceTieBreak, SourceLayout};
pub use writer::{CsvSink, HouseholdSink, MemorySink, ParquetSink};

// Service seam
pub use models::HouseholdRecord;
pub use service::{TextGenerator, TierModel, VulnerabilityService};
