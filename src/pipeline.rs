//! Household vulnerability pipeline
//!
//! Ties the stages together: format detection and layout mapping of the
//! source files, the family/respondent and benefit joins, and the per-batch
//! chain missing-value policy → feature derivation → scoring → tier
//! classification. Processed chunks are handed to a [`HouseholdSink`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use log::{debug, info};

use crate::algorithm::{
    BatchSummary, MissingValueReport, NormalizationStats, NormalizationStrategy, StatsAccumulator,
    SummaryAccumulator, apply_missing_value_policy, classify_batch, derive_features, score_batch,
};
use crate::config::PipelineConfig;
use crate::error::{Result, VulnError};
use crate::reader::{DetectedFormat, RawTableReader, detect_format, read_household_table};
use crate::registry::family::respondent_fields;
use crate::registry::{
    BenefitIndex, DuplicateReference, JoinReport, ReferencePersonIndex, SourceLayout,
    join_households, map_benefit_batch, map_family_batch, map_person_batch,
};
use crate::schema::columns;
use crate::utils::arrow::column_as_f64;
use crate::utils::logging::{
    create_spinner, finish_progress_bar, log_operation_complete, log_operation_start, log_warning,
};
use crate::writer::HouseholdSink;

/// Fewest households a chunk is scored with on its own; batch normalization
/// needs a sample variance
const MIN_CHUNK_HOUSEHOLDS: usize = 2;

/// Source files of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    /// Family register extract, streamed in chunks
    pub family: PathBuf,
    /// Person register extract providing the reference persons
    pub persons: Option<PathBuf>,
    /// Bolsa Família payment extract
    pub benefits: Option<PathBuf>,
}

impl SourceSet {
    /// A run over a family extract alone
    #[must_use]
    pub fn new(family: impl Into<PathBuf>) -> Self {
        Self {
            family: family.into(),
            persons: None,
            benefits: None,
        }
    }

    /// Add the person register extract
    #[must_use]
    pub fn with_persons(mut self, persons: impl Into<PathBuf>) -> Self {
        self.persons = Some(persons.into());
        self
    }

    /// Add the payment extract
    #[must_use]
    pub fn with_benefits(mut self, benefits: impl Into<PathBuf>) -> Self {
        self.benefits = Some(benefits.into());
        self
    }
}

/// Counts and statistics of one run
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    /// Chunks read from the family extract; undersized chunks are scored
    /// together with a neighbour
    pub chunks: usize,
    /// Data rows read from the family extract
    pub rows_read: usize,
    /// Households handed to the sink
    pub rows_written: usize,
    /// Join counts; `None` when no person extract was given
    pub join: Option<JoinReport>,
    /// Reference-person rows that lost the tie-break
    pub duplicate_rows: usize,
    /// Conflict reports of merged duplicates
    pub duplicates: Vec<DuplicateReference>,
    /// Distinct NIS in the payment extract
    pub benefit_recipients: usize,
    /// Fixed income statistics used for every chunk; `None` for per-batch runs
    pub normalization: Option<NormalizationStats>,
    /// Missing-value counts over all chunks
    pub missing_values: MissingValueReport,
    /// Aggregates over the written households
    pub summary: BatchSummary,
}

/// Detected formats of a source set, checked against their roles
struct DetectedSources {
    family: DetectedFormat,
    persons: Option<(PathBuf, DetectedFormat)>,
    benefits: Option<(PathBuf, DetectedFormat)>,
}

/// Joined lookup data built before the family extract is streamed
struct Indices {
    persons: Option<ReferencePersonIndex>,
    benefits: Option<BenefitIndex>,
}

/// Orchestrates detection, mapping, joins and scoring
#[derive(Debug, Clone, Default)]
pub struct VulnerabilityPipeline {
    config: PipelineConfig,
}

impl VulnerabilityPipeline {
    /// Create a pipeline with the given configuration
    #[must_use]
    pub const fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Statistics fixed by the configuration, if any
    fn fixed_stats(&self) -> Option<NormalizationStats> {
        match self.config.normalization {
            NormalizationStrategy::Reference(stats) => Some(stats),
            NormalizationStrategy::PerBatch | NormalizationStrategy::Global => None,
        }
    }

    /// Score and classify one canonical batch
    ///
    /// Global normalization has no wider input than the batch here, so it
    /// behaves like per-batch normalization. Running this on its own output
    /// returns the batch unchanged.
    ///
    /// # Errors
    /// Returns an error from any stage, e.g. `DivisionDegenerate` for a batch
    /// whose income has no variance
    pub fn process_batch(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let stats = self.fixed_stats();
        self.process_batch_with(batch, stats.as_ref())
            .map(|(processed, _)| processed)
    }

    /// Score and classify one canonical batch against explicit statistics
    ///
    /// `None` normalizes by the batch itself.
    pub fn process_batch_with(
        &self,
        batch: &RecordBatch,
        stats: Option<&NormalizationStats>,
    ) -> Result<(RecordBatch, MissingValueReport)> {
        let (treated, report) = apply_missing_value_policy(batch, self.config.missing_strategy)?;
        let derived = derive_features(&treated)?;
        let scored = score_batch(&derived, stats, self.config.degenerate_variance)?;
        let classified = classify_batch(&scored)?;
        Ok((classified, report))
    }

    /// Run the pipeline over a set of register extracts
    ///
    /// Every file is detected and checked against its role before anything is
    /// written. Person and payment extracts are indexed in parallel; the
    /// family extract is then streamed in chunks of `chunk_size` rows.
    ///
    /// # Errors
    /// Returns `FormatDetection` or `UnexpectedLayout` for unusable sources,
    /// and any stage or sink error
    pub fn run(&self, sources: &SourceSet, sink: &mut dyn HouseholdSink) -> Result<RunSummary> {
        let start = Instant::now();
        info!(
            "Scoring households (missing={}, tie-break={}, normalization={}, chunk size={})",
            self.config.missing_strategy,
            self.config.tie_break.as_str(),
            self.config.normalization,
            self.config.chunk_size
        );

        let detected = self.detect_sources(sources)?;
        let indices = self.build_indices(&detected)?;

        if indices.persons.is_none() {
            let defaulted = respondent_fields().iter().map(|field| field.name).join(", ");
            log_warning(
                &format!("No person extract, respondent fields keep their defaults ({defaulted})"),
                Some(&sources.family),
            );
        }
        let benefits = match (&indices.persons, &indices.benefits) {
            (None, Some(_)) => {
                log_warning(
                    "Payment extract given without a person extract, skipping the benefit join",
                    detected.benefits.as_ref().map(|(path, _)| path.as_path()),
                );
                None
            }
            (_, benefits) => benefits.as_ref(),
        };

        let stats = match self.config.normalization {
            NormalizationStrategy::PerBatch => None,
            NormalizationStrategy::Reference(stats) => Some(stats),
            NormalizationStrategy::Global => Some(self.global_stats(
                &sources.family,
                &detected.family,
                indices.persons.as_ref(),
                benefits,
            )?),
        };
        if let Some(stats) = &stats {
            info!(
                "Normalizing income with mean={:.4}, sd={:.4} over {} households",
                stats.mean, stats.std_dev, stats.count
            );
        }

        log_operation_start("Scoring households from", &sources.family);
        let spinner = create_spinner(Some("scoring"), self.config.show_progress);
        let mut reader = RawTableReader::open(
            &sources.family,
            detected.family.clone(),
            self.config.chunk_size,
        )?;
        let mut chunks = 0;
        let mut join_report = indices.persons.as_ref().map(|_| JoinReport::default());
        let mut missing_values = MissingValueReport::default();
        let mut summary = SummaryAccumulator::default();

        let mut score_and_write = |households: RecordBatch| -> Result<()> {
            let (processed, report) = self.process_batch_with(&households, stats.as_ref())?;
            missing_values.merge(&report);
            if processed.num_rows() > 0 {
                summary.add_batch(&processed)?;
                sink.write_batch(&processed)?;
            }
            spinner.inc(processed.num_rows() as u64);
            Ok(())
        };

        // A chunk is scored only once the next one is known, so that a chunk
        // too small to normalize on its own is folded into its neighbour.
        let mut pending: Option<RecordBatch> = None;
        while let Some(raw) = reader.next() {
            let raw = raw?;
            let row_offset = reader.rows_read() - raw.num_rows();
            let households = self.prepare_chunk(
                &raw,
                row_offset,
                indices.persons.as_ref(),
                benefits,
                join_report.as_mut(),
            )?;
            chunks += 1;
            debug!(
                "Chunk {chunks}: {} raw rows, {} households joined",
                raw.num_rows(),
                households.num_rows()
            );

            pending = match pending.take() {
                Some(previous)
                    if previous.num_rows() < MIN_CHUNK_HOUSEHOLDS
                        || households.num_rows() < MIN_CHUNK_HOUSEHOLDS =>
                {
                    Some(concat_batches(&previous.schema(), [&previous, &households])?)
                }
                Some(previous) => {
                    score_and_write(previous)?;
                    Some(households)
                }
                None => Some(households),
            };
        }
        if let Some(households) = pending {
            score_and_write(households)?;
        }
        sink.finish()?;
        finish_progress_bar(&spinner, None);

        let rows_read = reader.rows_read();
        let rows_written = sink.rows_written();
        log_operation_complete("scored", &sources.family, rows_written, Some(start.elapsed()));
        if let Some(join) = &join_report {
            info!(
                "Joined {} of {} households to a reference person, {} linked to benefit payments",
                join.households_joined, join.households_in, join.benefit_matches
            );
        }

        let (duplicate_rows, duplicates) = indices
            .persons
            .as_ref()
            .map(|index| (index.duplicate_rows(), index.duplicate_reports()))
            .unwrap_or_default();

        Ok(RunSummary {
            chunks,
            rows_read,
            rows_written,
            join: join_report,
            duplicate_rows,
            duplicates,
            benefit_recipients: indices.benefits.as_ref().map_or(0, BenefitIndex::len),
            normalization: stats,
            missing_values,
            summary: summary.finish(),
        })
    }

    /// Re-run the pipeline over a household table written by the CSV sink
    ///
    /// Columns that are already present are kept, so a fully scored table
    /// passes through unchanged. Income is normalized over the whole table
    /// unless reference statistics are configured.
    pub fn run_household_table(
        &self,
        path: &Path,
        sink: &mut dyn HouseholdSink,
    ) -> Result<RunSummary> {
        log_operation_start("Re-processing household table", path);
        let batches = read_household_table(path, self.config.chunk_size)?;

        let stats = match self.config.normalization {
            NormalizationStrategy::Reference(stats) => Some(stats),
            NormalizationStrategy::PerBatch | NormalizationStrategy::Global => {
                let mut accumulator = StatsAccumulator::default();
                for batch in &batches {
                    let (treated, _) =
                        apply_missing_value_policy(batch, self.config.missing_strategy)?;
                    let derived = derive_features(&treated)?;
                    accumulator.push_array(&column_as_f64(&derived, columns::INCOME_PER_CAPITA)?);
                }
                Some(accumulator.finish())
            }
        };

        let mut missing_values = MissingValueReport::default();
        let mut summary = SummaryAccumulator::default();
        let mut rows_read = 0;
        for batch in &batches {
            rows_read += batch.num_rows();
            let (processed, report) = self.process_batch_with(batch, stats.as_ref())?;
            missing_values.merge(&report);
            if processed.num_rows() > 0 {
                summary.add_batch(&processed)?;
                sink.write_batch(&processed)?;
            }
        }
        sink.finish()?;
        log_operation_complete("re-processed", path, sink.rows_written(), None);

        Ok(RunSummary {
            chunks: batches.len(),
            rows_read,
            rows_written: sink.rows_written(),
            join: None,
            duplicate_rows: 0,
            duplicates: Vec::new(),
            benefit_recipients: 0,
            normalization: stats,
            missing_values,
            summary: summary.finish(),
        })
    }

    /// Detect every source and check it against its role
    fn detect_sources(&self, sources: &SourceSet) -> Result<DetectedSources> {
        let sample_rows = self.config.detection_sample_rows;
        let family = detect_role(&sources.family, SourceLayout::FamilyRegister, sample_rows)?;
        let persons = sources
            .persons
            .as_ref()
            .map(|path| {
                detect_role(path, SourceLayout::PersonRegister, sample_rows)
                    .map(|format| (path.clone(), format))
            })
            .transpose()?;
        let benefits = sources
            .benefits
            .as_ref()
            .map(|path| {
                detect_role(path, SourceLayout::BenefitPayments, sample_rows)
                    .map(|format| (path.clone(), format))
            })
            .transpose()?;

        Ok(DetectedSources {
            family,
            persons,
            benefits,
        })
    }

    /// Index the person and payment extracts in parallel
    fn build_indices(&self, detected: &DetectedSources) -> Result<Indices> {
        let (persons, benefits) = rayon::join(
            || {
                detected
                    .persons
                    .as_ref()
                    .map(|(path, format)| self.index_persons(path, format))
                    .transpose()
            },
            || {
                detected
                    .benefits
                    .as_ref()
                    .map(|(path, format)| self.index_benefits(path, format))
                    .transpose()
            },
        );
        Ok(Indices {
            persons: persons?,
            benefits: benefits?,
        })
    }

    fn index_persons(&self, path: &Path, format: &DetectedFormat) -> Result<ReferencePersonIndex> {
        let start = Instant::now();
        log_operation_start("Indexing reference persons from", path);
        let mut index = ReferencePersonIndex::new(self.config.tie_break);
        let mut reader = RawTableReader::open(path, format.clone(), self.config.chunk_size)?;
        while let Some(raw) = reader.next() {
            let raw = raw?;
            let row_offset = reader.rows_read() - raw.num_rows();
            index.extend(map_person_batch(&raw, row_offset)?)?;
        }
        log_operation_complete("indexed", path, reader.rows_read(), Some(start.elapsed()));
        if index.duplicate_rows() > 0 {
            log_warning(
                &format!(
                    "{} reference-person rows lost the tie-break ({})",
                    index.duplicate_rows(),
                    self.config.tie_break.as_str()
                ),
                Some(path),
            );
        }
        Ok(index)
    }

    fn index_benefits(&self, path: &Path, format: &DetectedFormat) -> Result<BenefitIndex> {
        let start = Instant::now();
        log_operation_start("Indexing benefit payments from", path);
        let mut index = BenefitIndex::default();
        let mut reader = RawTableReader::open(path, format.clone(), self.config.chunk_size)?;
        while let Some(raw) = reader.next() {
            index.extend(map_benefit_batch(&raw?)?);
        }
        log_operation_complete("indexed", path, reader.rows_read(), Some(start.elapsed()));
        Ok(index)
    }

    /// Map and join one raw family chunk into canonical households
    fn prepare_chunk(
        &self,
        raw: &RecordBatch,
        row_offset: usize,
        persons: Option<&ReferencePersonIndex>,
        benefits: Option<&BenefitIndex>,
        join_report: Option<&mut JoinReport>,
    ) -> Result<RecordBatch> {
        let family = map_family_batch(raw, row_offset)?;
        match (persons, join_report) {
            (Some(persons), Some(total)) => {
                let (joined, report) = join_households(&family, persons, benefits)?;
                total.merge(&report);
                Ok(joined)
            }
            _ => Ok(family),
        }
    }

    /// First pass over the family extract accumulating per-capita income
    fn global_stats(
        &self,
        path: &Path,
        format: &DetectedFormat,
        persons: Option<&ReferencePersonIndex>,
        benefits: Option<&BenefitIndex>,
    ) -> Result<NormalizationStats> {
        debug!("Computing global income statistics over {}", path.display());
        let mut accumulator = StatsAccumulator::default();
        let mut reader = RawTableReader::open(path, format.clone(), self.config.chunk_size)?;
        let mut scratch = JoinReport::default();
        while let Some(raw) = reader.next() {
            let raw = raw?;
            let row_offset = reader.rows_read() - raw.num_rows();
            let households =
                self.prepare_chunk(&raw, row_offset, persons, benefits, Some(&mut scratch))?;
            let (treated, _) =
                apply_missing_value_policy(&households, self.config.missing_strategy)?;
            let derived = derive_features(&treated)?;
            accumulator.push_array(&column_as_f64(&derived, columns::INCOME_PER_CAPITA)?);
        }
        Ok(accumulator.finish())
    }
}

/// Detect a file and require the layout of its role
fn detect_role(path: &Path, expected: SourceLayout, sample_rows: usize) -> Result<DetectedFormat> {
    let format = detect_format(path, sample_rows)?;
    if format.layout != expected {
        return Err(VulnError::UnexpectedLayout {
            path: path.display().to_string(),
            expected: expected.as_str(),
            found: format.layout.as_str(),
        });
    }
    Ok(format)
}
