//! Storage sinks for scored household tables
//!
//! The pipeline hands every processed chunk to a [`HouseholdSink`]. All sinks
//! receive batches with the same schema within one run.

mod csv;
mod parquet;

pub use self::csv::CsvSink;
pub use self::parquet::ParquetSink;

use arrow::record_batch::RecordBatch;

use crate::error::Result;

/// Destination for processed household batches
pub trait HouseholdSink {
    /// Write one batch
    ///
    /// # Errors
    /// Returns an error if the batch cannot be written
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Flush and close the sink. Writing after `finish` is an error.
    ///
    /// # Errors
    /// Returns an error if buffered data cannot be flushed
    fn finish(&mut self) -> Result<()>;

    /// Rows written so far
    fn rows_written(&self) -> usize;
}

/// Sink keeping batches in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Vec<RecordBatch>,
    rows: usize,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches received, in order
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Take the received batches
    #[must_use]
    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }
}

impl HouseholdSink for MemorySink {
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.rows += batch.num_rows();
        self.batches.push(batch.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn rows_written(&self) -> usize {
        self.rows
    }
}
