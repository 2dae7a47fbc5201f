//! UTF-8 comma-separated output

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use arrow::csv::{Writer, WriterBuilder};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use log::debug;

use super::HouseholdSink;
use crate::error::{Result, VulnError};

/// Sink writing one CSV file with a single header row
pub struct CsvSink {
    path: PathBuf,
    writer: Option<Writer<BufWriter<File>>>,
    schema: Option<SchemaRef>,
    rows: usize,
}

impl CsvSink {
    /// Create (or truncate) the file at `path`
    ///
    /// # Errors
    /// Returns an error if the file cannot be created
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        let writer = WriterBuilder::new()
            .with_header(true)
            .with_delimiter(b',')
            .build(BufWriter::new(file));
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            schema: None,
            rows: 0,
        })
    }

    /// Output path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HouseholdSink for CsvSink {
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| {
                VulnError::InvalidConfig(format!("{} is already closed", self.path.display()))
            })?;

        match &self.schema {
            Some(schema) if schema.fields() != batch.schema().fields() => {
                return Err(VulnError::InvalidConfig(format!(
                    "batch schema differs from the header already written to {}",
                    self.path.display()
                )));
            }
            Some(_) => {}
            None => self.schema = Some(batch.schema()),
        }

        writer.write(batch)?;
        self.rows += batch.num_rows();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let mut inner = writer.into_inner();
            inner.flush()?;
            debug!("Wrote {} rows to {}", self.rows, self.path.display());
        }
        Ok(())
    }

    fn rows_written(&self) -> usize {
        self.rows
    }
}
