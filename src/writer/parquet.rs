//! Columnar copy of the household table

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use log::debug;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use super::HouseholdSink;
use crate::error::{Result, VulnError};

/// Sink writing one Parquet file
///
/// The file is created when the first batch arrives, since the writer needs
/// the schema up front. A run that writes nothing produces no file.
pub struct ParquetSink {
    path: PathBuf,
    writer: Option<ArrowWriter<File>>,
    closed: bool,
    rows: usize,
}

impl ParquetSink {
    /// Sink that will write to `path`
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: None,
            closed: false,
            rows: 0,
        }
    }

    /// Output path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HouseholdSink for ParquetSink {
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        if self.closed {
            return Err(VulnError::InvalidConfig(format!(
                "{} is already closed",
                self.path.display()
            )));
        }

        let mut writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                let props = WriterProperties::builder()
                    .set_compression(Compression::SNAPPY)
                    .build();
                let file = File::create(&self.path)?;
                ArrowWriter::try_new(file, batch.schema(), Some(props))?
            }
        };
        let written = writer.write(batch);
        self.writer = Some(writer);
        written?;
        self.rows += batch.num_rows();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.closed = true;
        if let Some(writer) = self.writer.take() {
            writer.close()?;
            debug!("Wrote {} rows to {}", self.rows, self.path.display());
        }
        Ok(())
    }

    fn rows_written(&self) -> usize {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::synthetic::SyntheticHouseholds;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    #[test]
    fn test_parquet_copy_matches_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("households.parquet");
        let batch = SyntheticHouseholds::new(21).generate(12).unwrap();

        let mut sink = ParquetSink::new(&path);
        sink.write_batch(&batch).unwrap();
        sink.finish().unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(batches, vec![batch]);
    }
}
