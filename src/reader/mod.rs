//! Module for reading delimited register extracts with format detection.
//!
//! Source files differ in delimiter and text encoding. Detection tries a fixed
//! list of delimiter/encoding candidates and accepts the first one whose header
//! matches a known layout signature. Files are then streamed as all-text record
//! batches of a bounded number of rows.

pub mod decode;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use log::{debug, info, warn};

pub use decode::{DecodingReader, TextEncoding};

use crate::error::{Result, VulnError};
use crate::registry::SourceLayout;
use crate::schema::{check_canonical_compatibility, storage_field};
use crate::utils::arrow::normalize_column_name;

/// Delimiter/encoding candidates, in preference order
pub const CANDIDATE_FORMATS: [(u8, TextEncoding); 6] = [
    (b';', TextEncoding::Latin1),
    (b';', TextEncoding::Utf8),
    (b'\t', TextEncoding::Latin1),
    (b'\t', TextEncoding::Utf8),
    (b',', TextEncoding::Utf8),
    (b',', TextEncoding::Latin1),
];

/// Result of format detection for one file
#[derive(Debug, Clone)]
pub struct DetectedFormat {
    /// Field delimiter
    pub delimiter: u8,
    /// Text encoding
    pub encoding: TextEncoding,
    /// Recognized layout
    pub layout: SourceLayout,
    /// Normalized column names, in file order
    pub columns: Vec<String>,
}

impl DetectedFormat {
    /// Printable delimiter for logs
    #[must_use]
    pub fn delimiter_label(&self) -> &'static str {
        match self.delimiter {
            b';' => "semicolon",
            b'\t' => "tab",
            b',' => "comma",
            _ => "other",
        }
    }
}

fn open_decoded(path: &Path, encoding: TextEncoding) -> Result<DecodingReader<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(DecodingReader::new(BufReader::new(file), encoding))
}

/// Read and normalize the header of `path` under one candidate configuration
///
/// The first `sample_rows` rows are parsed too, so a candidate whose encoding
/// cannot decode the data is rejected.
fn read_header(
    path: &Path,
    delimiter: u8,
    encoding: TextEncoding,
    sample_rows: usize,
) -> Result<Vec<String>> {
    let decoded = open_decoded(path, encoding)?;
    let (schema, _) = Format::default()
        .with_header(true)
        .with_delimiter(delimiter)
        .with_truncated_rows(true)
        .infer_schema(decoded, Some(sample_rows))?;
    Ok(schema
        .fields()
        .iter()
        .map(|field| normalize_column_name(field.name()))
        .collect())
}

/// Detect the delimiter, encoding and layout of a register extract
///
/// # Arguments
/// * `path` - The file to inspect
/// * `sample_rows` - Number of data rows parsed per candidate
///
/// # Errors
/// Returns `FormatDetection` when no candidate yields a known column signature
pub fn detect_format(path: &Path, sample_rows: usize) -> Result<DetectedFormat> {
    for (delimiter, encoding) in CANDIDATE_FORMATS {
        let columns = match read_header(path, delimiter, encoding, sample_rows) {
            Ok(columns) => columns,
            Err(VulnError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VulnError::Io(e));
            }
            Err(e) => {
                debug!(
                    "Candidate {:?}/{} failed for {}: {e}",
                    delimiter as char,
                    encoding.as_str(),
                    path.display()
                );
                continue;
            }
        };

        if let Some(layout) = SourceLayout::from_columns(&columns) {
            let detected = DetectedFormat {
                delimiter,
                encoding,
                layout,
                columns,
            };
            info!(
                "Detected {} as {} | delimiter={} | encoding={}",
                path.display(),
                layout.as_str(),
                detected.delimiter_label(),
                encoding.as_str()
            );
            return Ok(detected);
        }
    }

    Err(VulnError::FormatDetection {
        path: path.display().to_string(),
        attempts: CANDIDATE_FORMATS.len(),
    })
}

/// Streaming reader over the raw rows of a detected file
///
/// Every column is read as text; mapping to canonical types happens in the
/// layout mappers.
pub struct RawTableReader {
    inner: arrow::csv::Reader<DecodingReader<BufReader<File>>>,
    format: DetectedFormat,
    rows_read: usize,
}

impl RawTableReader {
    /// Open `path` with a previously detected format, yielding batches of at
    /// most `chunk_size` rows
    pub fn open(path: &Path, format: DetectedFormat, chunk_size: usize) -> Result<Self> {
        let schema: SchemaRef = Arc::new(Schema::new(
            format
                .columns
                .iter()
                .map(|name| Field::new(name, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ));
        let inner = ReaderBuilder::new(schema)
            .with_header(true)
            .with_delimiter(format.delimiter)
            .with_batch_size(chunk_size.max(1))
            .with_truncated_rows(true)
            .build(open_decoded(path, format.encoding)?)?;

        Ok(Self {
            inner,
            format,
            rows_read: 0,
        })
    }

    /// Detected format of the underlying file
    #[must_use]
    pub const fn format(&self) -> &DetectedFormat {
        &self.format
    }

    /// Number of data rows read so far
    #[must_use]
    pub const fn rows_read(&self) -> usize {
        self.rows_read
    }
}

impl Iterator for RawTableReader {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.inner.next()?;
        Some(next.map_err(VulnError::from).inspect(|batch| {
            self.rows_read += batch.num_rows();
        }))
    }
}

/// Detect and fully read a raw extract into memory
pub fn read_raw_table(
    path: &Path,
    sample_rows: usize,
    chunk_size: usize,
) -> Result<(DetectedFormat, Vec<RecordBatch>)> {
    let format = detect_format(path, sample_rows)?;
    let reader = RawTableReader::open(path, format.clone(), chunk_size)?;
    let batches = reader.collect::<Result<Vec<_>>>()?;
    Ok((format, batches))
}

/// Read back a household table written by the CSV sink
///
/// Canonical and derived columns get their canonical types; unknown columns
/// stay text.
pub fn read_household_table(path: &Path, chunk_size: usize) -> Result<Vec<RecordBatch>> {
    let (inferred, _) = Format::default()
        .with_header(true)
        .infer_schema(open_decoded(path, TextEncoding::Utf8)?, Some(0))?;
    let schema = Arc::new(Schema::new(
        inferred
            .fields()
            .iter()
            .map(|field| storage_field(field.name()))
            .collect::<Vec<_>>(),
    ));
    let report = check_canonical_compatibility(&schema);
    for issue in &report.issues {
        warn!("{}: {}", path.display(), issue.description);
    }
    debug!(
        "Reading household table {} with {} columns",
        path.display(),
        schema.fields().len()
    );

    ReaderBuilder::new(schema)
        .with_header(true)
        .with_batch_size(chunk_size.max(1))
        .build(open_decoded(path, TextEncoding::Utf8)?)?
        .map(|batch| batch.map_err(VulnError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_bytes(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_semicolon_latin1_family_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bytes(
            &dir,
            "familia.csv",
            b"\"cd_ibge\";\"id_familia\";\"nome\"\n\"2304400\";\"1\";\"Jos\xe9\"\n",
        );
        let format = detect_format(&path, 10).unwrap();
        assert_eq!(format.delimiter, b';');
        assert_eq!(format.encoding, TextEncoding::Latin1);
        assert_eq!(format.layout, SourceLayout::FamilyRegister);
        assert_eq!(format.columns, vec!["cd_ibge", "id_familia", "nome"]);
    }

    #[test]
    fn test_comma_utf8_family_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bytes(
            &dir,
            "familia.csv",
            "cd_ibge,cod_escoa_sanitario_domic_fam\n3550308,1\n".as_bytes(),
        );
        let format = detect_format(&path, 10).unwrap();
        assert_eq!(format.delimiter, b',');
        assert_eq!(format.encoding, TextEncoding::Utf8);
        assert_eq!(format.layout, SourceLayout::FamilyRegister);
    }

    #[test]
    fn test_unknown_header_fails_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bytes(&dir, "other.csv", b"a;b;c\n1;2;3\n");
        let err = detect_format(&path, 10).unwrap_err();
        assert!(matches!(err, VulnError::FormatDetection { attempts: 6, .. }));
    }

    #[test]
    fn test_raw_reader_chunks_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = String::from("cd_ibge;qtde_pessoas\n");
        for i in 0..25 {
            content.push_str(&format!("2304400;{i}\n"));
        }
        let path = write_bytes(&dir, "familia.csv", content.as_bytes());
        let format = detect_format(&path, 10).unwrap();
        let mut reader = RawTableReader::open(&path, format, 10).unwrap();
        let sizes: Vec<usize> = reader
            .by_ref()
            .map(|batch| batch.unwrap().num_rows())
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(reader.rows_read(), 25);
    }
}
