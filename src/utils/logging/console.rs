//! Console output for the command line

use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};

use crate::reader::DetectedFormat;

/// Print the detected format of a source file
pub fn print_detected_format(format: &DetectedFormat) {
    println!("Layout:    {}", format.layout);
    println!("Encoding:  {}", format.encoding.as_str());
    println!("Delimiter: {}", format.delimiter_label());
    println!("Columns:   {}", format.columns.len());
    for column in &format.columns {
        println!("  - {column}");
    }
}

/// Print the first `num_rows` rows of a batch, one line per row
///
/// # Errors
/// Returns an error if a column cannot be formatted
pub fn print_sample_rows(batch: &RecordBatch, num_rows: usize) -> Result<(), ArrowError> {
    let options = FormatOptions::default().with_null("NULL");
    let formatters = batch
        .columns()
        .iter()
        .map(|column| ArrayFormatter::try_new(column.as_ref(), &options))
        .collect::<Result<Vec<_>, _>>()?;
    let schema = batch.schema();

    println!("First {} rows:", num_rows.min(batch.num_rows()));
    for row in 0..num_rows.min(batch.num_rows()) {
        let cells: Vec<String> = schema
            .fields()
            .iter()
            .zip(&formatters)
            .map(|(field, formatter)| format!("{}={}", field.name(), formatter.value(row)))
            .collect();
        println!("  [{row}] {}", cells.join(", "));
    }
    Ok(())
}
