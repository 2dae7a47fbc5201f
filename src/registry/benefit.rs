//! Benefit payment register mapping

use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use log::debug;

use super::codes;
use crate::error::Result;
use crate::utils::arrow::{parse_decimal, string_column};

/// Raw column holding the recipient's NIS
pub const RECIPIENT_NIS_COLUMN: &str = "nis_favorecido";

/// Raw column holding the instalment value
pub const INSTALMENT_COLUMN: &str = "valor_parcela";

/// One benefit instalment
#[derive(Debug, Clone, PartialEq)]
pub struct BenefitPayment {
    /// Normalized recipient NIS
    pub nis: String,
    /// Instalment value; `None` when the cell is empty or unparseable
    pub amount: Option<f64>,
}

/// Map one raw benefit batch to the payments it lists
///
/// Rows without a recipient NIS cannot be linked and are skipped.
pub fn map_benefit_batch(raw: &RecordBatch) -> Result<Vec<BenefitPayment>> {
    let Some(nis) = string_column(raw, RECIPIENT_NIS_COLUMN) else {
        debug!(
            "Benefit batch has no '{}' column, skipping {} rows",
            RECIPIENT_NIS_COLUMN,
            raw.num_rows()
        );
        return Ok(Vec::new());
    };
    let amounts = string_column(raw, INSTALMENT_COLUMN);

    let payments: Vec<BenefitPayment> = (0..raw.num_rows())
        .filter(|row| nis.is_valid(*row))
        .filter_map(|row| {
            let key = codes::normalize_key(nis.value(row))?;
            let amount = amounts
                .filter(|column| column.is_valid(row))
                .and_then(|column| parse_decimal(column.value(row)));
            Some(BenefitPayment { nis: key, amount })
        })
        .collect();

    debug!(
        "Mapped {} payments from {} benefit rows",
        payments.len(),
        raw.num_rows()
    );
    Ok(payments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{ArrayRef, StringArray};

    #[test]
    fn test_maps_payments_with_decimal_comma() {
        let raw = RecordBatch::try_from_iter(vec![
            (
                "uf",
                Arc::new(StringArray::from(vec!["CE", "CE", "SP"])) as ArrayRef,
            ),
            (
                "nis_favorecido",
                Arc::new(StringArray::from(vec![Some("00012"), Some(""), Some("77")])) as ArrayRef,
            ),
            (
                "valor_parcela",
                Arc::new(StringArray::from(vec!["600,00", "150,00", "1.250,50"])) as ArrayRef,
            ),
        ])
        .unwrap();

        let payments = map_benefit_batch(&raw).unwrap();
        assert_eq!(
            payments,
            vec![
                BenefitPayment {
                    nis: "12".to_string(),
                    amount: Some(600.0)
                },
                BenefitPayment {
                    nis: "77".to_string(),
                    amount: Some(1250.5)
                },
            ]
        );
    }
}
