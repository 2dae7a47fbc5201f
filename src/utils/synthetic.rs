//! Synthetic household data
//!
//! Seeded generator of canonical household batches for demos and tests. The
//! distributions loosely follow the register: exponential incomes, most
//! households with water and sewage access, a minority receiving transfers.

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, VulnError};
use crate::schema::canonical_schema;

/// Municipalities households are spread over
const MUNICIPALITIES: [i64; 5] = [3550308, 3304557, 3106200, 2927408, 2611606];

/// Mean of the exponential household income distribution
const MEAN_INCOME: f64 = 500.0;

/// Generator of canonical household batches
pub struct SyntheticHouseholds {
    rng: StdRng,
    missing_rate: f64,
    next_id: usize,
}

impl SyntheticHouseholds {
    /// Create a generator with a fixed seed
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            missing_rate: 0.0,
            next_id: 0,
        }
    }

    /// Blank each non-identifier cell with probability `rate`
    #[must_use]
    pub fn with_missing_rate(mut self, rate: f64) -> Self {
        self.missing_rate = rate;
        self
    }

    fn column<T>(
        &mut self,
        rows: usize,
        mut sample: impl FnMut(&mut StdRng) -> T,
    ) -> Vec<Option<T>> {
        (0..rows)
            .map(|_| {
                let value = sample(&mut self.rng);
                let blank = self.missing_rate > 0.0 && self.rng.random_bool(self.missing_rate);
                (!blank).then_some(value)
            })
            .collect()
    }

    /// Generate `rows` households with the canonical schema
    ///
    /// # Errors
    /// Returns `InvalidConfig` when the missing rate is outside [0, 1]
    pub fn generate(&mut self, rows: usize) -> Result<RecordBatch> {
        if !(0.0..=1.0).contains(&self.missing_rate) {
            return Err(VulnError::InvalidConfig(format!(
                "missing rate {} is outside [0, 1]",
                self.missing_rate
            )));
        }

        let ids: Vec<String> = (self.next_id..self.next_id + rows)
            .map(|id| format!("SYN{id:07}"))
            .collect();
        self.next_id += rows;

        let municipality = self.column(rows, |rng| {
            MUNICIPALITIES[rng.random_range(0..MUNICIPALITIES.len())]
        });
        let age = self.column(rows, |rng| rng.random_range(0..80));
        let sex = self.column(rows, |rng| if rng.random_bool(0.5) { "M" } else { "F" });
        let education = self.column(rows, |rng| rng.random_range(0..=5));
        let income = self.column(rows, |rng| {
            let u: f64 = rng.random();
            (-MEAN_INCOME * (1.0 - u).ln() * 100.0).round() / 100.0
        });
        let size = self.column(rows, |rng| rng.random_range(1..8));
        let disability = self.column(rows, |rng| rng.random_bool(0.15));
        let employment = self.column(rows, |rng| rng.random_range(0..=2));
        let housing = self.column(rows, |rng| rng.random_range(0..=2));
        let water = self.column(rows, |rng| rng.random_bool(0.8));
        let sewage = self.column(rows, |rng| rng.random_bool(0.7));
        let electricity = self.column(rows, |rng| rng.random_bool(0.95));
        let garbage = self.column(rows, |rng| rng.random_bool(0.85));
        let transfer: Vec<bool> = (0..rows).map(|_| self.rng.random_bool(0.3)).collect();
        let amount: Vec<f64> = transfer
            .iter()
            .map(|receives| {
                if *receives {
                    (self.rng.random_range(89.0..400.0_f64) * 100.0).round() / 100.0
                } else {
                    0.0
                }
            })
            .collect();

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(Int64Array::from(municipality)),
            Arc::new(Int32Array::from(age)),
            Arc::new(StringArray::from(sex)),
            Arc::new(Int32Array::from(education)),
            Arc::new(Float64Array::from(income)),
            Arc::new(Int32Array::from(size)),
            Arc::new(BooleanArray::from(disability)),
            Arc::new(Int32Array::from(employment)),
            Arc::new(Int32Array::from(housing)),
            Arc::new(BooleanArray::from(water)),
            Arc::new(BooleanArray::from(sewage)),
            Arc::new(BooleanArray::from(electricity)),
            Arc::new(BooleanArray::from(garbage)),
            Arc::new(BooleanArray::from(transfer)),
            Arc::new(Float64Array::from(amount)),
        ];
        Ok(RecordBatch::try_new(canonical_schema(), columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    #[test]
    fn test_same_seed_same_batch() {
        let a = SyntheticHouseholds::new(42).generate(100).unwrap();
        let b = SyntheticHouseholds::new(42).generate(100).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.schema(), canonical_schema());
    }

    #[test]
    fn test_ids_continue_across_batches() {
        let mut generator = SyntheticHouseholds::new(1);
        generator.generate(3).unwrap();
        let second = generator.generate(2).unwrap();
        let ids = second.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(ids.value(0), "SYN0000003");
    }

    #[test]
    fn test_missing_rate_blanks_cells() {
        let batch = SyntheticHouseholds::new(5)
            .with_missing_rate(0.3)
            .generate(200)
            .unwrap();
        assert_eq!(batch.column(0).null_count(), 0);
        assert!(batch.column(2).null_count() > 0);
        assert!(SyntheticHouseholds::new(5).with_missing_rate(1.5).generate(1).is_err());
    }
}
