//! Stage 3: histogram of per-product differences.
//!
//! Each difference is classified into the first bin whose inclusive upper
//! bound is not below it; differences above the highest bound go to the
//! overflow bin, so no finite value is dropped. The output key of a bin is its
//! label prefixed with `Difference:`, and its value is the number of products
//! in it.

use std::sync::Arc;

use keydiff_stats::histogram::ThresholdBins;

use crate::{
    dataset::{DatasetLine, LineFormatError},
    stage::Stage,
};

/// Prefix of every histogram output key.
pub const BIN_KEY_PREFIX: &str = "Difference:";

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ClassifyError {
    #[display("{_0}")]
    #[from]
    Format(LineFormatError),
    #[display("{file}:{line_number}: difference is NaN")]
    NotANumber { file: Arc<str>, line_number: usize },
}

/// Output key of the bin labeled `label`.
#[must_use]
pub fn bin_key(label: &str) -> String {
    format!("{BIN_KEY_PREFIX}{label}")
}

/// Counts products per difference range.
#[derive(Debug, Clone, Default)]
pub struct BinningStage {
    bins: ThresholdBins,
}

impl BinningStage {
    pub const NAME: &'static str = "bins";

    #[must_use]
    pub fn new(bins: ThresholdBins) -> Self {
        Self { bins }
    }

    #[must_use]
    pub fn bins(&self) -> &ThresholdBins {
        &self.bins
    }
}

impl Stage for BinningStage {
    type Input = DatasetLine;
    type Key = String;
    type Value = u64;
    type Output = u64;
    type MapError = ClassifyError;
    type ReduceError = std::convert::Infallible;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn map(&self, input: &DatasetLine) -> Result<Vec<(String, u64)>, ClassifyError> {
        let (_product_id, diff) = input.number()?;
        let label = self
            .bins
            .classify(diff)
            .ok_or_else(|| ClassifyError::NotANumber {
                file: Arc::clone(&input.file),
                line_number: input.line_number,
            })?;
        Ok(vec![(bin_key(label), 1)])
    }

    fn reduce(&self, _key: &String, values: Vec<u64>) -> Result<u64, Self::ReduceError> {
        Ok(values.into_iter().sum())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::{counters::MAP_ERRORS, stage};

    fn line(text: &str) -> DatasetLine {
        DatasetLine {
            file: Arc::from("part-r-00000"),
            line_number: 1,
            text: text.to_owned(),
        }
    }

    #[test]
    fn test_map_classifies_difference() {
        let stage = BinningStage::default();
        assert_eq!(
            stage.map(&line("B1\t0.0")).unwrap(),
            [("Difference:0<x≤2".to_owned(), 1)]
        );
        assert_eq!(
            stage.map(&line("B2\t4.0")).unwrap(),
            [("Difference:3<x≤5".to_owned(), 1)]
        );
        assert_eq!(
            stage.map(&line("B3\t3.0")).unwrap(),
            [("Difference:2<x≤3".to_owned(), 1)]
        );
        assert_eq!(
            stage.map(&line("B4\t5.5")).unwrap(),
            [("Difference:x>5".to_owned(), 1)]
        );
    }

    #[test]
    fn test_map_rejects_bad_lines() {
        let stage = BinningStage::default();
        assert!(matches!(
            stage.map(&line("B1\tNaN")),
            Err(ClassifyError::NotANumber { line_number: 1, .. })
        ));
        assert!(matches!(
            stage.map(&line("B1\tabc")),
            Err(ClassifyError::Format(LineFormatError::InvalidValue { .. }))
        ));
        assert!(matches!(
            stage.map(&line("B1")),
            Err(ClassifyError::Format(LineFormatError::MissingSeparator { .. }))
        ));
    }

    #[test]
    fn test_infinite_difference_overflows() {
        let stage = BinningStage::default();
        assert_eq!(
            stage.map(&line("B1\tinf")).unwrap(),
            [("Difference:x>5".to_owned(), 1)]
        );
    }

    #[test]
    fn test_custom_bins() {
        let bins = ThresholdBins::new([(0.5, "small"), (1.0, "medium")], "large").unwrap();
        let stage = BinningStage::new(bins);
        assert_eq!(
            stage.map(&line("B1\t0.75")).unwrap(),
            [("Difference:medium".to_owned(), 1)]
        );
    }

    #[test]
    fn test_stage_counts_products_per_bin() {
        let partitions = vec![
            vec![line("B1\t0.0"), line("B2\t4.0"), line("B3\t1.5")],
            vec![line("B4\t9.0"), line("B5\t2.0"), line("B6\tbad")],
        ];
        let output = stage::run(
            &BinningStage::default(),
            &partitions,
            NonZeroUsize::new(3).unwrap(),
        );
        assert_eq!(
            output.records,
            [
                ("Difference:0<x≤2".to_owned(), 3),
                ("Difference:3<x≤5".to_owned(), 1),
                ("Difference:x>5".to_owned(), 1)
            ]
        );
        assert_eq!(output.counters.get(MAP_ERRORS), 1);
    }
}
