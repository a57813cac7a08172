//! Stage 2: per-product difference between the tagged and plain averages.
//!
//! The `Contains` suffix is stripped from every averaged key, so the tagged and
//! the plain average of a product meet in the same group. The group is folded
//! with `acc = |acc - v|` starting from zero:
//!
//! - two averages `a`, `b` give `|a - b|`, in either order;
//! - a single average (no review of the product mentioned a keyword) gives the
//!   average itself, `|0 - a| = a`.
//!
//! For three or more values the fold depends on the order of the values, so
//! such groups are rejected.
//!
//! Product ids that themselves end in `Contains` collide with another product
//! once the suffix is stripped. Such a collision is only detected when it
//! yields three or more values. If `XContains` and `X` were both reviewed
//! without any keyword, their two plain averages form a group of two and are
//! combined into `|a - b|` like a tagged/plain pair, so the difference
//! reported for `X` compares two unrelated products.

use crate::{
    average::TAG_SUFFIX,
    dataset::{DatasetLine, LineFormatError},
    stage::Stage,
};

/// An average together with the stage-1 key it was read under.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedAverage {
    pub source_key: String,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum CombineError {
    #[display("no averages were delivered")]
    Empty,
    #[display(
        "{count} averages share the product id (from {source_keys:?}); at most 2 are allowed",
        count = source_keys.len()
    )]
    TooManyValues { source_keys: Vec<String> },
}

/// Strips a single trailing [`TAG_SUFFIX`] from a stage-1 key.
#[must_use]
pub fn bare_product_id(key: &str) -> &str {
    key.strip_suffix(TAG_SUFFIX).unwrap_or(key)
}

/// Folds a group of averages into a non-negative difference.
///
/// Values are folded in ascending `source_key` order, so the result never
/// depends on delivery order.
pub fn combine(mut values: Vec<SourcedAverage>) -> Result<f64, CombineError> {
    values.sort_by(|a, b| a.source_key.cmp(&b.source_key));
    match values.len() {
        0 => Err(CombineError::Empty),
        1 | 2 => Ok(values
            .iter()
            .fold(0.0_f64, |acc, v| (acc - v.average).abs())),
        _ => Err(CombineError::TooManyValues {
            source_keys: values.into_iter().map(|v| v.source_key).collect(),
        }),
    }
}

/// Combines the tagged and plain averages of each product.
#[derive(Debug, Clone, Copy, Default)]
pub struct DifferenceStage;

impl DifferenceStage {
    pub const NAME: &'static str = "difference";
}

impl Stage for DifferenceStage {
    type Input = DatasetLine;
    type Key = String;
    type Value = SourcedAverage;
    type Output = f64;
    type MapError = LineFormatError;
    type ReduceError = CombineError;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn map(&self, input: &DatasetLine) -> Result<Vec<(String, SourcedAverage)>, LineFormatError> {
        let (key, average) = input.number()?;
        Ok(vec![(
            bare_product_id(key).to_owned(),
            SourcedAverage {
                source_key: key.to_owned(),
                average,
            },
        )])
    }

    fn reduce(&self, _key: &String, values: Vec<SourcedAverage>) -> Result<f64, CombineError> {
        combine(values)
    }
}
