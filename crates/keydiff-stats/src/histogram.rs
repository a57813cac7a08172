//! Threshold histograms.
//!
//! A [`ThresholdBins`] set is an ascending list of inclusive upper bounds, each
//! paired with a label, followed by a mandatory overflow bin. Bin `i` covers
//! `(upper[i - 1], upper[i]]` (the first bin starts at 0 for labeling
//! purposes), and the overflow bin covers everything above the last bound. A
//! value is assigned to the first bin whose upper bound is greater than or
//! equal to it, so every non-NaN value lands in exactly one bin.
//!
//! # Examples
//!
//! ```
//! use keydiff_stats::histogram::{Histogram, ThresholdBins};
//!
//! use std::collections::BTreeMap;
//!
//! let bins = ThresholdBins::from_upper_bounds(&[2.0, 3.0, 5.0]).unwrap();
//! assert_eq!(bins.classify(2.0), Some("0<x≤2"));
//! assert_eq!(bins.classify(9.0), Some("x>5"));
//!
//! let counts = BTreeMap::from([("0<x≤2".to_owned(), 2), ("x>5".to_owned(), 1)]);
//! let (histogram, unknown) = Histogram::from_label_counts(&bins, &counts);
//! let counts = histogram
//!     .bins
//!     .iter()
//!     .map(|bin| (bin.label.as_str(), bin.count))
//!     .collect::<Vec<_>>();
//! assert_eq!(
//!     counts,
//!     [("0<x≤2", 2), ("2<x≤3", 0), ("3<x≤5", 0), ("x>5", 1)]
//! );
//! assert!(unknown.is_empty());
//! ```

use std::collections::BTreeMap;

/// Error returned when a bin layout is rejected.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ThresholdError {
    #[display("at least one threshold is required")]
    Empty,
    #[display("threshold #{index} is not finite: {value}")]
    NonFinite { index: usize, value: f64 },
    #[display("threshold #{index} ({value}) must be greater than the previous one ({previous})")]
    NotAscending {
        index: usize,
        previous: f64,
        value: f64,
    },
    #[display("label '{label}' is used by more than one bin")]
    DuplicateLabel { label: String },
}

/// A single bounded bin: values up to and including `upper`.
#[derive(Debug, Clone, PartialEq)]
struct ThresholdBin {
    /// Inclusive upper bound of the bin.
    upper: f64,
    /// Label identifying the bin in output.
    label: String,
}

/// Ordered, non-overlapping bins over a non-negative magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdBins {
    bins: Vec<ThresholdBin>,
    overflow_label: String,
}

impl Default for ThresholdBins {
    /// The `0<x≤2`, `2<x≤3`, `3<x≤5` layout with a `x>5` overflow bin.
    fn default() -> Self {
        Self::from_upper_bounds(&[2.0, 3.0, 5.0]).expect("default thresholds are valid")
    }
}

impl ThresholdBins {
    /// Creates a layout from explicit `(upper, label)` pairs and an overflow label.
    pub fn new<I, S>(bins: I, overflow_label: impl Into<String>) -> Result<Self, ThresholdError>
    where
        I: IntoIterator<Item = (f64, S)>,
        S: Into<String>,
    {
        let bins = bins
            .into_iter()
            .map(|(upper, label)| ThresholdBin {
                upper,
                label: label.into(),
            })
            .collect::<Vec<_>>();
        let overflow_label = overflow_label.into();

        if bins.is_empty() {
            return Err(ThresholdError::Empty);
        }
        for (index, bin) in bins.iter().enumerate() {
            if !bin.upper.is_finite() {
                return Err(ThresholdError::NonFinite {
                    index,
                    value: bin.upper,
                });
            }
            if let Some(previous) = index.checked_sub(1).map(|i| bins[i].upper)
                && bin.upper <= previous
            {
                return Err(ThresholdError::NotAscending {
                    index,
                    previous,
                    value: bin.upper,
                });
            }
        }
        let mut labels = bins.iter().map(|bin| bin.label.as_str()).collect::<Vec<_>>();
        labels.push(&overflow_label);
        labels.sort_unstable();
        if let Some(pair) = labels.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ThresholdError::DuplicateLabel {
                label: pair[0].to_owned(),
            });
        }

        Ok(Self {
            bins,
            overflow_label,
        })
    }

    /// Creates a layout from ascending upper bounds, generating `lo<x≤hi` labels
    /// (the first lower bound is 0) and an `x>max` overflow label.
    ///
    /// # Examples
    ///
    /// ```
    /// # use keydiff_stats::histogram::ThresholdBins;
    /// let bins = ThresholdBins::from_upper_bounds(&[1.0, 2.5]).unwrap();
    /// assert_eq!(bins.labels().collect::<Vec<_>>(), ["0<x≤1", "1<x≤2.5", "x>2.5"]);
    /// ```
    pub fn from_upper_bounds(upper_bounds: &[f64]) -> Result<Self, ThresholdError> {
        let lower_bounds = std::iter::once(0.0).chain(upper_bounds.iter().copied());
        let bins = lower_bounds
            .zip(upper_bounds)
            .map(|(lower, upper)| (*upper, format!("{lower}<x≤{upper}")))
            .collect::<Vec<_>>();
        let overflow_label = match upper_bounds.last() {
            Some(max) => format!("x>{max}"),
            None => return Err(ThresholdError::Empty),
        };
        Self::new(bins, overflow_label)
    }

    /// Label of the overflow bin.
    #[must_use]
    pub fn overflow_label(&self) -> &str {
        &self.overflow_label
    }

    /// All labels in bin order, ending with the overflow label.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.bins
            .iter()
            .map(|bin| bin.label.as_str())
            .chain(std::iter::once(self.overflow_label.as_str()))
    }

    /// Returns the index of the bin `value` falls into.
    ///
    /// The index one past the last bounded bin is the overflow bin. Returns
    /// `None` only for NaN.
    #[must_use]
    pub fn index_of(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        Some(self.bins.partition_point(|bin| bin.upper < value))
    }

    /// Returns the label of the bin `value` falls into, or `None` for NaN.
    #[must_use]
    pub fn classify(&self, value: f64) -> Option<&str> {
        let index = self.index_of(value)?;
        Some(
            self.bins
                .get(index)
                .map_or(self.overflow_label.as_str(), |bin| bin.label.as_str()),
        )
    }
}

/// A frequency table over a [`ThresholdBins`] layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// One entry per bin in layout order; the last entry is the overflow bin.
    pub bins: Vec<HistogramBin>,
}

/// A single bin of a [`Histogram`].
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    /// The label of the bin.
    pub label: String,
    /// Inclusive upper bound, `None` for the overflow bin.
    pub upper: Option<f64>,
    /// The number of values that fell into this bin.
    pub count: u64,
}

impl Histogram {
    /// Builds a histogram from counts already aggregated per label.
    ///
    /// Bins without an entry in `counts` get a zero count. Labels in `counts`
    /// that are not part of `layout` are returned alongside the histogram.
    #[must_use]
    pub fn from_label_counts<'a>(
        layout: &ThresholdBins,
        counts: &'a BTreeMap<String, u64>,
    ) -> (Self, Vec<(&'a str, u64)>) {
        let mut histogram = Self::empty(layout);
        let mut unknown = vec![];
        for (label, &count) in counts {
            match histogram.bins.iter_mut().find(|bin| bin.label == *label) {
                Some(bin) => bin.count += count,
                None => unknown.push((label.as_str(), count)),
            }
        }
        (histogram, unknown)
    }

    fn empty(layout: &ThresholdBins) -> Self {
        let bins = layout
            .bins
            .iter()
            .map(|bin| HistogramBin {
                label: bin.label.clone(),
                upper: Some(bin.upper),
                count: 0,
            })
            .chain(std::iter::once(HistogramBin {
                label: layout.overflow_label.clone(),
                upper: None,
                count: 0,
            }))
            .collect();
        Self { bins }
    }

    /// Sum of all bin counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|bin| bin.count).sum()
    }
}
