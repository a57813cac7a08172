//! Compensated summation.
//!
//! Naive `f64` accumulation loses low-order bits once the running sum grows
//! much larger than the values being added. Review corpora can put millions of
//! ratings under a single product key, so the averaging stage sums with the
//! Neumaier variant of Kahan summation instead.
//!
//! # Examples
//!
//! ```
//! use keydiff_stats::summation::CompensatedSum;
//!
//! let values = [1e16, 1.0, -1e16];
//! assert_eq!(values.iter().sum::<f64>(), 0.0);
//!
//! let sum = values.into_iter().collect::<CompensatedSum>();
//! assert_eq!(sum.value(), 1.0);
//! ```

/// A Neumaier-compensated running sum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    /// Creates an empty sum.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sum: 0.0,
            compensation: 0.0,
        }
    }

    /// Adds a value to the sum.
    pub fn add(&mut self, value: f64) {
        let total = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - total) + value;
        } else {
            self.compensation += (value - total) + self.sum;
        }
        self.sum = total;
    }

    /// Returns the compensated total.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

impl Extend<f64> for CompensatedSum {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = f64>,
    {
        for value in iter {
            self.add(value);
        }
    }
}

impl FromIterator<f64> for CompensatedSum {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut sum = Self::new();
        sum.extend(iter);
        sum
    }
}

/// Arithmetic mean accumulated one value at a time.
///
/// The mean is only defined once at least one value has been pushed, so
/// [`RunningMean::mean`] returns `None` for an empty accumulator instead of
/// dividing by zero.
///
/// # Examples
///
/// ```
/// use keydiff_stats::summation::RunningMean;
///
/// let mut mean = RunningMean::new();
/// assert_eq!(mean.mean(), None);
///
/// mean.push(5.0);
/// mean.push(1.0);
/// assert_eq!(mean.mean(), Some(3.0));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    sum: CompensatedSum,
    count: u64,
}

impl RunningMean {
    /// Creates an empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sum: CompensatedSum::new(),
            count: 0,
        }
    }

    /// Adds one observation.
    pub fn push(&mut self, value: f64) {
        self.sum.add(value);
        self.count += 1;
    }

    /// Number of observations pushed so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns `sum / count`, or `None` when no value has been pushed.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum.value() / self.count as f64)
    }
}

impl Extend<f64> for RunningMean {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = f64>,
    {
        for value in iter {
            self.push(value);
        }
    }
}

impl FromIterator<f64> for RunningMean {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut mean = Self::new();
        mean.extend(iter);
        mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sum_is_zero() {
        assert_eq!(CompensatedSum::new().value(), 0.0);
    }

    #[test]
    fn test_compensation_recovers_small_terms() {
        let mut sum = CompensatedSum::new();
        sum.add(1.0);
        for _ in 0..10_000 {
            sum.add(1e-16);
        }
        assert!((sum.value() - (1.0 + 1e-12)).abs() < 1e-15);
    }

    #[test]
    fn test_empty_mean_is_undefined() {
        let mean = RunningMean::new();
        assert_eq!(mean.count(), 0);
        assert_eq!(mean.mean(), None);
    }

    #[test]
    fn test_single_value_mean() {
        let mean = [4.0].into_iter().collect::<RunningMean>();
        assert_eq!(mean.mean(), Some(4.0));
    }

    #[test]
    fn test_mean_of_ratings() {
        let mean = [5.0, 4.0, 4.0, 1.0].into_iter().collect::<RunningMean>();
        assert_eq!(mean.count(), 4);
        assert_eq!(mean.mean(), Some(3.5));
    }

    #[test]
    fn test_large_group_mean_is_exact() {
        let mean = std::iter::repeat_n(0.1, 1_000_000).collect::<RunningMean>();
        let average = mean.mean().unwrap();
        assert!((average - 0.1).abs() < 1e-15, "average = {average}");
    }
}
