//! Numeric building blocks for the keydiff review pipeline.
//!
//! This crate provides the small statistical tools the pipeline stages and the
//! CLI summary are built on:
//!
//! - **Compensated summation**: Neumaier summation and a running mean that stay
//!   accurate over very large groups
//! - **Descriptive statistics**: min, max, mean, median and spread of a dataset
//! - **Threshold histograms**: ordered `(lower, upper]` bins defined by ascending
//!   upper bounds, with a mandatory overflow bin
//!
//! # Modules
//!
//! - [`summation`]: Compensated sums and running means
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`histogram`]: Threshold bins and frequency tables
//!
//! # Examples
//!
//! ## Computing a running mean
//!
//! ```
//! use keydiff_stats::summation::RunningMean;
//!
//! let mean = [4.0, 5.0, 3.0].into_iter().collect::<RunningMean>();
//! assert_eq!(mean.count(), 3);
//! assert_eq!(mean.mean(), Some(4.0));
//! ```
//!
//! ## Classifying values into threshold bins
//!
//! ```
//! use keydiff_stats::histogram::ThresholdBins;
//!
//! let bins = ThresholdBins::default();
//! assert_eq!(bins.classify(0.0), Some("0<x≤2"));
//! assert_eq!(bins.classify(2.0), Some("0<x≤2"));
//! assert_eq!(bins.classify(4.0), Some("3<x≤5"));
//! assert_eq!(bins.classify(7.5), Some("x>5"));
//! ```
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use keydiff_stats::descriptive::DescriptiveStats;
//!
//! let stats = DescriptiveStats::new([1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! assert_eq!(stats.median, 3.0);
//! ```

pub mod descriptive;
pub mod histogram;
pub mod summation;
