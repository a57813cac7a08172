//! Keyword/rating analysis of product reviews as a three-stage batch pipeline.
//!
//! The pipeline tests whether reviews mentioning certain keywords ("reviews",
//! "comments") come with a different average rating than the product's reviews
//! overall, and summarizes the size of that difference as a histogram.
//!
//! # Overview
//!
//! Each stage is one map → group-by-key → reduce pass ([`stage`]), and each
//! stage's output is a key/value [`dataset`] consumed by the next:
//!
//! 1. **Average** ([`average::AverageStage`]): parse reviews, emit the rating
//!    under `<productId>` and, when the text mentions a keyword, under
//!    `<productId>Contains`; reduce each key to its mean rating
//! 2. **Difference** ([`difference::DifferenceStage`]): strip the `Contains`
//!    tag and fold the averages of each product into `|tagged - plain|`
//! 3. **Bins** ([`binning::BinningStage`]): classify each difference into
//!    ordered ranges (`0<x≤2`, `2<x≤3`, `3<x≤5`, overflow `x>5`) and count
//!    products per range
//!
//! [`pipeline::Pipeline`] runs the stages in order over a
//! [`source::RecordSource`].
//!
//! # Failure handling
//!
//! - A record or line that cannot be parsed is logged, counted and skipped;
//!   it never aborts a stage.
//! - A stage that cannot read its input or write its output fails the whole
//!   run and no later stage executes.
//!
//! # Example
//!
//! ```no_run
//! use std::{fs::File, io::BufReader};
//!
//! use keydiff_pipeline::{
//!     pipeline::{Pipeline, PipelineConfig, StagePaths},
//!     source::JsonLinesSource,
//! };
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//!
//! let reviews = JsonLinesSource::new(BufReader::new(File::open("reviews.json")?));
//! let paths = StagePaths {
//!     averages: "out/average".into(),
//!     differences: "out/difference".into(),
//!     histogram: "out/bins".into(),
//! };
//! let report = Pipeline::new(PipelineConfig::default()).run(reviews, &paths)?;
//!
//! for bin in &report.histogram.bins {
//!     println!("{}: {}", bin.label, bin.count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod average;
pub mod binning;
pub mod counters;
pub mod dataset;
pub mod difference;
pub mod pipeline;
pub mod record;
pub mod source;
pub mod stage;
