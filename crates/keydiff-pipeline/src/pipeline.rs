//! The three-stage keyword/rating pipeline.
//!
//! ```text
//! RecordSource ─▶ [average] ─▶ averages/ ─▶ [difference] ─▶ differences/ ─▶ [bins] ─▶ histogram/
//! ```
//!
//! Stages run strictly one after another: each stage writes its complete
//! dataset (including the `_SUCCESS` marker) before the next one reads it back
//! from disk. Any stage failure stops the run; the datasets written so far are
//! left in place.

use std::{
    collections::BTreeMap,
    io,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread,
};

use keydiff_stats::{
    descriptive::DescriptiveStats,
    histogram::{Histogram, ThresholdBins},
};

use crate::{
    average::{AverageStage, KeywordSet},
    binning::{BIN_KEY_PREFIX, BinningStage},
    counters::Counters,
    dataset::{self, DatasetError},
    difference::DifferenceStage,
    source::{self, RecordSource, ScanConfig},
    stage::{self, StageOutput},
};

/// Settings of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Keywords whose presence tags a review.
    pub keywords: KeywordSet,
    /// Histogram layout of the final stage.
    pub bins: ThresholdBins,
    /// Worker threads per map and reduce phase.
    pub workers: NonZeroUsize,
    /// Partitioning of the record source and of intermediate datasets.
    pub scan: ScanConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keywords: KeywordSet::default(),
            bins: ThresholdBins::default(),
            workers: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            scan: ScanConfig::default(),
        }
    }
}

/// Output locations of the three stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePaths {
    pub averages: PathBuf,
    pub differences: PathBuf,
    pub histogram: PathBuf,
}

impl StagePaths {
    fn all(&self) -> [&Path; 3] {
        [&self.averages, &self.differences, &self.histogram]
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum PipelineError {
    #[display("stage '{stage}' failed to read input records: {source}")]
    Source {
        stage: &'static str,
        source: io::Error,
    },
    #[display("stage '{stage}' failed: {source}")]
    Dataset {
        stage: &'static str,
        source: DatasetError,
    },
}

/// Counters of one finished stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: &'static str,
    pub output: PathBuf,
    pub counters: Counters,
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Stages in execution order.
    pub stages: Vec<StageReport>,
    /// Number of products per difference range.
    pub histogram: Histogram,
    /// Statistics over the per-product differences, `None` if there were none.
    pub differences: Option<DescriptiveStats>,
}

impl PipelineReport {
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|stage| stage.name == name)
    }
}

/// Runs the three stages.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage, reading reviews from `records` and writing the three
    /// datasets to `paths`.
    ///
    /// All output paths must be absent; this is checked before any stage runs.
    pub fn run<S>(&self, records: S, paths: &StagePaths) -> Result<PipelineReport, PipelineError>
    where
        S: RecordSource,
    {
        for path in paths.all() {
            dataset::ensure_absent(path).map_err(|source| PipelineError::Dataset {
                stage: AverageStage::NAME,
                source,
            })?;
        }
        let workers = self.config.workers;
        let batch_size = self.config.scan.batch_size;
        let mut stages = vec![];

        let average = AverageStage::new(self.config.keywords.clone());
        let batches = source::batches(records, &self.config.scan);
        let averages = stage::run_streaming(&average, batches, workers).map_err(|source| {
            PipelineError::Source {
                stage: AverageStage::NAME,
                source,
            }
        })?;
        stages.push(write_stage(&averages, &paths.averages, dataset::format_value)?);

        let partitions = read_stage_input(DifferenceStage::NAME, &paths.averages, batch_size)?;
        let differences = stage::run(&DifferenceStage, &partitions, workers);
        drop(partitions);
        stages.push(write_stage(
            &differences,
            &paths.differences,
            dataset::format_value,
        )?);

        let binning = BinningStage::new(self.config.bins.clone());
        let partitions = read_stage_input(BinningStage::NAME, &paths.differences, batch_size)?;
        let bins = stage::run(&binning, &partitions, workers);
        drop(partitions);
        stages.push(write_stage(&bins, &paths.histogram, |count: u64| {
            count.to_string()
        })?);

        let label_counts = bins
            .records
            .iter()
            .map(|(key, count)| {
                let label = key.strip_prefix(BIN_KEY_PREFIX).unwrap_or(key);
                (label.to_owned(), *count)
            })
            .collect::<BTreeMap<_, _>>();
        let (histogram, unknown) = Histogram::from_label_counts(binning.bins(), &label_counts);
        for (label, count) in unknown {
            tracing::warn!(label, count, "histogram output has a bin outside the layout");
        }
        let differences =
            DescriptiveStats::new(differences.records.iter().map(|(_, diff)| *diff));

        Ok(PipelineReport {
            stages,
            histogram,
            differences,
        })
    }
}

fn read_stage_input(
    stage: &'static str,
    path: &Path,
    batch_size: NonZeroUsize,
) -> Result<Vec<Vec<dataset::DatasetLine>>, PipelineError> {
    dataset::read_partitions(path, batch_size)
        .map_err(|source| PipelineError::Dataset { stage, source })
}

fn write_stage<O, F>(
    output: &StageOutput<String, O>,
    path: &Path,
    format: F,
) -> Result<StageReport, PipelineError>
where
    O: Copy,
    F: Fn(O) -> String,
{
    let records = output
        .records
        .iter()
        .map(|(key, value)| (key.as_str(), format(*value)));
    let written = dataset::write(path, records).map_err(|source| PipelineError::Dataset {
        stage: output.name,
        source,
    })?;
    tracing::info!(
        stage = output.name,
        records = written,
        path = %path.display(),
        "dataset written"
    );
    Ok(StageReport {
        name: output.name,
        output: path.to_owned(),
        counters: output.counters.clone(),
    })
}
