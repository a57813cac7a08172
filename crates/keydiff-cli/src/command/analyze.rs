use std::{io, num::NonZeroUsize, path::PathBuf};

use anyhow::Context;
use chrono::Utc;
use keydiff_pipeline::{
    average::KeywordSet,
    counters::{MAP_ERRORS, REDUCE_ERRORS, ROWS_PROCESSED},
    pipeline::{Pipeline, PipelineConfig, PipelineReport, StagePaths},
    source::{JsonLinesSource, ScanConfig},
};
use keydiff_stats::histogram::{Histogram, ThresholdBins};

use crate::{
    schema::summary::RunSummary,
    util::{self, Output},
};

const MAX_BAR_WIDTH: u64 = 50;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct AnalyzeArg {
    /// Output directory of the per-key rating averages
    #[arg(value_name = "AVERAGE_OUTPUT")]
    average_output: PathBuf,
    /// Output directory of the per-product differences
    #[arg(value_name = "DIFFERENCE_OUTPUT")]
    difference_output: PathBuf,
    /// Output directory of the difference histogram
    #[arg(value_name = "HISTOGRAM_OUTPUT")]
    histogram_output: PathBuf,
    /// JSON-Lines review file (reads stdin when omitted)
    #[arg(long)]
    input: Option<PathBuf>,
    /// Number of map/reduce worker threads (defaults to available parallelism)
    #[arg(long)]
    workers: Option<NonZeroUsize>,
    /// Number of records per map partition
    #[arg(long, default_value_t = ScanConfig::DEFAULT_BATCH_SIZE)]
    scan_batch_size: NonZeroUsize,
    /// Keyword tagging a review (repeatable, replaces the default keywords)
    #[arg(long = "keyword", value_name = "WORD")]
    keywords: Vec<String>,
    /// Inclusive upper bound of a histogram bin (repeatable, ascending)
    #[arg(long = "threshold", value_name = "X", allow_negative_numbers = true)]
    thresholds: Vec<f64>,
    /// Write the run summary as JSON to this path ('-' for stdout)
    #[arg(long)]
    summary: Option<PathBuf>,
}

impl AnalyzeArg {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = PipelineConfig {
            scan: ScanConfig {
                batch_size: self.scan_batch_size,
            },
            ..PipelineConfig::default()
        };
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if !self.keywords.is_empty() {
            config.keywords = KeywordSet::new(&self.keywords);
            if config.keywords.keywords().next().is_none() {
                tracing::warn!("all keywords are empty; no review will be tagged");
            }
        }
        if !self.thresholds.is_empty() {
            config.bins = ThresholdBins::from_upper_bounds(&self.thresholds)
                .context("Invalid --threshold values")?;
        }
        Ok(config)
    }

    fn stage_paths(&self) -> StagePaths {
        StagePaths {
            averages: self.average_output.clone(),
            differences: self.difference_output.clone(),
            histogram: self.histogram_output.clone(),
        }
    }
}

pub(crate) fn run(arg: &AnalyzeArg) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(arg.pipeline_config()?);
    let paths = arg.stage_paths();
    tracing::debug!(config = ?pipeline.config(), ?paths, "starting pipeline");

    let result = match &arg.input {
        Some(path) => pipeline.run(util::open_input(path)?, &paths),
        None => pipeline.run(JsonLinesSource::new(io::stdin().lock()), &paths),
    };
    let report = result.context("Pipeline failed")?;

    log_report(&report);
    eprintln!("Products per difference range:");
    print_histogram(&report.histogram);

    if let Some(path) = &arg.summary {
        let summary = RunSummary::new(pipeline.config(), &report, Utc::now());
        Output::save_json(&summary, path)?;
    }
    Ok(())
}

fn log_report(report: &PipelineReport) {
    for stage in &report.stages {
        tracing::info!(
            stage = stage.name,
            rows = stage.counters.get(ROWS_PROCESSED),
            map_errors = stage.counters.get(MAP_ERRORS),
            reduce_errors = stage.counters.get(REDUCE_ERRORS),
            output = %stage.output.display(),
            "stage finished"
        );
    }
    match &report.differences {
        Some(stats) => tracing::info!(
            products = stats.count,
            mean = stats.mean,
            median = stats.median,
            std_dev = stats.std_dev,
            max = stats.max,
            "difference statistics"
        ),
        None => tracing::warn!("no product differences were computed"),
    }
}

fn print_histogram(histogram: &Histogram) {
    let max_count = histogram
        .bins
        .iter()
        .map(|bin| bin.count)
        .max()
        .unwrap_or(0)
        .max(1);
    for bin in &histogram.bins {
        let bar_width = bin.count.saturating_mul(MAX_BAR_WIDTH) / max_count;
        let bar_width = usize::try_from(bar_width).unwrap_or(0);
        eprintln!("{:>15} | {:<5} {}", bin.label, bin.count, "#".repeat(bar_width));
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use clap::Parser as _;

    use super::*;
    use crate::command::CommandArgs;

    fn parse(args: &[&str]) -> AnalyzeArg {
        let args = ["keydiff"].iter().chain(args).copied();
        CommandArgs::try_parse_from(args).unwrap().analyze
    }

    const REVIEWS: &str = r#"{"asin":"B1","overall":"4.0","reviewText":"Many Reviews agree"}
{"asin":"B1","overall":"4.0","reviewText":"fine"}
{"asin":"B2","overall":"1.0","reviewText":"bad"}
{"asin":"B2","overall":"5.0","reviewText":"see the comments"}
not json
"#;

    #[test]
    fn test_defaults() {
        let arg = parse(&["a", "b", "c"]);
        let config = arg.pipeline_config().unwrap();
        assert_eq!(config.scan.batch_size.get(), 500);
        assert_eq!(config.keywords, KeywordSet::default());
        assert_eq!(config.bins, ThresholdBins::default());
        assert_eq!(
            arg.stage_paths(),
            StagePaths {
                averages: PathBuf::from("a"),
                differences: PathBuf::from("b"),
                histogram: PathBuf::from("c"),
            }
        );
    }

    #[test]
    fn test_overrides() {
        let arg = parse(&[
            "--workers",
            "3",
            "--scan-batch-size",
            "7",
            "--keyword",
            "Great",
            "--keyword",
            "bad",
            "--threshold",
            "1",
            "--threshold",
            "4.5",
            "a",
            "b",
            "c",
        ]);
        let config = arg.pipeline_config().unwrap();
        assert_eq!(config.workers.get(), 3);
        assert_eq!(config.scan.batch_size.get(), 7);
        assert_eq!(
            config.keywords.keywords().collect::<Vec<_>>(),
            ["bad", "great"]
        );
        assert_eq!(config.bins.labels().collect::<Vec<_>>(), ["0<x≤1", "1<x≤4.5", "x>4.5"]);
    }

    #[test]
    fn test_invalid_thresholds_are_rejected() {
        let arg = parse(&["--threshold", "3", "--threshold", "2", "a", "b", "c"]);
        assert!(arg.pipeline_config().is_err());
    }

    #[test]
    fn test_zero_workers_is_a_usage_error() {
        assert!(CommandArgs::try_parse_from(["keydiff", "--workers", "0", "a", "b", "c"]).is_err());
    }

    fn run_in(dir: &Path) -> anyhow::Result<()> {
        let input = dir.join("reviews.jsonl");
        let arg = parse(&[
            "--input",
            input.to_str().unwrap(),
            "--summary",
            dir.join("summary.json").to_str().unwrap(),
            "--workers",
            "2",
            dir.join("average").to_str().unwrap(),
            dir.join("difference").to_str().unwrap(),
            dir.join("bins").to_str().unwrap(),
        ]);
        run(&arg)
    }

    #[test]
    fn test_run_writes_datasets_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("reviews.jsonl"), REVIEWS).unwrap();

        run_in(dir.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("difference/part-r-00000")).unwrap(),
            "B1\t0.0\nB2\t2.0\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("bins/part-r-00000")).unwrap(),
            "Difference:0<x≤2\t2\n"
        );
        assert!(dir.path().join("bins/_SUCCESS").exists());

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["stages"][0]["name"], "average");
        assert_eq!(summary["stages"][0]["counters"]["Map Errors"], 1);
        assert_eq!(summary["histogram"][0]["count"], 2);
        assert_eq!(summary["differences"]["count"], 2);
    }

    #[test]
    fn test_run_fails_on_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("reviews.jsonl"), REVIEWS).unwrap();
        fs::create_dir(dir.path().join("bins")).unwrap();

        let err = run_in(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("bins"), "{err:#}");
        assert!(!dir.path().join("average").exists());
    }

    #[test]
    fn test_run_fails_on_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run_in(dir.path()).is_err());
    }
}
