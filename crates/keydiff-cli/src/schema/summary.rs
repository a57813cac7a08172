use std::{collections::BTreeMap, path::PathBuf};

use chrono::{DateTime, Utc};
use keydiff_pipeline::pipeline::{PipelineConfig, PipelineReport, StageReport};
use keydiff_stats::{descriptive::DescriptiveStats, histogram::HistogramBin};
use serde::Serialize;

/// Report of one pipeline run, written by `--summary`
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Timestamp when the run finished (ISO 8601 format)
    pub generated_at: DateTime<Utc>,
    /// Worker threads per map and reduce phase
    pub workers: usize,
    /// Records per map partition
    pub scan_batch_size: usize,
    /// Lowercased keywords that tagged reviews
    pub keywords: Vec<String>,
    /// Counters of every stage in execution order
    pub stages: Vec<StageSummary>,
    /// Products per difference range, including empty bins
    pub histogram: Vec<BinSummary>,
    /// Statistics over the per-product differences, absent when there were none
    pub differences: Option<DifferenceSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub name: String,
    pub output: PathBuf,
    pub counters: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BinSummary {
    pub label: String,
    /// Inclusive upper bound; `null` for the overflow bin
    pub upper: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DifferenceSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

impl RunSummary {
    pub fn new(
        config: &PipelineConfig,
        report: &PipelineReport,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            generated_at,
            workers: config.workers.get(),
            scan_batch_size: config.scan.batch_size.get(),
            keywords: config.keywords.keywords().map(str::to_owned).collect(),
            stages: report.stages.iter().map(StageSummary::from).collect(),
            histogram: report.histogram.bins.iter().map(BinSummary::from).collect(),
            differences: report.differences.as_ref().map(DifferenceSummary::from),
        }
    }
}

impl From<&StageReport> for StageSummary {
    fn from(stage: &StageReport) -> Self {
        Self {
            name: stage.name.to_owned(),
            output: stage.output.clone(),
            counters: stage
                .counters
                .iter()
                .map(|(name, value)| (name.to_owned(), value))
                .collect(),
        }
    }
}

impl From<&HistogramBin> for BinSummary {
    fn from(bin: &HistogramBin) -> Self {
        Self {
            label: bin.label.clone(),
            upper: bin.upper,
            count: bin.count,
        }
    }
}

impl From<&DescriptiveStats> for DifferenceSummary {
    fn from(stats: &DescriptiveStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean,
            median: stats.median,
            std_dev: stats.std_dev,
        }
    }
}

#[cfg(test)]
mod tests {
    use keydiff_pipeline::counters::{Counters, MAP_ERRORS, ROWS_PROCESSED};
    use keydiff_stats::histogram::{Histogram, ThresholdBins};

    use super::*;

    fn report() -> PipelineReport {
        let mut counters = Counters::new();
        counters.increment(ROWS_PROCESSED, 5);
        counters.increment(MAP_ERRORS, 1);
        let differences = [0.0, 2.0, 9.5];
        let bins = ThresholdBins::default();
        let label_counts = differences
            .iter()
            .filter_map(|diff| bins.classify(*diff))
            .fold(BTreeMap::new(), |mut counts, label| {
                *counts.entry(label.to_owned()).or_insert(0) += 1;
                counts
            });
        let (histogram, _) = Histogram::from_label_counts(&bins, &label_counts);
        PipelineReport {
            stages: vec![StageReport {
                name: "average",
                output: PathBuf::from("out/average"),
                counters,
            }],
            histogram,
            differences: DescriptiveStats::new(differences),
        }
    }

    #[test]
    fn test_summary_json_layout() {
        let generated_at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let summary = RunSummary::new(&PipelineConfig::default(), &report(), generated_at);
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["generated_at"], "2024-05-01T12:00:00Z");
        assert_eq!(json["keywords"], serde_json::json!(["comments", "reviews"]));
        assert_eq!(json["scan_batch_size"], 500);
        assert_eq!(
            json["stages"][0]["counters"],
            serde_json::json!({"Map Errors": 1, "Rows Processed": 5})
        );
        assert_eq!(json["stages"][0]["output"], "out/average");
        assert_eq!(
            json["histogram"],
            serde_json::json!([
                {"label": "0<x≤2", "upper": 2.0, "count": 2},
                {"label": "2<x≤3", "upper": 3.0, "count": 0},
                {"label": "3<x≤5", "upper": 5.0, "count": 0},
                {"label": "x>5", "upper": null, "count": 1},
            ])
        );
        assert_eq!(json["differences"]["count"], 3);
        assert_eq!(json["differences"]["median"], 2.0);
    }

    #[test]
    fn test_summary_without_differences() {
        let report = PipelineReport {
            differences: None,
            ..report()
        };
        let summary = RunSummary::new(&PipelineConfig::default(), &report, Utc::now());
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["differences"].is_null());
    }
}
