//! Budgeted read → cut → materialize → write/retain, one sample at a time

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use arrow::array::RecordBatch;
use indicatif::ProgressBar;

use crate::aggregate::concat_units;
use crate::budget::{Budget, WeightBoundary};
use crate::cut::{apply_cut, Cut};
use crate::error::SkimResult;
use crate::materialize::materialize;
use crate::progress::{fmt_num, fmt_weight, ProgressContext};
use crate::samples::Sample;
use crate::schema::{columns_with_extras, reconcile, DEFAULT_WEIGHT_COLUMN};
use crate::sink::{ChunkWriter, DEFAULT_ZSTD_LEVEL};
use crate::source::{self, SourceOptions};
use crate::variable::VariableSpec;
use crate::weights::{f64_values, weighted_count};

/// How samples are read and where their events go
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Share of each sample to read, in `[0, 1]`
    pub fraction: f64,
    pub weight_column: String,
    pub boundary: WeightBoundary,
    pub source: SourceOptions,
    /// Columns read for cuts only; dropped from the output
    pub extra_columns: Vec<String>,
    /// Chunk files go under this root when set
    pub output: Option<PathBuf>,
    /// Keep the surviving events in memory
    pub aggregate: bool,
    pub zstd_level: i32,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            fraction: 1.0,
            weight_column: DEFAULT_WEIGHT_COLUMN.to_string(),
            boundary: WeightBoundary::default(),
            source: SourceOptions::default(),
            extra_columns: Vec::new(),
            output: None,
            aggregate: true,
            zstd_level: DEFAULT_ZSTD_LEVEL,
        }
    }
}

/// Size of a sample before anything is read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prescan {
    /// Summed weight of weighted files plus rows of unweighted ones
    pub total: f64,
    /// Whether any file carries the weight column
    pub weighted: bool,
    pub rows: u64,
    pub units: usize,
}

/// Walk every file once to size the budget.
pub fn prescan(
    files: &[PathBuf],
    weight_column: &str,
    options: &SourceOptions,
) -> SkimResult<Prescan> {
    let mut scan = Prescan {
        total: 0.0,
        weighted: false,
        rows: 0,
        units: 0,
    };
    for path in files {
        let mut reader = source::open(path, options)?;
        scan.rows += reader.num_rows();
        scan.units += reader.num_units();
        if reader.has_column(weight_column) {
            scan.weighted = true;
            scan.total += reader.weight_sum(weight_column)?;
        } else {
            scan.total += reader.num_rows() as f64;
        }
    }
    Ok(scan)
}

/// What happened to one sample
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub key: String,
    pub files: usize,
    pub units_read: usize,
    pub budget: f64,
    pub rows_in: usize,
    pub weighted_in: f64,
    pub rows_out: usize,
    pub weighted_out: f64,
    pub chunks_written: usize,
    pub output_dir: Option<PathBuf>,
    /// Surviving events, when aggregating and anything survived
    pub result: Option<RecordBatch>,
}

/// Read one sample under its budget.
///
/// Files are read in order, unit by unit, until the budget is spent. Units
/// left empty by the budget or the cut are skipped and take no chunk number.
pub fn process_sample(
    sample: &Sample,
    specs: &[VariableSpec],
    cut: Option<&dyn Cut>,
    options: &ReadOptions,
    pb: &ProgressBar,
) -> SkimResult<SampleOutcome> {
    let scan = prescan(&sample.files, &options.weight_column, &options.source)?;
    let mut budget = Budget::new(scan.total, options.fraction, scan.weighted)?;
    pb.set_length(scan.units as u64);
    log::debug!(
        "{}: {} files, total {}, budget {}",
        sample.key,
        sample.files.len(),
        fmt_weight(scan.total),
        fmt_weight(budget.cap())
    );

    let mut writer = options
        .output
        .as_deref()
        .map(|root| ChunkWriter::create(root, &sample.key, options.zstd_level))
        .transpose()?;

    let mut outcome = SampleOutcome {
        key: sample.key.clone(),
        files: sample.files.len(),
        units_read: 0,
        budget: budget.cap(),
        rows_in: 0,
        weighted_in: 0.0,
        rows_out: 0,
        weighted_out: 0.0,
        chunks_written: 0,
        output_dir: writer.as_ref().map(|w| w.dir().to_path_buf()),
        result: None,
    };
    let mut retained: Vec<RecordBatch> = Vec::new();

    'files: for path in &sample.files {
        if budget.is_spent() {
            break;
        }
        let mut reader = source::open(path, &options.source)?;
        let file_specs = reconcile(specs, reader.column_names(), &options.weight_column);
        let read_columns =
            columns_with_extras(&file_specs, &options.extra_columns, reader.column_names());

        let mut units = reader.units(&read_columns)?.enumerate();
        loop {
            if budget.is_spent() {
                break 'files;
            }
            let Some((unit, batch)) = units.next() else {
                break;
            };
            let batch = batch?;
            outcome.units_read += 1;
            pb.inc(1);
            if batch.num_rows() == 0 {
                log::debug!("{}: unit {unit} is empty, skipping", path.display());
                continue;
            }

            let weights = batch
                .column_by_name(&options.weight_column)
                .map(f64_values)
                .transpose()?;
            let keep = budget.take(batch.num_rows(), weights.as_deref(), options.boundary);
            if keep == 0 {
                continue;
            }
            let batch = batch.slice(0, keep);
            outcome.rows_in += keep;
            outcome.weighted_in += weighted_count(&batch, &options.weight_column)?;

            let batch = match cut {
                Some(cut) => apply_cut(cut, batch)?,
                None => batch,
            };
            if batch.num_rows() == 0 {
                log::debug!(
                    "{}: no events of unit {unit} pass the cut",
                    path.display()
                );
                continue;
            }

            let out = materialize(&batch, &file_specs, &read_columns)?;
            outcome.rows_out += out.num_rows();
            outcome.weighted_out += weighted_count(&out, &options.weight_column)?;
            if let Some(writer) = writer.as_mut() {
                writer.write(&out)?;
            }
            if options.aggregate {
                retained.push(out);
            }
        }
    }

    outcome.chunks_written = writer.as_ref().map_or(0, ChunkWriter::chunks_written);
    if options.aggregate {
        outcome.result = concat_units(retained)?;
    }
    pb.finish_and_clear();

    log::info!(
        "{}: {} → {} events ({} → {} rows, {} chunks)",
        sample.key,
        fmt_weight(outcome.weighted_in),
        fmt_weight(outcome.weighted_out),
        fmt_num(outcome.rows_in),
        fmt_num(outcome.rows_out),
        outcome.chunks_written
    );
    Ok(outcome)
}

/// Outcome of a whole run
#[derive(Debug)]
pub struct RunSummary {
    pub samples: Vec<SampleOutcome>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// In-memory results keyed by sample; samples with no surviving events are absent.
    pub fn results(&self) -> BTreeMap<String, RecordBatch> {
        self.samples
            .iter()
            .filter_map(|s| s.result.clone().map(|r| (s.key.clone(), r)))
            .collect()
    }

    pub fn total_rows_out(&self) -> usize {
        self.samples.iter().map(|s| s.rows_out).sum()
    }
}

/// Process `samples` in order. `cut_for` picks the cut of each sample.
///
/// The first failing sample aborts the run.
pub fn run<F>(
    samples: &[Sample],
    specs: &[VariableSpec],
    options: &ReadOptions,
    progress: &ProgressContext,
    cut_for: F,
) -> SkimResult<RunSummary>
where
    F: Fn(&Sample) -> Option<Box<dyn Cut>>,
{
    let start = Instant::now();
    let mut outcomes = Vec::with_capacity(samples.len());

    for sample in samples {
        log::info!("Processing {} ({} files)", sample.key, sample.files.len());
        let pb = progress.sample_bar(&sample.key);
        let cut = cut_for(sample);
        let outcome = process_sample(sample, specs, cut.as_deref(), options, &pb)?;
        outcomes.push(outcome);
    }

    let summary = RunSummary {
        samples: outcomes,
        elapsed: start.elapsed(),
    };
    log::info!("=== Skim Summary ===");
    log::info!(
        "Samples: {}, events kept: {}",
        summary.samples.len(),
        fmt_num(summary.total_rows_out())
    );
    log::info!("Time: {:.1}s", summary.elapsed.as_secs_f64());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_read_everything_in_memory() {
        let options = ReadOptions::default();
        assert_eq!(options.fraction, 1.0);
        assert!(options.aggregate);
        assert!(options.output.is_none());
        assert_eq!(options.weight_column, "totalWeight");
        assert_eq!(options.boundary, WeightBoundary::NotExceed);
    }

    #[test]
    fn prescan_of_nothing_is_zero() {
        let scan = prescan(&[], "totalWeight", &SourceOptions::default()).unwrap();
        assert_eq!(scan.total, 0.0);
        assert!(!scan.weighted);
    }

    #[test]
    fn results_skip_empty_samples() {
        let outcome = |key: &str| SampleOutcome {
            key: key.to_string(),
            files: 1,
            units_read: 0,
            budget: 0.0,
            rows_in: 0,
            weighted_in: 0.0,
            rows_out: 0,
            weighted_out: 0.0,
            chunks_written: 0,
            output_dir: None,
            result: None,
        };
        let summary = RunSummary {
            samples: vec![outcome("Data"), outcome("Signal")],
            elapsed: Duration::ZERO,
        };
        assert!(summary.results().is_empty());
        assert_eq!(summary.total_rows_out(), 0);
    }
}
