//! `skimline run` - skim every sample of a run.toml

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;

use skimline_core::pipeline::prescan;
use skimline_core::source::SourceOptions;
use skimline_core::split::suggested_parts;
use skimline_core::{
    fmt_num, fmt_weight, sanitize_key, write_snapshot, Chain, Cut, ProgressContext, RangeCut,
    ReadOptions, RunHeader, RunLog, RunSummary, Sample, Skim, SplitRequest, TotalWeight,
    VariableSpec,
};

use crate::config::Config;
use crate::run_config::{RunConfig, SplitConfig};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to run.toml
    pub run_config: PathBuf,

    /// Output root (overrides run.toml)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Share of each sample to read (overrides run.toml)
    #[arg(short, long)]
    pub fraction: Option<f64>,

    /// Show the samples without reading them
    #[arg(long)]
    pub dry_run: bool,

    /// Number of parallel workers in split mode
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// Everything a run needs after run.toml and skimline.toml are merged.
struct Plan {
    samples: Vec<Sample>,
    specs: Vec<VariableSpec>,
    skim: Option<Skim>,
    luminosity: Option<f64>,
    range_cuts: Vec<RangeCut>,
    options: ReadOptions,
}

impl Plan {
    /// Weight computation for simulated samples, then the range cuts.
    fn cut_for(&self, sample: &Sample) -> Option<Box<dyn Cut>> {
        let mut chain = Chain::new();
        if let (Some(skim), Some(luminosity), false) = (self.skim, self.luminosity, sample.is_data())
        {
            chain.push(TotalWeight {
                column: self.options.weight_column.clone(),
                ..TotalWeight::new(luminosity, skim)
            });
        }
        for cut in &self.range_cuts {
            chain.push(cut.clone());
        }
        if chain.is_empty() {
            None
        } else {
            Some(Box::new(chain))
        }
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    timestamp: String,
    fraction: f64,
    luminosity: Option<f64>,
    skim: Option<&'a str>,
    variables: &'a [String],
    elapsed_secs: f64,
    samples: Vec<SampleReport>,
}

#[derive(Serialize)]
struct SampleReport {
    key: String,
    files: usize,
    budget: f64,
    rows_in: usize,
    weighted_in: f64,
    rows_out: usize,
    weighted_out: f64,
    chunks_written: usize,
}

pub fn run(args: RunArgs, config: &Config, progress: &ProgressContext) -> Result<()> {
    let mut run_config = RunConfig::from_file(&args.run_config)
        .with_context(|| format!("failed to load {}", args.run_config.display()))?;
    if let Some(fraction) = args.fraction {
        run_config.fraction = fraction;
    }
    run_config.validate()?;

    let started = Local::now();
    let output_root = run_config.output.write.then(|| {
        args.output
            .clone()
            .or_else(|| run_config.output.directory.clone())
            .unwrap_or_else(|| default_output_root(&config.output.default_dir, &started))
    });

    let skim = run_config.skim()?;
    let range_cuts = run_config.range_cuts()?;
    let mut extra_columns: Vec<String> = skim.map(Skim::read_variables).unwrap_or_default();
    for cut in &range_cuts {
        let base = cut.variable.base().to_string();
        if !extra_columns.contains(&base) {
            extra_columns.push(base);
        }
    }

    let plan = Plan {
        samples: run_config.samples()?,
        specs: run_config.specs()?,
        skim,
        luminosity: run_config.luminosity,
        range_cuts,
        options: ReadOptions {
            fraction: run_config.fraction,
            weight_column: config.read.weight_column.clone(),
            boundary: run_config.boundary()?,
            source: SourceOptions {
                tree_name: config.read.tree_name.clone(),
                step_size: config.read.step_size,
                entry_range: None,
            },
            extra_columns,
            output: output_root.clone(),
            aggregate: run_config.output.aggregate,
            zstd_level: config.output.compression_level,
        },
    };

    print_plan(&plan, output_root.as_deref());
    if args.dry_run {
        println!("(dry-run mode, no execution)");
        return Ok(());
    }

    let mut run_log = run_config
        .output
        .log_file
        .as_deref()
        .map(RunLog::open)
        .transpose()?;
    if let Some(log) = run_log.as_mut() {
        log.header(&RunHeader {
            timestamp: started.naive_local(),
            luminosity: run_config.luminosity,
            fraction: run_config.fraction,
            variables: run_config.variables.clone(),
            output_dir: output_root.clone(),
        })?;
    }

    let report = if let Some(split) = &run_config.split {
        let workers = args
            .workers
            .unwrap_or(config.workers.default)
            .min(config.workers.max);
        let root = output_root
            .as_deref()
            .context("split mode writes chunk files, but writing is disabled")?;
        run_split_mode(&plan, split, workers, root, progress, run_log.as_mut())?
    } else {
        let summary = skimline_core::run(
            &plan.samples,
            &plan.specs,
            &plan.options,
            progress,
            |sample| plan.cut_for(sample),
        )?;
        if let Some(log) = run_log.as_mut() {
            for s in &summary.samples {
                log.sample(&s.key, s.weighted_in, s.weighted_out)?;
            }
        }
        if let Some(dir) = &run_config.output.snapshot {
            let written = write_snapshot(dir, &summary.results())
                .with_context(|| format!("failed to write snapshot to {}", dir.display()))?;
            log::info!("Snapshot: {} samples in {}", written.len(), dir.display());
        }
        sample_reports(&summary)
    };

    print_results(&report);

    if let Some(root) = &output_root {
        let elapsed = (Local::now() - started).num_milliseconds() as f64 / 1000.0;
        let summary = RunReport {
            timestamp: started.to_rfc3339(),
            fraction: run_config.fraction,
            luminosity: run_config.luminosity,
            skim: skim.map(Skim::name),
            variables: &run_config.variables,
            elapsed_secs: elapsed,
            samples: report,
        };
        write_report(root, &summary)?;
    }
    Ok(())
}

/// `{default_dir}/skim_{yymmddHHMM}`
fn default_output_root(default_dir: &Path, at: &chrono::DateTime<Local>) -> PathBuf {
    default_dir.join(format!("skim_{}", at.format("%y%m%d%H%M")))
}

fn sample_reports(summary: &RunSummary) -> Vec<SampleReport> {
    summary
        .samples
        .iter()
        .map(|s| SampleReport {
            key: s.key.clone(),
            files: s.files,
            budget: s.budget,
            rows_in: s.rows_in,
            weighted_in: s.weighted_in,
            rows_out: s.rows_out,
            weighted_out: s.weighted_out,
            chunks_written: s.chunks_written,
        })
        .collect()
}

/// Every file of every sample as parallel entry ranges.
fn run_split_mode(
    plan: &Plan,
    split: &SplitConfig,
    workers: usize,
    output_root: &Path,
    progress: &ProgressContext,
    mut run_log: Option<&mut RunLog>,
) -> Result<Vec<SampleReport>> {
    let mut reports = Vec::with_capacity(plan.samples.len());
    for sample in &plan.samples {
        let scan = prescan(
            &sample.files,
            &plan.options.weight_column,
            &plan.options.source,
        )?;
        let cut = plan.cut_for(sample);
        let output_dir = output_root.join(sanitize_key(&sample.key));
        let mut report = SampleReport {
            key: sample.key.clone(),
            files: sample.files.len(),
            budget: scan.total * plan.options.fraction,
            rows_in: 0,
            weighted_in: 0.0,
            rows_out: 0,
            weighted_out: 0.0,
            chunks_written: 0,
        };

        for file in &sample.files {
            let parts = match split.parts {
                Some(parts) => parts,
                None => suggested_parts(file, split.max_parts.min(workers))?,
            };
            let label = (sample.files.len() > 1)
                .then(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .flatten();
            let request = SplitRequest {
                file: file.clone(),
                specs: &plan.specs,
                cut: cut.as_deref(),
                parts,
                output_dir: output_dir.clone(),
                label,
                options: &plan.options,
            };
            let summary = skimline_core::run_split(&request, progress)
                .with_context(|| format!("split of {} failed", file.display()))?;
            if summary.failed_parts > 0 {
                log::warn!(
                    "{}: {}/{} parts failed",
                    file.display(),
                    summary.failed_parts,
                    summary.parts
                );
            }
            report.rows_in += summary.rows_in;
            report.weighted_in += summary.weighted_in;
            report.rows_out += summary.rows_out;
            report.weighted_out += summary.weighted_out;
            report.chunks_written += summary.chunks_written;
        }

        if let Some(log) = run_log.as_deref_mut() {
            log.sample(&sample.key, report.weighted_in, report.weighted_out)?;
        }
        reports.push(report);
    }
    Ok(reports)
}

fn print_plan(plan: &Plan, output_root: Option<&Path>) {
    println!("=== Skim Plan ===");
    println!(
        "Variables: {}",
        plan.specs
            .iter()
            .map(VariableSpec::requested)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Fraction: {}", plan.options.fraction);
    match output_root {
        Some(root) => println!("Output: {}", root.display()),
        None => println!("Output: (in memory only)"),
    }

    let mut table = new_table(&["Sample", "Files", "Cut"]);
    for sample in &plan.samples {
        let cut = match plan.cut_for(sample) {
            Some(_) if plan.skim.is_some() && !sample.is_data() => "weights + ranges",
            Some(_) => "ranges",
            None => "-",
        };
        table.add_row(vec![
            sample.key.clone(),
            sample.files.len().to_string(),
            cut.to_string(),
        ]);
    }
    println!("{table}");
}

fn print_results(reports: &[SampleReport]) {
    let mut table = new_table(&["Sample", "Input", "Output", "Rows", "Chunks"]);
    for r in reports {
        table.add_row(vec![
            r.key.clone(),
            fmt_weight(r.weighted_in),
            fmt_weight(r.weighted_out),
            fmt_num(r.rows_out),
            r.chunks_written.to_string(),
        ]);
    }
    println!();
    println!("=== Run Complete ===");
    println!("{table}");
}

pub(crate) fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

fn write_report(root: &Path, report: &RunReport<'_>) -> Result<()> {
    std::fs::create_dir_all(root)?;
    let path = root.join("summary.json");
    let file = File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    log::info!("Summary written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan(skim: Option<Skim>, range_cuts: Vec<RangeCut>) -> Plan {
        Plan {
            samples: Vec::new(),
            specs: Vec::new(),
            skim,
            luminosity: Some(36.6),
            range_cuts,
            options: ReadOptions::default(),
        }
    }

    #[test]
    fn default_root_is_timestamped() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(
            default_output_root(Path::new("./output"), &at),
            PathBuf::from("./output/skim_2403091405")
        );
    }

    #[test]
    fn data_samples_get_no_weight_cut() {
        let plan = plan(Some(Skim::TwoToFourLep), Vec::new());
        assert!(plan.cut_for(&Sample::new("Data", Vec::new())).is_none());
        assert!(plan.cut_for(&Sample::new("Zee", Vec::new())).is_some());
    }

    #[test]
    fn range_cuts_apply_to_every_sample() {
        let cut = RangeCut::new(VariableSpec::scalar("met"), Some(20.0), None);
        let plan = plan(None, vec![cut]);
        assert!(plan.cut_for(&Sample::new("Data", Vec::new())).is_some());
        assert!(plan.cut_for(&Sample::new("Zee", Vec::new())).is_some());
    }

    #[test]
    fn report_serializes_sample_counts() {
        let report = RunReport {
            timestamp: "2024-03-09T14:05:00+00:00".to_string(),
            fraction: 0.5,
            luminosity: None,
            skim: None,
            variables: &["met".to_string()],
            elapsed_secs: 1.5,
            samples: vec![SampleReport {
                key: "Zee".to_string(),
                files: 2,
                budget: 10.0,
                rows_in: 10,
                weighted_in: 10.0,
                rows_out: 4,
                weighted_out: 4.0,
                chunks_written: 2,
            }],
        };
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["samples"][0]["key"], "Zee");
        assert_eq!(json["samples"][0]["chunks_written"], 2);
        assert!(json["skim"].is_null());
    }
}
