//! Process one large file as disjoint entry ranges on a rayon pool

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;

use crate::cut::{apply_cut, Cut};
use crate::error::{SkimError, SkimResult};
use crate::materialize::materialize;
use crate::pipeline::ReadOptions;
use crate::progress::{fmt_weight, ProgressContext};
use crate::schema::{columns_with_extras, reconcile};
use crate::sink::ChunkWriter;
use crate::source::{self, SourceOptions};
use crate::variable::VariableSpec;
use crate::weights::weighted_count;

/// Files above this size are worth splitting
pub const SPLIT_THRESHOLD_BYTES: u64 = 2_000_000_000;

/// Entry ranges of `parts` workers covering the first `entries * fraction`
/// entries. Part `i` covers `floor(n*f/p*i) .. floor(n*f/p*(i+1))`.
pub fn entry_ranges(entries: u64, fraction: f64, parts: usize) -> Vec<Range<u64>> {
    let parts = parts.max(1);
    let bound = |i: usize| (entries as f64 * fraction / parts as f64 * i as f64).floor() as u64;
    (0..parts).map(|i| bound(i)..bound(i + 1)).collect()
}

/// Number of parts for `path`: up to `max_parts` (and the CPU count) for
/// files over 2 GB, otherwise 1.
pub fn suggested_parts(path: &Path, max_parts: usize) -> SkimResult<usize> {
    let size = fs::metadata(path)?.len();
    if size <= SPLIT_THRESHOLD_BYTES {
        return Ok(1);
    }
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    Ok(max_parts.min(cpus).max(1))
}

pub struct SplitRequest<'a> {
    pub file: PathBuf,
    pub specs: &'a [VariableSpec],
    pub cut: Option<&'a dyn Cut>,
    pub parts: usize,
    /// Directory receiving `part{i}_chunk{N}.parquet`
    pub output_dir: PathBuf,
    /// Prepended to chunk names when several files share `output_dir`
    pub label: Option<String>,
    pub options: &'a ReadOptions,
}

#[derive(Debug, Clone, Default)]
pub struct SplitSummary {
    pub parts: usize,
    pub failed_parts: usize,
    /// Rows read by the parts that finished
    pub rows_in: usize,
    pub weighted_in: f64,
    pub rows_out: usize,
    pub weighted_out: f64,
    pub chunks_written: usize,
}

#[derive(Debug, Default)]
struct PartOutcome {
    rows_in: usize,
    weighted_in: f64,
    rows_out: usize,
    weighted_out: f64,
    chunks_written: usize,
}

/// Run every part of `request` in parallel and sum what they kept.
///
/// A failing part is logged and left out of the totals; the others still run.
pub fn run_split(
    request: &SplitRequest<'_>,
    progress: &ProgressContext,
) -> SkimResult<SplitSummary> {
    let start = Instant::now();
    let entries = source::open(&request.file, &request.options.source)?.num_rows();
    let ranges = entry_ranges(entries, request.options.fraction, request.parts);
    fs::create_dir_all(&request.output_dir)?;

    log::info!(
        "{}: {} entries in {} parts",
        request.file.display(),
        entries,
        ranges.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ranges.len())
        .build()
        .map_err(|e| SkimError::Io(std::io::Error::other(e)))?;

    let stage = progress.stage_line("split");
    let done = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let outcomes: Vec<PartOutcome> = pool.install(|| {
        ranges
            .par_iter()
            .enumerate()
            .filter_map(|(i, range)| {
                let result = process_part(request, i, range.clone());
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                stage.set_message(format!("{n}/{} parts", ranges.len()));
                match result {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        log::error!("Part {i} ({range:?}) of {}: {e}", request.file.display());
                        None
                    }
                }
            })
            .collect()
    });
    stage.finish_and_clear();

    let summary = SplitSummary {
        parts: ranges.len(),
        failed_parts: failed.load(Ordering::Relaxed),
        rows_in: outcomes.iter().map(|o| o.rows_in).sum(),
        weighted_in: outcomes.iter().map(|o| o.weighted_in).sum(),
        rows_out: outcomes.iter().map(|o| o.rows_out).sum(),
        weighted_out: outcomes.iter().map(|o| o.weighted_out).sum(),
        chunks_written: outcomes.iter().map(|o| o.chunks_written).sum(),
    };
    log::info!(
        "{}: {} → {} events in {} chunks, {}/{} parts ok ({:.1}s)",
        request.file.display(),
        fmt_weight(summary.weighted_in),
        fmt_weight(summary.weighted_out),
        summary.chunks_written,
        summary.parts - summary.failed_parts,
        summary.parts,
        start.elapsed().as_secs_f64()
    );
    Ok(summary)
}

fn process_part(
    request: &SplitRequest<'_>,
    part: usize,
    range: Range<u64>,
) -> SkimResult<PartOutcome> {
    let options = request.options;
    let source_options = SourceOptions {
        entry_range: Some(range),
        ..options.source.clone()
    };
    let mut reader = source::open(&request.file, &source_options)?;
    let specs = reconcile(request.specs, reader.column_names(), &options.weight_column);
    let read_columns =
        columns_with_extras(&specs, &options.extra_columns, reader.column_names());

    let prefix = match &request.label {
        Some(label) => format!("{label}_part{part}_chunk"),
        None => format!("part{part}_chunk"),
    };
    let mut writer = ChunkWriter::in_dir(request.output_dir.clone(), prefix, options.zstd_level);
    let mut outcome = PartOutcome::default();

    for batch in reader.units(&read_columns)? {
        let batch = batch?;
        outcome.rows_in += batch.num_rows();
        outcome.weighted_in += weighted_count(&batch, &options.weight_column)?;
        let batch = match request.cut {
            Some(cut) if batch.num_rows() > 0 => apply_cut(cut, batch)?,
            _ => batch,
        };
        if batch.num_rows() == 0 {
            continue;
        }
        let out = materialize(&batch, &specs, &read_columns)?;
        outcome.rows_out += out.num_rows();
        outcome.weighted_out += weighted_count(&out, &options.weight_column)?;
        writer.write(&out)?;
    }
    outcome.chunks_written = writer.chunks_written();
    Ok(outcome)
}
