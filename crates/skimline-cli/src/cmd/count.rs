//! `skimline count` - size of each sample without reading any events

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use skimline_core::pipeline::{prescan, Prescan};
use skimline_core::source::SourceOptions;
use skimline_core::{fmt_num, fmt_weight, SampleTable};

use super::run::new_table;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct CountArgs {
    /// Directory holding one subdirectory per sample
    pub dir: PathBuf,

    /// Samples to count; `a+b` combines. Default: every subdirectory
    #[arg(short, long, num_args = 1..)]
    pub samples: Vec<String>,

    /// Input file extension
    #[arg(short, long, default_value = "parquet")]
    pub extension: String,
}

pub fn run(args: CountArgs, config: &Config) -> Result<()> {
    let table = SampleTable::from_root(&args.dir, args.extension.clone())
        .with_context(|| format!("failed to list samples in {}", args.dir.display()))?;
    let keys: Vec<String> = if args.samples.is_empty() {
        table.codes().map(String::from).collect()
    } else {
        args.samples.clone()
    };
    let options = SourceOptions {
        tree_name: config.read.tree_name.clone(),
        step_size: config.read.step_size,
        entry_range: None,
    };

    let mut out = new_table(&["Sample", "Files", "Units", "Rows", "Events"]);
    let mut total = Prescan {
        total: 0.0,
        weighted: false,
        rows: 0,
        units: 0,
    };
    for key in &keys {
        let sample = table.resolve(key, key)?;
        let scan = prescan(&sample.files, &config.read.weight_column, &options)
            .with_context(|| format!("failed to scan sample '{key}'"))?;
        out.add_row(vec![
            key.clone(),
            sample.files.len().to_string(),
            scan.units.to_string(),
            fmt_num(scan.rows as usize),
            events_cell(&scan),
        ]);
        total.total += scan.total;
        total.rows += scan.rows;
        total.units += scan.units;
    }
    out.add_row(vec![
        "Total".to_string(),
        String::new(),
        total.units.to_string(),
        fmt_num(total.rows as usize),
        fmt_weight(total.total),
    ]);
    println!("{out}");
    Ok(())
}

/// Weighted samples show their summed weight, others their row count.
fn events_cell(scan: &Prescan) -> String {
    if scan.weighted {
        format!("{} (weighted)", fmt_weight(scan.total))
    } else {
        fmt_num(scan.total as usize)
    }
}
