//! `skimline inspect` - summarize a snapshot directory

use std::path::PathBuf;

use anyhow::{Context, Result};
use arrow::array::{Array, RecordBatch};
use clap::Args;

use skimline_core::{fmt_num, read_snapshot};

use super::run::new_table;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Snapshot directory written by `skimline run`
    pub snapshot: PathBuf,

    /// Also list the columns of each sample
    #[arg(long)]
    pub columns: bool,
}

pub fn run(args: InspectArgs) -> Result<()> {
    let results = read_snapshot(&args.snapshot)
        .with_context(|| format!("failed to read snapshot {}", args.snapshot.display()))?;
    if results.is_empty() {
        println!("{}: empty snapshot", args.snapshot.display());
        return Ok(());
    }

    let mut table = new_table(&["Sample", "Rows", "Columns"]);
    for (key, batch) in &results {
        table.add_row(vec![
            key.clone(),
            fmt_num(batch.num_rows()),
            batch.num_columns().to_string(),
        ]);
    }
    println!("{table}");

    if args.columns {
        for (key, batch) in &results {
            println!("\n{key}:");
            for line in describe_columns(batch) {
                println!("  {line}");
            }
        }
    }
    Ok(())
}

/// `name: type (n null)` per column
fn describe_columns(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, column)| {
            format!(
                "{}: {} ({} null)",
                field.name(),
                field.data_type(),
                column.null_count()
            )
        })
        .collect()
}
