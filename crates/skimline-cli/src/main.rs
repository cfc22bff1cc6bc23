//! skimline - event-data skimming CLI
//!
//! Reads Parquet and ROOT samples under a fractional budget, applies
//! weights and cuts, and writes the surviving events as chunked Parquet.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;
mod run_config;

use config::Config;

#[derive(Parser)]
#[command(name = "skimline")]
#[command(about = "Budgeted skims of columnar event data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./skimline.toml or ~/.config/skimline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Skim the samples of a run.toml
    Run(cmd::run::RunArgs),
    /// Count rows and weights of sample directories
    Count(cmd::count::CountArgs),
    /// Summarize a snapshot written by `run`
    Inspect(cmd::inspect::InspectArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = skimline_core::ProgressContext::new();

    // Logging:
    //   TTY:     quiet (warn) unless --debug, the bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = is_tty && !cli.debug;
    skimline_core::init_logging(quiet, cli.debug, multi)?;

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, &progress),
        Command::Count(args) => cmd::count::run(args, &config),
        Command::Inspect(args) => cmd::inspect::run(args),
        Command::Config => {
            let mut table = cmd::run::new_table(&["Setting", "Value"]);

            table.add_row(vec![
                "Output directory",
                &config.output.default_dir.display().to_string(),
            ]);
            table.add_row(vec![
                "Compression level",
                &config.output.compression_level.to_string(),
            ]);
            table.add_row(vec!["Tree name", &config.read.tree_name]);
            table.add_row(vec!["Step size", &config.read.step_size.to_string()]);
            table.add_row(vec!["Weight column", &config.read.weight_column]);
            table.add_row(vec![
                "Workers",
                &format!("{} (max: {})", config.workers.default, config.workers.max),
            ]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
