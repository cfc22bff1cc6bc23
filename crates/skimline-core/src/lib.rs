//! Skimline Core - event-data skimming over Parquet and ROOT files
//!
//! Reads columnar event data unit by unit under a fractional budget,
//! applies selection cuts and event weights, and writes the surviving
//! events as chunked Parquet files and/or keeps them in memory per sample.

pub mod aggregate;
pub mod budget;
pub mod cut;
pub mod error;
pub mod logging;
pub mod materialize;
pub mod pipeline;
pub mod progress;
pub mod run_log;
pub mod samples;
pub mod schema;
pub mod sink;
pub mod snapshot;
pub mod source;
pub mod split;
pub mod variable;
pub mod weights;

// Re-exports for convenience
pub use budget::{Budget, BudgetMode, WeightBoundary};
pub use cut::{apply_cut, Chain, Cut, RangeCut};
pub use error::{CutError, SkimError, SkimResult};
pub use logging::{init_logging, IndicatifLogger};
pub use pipeline::{process_sample, run, ReadOptions, RunSummary, SampleOutcome};
pub use progress::{fmt_num, fmt_weight, ProgressContext};
pub use run_log::{RunHeader, RunLog};
pub use samples::{sanitize_key, Sample, SampleTable};
pub use schema::DEFAULT_WEIGHT_COLUMN;
pub use sink::{cleanup_tmp_files, ChunkWriter, ParquetSink};
pub use snapshot::{read_snapshot, write_snapshot};
pub use source::{SourceOptions, UnitReader};
pub use split::{run_split, SplitRequest, SplitSummary};
pub use variable::{parse_specs, VariableSpec};
pub use weights::{Skim, TotalWeight};
