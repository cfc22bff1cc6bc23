//! Error type for the skim pipeline

use std::path::PathBuf;

use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use parquet::errors::ParquetError;

/// Error raised inside a user cut, surfaced unchanged.
pub type CutError = Box<dyn std::error::Error + Send + Sync>;

pub type SkimResult<T> = Result<T, SkimError>;

/// Everything that can abort the processing of a sample.
///
/// Nothing here is retried: a bad variable, a bad file or a failing cut
/// stops the sample that hit it.
#[derive(Debug)]
pub enum SkimError {
    /// Variable string is neither `name` nor `name[index]`
    Format { input: String, reason: String },
    /// Base column of a requested variable is absent from the batch
    VariableNotFound {
        requested: String,
        base: String,
        available: Vec<String>,
    },
    /// `name[index]` used on a column that is not a list
    NotNested { requested: String, base: String },
    /// Index is not below the widest row of the batch
    IndexOutOfRange {
        requested: String,
        index: usize,
        max_len: usize,
    },
    MissingDirectory(PathBuf),
    /// Glob pattern that matched nothing
    NoFilesFound(String),
    UnknownSample { code: String, valid: Vec<String> },
    UnsupportedFile(PathBuf),
    InvalidFraction(f64),
    /// Per-sample output directory already holds files
    OutputExists(PathBuf),
    /// Two sample keys sanitize to the same file name
    KeyCollision {
        first: String,
        second: String,
        name: String,
    },
    Cut(CutError),
    /// A cut returned more rows than it was given
    CutContract { rows_in: usize, rows_out: usize },
    SchemaMismatch {
        column: String,
        expected: DataType,
        found: DataType,
    },
    UnsupportedColumn { column: String, type_name: String },
    Root(String),
    Arrow(ArrowError),
    Parquet(ParquetError),
    Io(std::io::Error),
}

impl std::fmt::Display for SkimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Format { input, reason } => write!(
                f,
                "invalid variable format '{input}': {reason}. Expected \"variable\" or \"variable[int]\""
            ),
            Self::VariableNotFound {
                requested,
                base,
                available,
            } => write!(
                f,
                "variable '{base}' not found, failed to access '{requested}'. Available variable(s): {}",
                available.join(", ")
            ),
            Self::NotNested { requested, base } => {
                write!(f, "'{base}' is not nested, failed to access '{requested}'")
            }
            Self::IndexOutOfRange {
                requested,
                index,
                max_len,
            } => write!(
                f,
                "invalid index {index} for '{requested}': index should be less than {max_len}"
            ),
            Self::MissingDirectory(path) => {
                write!(f, "directory '{}' does not exist", path.display())
            }
            Self::NoFilesFound(pattern) => write!(f, "no files match '{pattern}'"),
            Self::UnknownSample { code, valid } => write!(
                f,
                "unknown sample code '{code}'. Available codes: {}",
                valid.join(", ")
            ),
            Self::UnsupportedFile(path) => write!(
                f,
                "unsupported input file '{}': expected .parquet or .root",
                path.display()
            ),
            Self::InvalidFraction(fraction) => {
                write!(f, "fraction must be within [0, 1], got {fraction}")
            }
            Self::OutputExists(path) => write!(
                f,
                "output directory '{}' already contains files",
                path.display()
            ),
            Self::KeyCollision {
                first,
                second,
                name,
            } => write!(
                f,
                "samples '{first}' and '{second}' would both be written as '{name}'"
            ),
            Self::Cut(e) => write!(f, "cut failed: {e}"),
            Self::CutContract { rows_in, rows_out } => write!(
                f,
                "cut returned {rows_out} rows from a batch of {rows_in}; a cut may only remove rows"
            ),
            Self::SchemaMismatch {
                column,
                expected,
                found,
            } => write!(
                f,
                "column '{column}' changes type across batches: {expected} vs {found}"
            ),
            Self::UnsupportedColumn { column, type_name } => {
                write!(f, "column '{column}' has unsupported type '{type_name}'")
            }
            Self::Root(msg) => write!(f, "ROOT: {msg}"),
            Self::Arrow(e) => write!(f, "Arrow: {e}"),
            Self::Parquet(e) => write!(f, "Parquet: {e}"),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for SkimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cut(e) => Some(e.as_ref()),
            Self::Arrow(e) => Some(e),
            Self::Parquet(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArrowError> for SkimError {
    fn from(e: ArrowError) -> Self {
        Self::Arrow(e)
    }
}

impl From<ParquetError> for SkimError {
    fn from(e: ParquetError) -> Self {
        Self::Parquet(e)
    }
}

impl From<std::io::Error> for SkimError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn not_found_lists_available_columns() {
        let err = SkimError::VariableNotFound {
            requested: "jet_pt[0]".into(),
            base: "jet_pt".into(),
            available: vec!["lep_pt".into(), "met".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'jet_pt'"));
        assert!(msg.contains("lep_pt, met"));
    }

    #[test]
    fn index_error_states_bound() {
        let err = SkimError::IndexOutOfRange {
            requested: "lep_pt[3]".into(),
            index: 3,
            max_len: 3,
        };
        assert!(err.to_string().contains("less than 3"));
    }

    #[test]
    fn cut_error_keeps_source() {
        let inner: CutError = "boom".into();
        let err = SkimError::Cut(inner);
        assert_eq!(err.source().map(|e| e.to_string()), Some("boom".into()));
    }

    #[test]
    fn io_converts() {
        let err: SkimError = std::io::Error::other("disk").into();
        assert!(err.to_string().starts_with("IO:"));
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SkimError>();
    }
}
