//! Variable specs: `name` or `name[index]`

use std::fmt;
use std::str::FromStr;

use crate::error::{SkimError, SkimResult};

/// A user-requested column, optionally indexed into a nested (list) column.
///
/// `lep_pt[0]` asks for the first element of every row of `lep_pt`;
/// the output column keeps the requested name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableSpec {
    Scalar(String),
    Indexed {
        requested: String,
        base: String,
        index: usize,
    },
}

impl VariableSpec {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::Scalar(name.into())
    }

    /// Parse one variable string.
    ///
    /// The base is the text before the first `[`, the index the text up to
    /// the first `]`. Nothing may follow the closing bracket.
    pub fn parse(input: &str) -> SkimResult<Self> {
        let format_err = |reason: &str| SkimError::Format {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        match (input.find('['), input.find(']')) {
            (None, None) => {
                if input.is_empty() {
                    return Err(format_err("empty name"));
                }
                Ok(Self::Scalar(input.to_string()))
            }
            (Some(open), Some(close)) => {
                if close < open {
                    return Err(format_err("']' before '['"));
                }
                let base = &input[..open];
                if base.is_empty() {
                    return Err(format_err("missing name before '['"));
                }
                if close + 1 != input.len() {
                    return Err(format_err("unexpected text after ']'"));
                }
                let digits = &input[open + 1..close];
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(format_err("index is not a non-negative integer"));
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|e| format_err(&e.to_string()))?;
                Ok(Self::Indexed {
                    requested: input.to_string(),
                    base: base.to_string(),
                    index,
                })
            }
            _ => Err(format_err("unbalanced brackets, perhaps a '[' or ']' is missing")),
        }
    }

    /// Name of the output column
    pub fn requested(&self) -> &str {
        match self {
            Self::Scalar(name) => name,
            Self::Indexed { requested, .. } => requested,
        }
    }

    /// Name of the column read from the file
    pub fn base(&self) -> &str {
        match self {
            Self::Scalar(name) => name,
            Self::Indexed { base, .. } => base,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::Indexed { index, .. } => Some(*index),
        }
    }
}

impl FromStr for VariableSpec {
    type Err = SkimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VariableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.requested())
    }
}

/// Parse a list of variable strings, preserving order and duplicates.
pub fn parse_specs<S: AsRef<str>>(inputs: &[S]) -> SkimResult<Vec<VariableSpec>> {
    inputs.iter().map(|s| VariableSpec::parse(s.as_ref())).collect()
}

/// Drop repeated requested names, keeping the first occurrence.
pub fn dedup(specs: Vec<VariableSpec>) -> Vec<VariableSpec> {
    let mut out: Vec<VariableSpec> = Vec::with_capacity(specs.len());
    for spec in specs {
        if out.iter().any(|s| s.requested() == spec.requested()) {
            log::info!("Skipping '{}': duplicated entry", spec.requested());
            continue;
        }
        out.push(spec);
    }
    out
}
