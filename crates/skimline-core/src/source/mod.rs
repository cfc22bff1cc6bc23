//! Read back-ends: files split into units (row groups, tree entry ranges)

mod parquet_file;
mod root_tree;

pub use parquet_file::ParquetReader;
pub use root_tree::{BranchKind, TreeReader};

use std::ops::Range;
use std::path::Path;

use arrow::array::RecordBatch;

use crate::error::{SkimError, SkimResult};
use crate::weights::weighted_count;

/// Tree read from ROOT files unless configured otherwise
pub const DEFAULT_TREE_NAME: &str = "analysis";
/// Entries per unit for ROOT trees
pub const DEFAULT_STEP_SIZE: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub tree_name: String,
    pub step_size: u64,
    /// Restrict reading to these entries (split mode)
    pub entry_range: Option<Range<u64>>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            tree_name: DEFAULT_TREE_NAME.to_string(),
            step_size: DEFAULT_STEP_SIZE,
            entry_range: None,
        }
    }
}

/// Units of one file in order, each projected to the requested columns.
pub type Units<'a> = Box<dyn Iterator<Item = SkimResult<RecordBatch>> + 'a>;

/// A file read one unit at a time.
pub trait UnitReader {
    fn path(&self) -> &Path;

    /// Every column the file carries, in file order
    fn column_names(&self) -> &[String];

    fn has_column(&self, name: &str) -> bool {
        self.column_names().iter().any(|c| c == name)
    }

    /// Rows covered by this reader (after any entry range)
    fn num_rows(&self) -> u64;

    fn num_units(&self) -> usize;

    /// Stream the units in file order, projected to `columns`. Columns the
    /// file lacks are silently left out. Nothing past the last unit pulled
    /// is decoded.
    fn units<'a>(&'a mut self, columns: &[String]) -> SkimResult<Units<'a>>;

    /// Sum of `column` over every unit, or the row count if the file lacks it.
    fn weight_sum(&mut self, column: &str) -> SkimResult<f64> {
        if !self.has_column(column) {
            return Ok(self.num_rows() as f64);
        }
        let columns = [column.to_string()];
        let mut sum = 0.0;
        for unit in self.units(&columns)? {
            sum += weighted_count(&unit?, column)?;
        }
        Ok(sum)
    }
}

/// Open `path` with the back-end matching its extension.
pub fn open(path: &Path, options: &SourceOptions) -> SkimResult<Box<dyn UnitReader>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => Ok(Box::new(ParquetReader::open(
            path,
            options.entry_range.clone(),
        )?)),
        Some("root") => Ok(Box::new(TreeReader::open(path, options)?)),
        _ => Err(SkimError::UnsupportedFile(path.to_path_buf())),
    }
}

/// Rows of one unit: `len` rows starting at `offset` inside storage block
/// `block`, which itself starts at absolute row `block_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub block: usize,
    pub block_start: u64,
    pub offset: u64,
    pub len: u64,
}

impl Span {
    pub fn start(&self) -> u64 {
        self.block_start + self.offset
    }
}

/// Cut consecutive blocks of `block_sizes` rows down to `range`, dropping
/// blocks that fall outside it.
pub(crate) fn spans(
    block_sizes: impl IntoIterator<Item = u64>,
    range: Option<&Range<u64>>,
) -> Vec<Span> {
    let mut out = Vec::new();
    let mut block_start = 0u64;
    for (block, size) in block_sizes.into_iter().enumerate() {
        let block_end = block_start + size;
        let (lo, hi) = match range {
            Some(r) => (block_start.max(r.start), block_end.min(r.end)),
            None => (block_start, block_end),
        };
        if lo < hi {
            out.push(Span {
                block,
                block_start,
                offset: lo - block_start,
                len: hi - lo,
            });
        }
        block_start = block_end;
    }
    out
}

/// `total` rows in blocks of at most `step`.
pub(crate) fn steps(total: u64, step: u64) -> impl Iterator<Item = u64> {
    let step = step.max(1);
    (0..total.div_ceil(step)).map(move |i| step.min(total - i * step))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_without_range_cover_blocks() {
        let s = spans([3, 0, 4], None);
        assert_eq!(s.len(), 2);
        assert_eq!((s[0].block, s[0].offset, s[0].len), (0, 0, 3));
        assert_eq!((s[1].block, s[1].start(), s[1].len), (2, 3, 4));
    }

    #[test]
    fn spans_clip_to_range() {
        let s = spans([4, 4, 4], Some(&(2..9)));
        let parts: Vec<_> = s.iter().map(|s| (s.block, s.offset, s.len)).collect();
        assert_eq!(parts, [(0, 2, 2), (1, 0, 4), (2, 0, 1)]);
        assert_eq!(s.iter().map(|s| s.len).sum::<u64>(), 7);
    }

    #[test]
    fn empty_range_has_no_spans() {
        assert!(spans([4, 4], Some(&(3..3))).is_empty());
    }

    #[test]
    fn steps_split_total() {
        assert_eq!(steps(250, 100).collect::<Vec<_>>(), [100, 100, 50]);
        assert_eq!(steps(0, 100).count(), 0);
        assert_eq!(steps(100, 100).collect::<Vec<_>>(), [100]);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = open(Path::new("events.csv"), &SourceOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, SkimError::UnsupportedFile(_)));
    }
}
