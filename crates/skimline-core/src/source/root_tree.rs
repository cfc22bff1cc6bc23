//! ROOT trees: units are fixed-size entry ranges, decoded branch by branch as they are pulled

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, ListArray,
    RecordBatch, RecordBatchOptions, UInt32Array, UInt64Array,
};
use arrow::datatypes::{Field, Float32Type, Float64Type, Int32Type, Schema};
use oxyroot::{Branch, Named, ReaderTree, RootFile};

use super::{spans, steps, SourceOptions, Span, UnitReader, Units};
use crate::error::{SkimError, SkimResult};

/// Branch layouts that map onto Arrow columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Bool,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    VecI32,
    VecF32,
    VecF64,
}

impl BranchKind {
    /// Classify a ROOT type name such as `float`, `Int_t` or `vector<double>`.
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        let normalized: String = type_name
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let normalized = normalized.replace("std::", "");

        if let Some(inner) = normalized
            .strip_prefix("vector<")
            .and_then(|s| s.strip_suffix('>'))
        {
            return match Self::from_type_name(inner)? {
                Self::I32 => Some(Self::VecI32),
                Self::F32 => Some(Self::VecF32),
                Self::F64 => Some(Self::VecF64),
                _ => None,
            };
        }

        match normalized.as_str() {
            "bool" | "bool_t" => Some(Self::Bool),
            "int" | "int_t" | "int32_t" => Some(Self::I32),
            "unsignedint" | "uint_t" | "uint32_t" => Some(Self::U32),
            "long64_t" | "int64_t" | "long" | "longlong" => Some(Self::I64),
            "ulong64_t" | "uint64_t" | "unsignedlong" | "unsignedlonglong" => Some(Self::U64),
            "float" | "float_t" | "float32_t" => Some(Self::F32),
            "double" | "double_t" | "double32_t" => Some(Self::F64),
            _ => None,
        }
    }
}

pub struct TreeReader {
    path: PathBuf,
    tree: ReaderTree,
    columns: Vec<String>,
    spans: Vec<Span>,
}

impl TreeReader {
    pub fn open(path: &Path, options: &SourceOptions) -> SkimResult<Self> {
        let mut file = RootFile::open(path)
            .map_err(|e| root_error(&format!("failed to open '{}'", path.display()), e))?;
        let tree = file.get_tree(&options.tree_name).map_err(|e| {
            root_error(
                &format!("no tree '{}' in '{}'", options.tree_name, path.display()),
                e,
            )
        })?;
        let columns = tree.branches().map(|b| b.name().to_string()).collect();
        let entries = tree.entries().max(0) as u64;
        let spans = spans(steps(entries, options.step_size), options.entry_range.as_ref());
        log::debug!(
            "{}: {entries} entries in tree '{}', {} units",
            path.display(),
            options.tree_name,
            spans.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            tree,
            columns,
            spans,
        })
    }
}

impl UnitReader for TreeReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn num_rows(&self) -> u64 {
        self.spans.iter().map(|s| s.len).sum()
    }

    fn num_units(&self) -> usize {
        self.spans.len()
    }

    /// Spans of a tree are contiguous, so every branch is decoded once, front
    /// to back, `step_size` entries per pull.
    fn units<'a>(&'a mut self, columns: &[String]) -> SkimResult<Units<'a>> {
        let this: &'a Self = self;
        let first = this.spans.first().map_or(0, Span::start) as usize;

        let mut streams: Vec<(String, BranchStream<'a>)> = Vec::new();
        for name in this.columns.iter().filter(|c| columns.contains(*c)) {
            let branch = this
                .tree
                .branch(name)
                .ok_or_else(|| SkimError::Root(format!("branch '{name}' vanished")))?;
            streams.push((name.clone(), BranchStream::open(branch, name, first)?));
        }

        Ok(Box::new(this.spans.iter().map(move |span| {
            let len = span.len as usize;
            let mut fields = Vec::with_capacity(streams.len());
            let mut arrays = Vec::with_capacity(streams.len());
            for (name, stream) in streams.iter_mut() {
                let array = stream.next_array(len);
                if array.len() != len {
                    return Err(SkimError::Root(format!(
                        "branch '{name}' of '{}' ends before entry {}",
                        this.path.display(),
                        span.start() + span.len
                    )));
                }
                fields.push(Field::new(name.as_str(), array.data_type().clone(), true));
                arrays.push(array);
            }
            let options = RecordBatchOptions::new().with_row_count(Some(len));
            Ok(RecordBatch::try_new_with_options(
                Arc::new(Schema::new(fields)),
                arrays,
                &options,
            )?)
        })))
    }
}

type Entries<'a, T> = Box<dyn Iterator<Item = T> + 'a>;

/// Entries of one branch, decoded as they are pulled.
enum BranchStream<'a> {
    Bool(Entries<'a, bool>),
    I32(Entries<'a, i32>),
    U32(Entries<'a, u32>),
    I64(Entries<'a, i64>),
    U64(Entries<'a, u64>),
    F32(Entries<'a, f32>),
    F64(Entries<'a, f64>),
    VecI32(Entries<'a, Vec<i32>>),
    VecF32(Entries<'a, Vec<f32>>),
    VecF64(Entries<'a, Vec<f64>>),
}

macro_rules! entries {
    ($branch:expr, $name:expr, $skip:expr, $t:ty) => {
        Box::new(
            $branch
                .as_iter::<$t>()
                .map_err(|e| root_error(&format!("failed to read branch '{}'", $name), e))?
                .skip($skip),
        )
    };
}

impl<'a> BranchStream<'a> {
    /// Stream of `branch` positioned at entry `skip`.
    fn open(branch: &'a Branch, name: &str, skip: usize) -> SkimResult<Self> {
        let type_name = branch.item_type_name();
        let kind = BranchKind::from_type_name(&type_name).ok_or_else(|| {
            SkimError::UnsupportedColumn {
                column: name.to_string(),
                type_name: type_name.to_string(),
            }
        })?;

        Ok(match kind {
            BranchKind::Bool => Self::Bool(entries!(branch, name, skip, bool)),
            BranchKind::I32 => Self::I32(entries!(branch, name, skip, i32)),
            BranchKind::U32 => Self::U32(entries!(branch, name, skip, u32)),
            BranchKind::I64 => Self::I64(entries!(branch, name, skip, i64)),
            BranchKind::U64 => Self::U64(entries!(branch, name, skip, u64)),
            BranchKind::F32 => Self::F32(entries!(branch, name, skip, f32)),
            BranchKind::F64 => Self::F64(entries!(branch, name, skip, f64)),
            BranchKind::VecI32 => Self::VecI32(entries!(branch, name, skip, Vec<i32>)),
            BranchKind::VecF32 => Self::VecF32(entries!(branch, name, skip, Vec<f32>)),
            BranchKind::VecF64 => Self::VecF64(entries!(branch, name, skip, Vec<f64>)),
        })
    }

    /// The next `len` entries as one array; shorter if the branch runs out.
    fn next_array(&mut self, len: usize) -> ArrayRef {
        match self {
            Self::Bool(it) => Arc::new(BooleanArray::from(it.take(len).collect::<Vec<_>>())),
            Self::I32(it) => Arc::new(Int32Array::from_iter_values(it.take(len))),
            Self::U32(it) => Arc::new(UInt32Array::from_iter_values(it.take(len))),
            Self::I64(it) => Arc::new(Int64Array::from_iter_values(it.take(len))),
            Self::U64(it) => Arc::new(UInt64Array::from_iter_values(it.take(len))),
            Self::F32(it) => Arc::new(Float32Array::from_iter_values(it.take(len))),
            Self::F64(it) => Arc::new(Float64Array::from_iter_values(it.take(len))),
            Self::VecI32(it) => Arc::new(ListArray::from_iter_primitive::<Int32Type, _, _>(
                it.take(len).map(|row| Some(row.into_iter().map(Some))),
            )),
            Self::VecF32(it) => Arc::new(ListArray::from_iter_primitive::<Float32Type, _, _>(
                it.take(len).map(|row| Some(row.into_iter().map(Some))),
            )),
            Self::VecF64(it) => Arc::new(ListArray::from_iter_primitive::<Float64Type, _, _>(
                it.take(len).map(|row| Some(row.into_iter().map(Some))),
            )),
        }
    }
}

fn root_error<E: std::fmt::Display>(context: &str, err: E) -> SkimError {
    SkimError::Root(format!("{context}: {err}"))
}
