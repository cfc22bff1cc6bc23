//! Parquet files: one unit per row group

use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatchReader;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder,
};
use parquet::arrow::ProjectionMask;

use super::{spans, Span, UnitReader, Units};
use crate::error::SkimResult;

pub struct ParquetReader {
    path: PathBuf,
    file: File,
    metadata: ArrowReaderMetadata,
    columns: Vec<String>,
    spans: Vec<Span>,
}

impl ParquetReader {
    pub fn open(path: &Path, range: Option<Range<u64>>) -> SkimResult<Self> {
        let file = File::open(path)?;
        let metadata = ArrowReaderMetadata::load(&file, ArrowReaderOptions::new())?;
        let columns = metadata
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let sizes = metadata
            .metadata()
            .row_groups()
            .iter()
            .map(|rg| rg.num_rows().max(0) as u64);
        let spans = spans(sizes, range.as_ref());
        log::debug!(
            "{}: {} row groups, {} units",
            path.display(),
            metadata.metadata().num_row_groups(),
            spans.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            metadata,
            columns,
            spans,
        })
    }

    /// Unit `unit` projected to `columns`; row groups can be read in any order.
    pub fn read_unit(&self, unit: usize, columns: &[String]) -> SkimResult<RecordBatch> {
        let span = self.spans[unit];
        let roots: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| columns.contains(*name))
            .map(|(i, _)| i)
            .collect();

        let builder = ParquetRecordBatchReaderBuilder::new_with_metadata(
            self.file.try_clone()?,
            self.metadata.clone(),
        );
        let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
        let group_rows = self.metadata.metadata().row_group(span.block).num_rows() as usize;
        let reader = builder
            .with_row_groups(vec![span.block])
            .with_projection(mask)
            .with_batch_size(group_rows.max(1))
            .build()?;

        let schema = reader.schema();
        let mut batches = reader.collect::<Result<Vec<_>, _>>()?;
        let batch = if batches.len() == 1 {
            batches.remove(0)
        } else {
            concat_batches(&schema, &batches)?
        };
        Ok(batch.slice(span.offset as usize, span.len as usize))
    }
}

impl UnitReader for ParquetReader {
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

    fn units<'a>(&'a mut self, columns: &[String]) -> SkimResult<Units<'a>> {
        let columns = columns.to_vec();
        let this: &'a Self = self;
        Ok(Box::new(
            (0..this.spans.len()).map(move |unit| this.read_unit(unit, &columns)),
        ))
    }
}
