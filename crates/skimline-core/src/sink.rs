//! Chunked Parquet output with atomic tmp→rename

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::error::{SkimError, SkimResult};
use crate::samples::sanitize_key;

/// Default zstd level for chunk files
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Parquet writer that only exposes the file under its final name once closed
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ParquetSink {
    pub fn create(final_path: PathBuf, schema: SchemaRef, zstd_level: i32) -> SkimResult<Self> {
        let mut tmp_name = final_path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        let level = ZstdLevel::try_new(zstd_level)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .build();
        let writer = ArrowWriter::try_new(file, schema, Some(props))?;

        Ok(Self {
            writer,
            tmp_path,
            final_path,
            row_count: 0,
        })
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> SkimResult<()> {
        self.row_count += batch.num_rows();
        Ok(self.writer.write(batch)?)
    }

    /// Flush the footer and rename tmp → final. Returns rows written.
    pub fn finalize(self) -> SkimResult<usize> {
        let row_count = self.row_count;
        self.writer.close()?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(row_count)
    }
}

/// Writes one `{prefix}{N}.parquet` file per retained unit, N counting from 0.
#[derive(Debug)]
pub struct ChunkWriter {
    dir: PathBuf,
    prefix: String,
    zstd_level: i32,
    next_chunk: usize,
}

impl ChunkWriter {
    /// Writer for `{output_root}/{sanitized_key}/chunk{N}.parquet`.
    ///
    /// Fails with `OutputExists` if the sample directory already holds
    /// finished files; stale `.tmp` leftovers are removed.
    pub fn create(output_root: &Path, sample_key: &str, zstd_level: i32) -> SkimResult<Self> {
        let dir = output_root.join(sanitize_key(sample_key));
        if dir.is_dir() {
            cleanup_tmp_files(&dir)?;
            if fs::read_dir(&dir)?.next().is_some() {
                return Err(SkimError::OutputExists(dir));
            }
        }
        fs::create_dir_all(&dir)?;
        Ok(Self::in_dir(dir, "chunk", zstd_level))
    }

    /// Writer into an existing directory with a custom file prefix.
    pub fn in_dir(dir: PathBuf, prefix: impl Into<String>, zstd_level: i32) -> Self {
        Self {
            dir,
            prefix: prefix.into(),
            zstd_level,
            next_chunk: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chunks_written(&self) -> usize {
        self.next_chunk
    }

    /// Write `batch` as the next chunk and return its path.
    pub fn write(&mut self, batch: &RecordBatch) -> SkimResult<PathBuf> {
        let path = self
            .dir
            .join(format!("{}{}.parquet", self.prefix, self.next_chunk));
        let mut sink = ParquetSink::create(path.clone(), batch.schema(), self.zstd_level)?;
        sink.write_batch(batch)?;
        let rows = sink.finalize()?;
        log::debug!("Wrote {} ({rows} rows)", path.display());
        self.next_chunk += 1;
        Ok(path)
    }
}

/// Remove stale .tmp files in the output directory
pub fn cleanup_tmp_files(output_dir: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
