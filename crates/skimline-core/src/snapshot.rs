//! Arrow IPC snapshot of the in-memory result, one file per sample

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;

use crate::error::{SkimError, SkimResult};
use crate::samples::sanitize_key;

/// Schema metadata key holding the unsanitized sample key
pub const SAMPLE_KEY_METADATA: &str = "skimline.sample_key";

/// Write one `{sanitized_key}.arrow` file per sample into `dir`.
///
/// Fails before writing anything if two keys sanitize to the same name.
pub fn write_snapshot(
    dir: &Path,
    results: &BTreeMap<String, RecordBatch>,
) -> SkimResult<Vec<PathBuf>> {
    let mut names: HashMap<String, &String> = HashMap::with_capacity(results.len());
    for key in results.keys() {
        let name = sanitize_key(key);
        if let Some(first) = names.insert(name.clone(), key) {
            return Err(SkimError::KeyCollision {
                first: first.clone(),
                second: key.clone(),
                name,
            });
        }
    }

    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(results.len());
    for (key, batch) in results {
        let mut metadata: HashMap<String, String> = batch.schema().metadata().clone();
        metadata.insert(SAMPLE_KEY_METADATA.to_string(), key.clone());
        let schema = Arc::new(batch.schema().as_ref().clone().with_metadata(metadata));
        let batch = batch.clone().with_schema(schema.clone())?;

        let path = dir.join(format!("{}.arrow", sanitize_key(key)));
        let mut writer = FileWriter::try_new(File::create(&path)?, &schema)?;
        writer.write(&batch)?;
        writer.finish()?;
        log::debug!("Snapshot of '{key}' written to {}", path.display());
        written.push(path);
    }
    Ok(written)
}

/// Read every `*.arrow` file of `dir` back, keyed by the original sample key.
pub fn read_snapshot(dir: &Path) -> SkimResult<BTreeMap<String, RecordBatch>> {
    if !dir.is_dir() {
        return Err(SkimError::MissingDirectory(dir.to_path_buf()));
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "arrow"))
        .collect();
    paths.sort();

    let mut results = BTreeMap::new();
    for path in paths {
        let reader = FileReader::try_new(File::open(&path)?, None)?;
        let schema = reader.schema();
        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        let batch = concat_batches(&schema, &batches)?;
        let key = schema
            .metadata()
            .get(SAMPLE_KEY_METADATA)
            .cloned()
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_default();
        results.insert(key, batch);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Float64Array};
    use tempfile::TempDir;

    fn batch(values: Vec<f64>) -> RecordBatch {
        RecordBatch::try_from_iter(vec![(
            "met",
            Arc::new(Float64Array::from(values)) as ArrayRef,
        )])
        .unwrap()
    }

    #[test]
    fn round_trip_keeps_sample_keys() {
        let dir = TempDir::new().unwrap();
        let mut results = BTreeMap::new();
        results.insert("Background Z+jets".to_string(), batch(vec![1.0, 2.0]));
        results.insert("Data".to_string(), batch(vec![3.0]));

        let written = write_snapshot(dir.path(), &results).unwrap();
        assert!(written.iter().any(|p| p.ends_with("Background Z_jets.arrow")));

        let back = read_snapshot(dir.path()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back["Background Z+jets"].num_rows(), 2);
        assert_eq!(
            back["Data"].column(0).as_ref(),
            results["Data"].column(0).as_ref()
        );
    }

    #[test]
    fn colliding_keys_are_refused() {
        let dir = TempDir::new().unwrap();
        let snap = dir.path().join("snap");
        let mut results = BTreeMap::new();
        results.insert("Z+jets".to_string(), batch(vec![1.0]));
        results.insert("Z.jets".to_string(), batch(vec![2.0]));

        match write_snapshot(&snap, &results).unwrap_err() {
            SkimError::KeyCollision {
                first,
                second,
                name,
            } => {
                assert_eq!((first.as_str(), second.as_str()), ("Z+jets", "Z.jets"));
                assert_eq!(name, "Z_jets");
            }
            other => panic!("expected a key collision, got {other}"),
        }
        assert!(!snap.exists());
    }

    #[test]
    fn missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_snapshot(&dir.path().join("nope")),
            Err(SkimError::MissingDirectory(_))
        ));
    }
}
