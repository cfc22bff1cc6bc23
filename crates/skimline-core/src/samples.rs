//! Sample resolution: sample keys to ordered lists of input files

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::error::{SkimError, SkimResult};

/// A named group of input files processed as one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub key: String,
    pub files: Vec<PathBuf>,
}

impl Sample {
    pub fn new(key: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            key: key.into(),
            files,
        }
    }

    /// Every `*.{extension}` file of `root/name`, sorted.
    pub fn from_directory(root: &Path, name: &str, extension: &str) -> SkimResult<Self> {
        let files = list_files(&root.join(name), extension)?;
        Ok(Self::new(name, files))
    }

    pub fn is_data(&self) -> bool {
        is_data(&self.key)
    }
}

/// Sorted `*.{extension}` files directly inside `dir`.
pub fn list_files(dir: &Path, extension: &str) -> SkimResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SkimError::MissingDirectory(dir.to_path_buf()));
    }
    let pattern = format!(
        "{}/*.{}",
        Pattern::escape(&dir.to_string_lossy()),
        extension
    );
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| SkimError::Format {
            input: pattern.clone(),
            reason: e.to_string(),
        })?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    if files.is_empty() {
        return Err(SkimError::NoFilesFound(pattern));
    }
    files.sort();
    Ok(files)
}

/// Names of the subdirectories of `root`, sorted.
pub fn discover(root: &Path) -> SkimResult<Vec<String>> {
    if !root.is_dir() {
        return Err(SkimError::MissingDirectory(root.to_path_buf()));
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Sample key as a directory/file name: `.` and `+` become `_`.
pub fn sanitize_key(key: &str) -> String {
    key.replace(['.', '+'], "_")
}

/// Real collision data is recognised by its key.
pub fn is_data(key: &str) -> bool {
    key.contains("Data")
}

/// Immutable mapping from sample codes to directories, plus aliases that
/// stand for `a+b+c` combinations.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    codes: BTreeMap<String, PathBuf>,
    aliases: BTreeMap<String, String>,
    extension: String,
}

impl SampleTable {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            ..Self::default()
        }
    }

    /// Table with one code per subdirectory of `root`.
    pub fn from_root(root: &Path, extension: impl Into<String>) -> SkimResult<Self> {
        let mut table = Self::new(extension);
        for name in discover(root)? {
            let dir = root.join(&name);
            table.codes.insert(name, dir);
        }
        Ok(table)
    }

    pub fn with_code(mut self, code: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.codes.insert(code.into(), dir.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, expr: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), expr.into());
        self
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.codes.keys().map(String::as_str)
    }

    /// Codes named by `expr` after alias expansion, in order.
    pub fn expand(&self, expr: &str) -> Vec<String> {
        expr.split('+')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .flat_map(|code| match self.aliases.get(code) {
                Some(target) => target
                    .split('+')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect(),
                None => vec![code.to_string()],
            })
            .collect()
    }

    /// Build sample `key` from the files of every code in `expr`.
    pub fn resolve(&self, key: &str, expr: &str) -> SkimResult<Sample> {
        let mut files = Vec::new();
        for code in self.expand(expr) {
            let dir = self.codes.get(&code).ok_or_else(|| SkimError::UnknownSample {
                code: code.clone(),
                valid: self.codes.keys().chain(self.aliases.keys()).cloned().collect(),
            })?;
            files.extend(list_files(dir, &self.extension)?);
        }
        if files.is_empty() {
            return Err(SkimError::NoFilesFound(expr.to_string()));
        }
        Ok(Sample::new(key, files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout() -> TempDir {
        let dir = TempDir::new().unwrap();
        for (sample, files) in [
            ("Zee", vec!["b.parquet", "a.parquet", "notes.txt"]),
            ("Zmumu", vec!["c.parquet"]),
            ("Data", vec!["d.parquet"]),
            ("empty", vec![]),
        ] {
            let sub = dir.path().join(sample);
            fs::create_dir_all(&sub).unwrap();
            for f in files {
                fs::write(sub.join(f), b"").unwrap();
            }
        }
        dir
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn from_directory_sorts_and_filters() {
        let root = layout();
        let sample = Sample::from_directory(root.path(), "Zee", "parquet").unwrap();
        assert_eq!(sample.key, "Zee");
        assert_eq!(names(&sample.files), ["a.parquet", "b.parquet"]);
    }

    #[test]
    fn missing_directory_and_no_files() {
        let root = layout();
        assert!(matches!(
            Sample::from_directory(root.path(), "ttbar", "parquet"),
            Err(SkimError::MissingDirectory(_))
        ));
        assert!(matches!(
            Sample::from_directory(root.path(), "empty", "parquet"),
            Err(SkimError::NoFilesFound(_))
        ));
    }

    #[test]
    fn discover_lists_subdirectories() {
        let root = layout();
        fs::write(root.path().join("README"), b"").unwrap();
        assert_eq!(
            discover(root.path()).unwrap(),
            ["Data", "Zee", "Zmumu", "empty"]
        );
    }

    #[test]
    fn keys_are_sanitized() {
        assert_eq!(sanitize_key("Z+jets.v2"), "Z_jets_v2");
        assert_eq!(sanitize_key("ttbar"), "ttbar");
    }

    #[test]
    fn data_is_recognised_by_key() {
        assert!(is_data("Data 2015"));
        assert!(!is_data("Signal ZZ"));
        assert!(Sample::new("Data", vec![]).is_data());
    }

    #[test]
    fn resolves_combinations_and_aliases() {
        let root = layout();
        let table = SampleTable::from_root(root.path(), "parquet")
            .unwrap()
            .with_alias("Z", "Zee+Zmumu");

        let combo = table.resolve("Background Z", "Zmumu + Zee").unwrap();
        assert_eq!(names(&combo.files), ["c.parquet", "a.parquet", "b.parquet"]);

        let alias = table.resolve("Z", "Z+Data").unwrap();
        assert_eq!(
            names(&alias.files),
            ["a.parquet", "b.parquet", "c.parquet", "d.parquet"]
        );
    }

    #[test]
    fn unknown_code_lists_valid_ones() {
        let root = layout();
        let table = SampleTable::from_root(root.path(), "parquet").unwrap();
        match table.resolve("x", "Zee+Wenu").unwrap_err() {
            SkimError::UnknownSample { code, valid } => {
                assert_eq!(code, "Wenu");
                assert!(valid.contains(&"Zmumu".to_string()));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn explicit_codes() {
        let root = layout();
        let table = SampleTable::new("parquet").with_code("ee", root.path().join("Zee"));
        assert_eq!(table.codes().collect::<Vec<_>>(), ["ee"]);
        assert_eq!(table.resolve("ee", "ee").unwrap().files.len(), 2);
    }
}
