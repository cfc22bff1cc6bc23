//! Append-only plain-text log of skim runs

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::SkimResult;

const SEPARATOR: &str = "==========================================================";

/// Settings recorded at the top of each run entry
#[derive(Debug, Clone)]
pub struct RunHeader {
    pub timestamp: NaiveDateTime,
    pub luminosity: Option<f64>,
    pub fraction: f64,
    pub variables: Vec<String>,
    pub output_dir: Option<PathBuf>,
}

pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: &Path) -> SkimResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&mut self, header: &RunHeader) -> SkimResult<()> {
        let w = &mut self.writer;
        writeln!(w, "{SEPARATOR}")?;
        writeln!(w, "Time: {}", header.timestamp.format("%Y-%m-%d %H:%M"))?;
        if let Some(lumi) = header.luminosity {
            writeln!(w, "Luminosity: {lumi} fb^-1")?;
        }
        writeln!(w, "Fraction: {}", header.fraction)?;
        writeln!(w, "Variables: {}", header.variables.join(", "))?;
        match &header.output_dir {
            Some(dir) => writeln!(w, "Output directory: {}", dir.display())?,
            None => writeln!(w, "Output directory: (not written)")?,
        }
        w.flush()?;
        Ok(())
    }

    /// Record the input and output event counts of one sample.
    pub fn sample(&mut self, key: &str, input: f64, output: f64) -> SkimResult<()> {
        let w = &mut self.writer;
        writeln!(w, "Sample: {key}")?;
        writeln!(w, "Total number of input: {input:.3}")?;
        writeln!(w, "Total number of output: {output:.3}")?;
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn header() -> RunHeader {
        RunHeader {
            timestamp: NaiveDate::from_ymd_opt(2025, 6, 13)
                .unwrap()
                .and_hms_opt(9, 58, 0)
                .unwrap(),
            luminosity: Some(36.6),
            fraction: 0.5,
            variables: vec!["lep_pt[0]".into(), "met".into()],
            output_dir: Some(PathBuf::from("output/skim_250613")),
        }
    }

    #[test]
    fn writes_header_and_samples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/run.log");
        let mut log = RunLog::open(&path).unwrap();
        log.header(&header()).unwrap();
        log.sample("Data", 120.0, 40.0).unwrap();
        log.sample("Signal", 10.5, 2.123456).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(SEPARATOR));
        assert!(text.contains("Time: 2025-06-13 09:58"));
        assert!(text.contains("Luminosity: 36.6 fb^-1"));
        assert!(text.contains("Variables: lep_pt[0], met"));
        assert!(text.contains(
            "Sample: Signal\nTotal number of input: 10.500\nTotal number of output: 2.123\n"
        ));
    }

    #[test]
    fn appends_across_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        for _ in 0..2 {
            let mut log = RunLog::open(&path).unwrap();
            log.header(&header()).unwrap();
        }
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches(SEPARATOR).count(), 2);
    }
}
