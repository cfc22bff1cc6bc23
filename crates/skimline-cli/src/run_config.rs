//! RunConfig: parse run.toml into samples, variables, cuts and output settings

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use skimline_core::variable::dedup;
use skimline_core::{
    parse_specs, RangeCut, Sample, SampleTable, Skim, VariableSpec, WeightBoundary,
};

/// Top-level run.toml structure.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Variables to keep, `name` or `name[index]`
    pub variables: Vec<String>,

    /// Share of each sample to read.
    #[serde(default = "default_fraction")]
    pub fraction: f64,

    /// Integrated luminosity in fb⁻¹. Required with `skim`.
    pub luminosity: Option<f64>,

    /// Skim name (`2to4lep`, `GamGam`). Present = compute `totalWeight` for simulated samples.
    pub skim: Option<String>,

    /// `not-exceed` or `reach`
    #[serde(default = "default_boundary")]
    pub boundary: String,

    pub samples: SamplesConfig,

    #[serde(default)]
    pub output: OutputSection,

    /// Range cuts applied in order after the weight computation.
    #[serde(default)]
    pub cuts: Vec<CutConfig>,

    /// Split each file into entry ranges processed in parallel.
    pub split: Option<SplitConfig>,
}

fn default_fraction() -> f64 {
    1.0
}

fn default_boundary() -> String {
    WeightBoundary::default().name().to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplesConfig {
    /// Root holding one directory per sample code.
    pub read_directory: PathBuf,

    #[serde(default = "default_extension")]
    pub extension: String,

    /// Sample keys to process; `a+b` combines codes. Empty = every code.
    #[serde(default)]
    pub keys: Vec<String>,

    /// Code → directory relative to `read_directory`. Empty = one code per subdirectory.
    #[serde(default)]
    pub codes: BTreeMap<String, PathBuf>,

    /// Alias → `a+b+c`
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

fn default_extension() -> String {
    "parquet".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Write chunk files
    pub write: bool,
    /// Output root; defaults to `{default_dir}/skim_{yymmddHHMM}`
    pub directory: Option<PathBuf>,
    /// Keep the surviving events in memory
    pub aggregate: bool,
    /// Snapshot directory for the in-memory result (needs `aggregate`)
    pub snapshot: Option<PathBuf>,
    /// Run log: a header, then one entry per sample
    pub log_file: Option<PathBuf>,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            write: true,
            directory: None,
            aggregate: false,
            snapshot: None,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CutConfig {
    pub variable: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SplitConfig {
    /// Upper bound on parts per file; files under 2 GB are not split.
    #[serde(default = "default_max_parts")]
    pub max_parts: usize,
    /// Fixed number of parts, regardless of file size
    pub parts: Option<usize>,
}

fn default_max_parts() -> usize {
    8
}

impl RunConfig {
    /// Parse run.toml from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read run config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse run config: {}", path.display()))?;
        Ok(config)
    }

    /// Reject settings that cannot run before any file is opened.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fraction) {
            anyhow::bail!("fraction must be in [0, 1], got {}", self.fraction);
        }
        if self.variables.is_empty() {
            anyhow::bail!("no variables requested");
        }
        self.specs()?;
        self.boundary()?;
        if self.skim()?.is_some() && self.luminosity.is_none() {
            anyhow::bail!("skim requires luminosity");
        }
        self.range_cuts()?;
        if !self.output.write && !self.output.aggregate {
            anyhow::bail!("[output] write and aggregate are both off, nothing would be kept");
        }
        if self.output.snapshot.is_some() && !self.output.aggregate {
            anyhow::bail!("[output] snapshot requires aggregate = true");
        }
        if let Some(split) = &self.split {
            if self.output.aggregate || !self.output.write {
                anyhow::bail!("[split] writes chunk files only: set write = true, aggregate = false");
            }
            if split.parts == Some(0) || split.max_parts == 0 {
                anyhow::bail!("[split] needs at least one part");
            }
        }
        Ok(())
    }

    /// Requested variables, parsed, duplicates dropped.
    pub fn specs(&self) -> Result<Vec<VariableSpec>> {
        Ok(dedup(parse_specs(&self.variables)?))
    }

    pub fn boundary(&self) -> Result<WeightBoundary> {
        self.boundary.parse().map_err(anyhow::Error::msg)
    }

    pub fn skim(&self) -> Result<Option<Skim>> {
        self.skim
            .as_deref()
            .map(|name| name.parse::<Skim>().map_err(anyhow::Error::msg))
            .transpose()
    }

    pub fn range_cuts(&self) -> Result<Vec<RangeCut>> {
        self.cuts
            .iter()
            .map(|c| {
                let variable = VariableSpec::parse(&c.variable)
                    .with_context(|| format!("invalid cut variable '{}'", c.variable))?;
                Ok(RangeCut::new(variable, c.min, c.max))
            })
            .collect()
    }

    /// Sample table built from `[samples]`.
    pub fn table(&self) -> Result<SampleTable> {
        let s = &self.samples;
        let mut table = if s.codes.is_empty() {
            SampleTable::from_root(&s.read_directory, s.extension.clone())?
        } else {
            s.codes
                .iter()
                .fold(SampleTable::new(s.extension.clone()), |t, (code, dir)| {
                    t.with_code(code.clone(), s.read_directory.join(dir))
                })
        };
        for (alias, expr) in &s.aliases {
            table = table.with_alias(alias.clone(), expr.clone());
        }
        Ok(table)
    }

    /// Samples in processing order, files resolved.
    pub fn samples(&self) -> Result<Vec<Sample>> {
        let table = self.table()?;
        let keys: Vec<String> = if self.samples.keys.is_empty() {
            table.codes().map(String::from).collect()
        } else {
            self.samples.keys.clone()
        };
        keys.iter()
            .map(|key| {
                table
                    .resolve(key, key)
                    .with_context(|| format!("failed to resolve sample '{key}'"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
variables = ["lep_pt[0]", "met", "met"]

[samples]
read_directory = "/data"
"#;

    #[test]
    fn minimal_config_defaults() {
        let config: RunConfig = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.fraction, 1.0);
        assert_eq!(config.boundary().unwrap(), WeightBoundary::NotExceed);
        assert!(config.output.write);
        assert!(!config.output.aggregate);
        assert_eq!(config.samples.extension, "parquet");
        assert_eq!(config.specs().unwrap().len(), 2);
        assert!(config.skim().unwrap().is_none());
    }

    #[test]
    fn full_config() {
        let toml = r#"
variables = ["lep_pt[0]", "totalWeight"]
fraction = 0.25
luminosity = 36.6
skim = "2to4lep"
boundary = "reach"

[samples]
read_directory = "/data"
extension = "root"
keys = ["Zll"]
aliases = { Zll = "Zee+Zmumu" }

[samples.codes]
Zee = "mc/Zee"
Zmumu = "mc/Zmumu"

[output]
aggregate = true
snapshot = "/tmp/snap"

[[cuts]]
variable = "lep_pt[0]"
min = 25.0
"#;
        let config: RunConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.skim().unwrap(), Some(Skim::TwoToFourLep));
        assert_eq!(config.boundary().unwrap(), WeightBoundary::Reach);
        assert_eq!(config.range_cuts().unwrap()[0].min, Some(25.0));
        assert_eq!(
            config.table().unwrap().expand("Zll"),
            vec!["Zee".to_string(), "Zmumu".to_string()]
        );
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let cases = [
            ("fraction = 1.5", "fraction"),
            ("skim = \"2to4lep\"", "luminosity"),
            ("boundary = \"midway\"", "midway"),
        ];
        for (line, needle) in cases {
            let toml = format!("{line}\n{MINIMAL}");
            let config: RunConfig = toml::from_str(&toml).unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(needle), "{line}: {err}");
        }
    }

    #[test]
    fn snapshot_needs_aggregate() {
        let toml = format!("{MINIMAL}\n[output]\nsnapshot = \"/tmp/snap\"\n");
        let config: RunConfig = toml::from_str(&toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn samples_default_to_every_directory() {
        let dir = TempDir::new().unwrap();
        for name in ["Data", "Zee"] {
            fs::create_dir(dir.path().join(name)).unwrap();
            fs::write(dir.path().join(name).join("f.parquet"), b"").unwrap();
        }
        let toml = format!(
            "variables = [\"met\"]\n[samples]\nread_directory = {:?}\n",
            dir.path().display().to_string()
        );
        let config: RunConfig = toml::from_str(&toml).unwrap();
        let samples = config.samples().unwrap();
        let keys: Vec<&str> = samples.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["Data", "Zee"]);
        assert_eq!(samples[1].files.len(), 1);
    }
}
