//! Monte-Carlo event weights

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field};

use crate::cut::Cut;
use crate::error::{CutError, SkimError, SkimResult};
use crate::materialize::{column_names, with_column};
use crate::schema::DEFAULT_WEIGHT_COLUMN;

/// Per-event normalisation column of simulated samples
pub const SUM_OF_WEIGHTS: &str = "sum_of_weights";

/// Event selection a dataset was skimmed with; decides which scale factors apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skim {
    TwoToFourLep,
    GamGam,
}

impl Skim {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "2to4lep" => Some(Self::TwoToFourLep),
            "GamGam" => Some(Self::GamGam),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::TwoToFourLep => "2to4lep",
            Self::GamGam => "GamGam",
        }
    }

    /// Columns multiplied into the event weight
    pub fn weight_variables(self) -> &'static [&'static str] {
        match self {
            Self::TwoToFourLep => &[
                "filteff",
                "kfac",
                "xsec",
                "mcWeight",
                "ScaleFactor_PILEUP",
                "ScaleFactor_ELE",
                "ScaleFactor_MUON",
                "ScaleFactor_LepTRIGGER",
            ],
            Self::GamGam => &[
                "filteff",
                "kfac",
                "xsec",
                "mcWeight",
                "ScaleFactor_PILEUP",
                "ScaleFactor_PHOTON",
            ],
        }
    }

    /// Extra columns a simulated sample must read for [`TotalWeight`].
    pub fn read_variables(self) -> Vec<String> {
        self.weight_variables()
            .iter()
            .copied()
            .chain([SUM_OF_WEIGHTS])
            .map(String::from)
            .collect()
    }
}

impl FromStr for Skim {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
            .ok_or_else(|| format!("unknown skim '{s}', expected '2to4lep' or 'GamGam'"))
    }
}

impl fmt::Display for Skim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cut that attaches the total event weight
/// `luminosity[fb^-1] * 1000 / sum_of_weights * prod(|w|)`.
///
/// A batch whose weights are all zero is real data and gets weight 1.
#[derive(Debug, Clone)]
pub struct TotalWeight {
    pub luminosity: f64,
    pub skim: Skim,
    pub column: String,
}

impl TotalWeight {
    pub fn new(luminosity: f64, skim: Skim) -> Self {
        Self {
            luminosity,
            skim,
            column: DEFAULT_WEIGHT_COLUMN.to_string(),
        }
    }

    pub fn compute(&self, batch: &RecordBatch) -> SkimResult<Float64Array> {
        let sow = required_f64(batch, SUM_OF_WEIGHTS)?;
        let mut weights: Vec<f64> = sow
            .iter()
            .map(|s| self.luminosity * 1000.0 / s)
            .collect();

        for name in self.skim.weight_variables() {
            let factor = required_f64(batch, name)?;
            for (w, f) in weights.iter_mut().zip(factor) {
                *w *= f.abs();
            }
        }

        if weights.iter().all(|&w| w == 0.0) {
            weights.iter_mut().for_each(|w| *w = 1.0);
        }
        Ok(Float64Array::from(weights))
    }
}

impl Cut for TotalWeight {
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch, CutError> {
        let weights = self.compute(&batch)?;
        let field = Field::new(&self.column, DataType::Float64, false);
        Ok(with_column(&batch, field, Arc::new(weights))?)
    }
}

fn required_f64(batch: &RecordBatch, name: &str) -> SkimResult<Vec<f64>> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| SkimError::VariableNotFound {
            requested: name.to_string(),
            base: name.to_string(),
            available: column_names(batch),
        })?;
    f64_values(column)
}

/// Column values as `f64`; nulls count as zero.
pub fn f64_values(column: &ArrayRef) -> SkimResult<Vec<f64>> {
    let values = cast(column, &DataType::Float64)?;
    let values = values
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| SkimError::UnsupportedColumn {
            column: String::new(),
            type_name: column.data_type().to_string(),
        })?;
    Ok(values.iter().map(|v| v.unwrap_or(0.0)).collect())
}

/// Sum of the weight column, or the row count when the batch carries none.
pub fn weighted_count(batch: &RecordBatch, weight_column: &str) -> SkimResult<f64> {
    match batch.column_by_name(weight_column) {
        Some(column) => Ok(f64_values(column)?.iter().sum()),
        None => Ok(batch.num_rows() as f64),
    }
}
