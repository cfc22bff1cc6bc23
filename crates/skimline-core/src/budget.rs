//! Fractional read budget, counted in rows or in summed event weight

use std::str::FromStr;

use crate::error::{SkimError, SkimResult};

/// How a unit is charged against the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetMode {
    RowCount,
    WeightSum,
}

impl BudgetMode {
    /// Weighted counting only when a weight column exists and is not all ones.
    pub fn for_weights(weights: Option<&[f64]>) -> Self {
        match weights {
            Some(w) if w.iter().any(|&v| v != 1.0) => Self::WeightSum,
            _ => Self::RowCount,
        }
    }
}

/// Where to cut a unit whose weights overshoot the remaining budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightBoundary {
    /// Longest prefix whose cumulative weight stays within the budget
    #[default]
    NotExceed,
    /// Shortest prefix whose cumulative weight reaches the budget; may overshoot by one row
    Reach,
}

impl WeightBoundary {
    pub fn name(self) -> &'static str {
        match self {
            Self::NotExceed => "not-exceed",
            Self::Reach => "reach",
        }
    }

    /// Number of leading rows to keep given the cumulative weights of a unit.
    ///
    /// `cumulative` must be non-decreasing (weights are non-negative).
    pub fn prefix_len(self, cumulative: &[f64], remaining: f64) -> usize {
        match self {
            Self::NotExceed => cumulative.partition_point(|&c| c <= remaining),
            Self::Reach => (cumulative.partition_point(|&c| c < remaining) + 1).min(cumulative.len()),
        }
    }
}

impl FromStr for WeightBoundary {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-exceed" => Ok(Self::NotExceed),
            "reach" => Ok(Self::Reach),
            other => Err(format!(
                "unknown weight boundary '{other}', expected 'not-exceed' or 'reach'"
            )),
        }
    }
}

/// Per-sample cap on rows or summed weight.
#[derive(Debug, Clone)]
pub struct Budget {
    cap: f64,
    read: f64,
    exhausted: bool,
}

impl Budget {
    /// Budget of `total * fraction`.
    ///
    /// Row totals are rounded to a whole number of rows (ties to even);
    /// weighted totals are kept as is.
    pub fn new(total: f64, fraction: f64, weighted: bool) -> SkimResult<Self> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(SkimError::InvalidFraction(fraction));
        }
        let cap = total * fraction;
        let cap = if weighted { cap } else { cap.round_ties_even() };
        Ok(Self {
            cap,
            read: 0.0,
            exhausted: false,
        })
    }

    pub fn cap(&self) -> f64 {
        self.cap
    }

    pub fn read(&self) -> f64 {
        self.read
    }

    /// True once nothing more may be read
    pub fn is_spent(&self) -> bool {
        self.exhausted || self.read >= self.cap
    }

    /// Charge a unit of `len` rows and return how many leading rows to keep.
    pub fn take(&mut self, len: usize, weights: Option<&[f64]>, boundary: WeightBoundary) -> usize {
        if self.is_spent() {
            return 0;
        }
        match (BudgetMode::for_weights(weights), weights) {
            (BudgetMode::WeightSum, Some(w)) => self.take_weighted(w, boundary),
            _ => self.take_rows(len),
        }
    }

    fn take_rows(&mut self, len: usize) -> usize {
        if self.read + len as f64 > self.cap {
            let keep = ((self.cap - self.read).floor().max(0.0) as usize).min(len);
            self.read += keep as f64;
            self.exhausted = true;
            keep
        } else {
            self.read += len as f64;
            len
        }
    }

    fn take_weighted(&mut self, weights: &[f64], boundary: WeightBoundary) -> usize {
        let sum: f64 = weights.iter().sum();
        if self.read + sum <= self.cap {
            self.read += sum;
            return weights.len();
        }

        let cumulative: Vec<f64> = weights
            .iter()
            .scan(0.0, |acc, &w| {
                *acc += w;
                Some(*acc)
            })
            .collect();
        let keep = boundary.prefix_len(&cumulative, self.cap - self.read);
        if keep > 0 {
            self.read += cumulative[keep - 1];
        }
        self.exhausted = true;
        keep
    }
}
