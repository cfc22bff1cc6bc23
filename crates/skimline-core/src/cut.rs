//! Event selection applied to each read unit

use arrow::array::{Array, BooleanArray, RecordBatch};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::DataType;

use crate::error::{CutError, SkimError, SkimResult};
use crate::materialize::resolve_or_null;
use crate::variable::VariableSpec;

/// A selection over one event batch.
///
/// Implementations return the surviving rows and may attach new columns.
/// Returning more rows than given is an error.
pub trait Cut: Send + Sync {
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch, CutError>;
}

impl<F, E> Cut for F
where
    F: Fn(RecordBatch) -> Result<RecordBatch, E> + Send + Sync,
    E: Into<CutError>,
{
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch, CutError> {
        self(batch).map_err(Into::into)
    }
}

/// Run `cut` and check it kept its side of the contract.
pub fn apply_cut(cut: &dyn Cut, batch: RecordBatch) -> SkimResult<RecordBatch> {
    let rows_in = batch.num_rows();
    let out = cut.apply(batch).map_err(|e| {
        log::error!("Cut failed: {e}");
        log::error!("A cut takes one event batch and returns the filtered batch");
        SkimError::Cut(e)
    })?;
    if out.num_rows() > rows_in {
        return Err(SkimError::CutContract {
            rows_in,
            rows_out: out.num_rows(),
        });
    }
    Ok(out)
}

/// Keep events with `min <= variable < max`. Null values never pass, and
/// neither do rows too short for an indexed variable.
#[derive(Debug, Clone)]
pub struct RangeCut {
    pub variable: VariableSpec,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeCut {
    pub fn new(variable: VariableSpec, min: Option<f64>, max: Option<f64>) -> Self {
        Self { variable, min, max }
    }

    fn passes(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value < max)
    }

    fn mask(&self, batch: &RecordBatch) -> SkimResult<BooleanArray> {
        let column = resolve_or_null(batch, &self.variable)?;
        let values = cast(&column, &DataType::Float64)?;
        let values = values
            .as_any()
            .downcast_ref::<arrow::array::Float64Array>()
            .ok_or_else(|| SkimError::UnsupportedColumn {
                column: self.variable.requested().to_string(),
                type_name: column.data_type().to_string(),
            })?;
        Ok(values
            .iter()
            .map(|v| Some(v.is_some_and(|v| self.passes(v))))
            .collect())
    }
}

impl Cut for RangeCut {
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch, CutError> {
        let mask = self.mask(&batch)?;
        Ok(filter_record_batch(&batch, &mask)?)
    }
}

/// Cuts applied in order; stops early once no rows are left.
#[derive(Default)]
pub struct Chain(Vec<Box<dyn Cut>>);

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cut: impl Cut + 'static) {
        self.0.push(Box::new(cut));
    }

    pub fn with(mut self, cut: impl Cut + 'static) -> Self {
        self.push(cut);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Cut for Chain {
    fn apply(&self, mut batch: RecordBatch) -> Result<RecordBatch, CutError> {
        for cut in &self.0 {
            if batch.num_rows() == 0 {
                break;
            }
            batch = cut.apply(batch)?;
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float32Array, Float64Array, Int32Array, ListArray};
    use arrow::datatypes::Float32Type;

    fn batch() -> RecordBatch {
        let lep_pt: ArrayRef = Arc::new(ListArray::from_iter_primitive::<Float32Type, _, _>(vec![
            Some(vec![Some(50.0), Some(30.0)]),
            Some(vec![Some(10.0)]),
            Some(vec![Some(25.0), Some(5.0)]),
        ]));
        RecordBatch::try_from_iter(vec![
            ("lep_pt", lep_pt),
            (
                "met",
                Arc::new(Float64Array::from(vec![Some(1.0), None, Some(3.0)])) as ArrayRef,
            ),
            ("lep_n", Arc::new(Int32Array::from(vec![2, 1, 2])) as ArrayRef),
        ])
        .unwrap()
    }

    #[test]
    fn closure_is_a_cut() {
        let keep_first = |b: RecordBatch| Ok::<_, SkimError>(b.slice(0, 1));
        let out = apply_cut(&keep_first, batch()).unwrap();
        assert_eq!(out.num_rows(), 1);
    }

    #[test]
    fn cut_error_is_surfaced() {
        let failing = |_: RecordBatch| Err::<RecordBatch, _>("no such branch");
        let err = apply_cut(&failing, batch()).unwrap_err();
        match err {
            SkimError::Cut(e) => assert_eq!(e.to_string(), "no such branch"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn growing_cut_breaks_contract() {
        let doubling = |b: RecordBatch| {
            arrow::compute::concat_batches(&b.schema(), &[b.clone(), b.clone()])
        };
        let err = apply_cut(&doubling, batch()).unwrap_err();
        assert!(matches!(
            err,
            SkimError::CutContract {
                rows_in: 3,
                rows_out: 6
            }
        ));
    }

    #[test]
    fn range_on_indexed_variable() {
        let cut = RangeCut::new(VariableSpec::parse("lep_pt[0]").unwrap(), Some(20.0), None);
        let out = apply_cut(&cut, batch()).unwrap();
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn short_rows_fail_an_indexed_range() {
        let second = RangeCut::new(VariableSpec::parse("lep_pt[1]").unwrap(), Some(0.0), None);
        assert_eq!(apply_cut(&second, batch()).unwrap().num_rows(), 2);

        // no row has a third lepton
        let third = RangeCut::new(VariableSpec::parse("lep_pt[2]").unwrap(), Some(0.0), None);
        let out = apply_cut(&third, batch()).unwrap();
        assert_eq!(out.num_rows(), 0);
        assert_eq!(out.num_columns(), 3);
    }

    #[test]
    fn range_is_half_open_and_null_fails() {
        let cut = RangeCut::new(VariableSpec::scalar("met"), Some(1.0), Some(3.0));
        let out = apply_cut(&cut, batch()).unwrap();
        assert_eq!(out.num_rows(), 1);
        let met = out
            .column_by_name("met")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(met.value(0), 1.0);
    }

    #[test]
    fn range_casts_integers() {
        let cut = RangeCut::new(VariableSpec::scalar("lep_n"), None, Some(2.0));
        assert_eq!(apply_cut(&cut, batch()).unwrap().num_rows(), 1);
    }

    #[test]
    fn range_on_missing_column_fails() {
        let cut = RangeCut::new(VariableSpec::scalar("jet_n"), Some(0.0), None);
        let err = apply_cut(&cut, batch()).unwrap_err();
        let SkimError::Cut(inner) = err else {
            panic!("expected cut error");
        };
        assert!(inner.to_string().contains("jet_n"));
    }

    #[test]
    fn chain_applies_in_order() {
        let chain = Chain::new()
            .with(RangeCut::new(VariableSpec::scalar("lep_n"), Some(2.0), None))
            .with(RangeCut::new(VariableSpec::scalar("met"), Some(2.0), None));
        assert_eq!(chain.len(), 2);
        let out = apply_cut(&chain, batch()).unwrap();
        assert_eq!(out.num_rows(), 1);
        let pt = out.column_by_name("lep_pt").unwrap();
        let values = crate::materialize::extract_index("lep_pt[0]", "lep_pt", pt.as_ref(), 0)
            .unwrap();
        let values = values.as_any().downcast_ref::<Float32Array>().unwrap();
        assert_eq!(values.value(0), 25.0);
    }

    #[test]
    fn empty_chain_keeps_everything() {
        let chain = Chain::new();
        assert!(chain.is_empty());
        assert_eq!(apply_cut(&chain, batch()).unwrap().num_rows(), 3);
    }
}
