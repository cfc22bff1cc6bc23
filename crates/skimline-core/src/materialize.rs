//! Resolve variable specs into concrete output columns

use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, AsArray, RecordBatch, RecordBatchOptions, UInt64Array,
};
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Schema};
use rustc_hash::FxHashSet;

use crate::error::{SkimError, SkimResult};
use crate::variable::VariableSpec;

/// `(start, len)` of every row of a list column within its child values.
/// Null rows have length 0. `None` if the column is not a list.
fn row_spans(array: &dyn Array) -> Option<Vec<(usize, usize)>> {
    let spans = match array.data_type() {
        DataType::List(_) => {
            let list = array.as_list::<i32>();
            let offsets = list.value_offsets();
            (0..list.len())
                .map(|row| {
                    span_or_empty(
                        list.is_null(row),
                        offsets[row] as usize,
                        offsets[row + 1] as usize,
                    )
                })
                .collect()
        }
        DataType::LargeList(_) => {
            let list = array.as_list::<i64>();
            let offsets = list.value_offsets();
            (0..list.len())
                .map(|row| {
                    span_or_empty(
                        list.is_null(row),
                        offsets[row] as usize,
                        offsets[row + 1] as usize,
                    )
                })
                .collect()
        }
        DataType::FixedSizeList(_, size) => {
            let list = array.as_fixed_size_list();
            let size = *size as usize;
            (0..list.len())
                .map(|row| {
                    let start = list.value_offset(row) as usize;
                    span_or_empty(list.is_null(row), start, start + size)
                })
                .collect()
        }
        _ => return None,
    };
    Some(spans)
}

fn span_or_empty(is_null: bool, start: usize, end: usize) -> (usize, usize) {
    if is_null {
        (start, 0)
    } else {
        (start, end - start)
    }
}

fn list_values(array: &dyn Array) -> ArrayRef {
    match array.data_type() {
        DataType::List(_) => array.as_list::<i32>().values().clone(),
        DataType::LargeList(_) => array.as_list::<i64>().values().clone(),
        _ => array.as_fixed_size_list().values().clone(),
    }
}

/// Widest row of a list column, or `None` if the column is not a list.
pub fn max_row_len(array: &dyn Array) -> Option<usize> {
    row_spans(array).map(|spans| spans.iter().map(|&(_, len)| len).max().unwrap_or(0))
}

/// Column `[:, index]` of a list column; rows shorter than `index + 1` become null.
pub fn extract_index(
    requested: &str,
    base: &str,
    array: &dyn Array,
    index: usize,
) -> SkimResult<ArrayRef> {
    let spans = row_spans(array).ok_or_else(|| SkimError::NotNested {
        requested: requested.to_string(),
        base: base.to_string(),
    })?;

    let max_len = spans.iter().map(|&(_, len)| len).max().unwrap_or(0);
    if index >= max_len {
        return Err(SkimError::IndexOutOfRange {
            requested: requested.to_string(),
            index,
            max_len,
        });
    }

    take_index(array, &spans, index)
}

fn take_index(array: &dyn Array, spans: &[(usize, usize)], index: usize) -> SkimResult<ArrayRef> {
    let values = list_values(array);
    if spans.iter().all(|&(_, len)| len <= index) {
        return Ok(new_null_array(values.data_type(), spans.len()));
    }
    let indices: UInt64Array = spans
        .iter()
        .map(|&(start, len)| (len > index).then_some((start + index) as u64))
        .collect();
    Ok(take(values.as_ref(), &indices, None)?)
}

/// Resolve one spec against a batch.
pub fn resolve(batch: &RecordBatch, spec: &VariableSpec) -> SkimResult<ArrayRef> {
    let column = batch
        .column_by_name(spec.base())
        .ok_or_else(|| SkimError::VariableNotFound {
            requested: spec.requested().to_string(),
            base: spec.base().to_string(),
            available: column_names(batch),
        })?;

    match spec.index() {
        None => Ok(column.clone()),
        Some(index) => extract_index(spec.requested(), spec.base(), column.as_ref(), index),
    }
}

/// Like [`resolve`], but an index past every row yields an all-null column
/// instead of an error.
pub fn resolve_or_null(batch: &RecordBatch, spec: &VariableSpec) -> SkimResult<ArrayRef> {
    let Some(index) = spec.index() else {
        return resolve(batch, spec);
    };
    let column = batch
        .column_by_name(spec.base())
        .ok_or_else(|| SkimError::VariableNotFound {
            requested: spec.requested().to_string(),
            base: spec.base().to_string(),
            available: column_names(batch),
        })?;
    let spans = row_spans(column.as_ref()).ok_or_else(|| SkimError::NotNested {
        requested: spec.requested().to_string(),
        base: spec.base().to_string(),
    })?;
    take_index(column.as_ref(), &spans, index)
}

pub fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

/// Build the output batch: one column per distinct requested name, in spec
/// order, followed by columns a cut derived (present in `batch` but not in
/// `read_columns`). Everything else is dropped.
pub fn materialize(
    batch: &RecordBatch,
    specs: &[VariableSpec],
    read_columns: &[String],
) -> SkimResult<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<Field> = Vec::with_capacity(specs.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(specs.len());
    let mut seen: FxHashSet<&str> = FxHashSet::default();

    for spec in specs {
        if !seen.insert(spec.requested()) {
            continue;
        }
        let column = resolve(batch, spec)?;
        let field = match spec {
            VariableSpec::Scalar(name) => schema
                .field_with_name(name)
                .cloned()
                .unwrap_or_else(|_| Field::new(name, column.data_type().clone(), true)),
            VariableSpec::Indexed { requested, .. } => {
                Field::new(requested, column.data_type().clone(), true)
            }
        };
        fields.push(field);
        columns.push(column);
    }

    let read: FxHashSet<&str> = read_columns.iter().map(String::as_str).collect();
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let name = field.name().as_str();
        if read.contains(name) || seen.contains(name) {
            continue;
        }
        log::trace!("Keeping derived column '{name}'");
        fields.push(field.as_ref().clone());
        columns.push(column.clone());
    }

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        columns,
        &options,
    )?)
}

/// Return `batch` with `column` appended, replacing any column of the same name.
pub fn with_column(batch: &RecordBatch, field: Field, column: ArrayRef) -> SkimResult<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<Field> = Vec::with_capacity(schema.fields().len() + 1);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len() + 1);
    for (f, c) in schema.fields().iter().zip(batch.columns()) {
        if f.name() != field.name() {
            fields.push(f.as_ref().clone());
            columns.push(c.clone());
        }
    }
    fields.push(field);
    columns.push(column);
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float32Array, Float64Array, Int32Array, ListArray};
    use arrow::datatypes::Float32Type;

    use crate::variable::parse_specs;

    fn lep_pt() -> ArrayRef {
        Arc::new(ListArray::from_iter_primitive::<Float32Type, _, _>(vec![
            Some(vec![Some(50.0), Some(30.0), Some(10.0)]),
            Some(vec![Some(40.0)]),
            Some(vec![Some(60.0), Some(20.0)]),
        ]))
    }

    fn batch() -> RecordBatch {
        RecordBatch::try_from_iter(vec![
            ("lep_pt", lep_pt()),
            ("met", Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0])) as ArrayRef),
            ("lep_n", Arc::new(Int32Array::from(vec![3, 1, 2])) as ArrayRef),
        ])
        .unwrap()
    }

    #[test]
    fn pads_short_rows_with_null() {
        let col = extract_index("lep_pt[1]", "lep_pt", lep_pt().as_ref(), 1).unwrap();
        let col = col.as_any().downcast_ref::<Float32Array>().unwrap();
        assert_eq!(col.len(), 3);
        assert_eq!(col.value(0), 30.0);
        assert!(col.is_null(1));
        assert_eq!(col.value(2), 20.0);
    }

    #[test]
    fn no_nulls_when_every_row_is_wide_enough() {
        let col = extract_index("lep_pt[0]", "lep_pt", lep_pt().as_ref(), 0).unwrap();
        assert_eq!(col.null_count(), 0);
    }

    #[test]
    fn index_at_max_len_fails() {
        let err = extract_index("lep_pt[3]", "lep_pt", lep_pt().as_ref(), 3).unwrap_err();
        match err {
            SkimError::IndexOutOfRange { index, max_len, .. } => {
                assert_eq!(index, 3);
                assert_eq!(max_len, 3);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn scalar_column_is_not_nested() {
        let b = batch();
        let err = resolve(&b, &VariableSpec::parse("met[0]").unwrap()).unwrap_err();
        assert!(matches!(err, SkimError::NotNested { .. }));
    }

    #[test]
    fn missing_base_lists_columns() {
        let b = batch();
        let err = resolve(&b, &VariableSpec::parse("jet_pt[0]").unwrap()).unwrap_err();
        match err {
            SkimError::VariableNotFound { available, .. } => {
                assert_eq!(available, ["lep_pt", "met", "lep_n"]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn null_list_rows_count_as_empty() {
        let list: ArrayRef = Arc::new(ListArray::from_iter_primitive::<Float32Type, _, _>(vec![
            None,
            Some(vec![Some(1.0), Some(2.0)]),
        ]));
        assert_eq!(max_row_len(list.as_ref()), Some(2));
        let col = extract_index("x[1]", "x", list.as_ref(), 1).unwrap();
        assert!(col.is_null(0));
        assert!(!col.is_null(1));
    }

    #[test]
    fn sliced_list_uses_its_own_offsets() {
        let sliced = lep_pt().slice(1, 2);
        let col = extract_index("lep_pt[0]", "lep_pt", sliced.as_ref(), 0).unwrap();
        let col = col.as_any().downcast_ref::<Float32Array>().unwrap();
        assert_eq!(col.values().to_vec(), vec![40.0, 60.0]);
    }

    #[test]
    fn unread_columns_count_as_derived() {
        let b = batch();
        let specs = parse_specs(&["lep_pt[0]", "met"]).unwrap();
        let read = vec!["lep_pt".to_string(), "met".to_string()];
        let out = materialize(&b, &specs, &read).unwrap();
        assert_eq!(column_names(&out), ["lep_pt[0]", "met", "lep_n"]);
    }

    #[test]
    fn drops_read_but_unrequested_columns() {
        let b = batch();
        let specs = parse_specs(&["met", "met", "lep_pt[0]"]).unwrap();
        let read = vec!["lep_pt".to_string(), "met".to_string(), "lep_n".to_string()];
        let out = materialize(&b, &specs, &read).unwrap();
        assert_eq!(column_names(&out), ["met", "lep_pt[0]"]);
        assert_eq!(out.num_rows(), 3);
    }

    #[test]
    fn cut_derived_column_survives() {
        let b = with_column(
            &batch(),
            Field::new("weight", DataType::Float64, false),
            Arc::new(Float64Array::from(vec![0.5, 0.5, 0.5])),
        )
        .unwrap();
        let specs = parse_specs(&["lep_pt[2]"]).unwrap();
        let read = vec!["lep_pt".to_string(), "met".to_string(), "lep_n".to_string()];
        let out = materialize(&b, &specs, &read).unwrap();
        assert_eq!(column_names(&out), ["lep_pt[2]", "weight"]);
        assert_eq!(out.column(0).null_count(), 2);
    }

    #[test]
    fn with_column_replaces_existing() {
        let b = batch();
        let replaced = with_column(
            &b,
            Field::new("met", DataType::Float64, false),
            Arc::new(Float64Array::from(vec![9.0, 9.0, 9.0])),
        )
        .unwrap();
        assert_eq!(column_names(&replaced), ["lep_pt", "lep_n", "met"]);
    }
}
