//! Concatenate retained units into one batch per sample

use std::sync::Arc;

use arrow::array::{new_null_array, ArrayRef, RecordBatch};
use arrow::compute::concat_batches;
use arrow::datatypes::{Field, Schema, SchemaRef};

use crate::error::{SkimError, SkimResult};

/// Union of the columns of `schemas` in first-seen order, every field nullable.
pub fn unify_schemas<'a>(schemas: impl IntoIterator<Item = &'a Schema>) -> SkimResult<SchemaRef> {
    let mut fields: Vec<Field> = Vec::new();
    for schema in schemas {
        for field in schema.fields() {
            match fields.iter().find(|f| f.name() == field.name()) {
                Some(existing) if existing.data_type() != field.data_type() => {
                    return Err(SkimError::SchemaMismatch {
                        column: field.name().clone(),
                        expected: existing.data_type().clone(),
                        found: field.data_type().clone(),
                    });
                }
                Some(_) => {}
                None => fields.push(field.as_ref().clone().with_nullable(true)),
            }
        }
    }
    Ok(Arc::new(Schema::new(fields)))
}

/// Reshape `batch` to `schema`, filling absent columns with nulls.
fn conform(batch: &RecordBatch, schema: &SchemaRef) -> SkimResult<RecordBatch> {
    let columns: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(column) => column.clone(),
            None => new_null_array(field.data_type(), batch.num_rows()),
        })
        .collect();
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Zero units give `None`, one unit is returned unchanged, more are
/// concatenated once.
pub fn concat_units(mut units: Vec<RecordBatch>) -> SkimResult<Option<RecordBatch>> {
    match units.len() {
        0 => Ok(None),
        1 => Ok(units.pop()),
        _ => {
            let first = units[0].schema();
            if units.iter().all(|u| u.schema() == first) {
                return Ok(Some(concat_batches(&first, &units)?));
            }
            let schemas: Vec<SchemaRef> = units.iter().map(RecordBatch::schema).collect();
            let schema = unify_schemas(schemas.iter().map(|s| &**s))?;
            log::debug!(
                "Unifying {} units into {} columns",
                units.len(),
                schema.fields().len()
            );
            let conformed = units
                .iter()
                .map(|u| conform(u, &schema))
                .collect::<SkimResult<Vec<_>>>()?;
            Ok(Some(concat_batches(&schema, &conformed)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, Int32Array};
    use arrow::datatypes::DataType;

    fn unit(n: i32) -> RecordBatch {
        RecordBatch::try_from_iter(vec![(
            "met",
            Arc::new(Int32Array::from((0..n).collect::<Vec<_>>())) as ArrayRef,
        )])
        .unwrap()
    }

    fn weighted_unit(n: i32) -> RecordBatch {
        RecordBatch::try_from_iter(vec![
            (
                "met",
                Arc::new(Int32Array::from((0..n).collect::<Vec<_>>())) as ArrayRef,
            ),
            (
                "totalWeight",
                Arc::new(Float64Array::from(vec![0.5; n as usize])) as ArrayRef,
            ),
        ])
        .unwrap()
    }

    #[test]
    fn no_units_is_absent() {
        assert!(concat_units(vec![]).unwrap().is_none());
    }

    #[test]
    fn single_unit_is_unchanged() {
        let u = unit(3);
        let out = concat_units(vec![u.clone()]).unwrap().unwrap();
        assert_eq!(out, u);
    }

    #[test]
    fn concatenates_same_schema() {
        let out = concat_units(vec![unit(3), unit(4), unit(1)]).unwrap().unwrap();
        assert_eq!(out.num_rows(), 8);
        assert_eq!(out.num_columns(), 1);
    }

    #[test]
    fn fills_missing_columns_with_nulls() {
        let out = concat_units(vec![unit(2), weighted_unit(3)]).unwrap().unwrap();
        assert_eq!(out.num_rows(), 5);
        let weight = out.column_by_name("totalWeight").unwrap();
        assert_eq!(weight.null_count(), 2);
        assert!(out.schema().field(1).is_nullable());
    }

    #[test]
    fn type_conflict_fails() {
        let other = RecordBatch::try_from_iter(vec![(
            "met",
            Arc::new(Float64Array::from(vec![1.0])) as ArrayRef,
        )])
        .unwrap();
        let err = concat_units(vec![unit(1), other]).unwrap_err();
        match err {
            SkimError::SchemaMismatch {
                column,
                expected,
                found,
            } => {
                assert_eq!(column, "met");
                assert_eq!(expected, DataType::Int32);
                assert_eq!(found, DataType::Float64);
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
