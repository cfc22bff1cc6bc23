//! Per-file reconciliation of the working variable list

use crate::variable::VariableSpec;

/// Column holding the per-event weight of simulated samples.
pub const DEFAULT_WEIGHT_COLUMN: &str = "totalWeight";

/// Adjust `specs` to what a file actually carries.
///
/// A weight column present in the file is always read, even if nobody asked
/// for it; a requested weight column the file lacks is dropped. Files of one
/// sample may disagree (real data carries no weights), so this runs per file.
pub fn reconcile(
    specs: &[VariableSpec],
    file_columns: &[String],
    weight_column: &str,
) -> Vec<VariableSpec> {
    let in_file = file_columns.iter().any(|c| c == weight_column);
    let requested = specs.iter().any(|s| s.base() == weight_column);

    match (in_file, requested) {
        (true, false) => {
            let mut out = specs.to_vec();
            out.push(VariableSpec::scalar(weight_column));
            out
        }
        (false, true) => specs
            .iter()
            .filter(|s| s.base() != weight_column)
            .cloned()
            .collect(),
        _ => specs.to_vec(),
    }
}

/// Distinct base columns to read, in first-seen order.
pub fn columns_to_read(specs: &[VariableSpec]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::with_capacity(specs.len());
    for spec in specs {
        if !columns.iter().any(|c| c == spec.base()) {
            columns.push(spec.base().to_string());
        }
    }
    columns
}

/// `columns_to_read`, plus the `extras` the file carries.
///
/// An extra the file lacks stays out of the read list, so a cut that derives
/// a column of that name still gets it written.
pub fn columns_with_extras(
    specs: &[VariableSpec],
    extras: &[String],
    file_columns: &[String],
) -> Vec<String> {
    let mut columns = columns_to_read(specs);
    for extra in extras {
        if file_columns.contains(extra) && !columns.contains(extra) {
            columns.push(extra.clone());
        }
    }
    columns
}
