//! Wide-to-tall restructuring for repeated-measurement tables.
//!
//! A wide table has one row per subject-and-visit with one column per
//! measurement; the tall form has one row per subject, visit, and
//! measurement. Identifier columns are carried onto every tall row and each
//! measure contributes one block of rows tagged with its code, name, and
//! unit.

use anyhow::Result;
use polars::prelude::DataFrame;
use tracing::debug;

use clinmap_common::frame_from_opt_strings;
use clinmap_model::spec::TransposeSpec;

use crate::patterns::merged_column;

/// Pivot a wide frame into the tall layout described by `spec`.
///
/// - Requested id columns absent from the input are silently dropped.
/// - A measure without a unit yields a null unit value, not an error.
/// - Rows whose measurement value is null are dropped.
/// - Zero matching measure columns yields an empty frame with the full
///   output schema.
///
/// Row order is preserved within each measure block and blocks follow the
/// measure order of the spec.
pub fn transpose_wide(frame: &DataFrame, spec: &TransposeSpec) -> Result<DataFrame> {
    let height = frame.height();

    // Id columns that actually exist, with their values, in declared order.
    let id_columns: Vec<(String, Vec<Option<String>>)> = spec
        .id_columns
        .iter()
        .filter_map(|name| merged_column(frame, name).map(|values| (name.clone(), values)))
        .collect();
    if id_columns.len() < spec.id_columns.len() {
        debug!(
            requested = spec.id_columns.len(),
            present = id_columns.len(),
            "id columns absent from wide input were dropped"
        );
    }

    let mut out: Vec<(String, Vec<Option<String>>)> = id_columns
        .iter()
        .map(|(name, _)| (name.clone(), Vec::new()))
        .collect();
    out.push((spec.result_target.clone(), Vec::new()));
    out.push((spec.code_target.clone(), Vec::new()));
    out.push((spec.name_target.clone(), Vec::new()));
    if let Some(unit_target) = &spec.unit_target {
        out.push((unit_target.clone(), Vec::new()));
    }
    let result_idx = id_columns.len();

    for measure in &spec.measures {
        let Some(values) = merged_column(frame, &measure.column) else {
            continue;
        };
        for row in 0..height {
            let Some(result) = values.get(row).cloned().flatten() else {
                continue;
            };
            for (col_idx, (_, id_values)) in id_columns.iter().enumerate() {
                out[col_idx].1.push(id_values[row].clone());
            }
            out[result_idx].1.push(Some(result));
            out[result_idx + 1].1.push(Some(measure.code.clone()));
            out[result_idx + 2].1.push(Some(measure.name.clone()));
            if spec.unit_target.is_some() {
                out[result_idx + 3].1.push(measure.unit.clone());
            }
        }
    }

    frame_from_opt_strings(out)
}
