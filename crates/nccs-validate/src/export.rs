//! Failure export: the rows reviewers must look at, one per EIN.

use std::collections::HashMap;
use std::path::PathBuf;

use nccs_core::RecordTable;
use nccs_ingest::{WorkspaceLayout, write_csv_table};
use nccs_model::validation::{EIN, VALIDATION_REASON};
use nccs_model::{ReleaseForm, Result, ReviewCategory};
use polars::prelude::{IdxCa, IdxSize};
use tracing::info;

/// Where an export landed and how many rows it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureExport {
    pub path: PathBuf,
    pub rows: usize,
}

/// Union of the category masks, one row per EIN, annotated with
/// `VALIDATION_REASON`.
///
/// Rows are ordered by the first category that selected them (L, C, F), then by
/// table order. The reason lists every category that selected the EIN in the
/// same order, e.g. `LF`. Returns `None` when no row is selected.
pub fn failure_rows(
    table: &RecordTable,
    selections: &[(ReviewCategory, &[bool])],
) -> Result<Option<RecordTable>> {
    let eins = table.eins()?;
    let mut order: Vec<usize> = Vec::new();
    let mut reasons: HashMap<&str, String> = HashMap::new();

    for category in ReviewCategory::ORDER {
        for (_, mask) in selections.iter().filter(|(c, _)| *c == category) {
            for (row, selected) in mask.iter().enumerate() {
                if !selected {
                    continue;
                }
                let reason = reasons.entry(eins[row].as_str()).or_insert_with(|| {
                    order.push(row);
                    String::new()
                });
                if !reason.contains(category.letter()) {
                    reason.push(category.letter());
                }
            }
        }
    }
    if order.is_empty() {
        return Ok(None);
    }

    let indices = IdxCa::from_vec(
        "row".into(),
        order.iter().map(|row| *row as IdxSize).collect(),
    );
    let mut rows = RecordTable::new(table.form.clone(), table.data.take(&indices)?)?;
    let annotated = order
        .iter()
        .map(|row| reasons.get(eins[*row].as_str()).cloned())
        .collect();
    rows.set_strings(VALIDATION_REASON, annotated)?;
    Ok(Some(rows))
}

/// Writes the failure export of `form` to `validation/failures/`.
pub fn export_failures(
    layout: &WorkspaceLayout,
    form: ReleaseForm,
    release_year: i32,
    table: &RecordTable,
    selections: &[(ReviewCategory, &[bool])],
) -> Result<Option<FailureExport>> {
    let Some(rows) = failure_rows(table, selections)? else {
        return Ok(None);
    };
    let path = layout.failure_file(form, release_year);
    let written = write_csv_table(&path, &rows.data, EIN)?;
    info!(
        form = %form,
        rows = written,
        path = %path.display(),
        "exported {} rows of {} for review",
        written,
        form
    );
    Ok(Some(FailureExport {
        path,
        rows: written,
    }))
}
