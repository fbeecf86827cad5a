//! The `review` subcommand: the pending part of one failure export.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use nccs_core::RecordTable;
use nccs_ingest::WorkspaceLayout;
use nccs_model::validation::{VALIDATION_REASON, VALIDATION_STATE};
use nccs_model::{ReleaseForm, ValidationState};
use nccs_validate::engine::residual_columns;
use nccs_validate::review::load_export;
use nccs_validate::{ReviewQuery, review_queue};

/// One exported row still waiting for a reviewer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRow {
    pub ein: String,
    pub name: Option<String>,
    pub reason: String,
    pub state: ValidationState,
    /// Residual column with the largest magnitude, and its value.
    pub worst: Option<(String, f64)>,
}

#[derive(Debug, Clone)]
pub struct ReviewResult {
    pub form: ReleaseForm,
    pub export: PathBuf,
    pub exported: usize,
    pub pending: usize,
    pub rows: Vec<ReviewRow>,
}

/// Reads the export of `(form, year)` and keeps the rows `query` selects.
pub fn load_review(
    layout: &WorkspaceLayout,
    form: ReleaseForm,
    year: i32,
    query: &ReviewQuery,
    limit: usize,
) -> Result<ReviewResult> {
    let export = layout.failure_file(form, year);
    if !export.is_file() {
        bail!(
            "no failure export for {form} {year} at {}; run `nccs build` first",
            export.display()
        );
    }
    let table = load_export(&export).with_context(|| format!("read {}", export.display()))?;
    let queue = review_queue(&table, query).context("select review queue")?;
    let mut rows = review_rows(&queue)?;
    let pending = rows.len();
    rows.truncate(limit);
    Ok(ReviewResult {
        form,
        export,
        exported: table.record_count(),
        pending,
        rows,
    })
}

/// Flattens a review queue into display rows, in export order.
pub fn review_rows(queue: &RecordTable) -> Result<Vec<ReviewRow>> {
    let count = queue.record_count();
    let eins = queue.eins()?;
    let names = optional_strings(queue, "NAME")?;
    let reasons = optional_strings(queue, VALIDATION_REASON)?;
    let states = queue.numbers_or_null(VALIDATION_STATE)?;

    let mut worst: Vec<Option<(String, f64)>> = vec![None; count];
    for column in residual_columns(queue) {
        for (row, value) in queue.numbers(&column)?.into_iter().enumerate() {
            let Some(value) = value else { continue };
            let larger = worst[row]
                .as_ref()
                .is_none_or(|(_, current)| value.abs() > current.abs());
            if larger {
                worst[row] = Some((column.clone(), value));
            }
        }
    }

    Ok((0..count)
        .map(|row| ReviewRow {
            ein: eins[row].clone(),
            name: names[row].clone(),
            reason: reasons[row].clone().unwrap_or_default(),
            state: ValidationState::from_value(states[row]),
            worst: worst[row].clone(),
        })
        .collect())
}

fn optional_strings(table: &RecordTable, name: &str) -> Result<Vec<Option<String>>> {
    if table.has_column(name) {
        Ok(table.strings(name)?)
    } else {
        Ok(vec![None; table.record_count()])
    }
}
