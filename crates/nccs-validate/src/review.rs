//! Review queue over a failure export.
//!
//! The interactive fixer is a separate tool; this module owns the part of its
//! contract the pipeline depends on: which rows still need a reviewer and how
//! `MANUALLY_FIXED` is written.

use std::path::Path;

use nccs_core::RecordTable;
use nccs_ingest::{DelimitedOptions, read_delimited_table};
use nccs_model::validation::{MANUALLY_FIXED, VALIDATION_REASON, VALIDATION_STATE};
use nccs_model::{Result, ReviewCategory, ValidationState};

use crate::engine::{residual_columns, row_states};

/// Which exported rows to bring up for review.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewQuery {
    /// Residual magnitude at which a row needs review regardless of category.
    pub threshold: f64,
    pub categories: Vec<ReviewCategory>,
}

impl Default for ReviewQuery {
    fn default() -> Self {
        Self {
            threshold: 1000.0,
            categories: ReviewCategory::ORDER.to_vec(),
        }
    }
}

impl ReviewQuery {
    fn selects_reason(&self, reason: &str) -> bool {
        self.categories
            .iter()
            .any(|category| reason.contains(category.letter()))
    }
}

/// Rows of an export still waiting for a reviewer.
///
/// Ignored rows never come back. Other rows come back while a residual is at
/// or beyond the threshold, or while they were exported for a requested
/// category and nobody has fixed or checked them yet.
pub fn review_queue(export: &RecordTable, query: &ReviewQuery) -> Result<RecordTable> {
    let states = row_states(export)?;
    let reasons = if export.has_column(VALIDATION_REASON) {
        export.strings(VALIDATION_REASON)?
    } else {
        vec![None; export.record_count()]
    };
    let mut over_threshold = vec![false; export.record_count()];
    for column in residual_columns(export) {
        for (row, residual) in export.numbers(&column)?.into_iter().enumerate() {
            if residual.is_some_and(|value| value.abs() >= query.threshold) {
                over_threshold[row] = true;
            }
        }
    }

    let mask: Vec<bool> = states
        .iter()
        .zip(&reasons)
        .zip(&over_threshold)
        .map(|((state, reason), over)| {
            let pending = !matches!(state, ValidationState::Fixed | ValidationState::Checked)
                && reason
                    .as_deref()
                    .is_some_and(|reason| query.selects_reason(reason));
            *state != ValidationState::Ignored && (*over || pending)
        })
        .collect();
    export.filtered(&mask)
}

/// Reads a failure export written by the pipeline.
pub fn load_export(path: &Path) -> Result<RecordTable> {
    let data = read_delimited_table(path, &DelimitedOptions::default())?;
    let mut table = RecordTable::new("export", data)?;
    let numeric: Vec<String> = residual_columns(&table)
        .into_iter()
        .chain([VALIDATION_STATE.to_string()])
        .collect();
    let numeric: Vec<&str> = numeric.iter().map(String::as_str).collect();
    table.coerce_numeric(&numeric, None)?;
    Ok(table)
}

/// Adds `columns` to a `MANUALLY_FIXED` list: space separated, upper case,
/// each column once, in first-seen order.
pub fn record_manual_fix(existing: Option<&str>, columns: &[&str]) -> String {
    let mut listed: Vec<String> = Vec::new();
    let existing = existing.unwrap_or_default().split_whitespace();
    for column in existing.chain(columns.iter().copied()) {
        let column = column.trim().to_uppercase();
        if !column.is_empty() && !listed.contains(&column) {
            listed.push(column);
        }
    }
    listed.join(" ")
}

/// Rewrites every `MANUALLY_FIXED` cell of `table` in [`record_manual_fix`]
/// form. Returns the rows that list at least one column.
pub fn normalize_manually_fixed(table: &mut RecordTable) -> Result<usize> {
    if !table.has_column(MANUALLY_FIXED) {
        return Ok(0);
    }
    let values: Vec<Option<String>> = table
        .strings(MANUALLY_FIXED)?
        .iter()
        .map(|value| Some(record_manual_fix(value.as_deref(), &[])))
        .collect();
    let listed = values
        .iter()
        .filter(|value| value.as_deref().is_some_and(|v| !v.is_empty()))
        .count();
    table.set_strings(MANUALLY_FIXED, values)?;
    Ok(listed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn manual_fix_lists_are_normalized() {
        assert_eq!(record_manual_fix(None, &["totrev"]), "TOTREV");
        assert_eq!(
            record_manual_fix(Some("TOTREV exps"), &["Totrev", "NETINC"]),
            "TOTREV EXPS NETINC"
        );
        assert_eq!(record_manual_fix(Some(""), &[]), "");
    }

    #[test]
    fn queue_skips_ignored_and_resolved_rows() {
        let export = RecordTable::new(
            "CO",
            df!(
                "EIN" => &["1", "2", "3", "4", "5"],
                "validate_ez_totrev" => &[5000.0, 5000.0, 0.0, 0.0, 0.0],
                VALIDATION_REASON => &["F", "F", "L", "L", "C"],
                VALIDATION_STATE => &[2.0, 1.0, 0.0, 3.0, 0.0],
            )
            .unwrap(),
        )
        .unwrap();
        let query = ReviewQuery {
            threshold: 1000.0,
            categories: vec![ReviewCategory::Largest],
        };
        let queue = review_queue(&export, &query).unwrap();
        assert_eq!(queue.eins().unwrap(), vec!["2", "3"]);
    }

    #[test]
    fn fixer_lists_are_rewritten_in_place() {
        let mut table = RecordTable::new(
            "PF",
            df!("EIN" => &["1", "2"], MANUALLY_FIXED => &["", "name  p1totrev NAME"]).unwrap(),
        )
        .unwrap();
        assert_eq!(normalize_manually_fixed(&mut table).unwrap(), 1);
        assert_eq!(
            table.strings(MANUALLY_FIXED).unwrap(),
            vec![Some(String::new()), Some("NAME P1TOTREV".to_string())]
        );
    }
}
