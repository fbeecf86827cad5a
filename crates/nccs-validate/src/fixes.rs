//! Fix reintegration: reviewed rows coming back from the fixer tool.
//!
//! A fix batch is the failure export after review, dropped into
//! `validation/fixes/<form>_<year>_validate.csv`. Each of its rows replaces
//! the working row with the same EIN before validation runs again.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use nccs_core::RecordTable;
use nccs_core::numeric::make_numeric;
use nccs_ingest::{DelimitedOptions, WorkspaceLayout, read_delimited_table};
use nccs_model::validation::{EIN, VALIDATION_STATE};
use nccs_model::{ReleaseForm, Result};
use polars::prelude::DataFrame;
use tracing::{debug, info};

use crate::engine::drop_residual_columns;
use crate::review::normalize_manually_fixed;

/// A reviewed batch of rows for one release form.
#[derive(Debug, Clone)]
pub struct FixBatch {
    pub form: ReleaseForm,
    pub path: PathBuf,
    pub records: RecordTable,
}

impl FixBatch {
    /// Loads the batch for `(form, year)`, or `None` when no file was dropped in.
    pub fn load(layout: &WorkspaceLayout, form: ReleaseForm, year: i32) -> Result<Option<Self>> {
        let path = layout.fix_file(form, year);
        if !path.is_file() {
            debug!(form = %form, path = %path.display(), "no fix batch");
            return Ok(None);
        }
        let data = read_delimited_table(&path, &DelimitedOptions::default())?;
        let batch = Self::from_frame(form, path, data)?;
        info!(
            form = %form,
            rows = batch.records.record_count(),
            fixes = batch.fixes_applied()?,
            "Found {} validation fixes for {}",
            batch.records.record_count(),
            form
        );
        Ok(Some(batch))
    }

    /// Wraps a text frame: numeric columns are recast without filling, the
    /// residual columns of the export are dropped and `MANUALLY_FIXED` lists
    /// are normalized.
    pub fn from_frame(form: ReleaseForm, path: PathBuf, data: DataFrame) -> Result<Self> {
        let mut records = RecordTable::new(form.code(), data)?;
        make_numeric(&mut records, None)?;
        records.coerce_numeric(&[VALIDATION_STATE], None)?;
        drop_residual_columns(&mut records);
        let edited = normalize_manually_fixed(&mut records)?;
        debug!(form = %form, edited, "rows with manual edits");
        Ok(Self {
            form,
            path,
            records,
        })
    }

    /// Rows a reviewer changed, i.e. with a nonzero validation state.
    pub fn fixes_applied(&self) -> Result<usize> {
        Ok(self
            .records
            .numbers_or_null(VALIDATION_STATE)?
            .into_iter()
            .flatten()
            .filter(|state| *state != 0.0)
            .count())
    }

    /// Overwrites every working row whose EIN is in the batch.
    ///
    /// Columns the batch does not carry keep their working values. EINs that
    /// are no longer in the table are skipped. Returns the rows overwritten.
    pub fn integrate_into(&self, table: &mut RecordTable) -> Result<usize> {
        let mut batch_rows: HashMap<String, usize> = HashMap::new();
        for (idx, ein) in self.records.eins()?.into_iter().enumerate() {
            batch_rows.entry(ein).or_insert(idx);
        }
        let matches: Vec<Option<usize>> = table
            .eins()?
            .iter()
            .map(|ein| batch_rows.get(ein).copied())
            .collect();
        let overwritten = matches.iter().flatten().count();
        if overwritten == 0 {
            return Ok(0);
        }

        for name in table.column_names() {
            if name == EIN || !self.records.has_column(&name) {
                continue;
            }
            if table.is_numeric(&name) {
                let fixed = self.records.numbers(&name)?;
                let current = table.numbers(&name)?;
                let merged = splice(&matches, current, &fixed);
                table.set_numbers(&name, merged)?;
            } else {
                let fixed = self.records.strings(&name)?;
                let current = table.strings(&name)?;
                let merged = splice(&matches, current, &fixed);
                table.set_strings(&name, merged)?;
            }
        }

        let matched: HashSet<usize> = matches.iter().flatten().copied().collect();
        let skipped = batch_rows.len() - matched.len();
        info!(
            form = %self.form,
            rows = overwritten,
            skipped,
            "Integrated {} rows of validation fixes into {}",
            overwritten,
            self.form
        );
        Ok(overwritten)
    }
}

fn splice<T: Clone>(matches: &[Option<usize>], current: Vec<T>, fixed: &[T]) -> Vec<T> {
    current
        .into_iter()
        .zip(matches)
        .map(|(value, matched)| match matched {
            Some(idx) => fixed[*idx].clone(),
            None => value,
        })
        .collect()
}

/// Result of reintegrating one form's fix batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reintegration {
    pub rows_overwritten: usize,
    pub fixes_applied: usize,
}

/// Loads and integrates the fix batch of `form`, if there is one.
pub fn reintegrate(
    layout: &WorkspaceLayout,
    form: ReleaseForm,
    year: i32,
    table: &mut RecordTable,
) -> Result<Option<Reintegration>> {
    let Some(batch) = FixBatch::load(layout, form, year)? else {
        return Ok(None);
    };
    Ok(Some(Reintegration {
        rows_overwritten: batch.integrate_into(table)?,
        fixes_applied: batch.fixes_applied()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nccs_model::validation::MANUALLY_FIXED;
    use polars::prelude::*;

    #[test]
    fn batch_columns_are_typed_and_stripped() {
        let batch = FixBatch::from_frame(
            ReleaseForm::Pf,
            PathBuf::from("pf_2015_validate.csv"),
            df!(
                "EIN" => &["1", "2"],
                "P1TOTREV" => &["10", ""],
                "validate_pf_p1totrev" => &["0", "5"],
                VALIDATION_STATE => &["1", "0"],
                "NAME" => &["A", "B"],
                MANUALLY_FIXED => &["p1totrev P1TOTREV", ""],
            )
            .unwrap(),
        )
        .unwrap();
        assert!(!batch.records.has_column("validate_pf_p1totrev"));
        assert_eq!(
            batch.records.strings(MANUALLY_FIXED).unwrap()[0].as_deref(),
            Some("P1TOTREV")
        );
        assert_eq!(
            batch.records.numbers("P1TOTREV").unwrap(),
            vec![Some(10.0), None]
        );
        assert_eq!(batch.fixes_applied().unwrap(), 1);
    }

    #[test]
    fn unmatched_rows_and_columns_are_untouched() {
        let batch = FixBatch::from_frame(
            ReleaseForm::Pf,
            PathBuf::from("fix.csv"),
            df!(
                "EIN" => &["2", "9"],
                "P1TOTREV" => &["40", "90"],
                VALIDATION_STATE => &["1", "1"],
            )
            .unwrap(),
        )
        .unwrap();
        let mut table = RecordTable::new(
            "PF",
            df!(
                "EIN" => &["1", "2"],
                "P1TOTREV" => &[1.0, 2.0],
                "NAME" => &["A", "B"],
                VALIDATION_STATE => &[0.0, 0.0],
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(batch.integrate_into(&mut table).unwrap(), 1);
        assert_eq!(
            table.numbers("P1TOTREV").unwrap(),
            vec![Some(1.0), Some(40.0)]
        );
        assert_eq!(
            table.numbers(VALIDATION_STATE).unwrap(),
            vec![Some(0.0), Some(1.0)]
        );
        assert_eq!(table.strings("NAME").unwrap()[1].as_deref(), Some("B"));
        assert_eq!(table.record_count(), 2);
    }
}
