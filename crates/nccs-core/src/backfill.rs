//! Backfill: carry forward organizations missing from this year's extracts.
//!
//! For each prior release, most recent first, EINs absent from the table
//! assembled so far are appended from that release's finalized table.

use std::collections::HashSet;

use nccs_ingest::{DtypeTemplate, ReferenceRequest, ReferenceSource};
use nccs_model::validation::{EIN, SOURCE};
use nccs_model::{ReleaseForm, Result};
use tracing::info;

use crate::frame::RecordTable;
use crate::numeric::PRIOR_NUMERIC_COLUMNS;
use crate::pipeline_context::PipelineContext;
use crate::release::ReleaseTables;
use crate::source::fill_tracking;

/// Appends rows of `prior` whose EIN is not yet in `table`.
///
/// `prior` is tagged with `source_tag` and cut down to the columns of `table`.
/// Returns the appended EINs.
pub fn append_missing(
    form: ReleaseForm,
    table: &mut RecordTable,
    prior: RecordTable,
    source_tag: &str,
) -> Result<Vec<String>> {
    let mut prior = prior;
    let rows = prior.record_count();
    prior.set_strings(SOURCE, vec![Some(source_tag.to_string()); rows])?;

    let current: HashSet<String> = table.column_names().into_iter().collect();
    let keep: Vec<String> = prior
        .column_names()
        .into_iter()
        .filter(|name| current.contains(name))
        .collect();
    prior.data = prior.data.select(keep.iter().map(String::as_str))?;

    if form.is_charity() {
        let present: Vec<&str> = PRIOR_NUMERIC_COLUMNS
            .iter()
            .copied()
            .filter(|column| prior.has_column(column))
            .collect();
        prior.coerce_numeric(&present, Some(0.0))?;
    }

    let existing: HashSet<String> = table.eins()?.into_iter().collect();
    let prior_eins = prior.eins()?;
    let mut seen = HashSet::new();
    let mask: Vec<bool> = prior_eins
        .iter()
        .map(|ein| !existing.contains(ein) && seen.insert(ein.clone()))
        .collect();
    let appended = prior.filtered(&mask)?;
    let eins = appended.eins()?;

    table.append(&appended.data)?;
    fill_tracking(table)?;
    Ok(eins)
}

/// Backfills every release form from `backfill_depth` prior releases.
pub fn backfill(ctx: &mut PipelineContext, releases: &mut ReleaseTables) -> Result<()> {
    let years = ctx.options.backfill_years();
    for (form, table) in releases.iter_mut() {
        for &year in &years {
            let name = format!("core{year}{}", form.stem());
            info!(form = %form, table = %name, "loading prior release for backfill");
            let request = ReferenceRequest::new(&name, form.database())
                .with_index(EIN)
                .with_template(DtypeTemplate::from_frame(&table.data));
            let prior = RecordTable::new(&name, ctx.references.fetch(&request)?)?;
            let eins = append_missing(*form, table, prior, &name)?;
            info!(
                form = %form,
                year,
                backfilled = eins.len(),
                "backfilled {} observations into {} from {}",
                eins.len(),
                form,
                year
            );
            ctx.audit
                .backfilled
                .entry(*form)
                .or_default()
                .insert(year, eins);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nccs_model::validation::{MANUALLY_FIXED, VALIDATION_STATE};
    use polars::prelude::*;

    #[test]
    fn only_absent_eins_are_appended() {
        let mut table = RecordTable::new(
            "CO",
            df!(
                "EIN" => &["1"],
                "TOTREV" => &[5.0],
                "SOURCE" => &["15eofinextract990.dat"],
                VALIDATION_STATE => &[0.0],
                MANUALLY_FIXED => &[""],
            )
            .unwrap(),
        )
        .unwrap();
        let prior = RecordTable::new(
            "core2014co",
            df!(
                "EIN" => &["1", "2"],
                "TOTREV" => &[Some(1.0), Some(2.0)],
                "OLDCOL" => &["x", "y"],
            )
            .unwrap(),
        )
        .unwrap();
        let eins = append_missing(ReleaseForm::Co, &mut table, prior, "core2014co").unwrap();
        assert_eq!(eins, vec!["2"]);
        assert_eq!(table.eins().unwrap(), vec!["1", "2"]);
        assert!(!table.has_column("OLDCOL"));
        assert_eq!(
            table.strings("SOURCE").unwrap()[1].as_deref(),
            Some("core2014co")
        );
        assert_eq!(table.numbers(VALIDATION_STATE).unwrap()[1], Some(0.0));
        assert_eq!(table.strings(MANUALLY_FIXED).unwrap()[1].as_deref(), Some(""));
    }
}
