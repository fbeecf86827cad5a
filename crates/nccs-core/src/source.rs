//! Loading and cleaning the raw IRS extracts.
//!
//! Stage order for each source form: [`load_source`], [`apply_crosswalk`],
//! [`drop_missing`], [`drop_on_values`], [`init_tracking`].

use nccs_ingest::{Crosswalk, DelimitedOptions, read_delimited_table, read_drop_list};
use nccs_model::validation::{EIN, MANUALLY_FIXED, SOURCE, VALIDATION_STATE};
use nccs_model::{NccsError, Result, SourceForm, ValidationState};
use tracing::{info, warn};

use crate::frame::RecordTable;
use crate::pipeline_context::PipelineContext;

/// Raw column names that carry the tax period, in any case.
pub const PERIOD_ALIASES: [&str; 4] = ["TAX_PRD", "TAX_PD", "A_TAX_PRD", "TAXPRD"];

/// Reads the configured extract for `form` from `downloads/IRS`.
///
/// Every column is text. A lower-case `ein` header becomes `EIN` and `SOURCE`
/// is set to the file name.
pub fn load_source(ctx: &PipelineContext, form: SourceForm) -> Result<RecordTable> {
    let sources = &ctx.options.sources;
    let file_name = sources.file_for(form, ctx.release_year());
    let path = ctx.layout.irs_downloads().join(&file_name);
    if !path.is_file() {
        return Err(NccsError::MissingSource {
            what: format!("{form} extract"),
            path,
        });
    }

    let options = DelimitedOptions::default().with_separator(sources.separator());
    let mut data = read_delimited_table(&path, &options)?;
    let has_ein = data.get_column_names().iter().any(|name| name.as_str() == EIN);
    if !has_ein {
        let found = data
            .get_column_names()
            .iter()
            .find(|name| name.eq_ignore_ascii_case(EIN))
            .map(|name| name.to_string());
        if let Some(found) = found {
            data.rename(&found, EIN.into())?;
        }
    }

    let mut table = RecordTable::new(form.code(), data)?;
    let rows = table.record_count();
    table.set_strings(SOURCE, vec![Some(file_name.clone()); rows])?;
    info!(form = %form, file = %file_name, rows, "loaded source extract");
    Ok(table)
}

/// Result of applying one crosswalk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrosswalkOutcome {
    /// Original columns whose name changed.
    pub changes: usize,
    pub columns: usize,
    /// Crosswalk targets that are not columns afterwards.
    pub not_crosswalked: Vec<String>,
}

/// Upper-cases every header and renames IRS columns to NCCS names.
///
/// Exactly one tax period alias must be present, otherwise the crosswalk
/// cannot produce `TAXPER` and the run halts.
pub fn apply_crosswalk(
    ctx: &mut PipelineContext,
    form: SourceForm,
    table: &mut RecordTable,
    crosswalk: &Crosswalk,
) -> Result<CrosswalkOutcome> {
    let release_year = ctx.release_year();
    let found: Vec<String> = table
        .column_names()
        .into_iter()
        .filter(|name| {
            PERIOD_ALIASES
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
        })
        .collect();
    if found.len() != 1 {
        return Err(NccsError::PeriodAlias {
            form: form.code().to_string(),
            release_year,
            found,
        });
    }

    let original: Vec<String> = table
        .column_names()
        .into_iter()
        .map(|name| name.to_uppercase())
        .collect();
    let upper_pairs: Vec<(String, String)> = table
        .column_names()
        .into_iter()
        .map(|name| {
            let upper = name.to_uppercase();
            (name, upper)
        })
        .collect();
    table.rename(upper_pairs.iter().map(|(old, new)| (old.as_str(), new.as_str())))?;
    table.rename(crosswalk.iter())?;

    let columns = table.column_names();
    let changes = original
        .iter()
        .filter(|name| !columns.contains(name))
        .count();
    let not_crosswalked: Vec<String> = crosswalk
        .targets()
        .filter(|target| !table.has_column(target))
        .map(str::to_string)
        .collect();

    info!(
        form = %form,
        release_year,
        changes,
        columns = original.len(),
        "crosswalk applied"
    );
    if !not_crosswalked.is_empty() {
        warn!(
            form = %form,
            release_year,
            missing = not_crosswalked.len(),
            columns = ?not_crosswalked,
            "columns failed to crosswalk"
        );
    }
    ctx.audit
        .not_crosswalked
        .entry(form)
        .or_default()
        .insert(release_year, not_crosswalked.clone());

    Ok(CrosswalkOutcome {
        changes,
        columns: original.len(),
        not_crosswalked,
    })
}

fn is_missing_marker(text: Option<&str>, number: Option<f64>) -> bool {
    match (text, number) {
        (Some(text), _) => text == "N" || text == "0",
        (None, Some(number)) => number == 0.0,
        (None, None) => false,
    }
}

/// Removes zero filers: rows where every listed column is `N`, `0` or numeric 0.
///
/// An empty list drops nothing. A listed column the table lacks never matches,
/// so its presence in the list keeps every row.
pub fn drop_rows_all_missing(table: &mut RecordTable, columns: &[String]) -> Result<usize> {
    if columns.is_empty() {
        return Ok(0);
    }
    let mut keep = vec![false; table.record_count()];
    for column in columns {
        if !table.has_column(column) {
            return Ok(0);
        }
        if table.is_numeric(column) {
            for (idx, value) in table.numbers(column)?.into_iter().enumerate() {
                if !is_missing_marker(None, value) {
                    keep[idx] = true;
                }
            }
        } else {
            for (idx, value) in table.strings(column)?.into_iter().enumerate() {
                if !is_missing_marker(value.as_deref(), None) {
                    keep[idx] = true;
                }
            }
        }
    }
    table.retain(&keep)
}

/// Reads the form's drop-if-missing list and applies it.
pub fn drop_missing(
    ctx: &mut PipelineContext,
    form: SourceForm,
    table: &mut RecordTable,
    crosswalk: &Crosswalk,
) -> Result<usize> {
    let path = ctx.layout.drop_list(form);
    if !path.is_file() {
        return Err(NccsError::MissingSource {
            what: format!("{form} drop-if-missing list"),
            path,
        });
    }
    let columns = read_drop_list(&path, crosswalk)?;
    let dropped = drop_rows_all_missing(table, &columns)?;
    info!(
        form = %form,
        release_year = ctx.release_year(),
        dropped,
        "dropped observations missing all values from droplist"
    );
    ctx.audit.drop_lists.insert(form, columns);
    ctx.audit.record_dropped("drop_missing", form, dropped);
    Ok(dropped)
}

/// Form-specific value filters. Only PF has one: `SUBSECCD == '92'` is removed.
pub fn drop_on_values(
    ctx: &mut PipelineContext,
    form: SourceForm,
    table: &mut RecordTable,
) -> Result<usize> {
    if form != SourceForm::Pf || !table.has_column("SUBSECCD") {
        return Ok(0);
    }
    let keep: Vec<bool> = table
        .strings("SUBSECCD")?
        .iter()
        .map(|value| value.as_deref() != Some("92"))
        .collect();
    let dropped = table.retain(&keep)?;
    if dropped > 0 {
        info!(form = %form, dropped, "dropped 4947(a)(1) trusts (SUBSECCD 92)");
    }
    ctx.audit.record_dropped("drop_on_values", form, dropped);
    Ok(dropped)
}

/// Adds the review tracking columns with their initial values.
pub fn init_tracking(table: &mut RecordTable) -> Result<()> {
    let rows = table.record_count();
    table.set_numbers(
        VALIDATION_STATE,
        vec![Some(ValidationState::Unchanged.code() as f64); rows],
    )?;
    table.set_strings(MANUALLY_FIXED, vec![Some(String::new()); rows])
}

/// Fills the tracking columns on rows that predate them (backfilled history).
pub fn fill_tracking(table: &mut RecordTable) -> Result<()> {
    if !table.has_column(VALIDATION_STATE) {
        return init_tracking(table);
    }
    table.coerce_numeric(
        &[VALIDATION_STATE],
        Some(ValidationState::Unchanged.code() as f64),
    )?;
    if table.has_column(MANUALLY_FIXED) {
        table.fill_text(MANUALLY_FIXED, "")
    } else {
        let rows = table.record_count();
        table.set_strings(MANUALLY_FIXED, vec![Some(String::new()); rows])
    }
}
