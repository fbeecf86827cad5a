//! Final column projection against the published variable lists.

use nccs_ingest::read_allowlist;
use nccs_model::validation::{EIN, MANUALLY_FIXED, VALIDATION_STATE};
use nccs_model::{NccsError, Result};
use tracing::{info, warn};

use crate::frame::RecordTable;
use crate::pipeline_context::PipelineContext;
use crate::release::ReleaseTables;

/// Columns removed from and missing in one output form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionOutcome {
    pub dropped: Vec<String>,
    pub missing: Vec<String>,
}

/// Keeps only `allowed` columns (in table order) and reports the difference.
///
/// `EIN` and the tracking columns are always allowed.
pub fn project_columns(table: &mut RecordTable, allowed: &[String]) -> Result<ProjectionOutcome> {
    let mut desired: Vec<String> = allowed.to_vec();
    if !desired.iter().any(|name| name == EIN) {
        desired.insert(0, EIN.to_string());
    }
    for tracking in [VALIDATION_STATE, MANUALLY_FIXED] {
        if !desired.iter().any(|name| name == tracking) {
            desired.push(tracking.to_string());
        }
    }

    let present = table.column_names();
    let (kept, dropped): (Vec<String>, Vec<String>) = present
        .into_iter()
        .partition(|name| desired.contains(name));
    let missing = desired
        .into_iter()
        .filter(|name| !kept.contains(name))
        .collect();
    table.data = table.data.select(kept.iter().map(String::as_str))?;
    Ok(ProjectionOutcome { dropped, missing })
}

/// Projects every release table to its allowlist. Missing or extra columns are
/// logged, never fatal.
pub fn check_columns(ctx: &mut PipelineContext, releases: &mut ReleaseTables) -> Result<()> {
    for (form, table) in releases.iter_mut() {
        let path = ctx.layout.allowlist(*form);
        if !path.is_file() {
            return Err(NccsError::MissingSource {
                what: format!("{form} final variable list"),
                path,
            });
        }
        let allowed = read_allowlist(&path)?;
        let outcome = project_columns(table, &allowed)?;
        info!(
            form = %form,
            dropped = outcome.dropped.len(),
            "dropped {} columns from {}",
            outcome.dropped.len(),
            form
        );
        if !outcome.missing.is_empty() {
            warn!(
                form = %form,
                missing = outcome.missing.len(),
                columns = ?outcome.missing,
                "found {} missing columns from {}",
                outcome.missing.len(),
                form
            );
        }
        ctx.audit.projections.insert(*form, outcome);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn projection_reports_both_directions() {
        let mut table = RecordTable::new(
            "PF",
            df!(
                "EIN" => &["1"],
                "EXTRA" => &["x"],
                "NAME" => &["A"],
                VALIDATION_STATE => &[0.0],
            )
            .unwrap(),
        )
        .unwrap();
        let allowed = vec!["EIN".to_string(), "NAME".to_string(), "STATE".to_string()];
        let outcome = project_columns(&mut table, &allowed).unwrap();
        assert_eq!(outcome.dropped, vec!["EXTRA"]);
        assert_eq!(outcome.missing, vec!["STATE", MANUALLY_FIXED]);
        assert_eq!(table.column_names(), vec!["EIN", "NAME", VALIDATION_STATE]);
    }
}
