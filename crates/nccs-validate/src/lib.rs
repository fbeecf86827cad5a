//! Validation of release forms before they are published.
//!
//! For every validated release form a run:
//!
//! 1. reintegrates the reviewed fix batch, if one was dropped in
//! 2. computes the arithmetic identity residuals and decides the outcome
//! 3. runs the large-organization and large-change extracts
//! 4. exports the selected rows to `validation/failures/`
//!
//! [`gate_release`] then decides whether the final files may be written.

pub mod engine;
pub mod export;
pub mod extract;
pub mod fixes;
pub mod identities;
pub mod review;

pub use engine::{FormValidation, ValidationEngine};
pub use export::{FailureExport, export_failures};
pub use extract::{ExtractColumns, Extracts, extract};
pub use fixes::{FixBatch, Reintegration, reintegrate};
pub use identities::{Identity, IdentitySet, identity_sets};
pub use review::{ReviewQuery, normalize_manually_fixed, record_manual_fix, review_queue};

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use nccs_core::{PipelineContext, ReleaseTables};
use nccs_model::{FormValidationReport, ReleaseForm, ReviewCategory, ValidationOutcome};

/// Everything validation found in one run.
#[derive(Debug, Clone, Default)]
pub struct ValidationRun {
    pub reports: Vec<FormValidationReport>,
    pub exports: Vec<FailureExport>,
    /// Whether any form had a fix batch reintegrated.
    ///
    /// A batch counts as soon as its file is present, even when every row
    /// still has `VALIDATION_STATE` 0. Dropping the export back in unchanged
    /// therefore releases forms that were held only by the extracts.
    pub fixes_integrated: bool,
}

impl ValidationRun {
    pub fn hard_failures(&self) -> impl Iterator<Item = &FormValidationReport> {
        self.reports
            .iter()
            .filter(|report| report.outcome.blocks_output())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatingDecision {
    pub block_release: bool,
    pub blocking_forms: Vec<ReleaseForm>,
}

/// Whether the final files may be written.
///
/// Any hard failure blocks. Without hard failures, rows picked by the review
/// extracts block until a fix batch has been reintegrated.
pub fn gate_release(run: &ValidationRun) -> GatingDecision {
    let mut blocking: Vec<ReleaseForm> = run.hard_failures().map(|report| report.form).collect();
    if blocking.is_empty() && !run.fixes_integrated {
        blocking = run
            .reports
            .iter()
            .filter(|report| report.extracted_rows() > 0)
            .map(|report| report.form)
            .collect();
    }
    GatingDecision {
        block_release: !blocking.is_empty(),
        blocking_forms: blocking,
    }
}

/// Validates every primary release form present in `releases`.
///
/// Residual columns are removed from the tables once exported.
pub fn validate_releases(
    ctx: &PipelineContext,
    releases: &mut ReleaseTables,
) -> nccs_model::Result<ValidationRun> {
    let engine = ValidationEngine::from_options(&ctx.options);
    let year = ctx.release_year();
    let mut run = ValidationRun::default();

    for form in ReleaseForm::PRIMARY {
        let Some(table) = releases.get_mut(&form) else {
            continue;
        };
        if !ctx.options.validate.enabled(form) {
            info!(form = %form, "validation disabled for {}", form);
            run.reports
                .push(FormValidationReport::new(form, ValidationOutcome::Skipped));
            continue;
        }

        let reintegration = reintegrate(&ctx.layout, form, year, table)?;
        run.fixes_integrated |= reintegration.is_some();
        let fixes_applied = reintegration.map_or(0, |r| r.fixes_applied);

        let FormValidation {
            mut report,
            failed_rows,
        } = engine.validate(form, table, fixes_applied)?;
        let extracts = extract(table, form, &ctx.options.extract)?;
        report.largest_rows = extracts.largest_count();
        report.changed_rows = extracts.changed_count();
        if !extracts.is_empty() {
            info!(
                form = %form,
                largest = report.largest_rows,
                changed = report.changed_rows,
                "extracted {} large and {} changed organizations from {}",
                report.largest_rows,
                report.changed_rows,
                form
            );
        }

        let selections = [
            (ReviewCategory::Largest, extracts.largest.as_slice()),
            (ReviewCategory::Changed, extracts.changed.as_slice()),
            (ReviewCategory::Failed, failed_rows.as_slice()),
        ];
        if let Some(export) = export_failures(&ctx.layout, form, year, table, &selections)? {
            run.exports.push(export);
        }
        engine::drop_residual_columns(table);
        run.reports.push(report);
    }
    Ok(run)
}

#[derive(Debug, Serialize)]
pub struct RunReportPayload<'a> {
    pub schema: &'static str,
    pub schema_version: u32,
    pub generated_at: String,
    pub release_year: i32,
    pub blocked: bool,
    pub blocking_forms: &'a [ReleaseForm],
    pub fixes_integrated: bool,
    pub forms: &'a [FormValidationReport],
    pub exports: Vec<String>,
}

const REPORT_SCHEMA: &str = "nccs-core.validation-run";
const REPORT_SCHEMA_VERSION: u32 = 1;

/// Writes the JSON run report and returns its path.
pub fn write_run_report(
    path: &Path,
    release_year: i32,
    run: &ValidationRun,
    decision: &GatingDecision,
) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let payload = RunReportPayload {
        schema: REPORT_SCHEMA,
        schema_version: REPORT_SCHEMA_VERSION,
        generated_at: Utc::now().to_rfc3339(),
        release_year,
        blocked: decision.block_release,
        blocking_forms: &decision.blocking_forms,
        fixes_integrated: run.fixes_integrated,
        forms: &run.reports,
        exports: run
            .exports
            .iter()
            .map(|export| export.path.display().to_string())
            .collect(),
    };
    let json = serde_json::to_string_pretty(&payload)?;
    std::fs::write(path, format!("{json}\n"))?;
    if decision.block_release {
        warn!(path = %path.display(), "validation run report written for a blocked run");
    } else {
        info!(path = %path.display(), "validation run report written");
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(form: ReleaseForm, outcome: ValidationOutcome, largest: usize) -> FormValidationReport {
        let mut report = FormValidationReport::new(form, outcome);
        report.largest_rows = largest;
        report
    }

    #[test]
    fn hard_failures_block_even_after_fixes() {
        let run = ValidationRun {
            reports: vec![
                report(ReleaseForm::Co, ValidationOutcome::HardFailed, 0),
                report(ReleaseForm::Pf, ValidationOutcome::Passed, 4),
            ],
            exports: Vec::new(),
            fixes_integrated: true,
        };
        let decision = gate_release(&run);
        assert!(decision.block_release);
        assert_eq!(decision.blocking_forms, vec![ReleaseForm::Co]);
    }

    #[test]
    fn extracts_block_until_fixes_come_back() {
        let mut run = ValidationRun {
            reports: vec![report(ReleaseForm::Pf, ValidationOutcome::Passed, 2)],
            exports: Vec::new(),
            fixes_integrated: false,
        };
        assert_eq!(gate_release(&run).blocking_forms, vec![ReleaseForm::Pf]);
        run.fixes_integrated = true;
        assert_eq!(gate_release(&run), GatingDecision::default());
    }
}
