//! Core file build with explicit stages.
//!
//! The build runs these stages in order:
//! 1. **Prepare**: create the workspace folders, clear last run's outputs
//! 2. **Ingest**: read, crosswalk and filter each raw extract
//! 3. **Enrich**: merge NTEE, FIPS/MSA, e-Postcard and BMF columns
//! 4. **Transform**: numeric coercion, computed columns, manual fixes
//! 5. **Assemble**: split into release forms, merge last year, backfill
//! 6. **Deduplicate**: one row per EIN in every primary form
//! 7. **Validate**: fixes, identities, extracts, exports, gating
//! 8. **Output**: full-990 cuts, column projection, CSV files
//!
//! Output only runs when validation lets the release through.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, info_span, warn};

use nccs_core::enrich::{merge_bmf, merge_epostcard, merge_fipsmsa, merge_ntee};
use nccs_core::numeric::make_numeric;
use nccs_core::prior_year::merge_prior_year;
use nccs_core::source::{apply_crosswalk, drop_missing, drop_on_values, init_tracking, load_source};
use nccs_core::{
    PipelineContext, ReleaseTables, SourceTables, add_full_forms, backfill::backfill,
    build_output, check_columns, deduplicate, strategy_for,
};
use nccs_ingest::{Crosswalk, clear_csv_files, write_csv_table};
use nccs_model::validation::EIN;
use nccs_model::{ReleaseForm, SourceForm};
use nccs_validate::{GatingDecision, ValidationRun, gate_release, validate_releases, write_run_report};

use crate::types::{BuildResult, ReleaseSummary, SourceSummary};

// ============================================================================
// Stage 1: Prepare
// ============================================================================

/// Creates the workspace folders and removes the previous run's release and
/// failure files. A halted run leaves no release files behind.
pub fn prepare(ctx: &PipelineContext) -> Result<()> {
    ctx.layout
        .ensure_dirs()
        .context("create workspace folders")?;
    let removed = clear_csv_files(&ctx.layout.output_dir()).context("clear final output")?
        + clear_csv_files(&ctx.layout.failures_dir()).context("clear failure exports")?;
    if removed > 0 {
        info!(removed, "removed previous run files");
    }
    Ok(())
}

// ============================================================================
// Stage 2: Ingest
// ============================================================================

/// Reads and cleans every configured source form.
pub fn ingest(ctx: &mut PipelineContext) -> Result<(SourceTables, Vec<SourceSummary>)> {
    let mut tables = SourceTables::new();
    let mut summaries = Vec::new();
    let forms: Vec<SourceForm> = SourceForm::ALL
        .into_iter()
        .filter(|form| ctx.options.includes(*form))
        .collect();

    for form in forms {
        let crosswalk_path = ctx.layout.crosswalk(form);
        let crosswalk = Crosswalk::load(&crosswalk_path)
            .with_context(|| format!("load {form} crosswalk"))?;
        let mut table = load_source(ctx, form).with_context(|| format!("load {form} extract"))?;
        let loaded = table.record_count();
        let crosswalked = apply_crosswalk(ctx, form, &mut table, &crosswalk)
            .with_context(|| format!("crosswalk {form}"))?;
        let dropped_missing = drop_missing(ctx, form, &mut table, &crosswalk)
            .with_context(|| format!("drop {form} zero filers"))?;
        let dropped_values = drop_on_values(ctx, form, &mut table)?;
        init_tracking(&mut table)?;

        summaries.push(SourceSummary {
            form,
            file: ctx
                .options
                .sources
                .file_for(form, ctx.release_year()),
            loaded,
            renamed: crosswalked.changes,
            not_crosswalked: crosswalked.not_crosswalked.len(),
            dropped_missing,
            dropped_values,
            manual_fixes: 0,
            rows: table.record_count(),
        });
        tables.insert(form, table);
    }
    Ok((tables, summaries))
}

// ============================================================================
// Stage 3: Enrich
// ============================================================================

pub fn enrich(ctx: &mut PipelineContext, tables: &mut SourceTables) -> Result<()> {
    merge_ntee(ctx, tables).context("merge NTEE codes")?;
    merge_fipsmsa(ctx, tables).context("merge FIPS/MSA codes")?;
    merge_epostcard(ctx, tables).context("merge e-Postcard filers")?;
    merge_bmf(ctx, tables).context("merge BMF columns")?;
    Ok(())
}

// ============================================================================
// Stage 4: Transform
// ============================================================================

/// Computed columns and manual fixes for every source form.
pub fn transform(
    ctx: &mut PipelineContext,
    tables: &mut SourceTables,
    summaries: &mut [SourceSummary],
) -> Result<()> {
    for (form, table) in tables.iter_mut() {
        make_numeric(table, Some(0.0))?;
        let strategy = strategy_for(*form);
        strategy
            .calculate_columns(ctx, table)
            .with_context(|| format!("calculate {form} columns"))?;
        let touched = strategy.apply_manual_fixes(table)?;
        if let Some(summary) = summaries.iter_mut().find(|s| s.form == *form) {
            summary.manual_fixes = touched;
            summary.rows = table.record_count();
        }
    }
    Ok(())
}

// ============================================================================
// Stage 5: Assemble
// ============================================================================

/// Splits the source forms into release forms and merges earlier releases.
pub fn assemble(ctx: &mut PipelineContext, tables: SourceTables) -> Result<ReleaseTables> {
    let mut releases = build_output(tables).context("assemble release forms")?;
    merge_prior_year(ctx, &mut releases).context("merge prior year release")?;
    backfill(ctx, &mut releases).context("backfill from prior releases")?;
    Ok(releases)
}

// ============================================================================
// Stage 6: Deduplicate
// ============================================================================

pub fn deduplicate_releases(
    ctx: &mut PipelineContext,
    releases: &mut ReleaseTables,
) -> Result<()> {
    for form in ReleaseForm::PRIMARY {
        if let Some(table) = releases.get_mut(&form) {
            deduplicate(ctx, form, table).with_context(|| format!("deduplicate {form}"))?;
        }
    }
    Ok(())
}

// ============================================================================
// Stage 7: Validate
// ============================================================================

/// Result of the validation stage.
#[derive(Debug)]
pub struct ValidateResult {
    pub run: ValidationRun,
    pub gating: GatingDecision,
    pub run_report: PathBuf,
}

pub fn validate(ctx: &PipelineContext, releases: &mut ReleaseTables) -> Result<ValidateResult> {
    let run = validate_releases(ctx, releases).context("validate release forms")?;
    let gating = gate_release(&run);
    let run_report = write_run_report(&ctx.layout.run_report(), ctx.release_year(), &run, &gating)
        .context("write validation run report")?;
    for report in &run.reports {
        info!(
            form = %report.form,
            outcome = report.outcome.label(),
            failed_rows = report.failed_rows,
            "validation {} for {}",
            report.outcome.label(),
            report.form
        );
    }
    if gating.block_release {
        let forms: Vec<&str> = gating.blocking_forms.iter().map(|form| form.code()).collect();
        warn!(
            forms = ?forms,
            exports = %ctx.layout.failures_dir().display(),
            "release halted for review"
        );
    }
    Ok(ValidateResult {
        run,
        gating,
        run_report,
    })
}

// ============================================================================
// Stage 8: Output
// ============================================================================

/// Cuts the full-990 subsets, projects every form and writes the files.
pub fn write_outputs(
    ctx: &mut PipelineContext,
    releases: &mut ReleaseTables,
) -> Result<Vec<(ReleaseForm, PathBuf)>> {
    if ctx.options.output_full {
        add_full_forms(releases).context("cut full 990 forms")?;
    }
    check_columns(ctx, releases).context("project final columns")?;
    let mut written = Vec::new();
    for (form, table) in releases.iter() {
        let path = ctx.layout.release_file(*form, ctx.release_year());
        let rows = write_csv_table(&path, &table.data, EIN)
            .with_context(|| format!("write {}", path.display()))?;
        info!(form = %form, rows, path = %path.display(), "wrote release file");
        written.push((*form, path));
    }
    Ok(written)
}

// ============================================================================
// Driver
// ============================================================================

fn timed<T>(name: &'static str, stage: impl FnOnce() -> Result<T>) -> Result<T> {
    let span = info_span!("stage", stage = name);
    let _guard = span.enter();
    let start = Instant::now();
    let result = stage()?;
    info!(duration_ms = start.elapsed().as_millis(), "{name} complete");
    Ok(result)
}

/// Runs every stage. A run halted by validation is still `Ok`.
pub fn run_build(ctx: &mut PipelineContext) -> Result<BuildResult> {
    let start = Instant::now();
    let release_year = ctx.release_year();
    let span = info_span!("build", release_year);
    let _guard = span.enter();

    timed("prepare", || prepare(ctx))?;
    let (mut tables, mut sources) = timed("ingest", || ingest(ctx))?;
    timed("enrich", || enrich(ctx, &mut tables))?;
    timed("transform", || transform(ctx, &mut tables, &mut sources))?;
    let mut releases = timed("assemble", || assemble(ctx, tables))?;
    timed("deduplicate", || deduplicate_releases(ctx, &mut releases))?;
    let validated = timed("validate", || validate(ctx, &mut releases))?;

    let mut summaries = release_summaries(ctx, &releases);
    if !validated.gating.block_release {
        let written = timed("output", || write_outputs(ctx, &mut releases))?;
        for (form, path) in written {
            let projection = ctx.audit.projections.get(&form).cloned().unwrap_or_default();
            let rows = releases.get(&form).map_or(0, |table| table.record_count());
            let index = match summaries.iter().position(|summary| summary.form == form) {
                Some(index) => index,
                None => {
                    summaries.push(ReleaseSummary::new(form, rows));
                    summaries.len() - 1
                }
            };
            let summary = &mut summaries[index];
            summary.rows = rows;
            summary.dropped_columns = projection.dropped.len();
            summary.missing_columns = projection.missing.len();
            summary.output = Some(path);
        }
    }

    let duration_ms = start.elapsed().as_millis();
    info!(duration_ms, written = !validated.gating.block_release, "build complete");
    Ok(BuildResult {
        release_year,
        sources,
        releases: summaries,
        validation: validated.run,
        gating: validated.gating,
        run_report: validated.run_report,
        failures_dir: ctx.layout.failures_dir(),
        output_dir: ctx.layout.output_dir(),
        duration_ms,
    })
}

fn release_summaries(ctx: &PipelineContext, releases: &ReleaseTables) -> Vec<ReleaseSummary> {
    releases
        .iter()
        .map(|(form, table)| {
            let mut summary = ReleaseSummary::new(*form, table.record_count());
            summary.backfilled = ctx.audit.backfilled_count(*form);
            if let Some(dedup) = ctx.audit.dedup.get(form) {
                summary.stale_dropped = dedup.stale_dropped;
                summary.duplicates_dropped = dedup.total_dropped();
            }
            summary
        })
        .collect()
}
