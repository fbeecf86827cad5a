use anyhow::{Context, Result};
use tracing::info;

use nccs_core::PipelineContext;
use nccs_ingest::WorkspaceLayout;
use nccs_model::ReleaseForm;
use nccs_validate::ReviewQuery;

use nccs_cli::config::{RunOverrides, build_options, parse_categories};
use nccs_cli::pipeline::run_build;
use nccs_cli::review::{ReviewResult, load_review};
use nccs_cli::types::BuildResult;

use crate::cli::{BuildArgs, ReviewArgs};

pub fn run(args: &BuildArgs) -> Result<BuildResult> {
    let overrides = RunOverrides {
        release_year: args.workspace.release_year,
        forms: args.forms.clone(),
        backfill_depth: args.backfill_depth,
        tolerance: args.tolerance,
        seed: args.seed,
        no_partial_validation: args.no_partial_validation,
        no_full_forms: args.no_full_forms,
        skip_validation: args.skip_validation.clone(),
    };
    let options = build_options(args.workspace.config.as_deref(), &overrides)?;
    info!(
        root = %args.workspace.root.display(),
        release_year = options.release_year,
        forms = ?options.forms,
        backfill_depth = options.backfill_depth,
        "starting core file build"
    );
    let layout = WorkspaceLayout::new(&args.workspace.root);
    let mut ctx = PipelineContext::new(layout).with_options(options);
    run_build(&mut ctx)
}

pub fn review(args: &ReviewArgs) -> Result<ReviewResult> {
    let options = build_options(
        args.workspace.config.as_deref(),
        &RunOverrides {
            release_year: args.workspace.release_year,
            ..RunOverrides::default()
        },
    )?;
    let form: ReleaseForm = args
        .form
        .parse()
        .with_context(|| format!("parse release form '{}'", args.form))?;
    let query = ReviewQuery {
        threshold: args.threshold,
        categories: parse_categories(&args.categories)?,
    };
    let layout = WorkspaceLayout::new(&args.workspace.root);
    load_review(&layout, form, options.release_year, &query, args.limit)
}
