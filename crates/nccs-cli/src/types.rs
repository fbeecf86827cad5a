use std::path::PathBuf;

use nccs_model::{ReleaseForm, SourceForm};
use nccs_validate::{GatingDecision, ValidationRun};

/// What happened to one raw extract before release assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub form: SourceForm,
    pub file: String,
    pub loaded: usize,
    /// Columns renamed by the crosswalk.
    pub renamed: usize,
    pub not_crosswalked: usize,
    pub dropped_missing: usize,
    pub dropped_values: usize,
    /// Rows touched by the form's manual fixes.
    pub manual_fixes: usize,
    pub rows: usize,
}

/// One release form after deduplication and, when allowed, its written file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub form: ReleaseForm,
    pub rows: usize,
    pub backfilled: usize,
    pub stale_dropped: usize,
    pub duplicates_dropped: usize,
    pub dropped_columns: usize,
    pub missing_columns: usize,
    pub output: Option<PathBuf>,
}

impl ReleaseSummary {
    pub fn new(form: ReleaseForm, rows: usize) -> Self {
        Self {
            form,
            rows,
            backfilled: 0,
            stale_dropped: 0,
            duplicates_dropped: 0,
            dropped_columns: 0,
            missing_columns: 0,
            output: None,
        }
    }
}

#[derive(Debug)]
pub struct BuildResult {
    pub release_year: i32,
    pub sources: Vec<SourceSummary>,
    pub releases: Vec<ReleaseSummary>,
    pub validation: ValidationRun,
    pub gating: GatingDecision,
    pub run_report: PathBuf,
    pub failures_dir: PathBuf,
    pub output_dir: PathBuf,
    pub duration_ms: u128,
}

impl BuildResult {
    /// Whether the release files were written.
    pub fn written(&self) -> bool {
        !self.gating.block_release
    }
}
