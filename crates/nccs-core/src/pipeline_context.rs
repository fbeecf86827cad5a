//! Context threaded through every stage of a core file build.
//!
//! The [`PipelineContext`] bundles what stages share:
//!
//! - **Layout**: every path of the build workspace ([`WorkspaceLayout`])
//! - **Options**: the run configuration ([`PipelineOptions`])
//! - **References**: the per-run reference table cache
//! - **Audit**: data-quality findings collected along the way ([`RunAudit`])
//! - **Random source**: the generator behind `RANDNUM` and the dedup tie-break

use std::collections::BTreeMap;

use nccs_ingest::{CachedReferenceStore, WorkspaceLayout};
use nccs_model::{PipelineOptions, ReleaseForm, SourceForm};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dedupe::DedupOutcome;
use crate::projection::ProjectionOutcome;

/// Centralized context for one build.
#[derive(Debug)]
pub struct PipelineContext {
    pub layout: WorkspaceLayout,
    pub options: PipelineOptions,
    /// Reference tables, cached by table name for the length of the run.
    pub references: CachedReferenceStore,
    pub audit: RunAudit,
    rng: StdRng,
}

impl PipelineContext {
    /// Creates a context with default options rooted at `layout`.
    pub fn new(layout: WorkspaceLayout) -> Self {
        let references = CachedReferenceStore::new(layout.nccs_downloads());
        Self {
            layout,
            options: PipelineOptions::default(),
            references,
            audit: RunAudit::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Sets the options and reseeds the random source from them.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.rng = match options.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.options = options;
        self
    }

    /// Replaces the reference store, e.g. with one whose cache is pre-seeded.
    pub fn with_references(mut self, references: CachedReferenceStore) -> Self {
        self.references = references;
        self
    }

    pub fn release_year(&self) -> i32 {
        self.options.release_year
    }

    /// `n` draws from the uniform distribution on `[0, 1)`.
    pub fn random_values(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.rng.r#gen::<f64>()).collect()
    }
}

/// Data-quality findings of one run. Nothing here halts the build.
#[derive(Debug, Clone, Default)]
pub struct RunAudit {
    /// Crosswalk targets absent after renaming, per form and release year.
    pub not_crosswalked: BTreeMap<SourceForm, BTreeMap<i32, Vec<String>>>,
    /// Resolved drop-if-missing column lists.
    pub drop_lists: BTreeMap<SourceForm, Vec<String>>,
    /// Rows removed per stage label (`"drop_missing EZ"`, ...).
    pub dropped_rows: BTreeMap<String, usize>,
    /// EINs appended from each prior release.
    pub backfilled: BTreeMap<ReleaseForm, BTreeMap<i32, Vec<String>>>,
    pub dedup: BTreeMap<ReleaseForm, DedupOutcome>,
    pub projections: BTreeMap<ReleaseForm, ProjectionOutcome>,
}

impl RunAudit {
    pub fn record_dropped(&mut self, stage: &str, form: impl std::fmt::Display, rows: usize) {
        *self
            .dropped_rows
            .entry(format!("{stage} {form}"))
            .or_insert(0) += rows;
    }

    pub fn backfilled_count(&self, form: ReleaseForm) -> usize {
        self.backfilled
            .get(&form)
            .map(|years| years.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_contexts_draw_the_same_values() {
        let options = PipelineOptions::default().with_seed(7);
        let mut a = PipelineContext::new(WorkspaceLayout::new("a")).with_options(options.clone());
        let mut b = PipelineContext::new(WorkspaceLayout::new("b")).with_options(options);
        let draws = a.random_values(4);
        assert_eq!(draws, b.random_values(4));
        assert!(draws.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn dropped_rows_accumulate_per_stage() {
        let mut audit = RunAudit::default();
        audit.record_dropped("drop_missing", SourceForm::Ez, 3);
        audit.record_dropped("drop_missing", SourceForm::Ez, 2);
        assert_eq!(audit.dropped_rows["drop_missing EZ"], 5);
    }
}
