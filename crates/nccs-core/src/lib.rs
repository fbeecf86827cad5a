//! Record tables and the core-file build stages.
//!
//! This crate turns raw IRS extracts into release-form tables:
//!
//! - **frame**: [`RecordTable`], a DataFrame keyed by `EIN`
//! - **source**: extract loading, crosswalk, drop lists, tracking columns
//! - **enrich**: NTEE, FIPS/MSA, e-Postcard and BMF merges
//! - **transform**: computed-column rule tables
//! - **strategy**: per-source-form rules and manual fixes
//! - **release**: CO/PC/PF assembly and the full-990 cuts
//! - **prior_year** / **backfill**: merges with earlier releases
//! - **dedupe**: one row per EIN
//! - **projection**: final column lists

pub mod backfill;
pub mod dedupe;
pub mod enrich;
pub mod frame;
pub mod numeric;
pub mod pipeline_context;
pub mod prior_year;
pub mod projection;
pub mod release;
pub mod source;
pub mod strategy;
pub mod transform;

pub use dedupe::{Criterion, DedupCriteria, DedupOutcome, SizeMeasure, deduplicate};
pub use enrich::SourceTables;
pub use frame::{RecordTable, concat_diagonal};
pub use pipeline_context::{PipelineContext, RunAudit};
pub use projection::{ProjectionOutcome, check_columns};
pub use release::{ReleaseTables, add_full_forms, build_output};
pub use strategy::{FormStrategy, ManualFix, strategy_for};
