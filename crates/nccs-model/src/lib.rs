pub mod error;
pub mod form;
pub mod options;
pub mod report;
pub mod validation;

pub use error::{NccsError, Result};
pub use form::{ReleaseForm, SourceForm};
pub use options::{
    ExtractOptions, MAX_BACKFILL_DEPTH, PipelineOptions, ReferenceTables, SourceFiles,
    ValidationToggles,
};
pub use report::{FormValidationReport, IdentityResult, ValidationOutcome};
pub use validation::{ReviewCategory, ValidationState};
