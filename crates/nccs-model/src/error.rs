use std::path::PathBuf;

use thiserror::Error;

/// Errors that halt a core file build.
///
/// Data-quality findings (uncrosswalked columns, identity failures, projection
/// gaps) are never reported through this type; they are carried as values on
/// the pipeline context and in the validation report.
#[derive(Debug, Error)]
pub enum NccsError {
    // === Configuration Errors ===
    /// The raw extract carries no tax period column, or carries several.
    #[error(
        "expected exactly one tax period column (TAX_PRD, TAX_PD, A_TAX_PRD, TAXPRD) in {form} {release_year}, found {found:?}"
    )]
    PeriodAlias {
        form: String,
        release_year: i32,
        found: Vec<String>,
    },

    /// A computed column requires an operand that is absent or not numeric.
    #[error("computed column {rule} requires numeric operand {column}")]
    Precondition { rule: String, column: String },

    /// Deduplication left repeated identifiers behind.
    #[error("deduplication did not result in unique EINs in {form} ({count} repeated)")]
    DuplicateIdentifier { form: String, count: usize },

    /// A reference table could not be found in the cache or on disk.
    #[error("reference table {name} is neither cached nor present at {path}")]
    UnresolvableSource { name: String, path: PathBuf },

    /// A required input file (extract, settings list) is missing.
    #[error("required input {what} not found at {path}")]
    MissingSource { what: String, path: PathBuf },

    /// The pipeline options describe an impossible run.
    #[error("invalid configuration: {0}")]
    Config(String),

    // === Wrapped Errors ===
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("DataFrame operation failed: {message}")]
    Frame { message: String },

    #[error("{0}")]
    Message(String),
}

impl From<polars::prelude::PolarsError> for NccsError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::Frame {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NccsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_alias_lists_found_columns() {
        let err = NccsError::PeriodAlias {
            form: "EZ".to_string(),
            release_year: 2015,
            found: vec!["TAX_PRD".to_string(), "TAXPRD".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("EZ 2015"));
        assert!(text.contains("TAXPRD"));
    }

    #[test]
    fn polars_errors_become_frame_errors() {
        let polars_err = polars::prelude::PolarsError::ColumnNotFound("EIN".into());
        let err: NccsError = polars_err.into();
        assert!(matches!(err, NccsError::Frame { .. }));
    }
}
