//! Error types for flat-file input and output.

use std::path::PathBuf;

use nccs_model::NccsError;
use thiserror::Error;

/// Errors that can occur while reading or writing build files.
#[derive(Debug, Error)]
pub enum IngestError {
    // === File System Errors ===
    /// Directory not found or not readable.
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// Input file not found.
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Failed to read directory entries.
    #[error("failed to read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read or write a file.
    #[error("failed to access file {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Delimited File Errors ===
    /// Failed to parse a delimited file with Polars.
    #[error("failed to parse {path}: {message}")]
    CsvParse { path: PathBuf, message: String },

    /// Failed to write a CSV file.
    #[error("failed to write {path}: {message}")]
    CsvWrite { path: PathBuf, message: String },

    /// A settings file does not follow its line format.
    #[error("malformed settings line {line} in {path}: {content}")]
    SettingsFormat {
        path: PathBuf,
        line: usize,
        content: String,
    },

    // === Reference Data Errors ===
    /// Reference table neither cached nor downloaded.
    #[error("reference table {name} is not cached and {path} does not exist")]
    ReferenceUnavailable { name: String, path: PathBuf },

    /// Reference table lacks requested columns.
    #[error("reference table {name} is missing requested columns {missing:?}")]
    ReferenceSchema { name: String, missing: Vec<String> },

    // === DataFrame Errors ===
    /// Column not found in DataFrame.
    #[error("column '{column}' not found in DataFrame")]
    ColumnNotFound { column: String },

    /// Failed DataFrame operation.
    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl IngestError {
    pub(crate) fn file_access(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::FileAccess {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

impl From<polars::prelude::PolarsError> for IngestError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}

impl From<IngestError> for NccsError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::ReferenceUnavailable { name, path } => {
                NccsError::UnresolvableSource { name, path }
            }
            IngestError::FileNotFound { path } => NccsError::MissingSource {
                what: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path,
            },
            IngestError::FileAccess { source, .. } | IngestError::DirectoryRead { source, .. } => {
                NccsError::Io(source)
            }
            IngestError::CsvParse { path, message } | IngestError::CsvWrite { path, message } => {
                NccsError::Read { path, message }
            }
            IngestError::DataFrame { message } => NccsError::Frame { message },
            other => NccsError::Message(other.to_string()),
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::FileNotFound {
            path: PathBuf::from("/path/to/file.csv"),
        };
        assert_eq!(err.to_string(), "file not found: /path/to/file.csv");
    }

    #[test]
    fn test_unavailable_reference_is_unresolvable_source() {
        let err = IngestError::ReferenceUnavailable {
            name: "lu_fipsmsa".to_string(),
            path: PathBuf::from("downloads/NCCS/lu_fipsmsa.csv"),
        };
        let err: NccsError = err.into();
        assert!(matches!(err, NccsError::UnresolvableSource { .. }));
    }

    #[test]
    fn test_error_from_polars() {
        let polars_err = polars::prelude::PolarsError::ColumnNotFound("test".into());
        let ingest_err: IngestError = polars_err.into();
        assert!(matches!(ingest_err, IngestError::DataFrame { .. }));
    }
}
