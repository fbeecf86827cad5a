//! Flat-file input and output for the NCCS core file build.
//!
//! This crate reads the pre-downloaded IRS extracts and NCCS reference
//! tables, parses the plain-text settings lists, and writes release and
//! validation CSV files. All tables come back with string columns; numeric
//! coercion is the caller's decision.
//!
//! # Example
//!
//! ```ignore
//! use nccs_ingest::{CachedReferenceStore, ReferenceRequest, ReferenceSource, WorkspaceLayout};
//!
//! let layout = WorkspaceLayout::new("/data/nccs");
//! let mut store = CachedReferenceStore::new(layout.nccs_downloads());
//! let fips = store.fetch(
//!     &ReferenceRequest::new("lu_fipsmsa", "nccs").with_columns(&["FIPS", "PMSA", "MSA_NECH"]),
//! )?;
//! ```

mod csv_table;
mod discovery;
mod error;
mod layout;
pub mod polars_utils;
mod reference;
mod settings;

// === Error Types ===
pub use error::{IngestError, Result};

// === Delimited Files ===
pub use csv_table::{DelimitedOptions, read_delimited_table, write_csv_table};

// === Workspace ===
pub use discovery::{clear_csv_files, list_csv_files};
pub use layout::WorkspaceLayout;

// === Reference Data ===
pub use reference::{
    CachedReferenceStore, ColumnKind, DtypeTemplate, ReferenceRequest, ReferenceSource,
};

// === Settings Lists ===
pub use settings::{Crosswalk, read_allowlist, read_drop_list};
