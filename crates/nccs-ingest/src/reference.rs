//! Reference data retrieval: NCCS lookup tables and prior releases.
//!
//! Tables are resolved from an in-process cache first, then from
//! `downloads/NCCS/<table>.csv`. A table found in neither place is an
//! unresolvable source.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::csv_table::{DelimitedOptions, read_delimited_table};
use crate::error::{IngestError, Result};
use crate::polars_utils::{coerce_numeric, coerce_text, column_names, is_numeric_dtype};

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Column kinds copied from a live table so that a fetched table lines up with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DtypeTemplate {
    kinds: BTreeMap<String, ColumnKind>,
}

impl DtypeTemplate {
    pub fn from_frame(df: &DataFrame) -> Self {
        let kinds = df
            .get_columns()
            .iter()
            .map(|column| {
                let kind = if is_numeric_dtype(column.dtype()) {
                    ColumnKind::Numeric
                } else {
                    ColumnKind::Text
                };
                (column.name().to_string(), kind)
            })
            .collect();
        Self { kinds }
    }

    pub fn kind(&self, column: &str) -> Option<ColumnKind> {
        self.kinds.get(column).copied()
    }

    /// Recasts the columns of `df` that the template knows. Unparseable numbers become null.
    pub fn apply(&self, df: &mut DataFrame) -> Result<()> {
        for name in column_names(df) {
            match self.kind(&name) {
                Some(ColumnKind::Numeric) => {
                    coerce_numeric(df, &name, None)?;
                }
                Some(ColumnKind::Text) => {
                    coerce_text(df, &name)?;
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// What a caller wants from a reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRequest {
    pub table: String,
    pub database: String,
    /// Subset of columns, matched case-insensitively. `None` keeps all.
    pub columns: Option<Vec<String>>,
    /// Key column, moved to the front of the result.
    pub index_column: Option<String>,
    pub template: Option<DtypeTemplate>,
}

impl ReferenceRequest {
    pub fn new(table: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            database: database.into(),
            columns: None,
            index_column: None,
            template: None,
        }
    }

    pub fn with_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.as_ref().to_string()).collect());
        self
    }

    pub fn with_index(mut self, column: impl Into<String>) -> Self {
        self.index_column = Some(column.into());
        self
    }

    pub fn with_template(mut self, template: DtypeTemplate) -> Self {
        self.template = Some(template);
        self
    }
}

/// Source of reference tables.
pub trait ReferenceSource {
    fn fetch(&mut self, request: &ReferenceRequest) -> Result<DataFrame>;
}

/// File-backed reference store with a per-run cache keyed by table name.
#[derive(Debug, Clone)]
pub struct CachedReferenceStore {
    root: PathBuf,
    cache: HashMap<String, DataFrame>,
}

impl CachedReferenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Seeds the cache with an already-loaded table.
    pub fn insert(&mut self, table: impl Into<String>, df: DataFrame) {
        self.cache.insert(table.into(), df);
    }

    pub fn is_cached(&self, table: &str) -> bool {
        self.cache.contains_key(table)
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.csv"))
    }

    fn load(&mut self, table: &str) -> Result<&DataFrame> {
        if !self.cache.contains_key(table) {
            let path = self.table_path(table);
            if !path.is_file() {
                return Err(IngestError::ReferenceUnavailable {
                    name: table.to_string(),
                    path,
                });
            }
            tracing::info!(table, path = %path.display(), "loading reference table from disk");
            let df = read_delimited_table(&path, &DelimitedOptions::default())?;
            self.cache.insert(table.to_string(), df);
        }
        self.cache
            .get(table)
            .ok_or_else(|| IngestError::DataFrame {
                message: format!("reference table {table} vanished from cache"),
            })
    }
}

fn resolve_column(available: &[String], wanted: &str) -> Option<String> {
    available
        .iter()
        .find(|name| name.eq_ignore_ascii_case(wanted))
        .cloned()
}

impl ReferenceSource for CachedReferenceStore {
    fn fetch(&mut self, request: &ReferenceRequest) -> Result<DataFrame> {
        let table = request.table.as_str();
        let full = self.load(table)?;
        let available = column_names(full);

        let mut selected = match &request.columns {
            Some(wanted) => {
                let mut resolved = Vec::with_capacity(wanted.len());
                let mut missing = Vec::new();
                for column in wanted {
                    match resolve_column(&available, column) {
                        Some(name) => resolved.push(name),
                        None => missing.push(column.clone()),
                    }
                }
                if !missing.is_empty() {
                    return Err(IngestError::ReferenceSchema {
                        name: table.to_string(),
                        missing,
                    });
                }
                resolved
            }
            None => available.clone(),
        };

        if let Some(index) = &request.index_column {
            let Some(actual) = resolve_column(&available, index) else {
                return Err(IngestError::ReferenceSchema {
                    name: table.to_string(),
                    missing: vec![index.clone()],
                });
            };
            selected.retain(|name| name != &actual);
            selected.insert(0, actual);
        }

        let mut df = full.select(selected.iter().map(String::as_str))?;
        if let Some(template) = &request.template {
            template.apply(&mut df)?;
        }
        tracing::debug!(
            table,
            database = %request.database,
            rows = df.height(),
            columns = df.width(),
            "fetched reference table"
        );
        Ok(df)
    }
}
