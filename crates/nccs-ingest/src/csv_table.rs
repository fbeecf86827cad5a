//! Delimited table reading and CSV release writing.
//!
//! Every table is read with all columns as strings. Numeric coercion is a
//! separate, explicit step so that identifiers like `EIN` and codes like
//! `SUBSECCD = '03'` keep their leading zeros.

use std::path::Path;

use polars::prelude::*;

use crate::error::{IngestError, Result};
use crate::polars_utils::{column_names, column_strings_or_empty};

/// How a delimited file is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedOptions {
    pub separator: u8,
    pub has_header: bool,
    /// Names for a headerless file, applied in order.
    pub column_names: Vec<String>,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            separator: b',',
            has_header: true,
            column_names: Vec::new(),
        }
    }
}

impl DelimitedOptions {
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    pub fn headerless(mut self, names: &[&str]) -> Self {
        self.has_header = false;
        self.column_names = names.iter().map(|name| (*name).to_string()).collect();
        self
    }
}

fn parse_error(path: &Path, err: impl std::fmt::Display) -> IngestError {
    IngestError::CsvParse {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Reads a delimited file into a DataFrame with every column as `String`.
pub fn read_delimited_table(path: &Path, options: &DelimitedOptions) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(IngestError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let separator = options.separator;
    let mut df = CsvReadOptions::default()
        .with_has_header(options.has_header)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|parse| parse.with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| parse_error(path, e))?
        .finish()
        .map_err(|e| parse_error(path, e))?;

    if !options.has_header {
        let generated = column_names(&df);
        for (old, new) in generated.iter().zip(&options.column_names) {
            df.rename(old, new.as_str().into())?;
        }
    }

    tracing::debug!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "read delimited table"
    );
    Ok(df)
}

/// Writes a table as CSV with `leading` as the first column.
///
/// Returns the number of data rows written. Parent directories are created.
pub fn write_csv_table(path: &Path, df: &DataFrame, leading: &str) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| IngestError::file_access(parent, e))?;
    }

    let mut order = column_names(df);
    if let Some(pos) = order.iter().position(|name| name == leading) {
        let first = order.remove(pos);
        order.insert(0, first);
    }

    let columns = order
        .iter()
        .map(|name| column_strings_or_empty(df, name))
        .collect::<Result<Vec<_>>>()?;

    let write_error = |e: csv::Error| IngestError::CsvWrite {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut writer = csv::Writer::from_path(path).map_err(write_error)?;
    writer.write_record(&order).map_err(write_error)?;
    for row in 0..df.height() {
        writer
            .write_record(columns.iter().map(|column| column[row].as_str()))
            .map_err(write_error)?;
    }
    writer.flush().map_err(|e| IngestError::file_access(path, e))?;

    Ok(df.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polars_utils::column_strings;
    use tempfile::TempDir;

    #[test]
    fn reads_every_column_as_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("extract.dat");
        std::fs::write(&path, "EIN SUBSECCD TOTREV\n010000001 03 100\n").unwrap();

        let options = DelimitedOptions::default().with_separator(b' ');
        let df = read_delimited_table(&path, &options).unwrap();
        assert_eq!(
            column_strings(&df, "SUBSECCD").unwrap(),
            vec![Some("03".to_string())]
        );
        assert_eq!(
            column_strings(&df, "EIN").unwrap(),
            vec![Some("010000001".to_string())]
        );
    }

    #[test]
    fn headerless_files_take_given_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("epostcard.dat");
        std::fs::write(&path, "123456789|2015\n987654321|\n").unwrap();

        let options = DelimitedOptions::default()
            .with_separator(b'|')
            .headerless(&["EIN", "EPOSTCARD"]);
        let df = read_delimited_table(&path, &options).unwrap();
        assert_eq!(column_names(&df), vec!["EIN", "EPOSTCARD"]);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = read_delimited_table(&dir.path().join("nope.csv"), &DelimitedOptions::default())
            .unwrap_err();
        assert!(matches!(err, IngestError::FileNotFound { .. }));
    }

    #[test]
    fn writer_puts_identifier_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("core2015pf.csv");
        let df = df!(
            "TOTREV" => &[Some(1500.0), None],
            "EIN" => &["1", "2"],
        )
        .unwrap();

        let rows = write_csv_table(&path, &df, "EIN").unwrap();
        assert_eq!(rows, 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "EIN,TOTREV\n1,1500\n2,\n");
    }
}
