//! Record tables keyed by EIN.
//!
//! A [`RecordTable`] is a DataFrame plus the form it belongs to. Columns are
//! either text or `Float64`. The identifier column `EIN` is always text and is
//! not required to be unique until deduplication has run.

use std::collections::{BTreeMap, HashMap};

use nccs_ingest::polars_utils::{
    coerce_numeric, coerce_text, column_f64, column_names, column_strings, has_column,
    is_numeric_column, numeric_column, string_column,
};
use nccs_model::validation::EIN;
use nccs_model::{NccsError, Result};
use polars::prelude::*;

#[derive(Debug, Clone)]
pub struct RecordTable {
    /// Form label used in logs and errors (`EZ`, `CO`, `PC_full`, ...).
    pub form: String,
    pub data: DataFrame,
}

impl RecordTable {
    /// Wraps a frame, casting its `EIN` column to text.
    pub fn new(form: impl Into<String>, mut data: DataFrame) -> Result<Self> {
        let form = form.into();
        if !has_column(&data, EIN) {
            return Err(NccsError::Frame {
                message: format!("{form} table has no {EIN} column"),
            });
        }
        coerce_text(&mut data, EIN)?;
        Ok(Self { form, data })
    }

    pub fn record_count(&self) -> usize {
        self.data.height()
    }

    pub fn has_column(&self, name: &str) -> bool {
        has_column(&self.data, name)
    }

    pub fn column_names(&self) -> Vec<String> {
        column_names(&self.data)
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        is_numeric_column(&self.data, name)
    }

    pub fn eins(&self) -> Result<Vec<String>> {
        Ok(column_strings(&self.data, EIN)?
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect())
    }

    /// Occurrences per EIN.
    pub fn ein_counts(&self) -> Result<HashMap<String, usize>> {
        let mut counts = HashMap::new();
        for ein in self.eins()? {
            *counts.entry(ein).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Rows whose EIN appears more than once.
    pub fn duplicate_count(&self) -> Result<usize> {
        Ok(self
            .ein_counts()?
            .values()
            .filter(|count| **count > 1)
            .sum())
    }

    /// Fails with [`NccsError::DuplicateIdentifier`] if any EIN repeats.
    pub fn ensure_unique(&self) -> Result<()> {
        let count = self.duplicate_count()?;
        if count > 0 {
            return Err(NccsError::DuplicateIdentifier {
                form: self.form.clone(),
                count,
            });
        }
        Ok(())
    }

    pub fn strings(&self, name: &str) -> Result<Vec<Option<String>>> {
        Ok(column_strings(&self.data, name)?)
    }

    pub fn numbers(&self, name: &str) -> Result<Vec<Option<f64>>> {
        Ok(column_f64(&self.data, name)?)
    }

    /// Numbers of a column, or all-null when the column is absent.
    pub fn numbers_or_null(&self, name: &str) -> Result<Vec<Option<f64>>> {
        if self.has_column(name) {
            self.numbers(name)
        } else {
            Ok(vec![None; self.record_count()])
        }
    }

    pub fn set_strings(&mut self, name: &str, values: Vec<Option<String>>) -> Result<()> {
        self.data.with_column(string_column(name, values))?;
        Ok(())
    }

    pub fn set_numbers(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<()> {
        self.data.with_column(numeric_column(name, values))?;
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> bool {
        self.data.drop_in_place(name).is_ok()
    }

    /// Renames columns; targets that already exist are left alone.
    ///
    /// Returns the number of columns renamed.
    pub fn rename<'a, I>(&mut self, mapping: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut renamed = 0;
        for (old, new) in mapping {
            if old == new || !self.has_column(old) || self.has_column(new) {
                continue;
            }
            self.data.rename(old, new.into())?;
            renamed += 1;
        }
        Ok(renamed)
    }

    /// Keeps rows where `mask` is true. Returns the number of rows removed.
    pub fn retain(&mut self, mask: &[bool]) -> Result<usize> {
        let before = self.record_count();
        let mask = BooleanChunked::from_slice("mask".into(), mask);
        self.data = self.data.filter(&mask)?;
        Ok(before - self.record_count())
    }

    /// Rows where `mask` is true, as a new table.
    pub fn filtered(&self, mask: &[bool]) -> Result<RecordTable> {
        let mask = BooleanChunked::from_slice("mask".into(), mask);
        Ok(RecordTable {
            form: self.form.clone(),
            data: self.data.filter(&mask)?,
        })
    }

    /// Left-merges `reference` on `key`, matching `reference_key` in the reference.
    ///
    /// Rows are never dropped or duplicated: each row takes the first matching
    /// reference row. Columns already on this table are not overwritten.
    /// Returns the names of the columns added.
    pub fn left_merge(
        &mut self,
        reference: &DataFrame,
        key: &str,
        reference_key: &str,
    ) -> Result<Vec<String>> {
        let reference_keys = column_strings(reference, reference_key)?;
        let mut first_match: HashMap<&str, usize> = HashMap::new();
        for (idx, value) in reference_keys.iter().enumerate() {
            if let Some(value) = value {
                first_match.entry(value.as_str()).or_insert(idx);
            }
        }

        let keys = if self.has_column(key) {
            self.strings(key)?
        } else {
            vec![None; self.record_count()]
        };
        let matches: Vec<Option<usize>> = keys
            .iter()
            .map(|value| {
                value
                    .as_deref()
                    .and_then(|value| first_match.get(value).copied())
            })
            .collect();

        let mut added = Vec::new();
        for name in column_names(reference) {
            if name == reference_key || self.has_column(&name) {
                continue;
            }
            if is_numeric_column(reference, &name) {
                let source = column_f64(reference, &name)?;
                let values = matches
                    .iter()
                    .map(|idx| idx.and_then(|idx| source[idx]))
                    .collect();
                self.set_numbers(&name, values)?;
            } else {
                let source = column_strings(reference, &name)?;
                let values = matches
                    .iter()
                    .map(|idx| idx.and_then(|idx| source[idx].clone()))
                    .collect();
                self.set_strings(&name, values)?;
            }
            added.push(name);
        }
        Ok(added)
    }

    /// Appends rows of `other`, aligning columns by name.
    pub fn append(&mut self, other: &DataFrame) -> Result<()> {
        self.data = concat_diagonal(&[self.data.clone(), other.clone()])?;
        Ok(())
    }

    /// Recasts the named columns to numbers. Returns how many were present.
    pub fn coerce_numeric(&mut self, columns: &[&str], fill: Option<f64>) -> Result<usize> {
        let mut coerced = 0;
        for name in columns {
            if coerce_numeric(&mut self.data, name, fill)? {
                coerced += 1;
            }
        }
        Ok(coerced)
    }

    /// Fills numeric nulls with 0 and text nulls with the empty string.
    pub fn fill_missing(&mut self) -> Result<()> {
        for name in self.column_names() {
            if self.is_numeric(&name) {
                let values = self
                    .numbers(&name)?
                    .into_iter()
                    .map(|value| Some(value.unwrap_or(0.0)))
                    .collect();
                self.set_numbers(&name, values)?;
            } else {
                let values = self
                    .strings(&name)?
                    .into_iter()
                    .map(|value| Some(value.unwrap_or_default()))
                    .collect();
                self.set_strings(&name, values)?;
            }
        }
        Ok(())
    }

    /// Fills nulls of one text column.
    pub fn fill_text(&mut self, name: &str, fill: &str) -> Result<()> {
        if !self.has_column(name) {
            return Ok(());
        }
        let values = self
            .strings(name)?
            .into_iter()
            .map(|value| Some(value.unwrap_or_else(|| fill.to_string())))
            .collect();
        self.set_strings(name, values)
    }
}

/// Stacks frames vertically, taking the union of their columns.
///
/// Column order and types follow the first frame that carries each column.
/// Missing columns are filled with nulls.
pub fn concat_diagonal(frames: &[DataFrame]) -> Result<DataFrame> {
    let mut order: Vec<String> = Vec::new();
    let mut dtypes: BTreeMap<String, DataType> = BTreeMap::new();
    for frame in frames {
        for column in frame.get_columns() {
            let name = column.name().to_string();
            if !dtypes.contains_key(&name) {
                dtypes.insert(name.clone(), column.dtype().clone());
                order.push(name);
            }
        }
    }

    let mut result: Option<DataFrame> = None;
    for frame in frames {
        let mut aligned = frame.clone();
        for name in &order {
            let dtype = &dtypes[name];
            if has_column(&aligned, name) {
                let current = aligned.column(name)?.as_materialized_series().clone();
                if current.dtype() != dtype {
                    aligned.with_column(current.cast(dtype)?)?;
                }
            } else {
                aligned.with_column(Series::full_null(
                    name.as_str().into(),
                    aligned.height(),
                    dtype,
                ))?;
            }
        }
        let aligned = aligned.select(order.iter().map(String::as_str))?;
        match result.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&aligned)?;
            }
            None => result = Some(aligned),
        }
    }
    Ok(result.unwrap_or_default())
}
