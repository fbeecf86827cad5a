//! Polars AnyValue and column utility functions.
//!
//! Record tables only ever hold two kinds of columns: text (`String`) and
//! numbers (`Float64`). These helpers convert between cells, vectors and
//! columns under that convention.

use polars::prelude::*;

use crate::error::{IngestError, Result};

/// Converts a Polars AnyValue to a String representation.
/// Returns empty string for Null, formats whole floats without a fraction.
pub fn any_to_string(value: AnyValue<'_>) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::Int8(v) => v.to_string(),
        AnyValue::Int16(v) => v.to_string(),
        AnyValue::Int32(v) => v.to_string(),
        AnyValue::Int64(v) => v.to_string(),
        AnyValue::UInt8(v) => v.to_string(),
        AnyValue::UInt16(v) => v.to_string(),
        AnyValue::UInt32(v) => v.to_string(),
        AnyValue::UInt64(v) => v.to_string(),
        AnyValue::Float32(v) => format_numeric(f64::from(v)),
        AnyValue::Float64(v) => format_numeric(v),
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Boolean(b) => if b { "1" } else { "0" }.to_string(),
        other => other.to_string(),
    }
}

/// Formats a number the way the release files carry it: `2015`, not `2015.0`.
pub fn format_numeric(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Converts an AnyValue to f64, returning None for non-numeric or null values.
pub fn any_to_f64(value: AnyValue<'_>) -> Option<f64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Int8(v) => Some(f64::from(v)),
        AnyValue::Int16(v) => Some(f64::from(v)),
        AnyValue::Int32(v) => Some(f64::from(v)),
        AnyValue::Int64(v) => Some(v as f64),
        AnyValue::UInt8(v) => Some(f64::from(v)),
        AnyValue::UInt16(v) => Some(f64::from(v)),
        AnyValue::UInt32(v) => Some(f64::from(v)),
        AnyValue::UInt64(v) => Some(v as f64),
        AnyValue::Float32(v) => Some(f64::from(v)),
        AnyValue::Float64(v) => Some(v),
        AnyValue::String(s) => parse_f64(s),
        AnyValue::StringOwned(s) => parse_f64(&s),
        _ => None,
    }
}

/// Parses a string as f64, returning None for invalid, empty or NaN strings.
pub fn parse_f64(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| !v.is_nan())
}

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(Column::as_materialized_series)
        .map_err(|_| IngestError::ColumnNotFound {
            column: name.to_string(),
        })
}

/// Whether the named column holds numbers.
pub fn is_numeric_column(df: &DataFrame, name: &str) -> bool {
    df.column(name)
        .map(|column| is_numeric_dtype(column.dtype()))
        .unwrap_or(false)
}

/// Reads a column as text. Numbers are formatted with [`format_numeric`].
pub fn column_strings(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = series(df, name)?;
    if series.dtype() == &DataType::String {
        return Ok(series
            .str()?
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect());
    }
    let mut values = Vec::with_capacity(series.len());
    for idx in 0..series.len() {
        let value = series.get(idx)?;
        values.push(match value {
            AnyValue::Null => None,
            other => Some(any_to_string(other)),
        });
    }
    Ok(values)
}

/// Reads a column as text with nulls replaced by the empty string.
pub fn column_strings_or_empty(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    Ok(column_strings(df, name)?
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect())
}

/// Reads a column as numbers. Text that does not parse becomes None.
pub fn column_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = series(df, name)?;
    if is_numeric_dtype(series.dtype()) {
        let cast = series.cast(&DataType::Float64)?;
        return Ok(cast.f64()?.into_iter().collect());
    }
    if series.dtype() == &DataType::String {
        return Ok(series
            .str()?
            .into_iter()
            .map(|value| value.and_then(parse_f64))
            .collect());
    }
    let mut values = Vec::with_capacity(series.len());
    for idx in 0..series.len() {
        values.push(any_to_f64(series.get(idx)?));
    }
    Ok(values)
}

pub fn string_column(name: &str, values: Vec<Option<String>>) -> Series {
    Series::new(name.into(), values)
}

pub fn numeric_column(name: &str, values: Vec<Option<f64>>) -> Series {
    Series::new(name.into(), values)
}

/// Recasts a column to `Float64`; unparseable or missing cells take `fill`.
///
/// Missing columns are left alone.
pub fn coerce_numeric(df: &mut DataFrame, name: &str, fill: Option<f64>) -> Result<bool> {
    if !has_column(df, name) {
        return Ok(false);
    }
    let values: Vec<Option<f64>> = column_f64(df, name)?
        .into_iter()
        .map(|value| value.or(fill))
        .collect();
    df.with_column(numeric_column(name, values))?;
    Ok(true)
}

/// Recasts a column to `String`, keeping nulls.
pub fn coerce_text(df: &mut DataFrame, name: &str) -> Result<bool> {
    if !has_column(df, name) {
        return Ok(false);
    }
    let values = column_strings(df, name)?;
    df.with_column(string_column(name, values))?;
    Ok(true)
}
