//! Polars `AnyValue` and string-column utilities shared across the clinmap
//! crates.
//!
//! The mapping engine is string-first: raw cells are carried as strings and
//! only sequence/derived numerics use typed columns. These helpers keep the
//! conversions in one place.

use anyhow::{Context, Result};
use polars::prelude::{AnyValue, Column, DataFrame, NamedFrom, Series};

/// Converts a Polars `AnyValue` to a `String` representation.
///
/// Returns an empty string for `Null` and formats floats without trailing
/// zeros.
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
        AnyValue::Boolean(b) => if b { "Y" } else { "N" }.to_string(),
        other => other.to_string(),
    }
}

/// Converts `AnyValue` to `String`, returning `None` if the result is empty
/// after trimming.
pub fn any_to_string_non_empty(value: AnyValue<'_>) -> Option<String> {
    let s = any_to_string(value);
    if s.trim().is_empty() { None } else { Some(s) }
}

/// Formats a floating-point number without unnecessary trailing zeros.
pub fn format_numeric(v: f64) -> String {
    let s = format!("{v}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Converts an `AnyValue` to `i64`, returning `None` for non-integer values.
pub fn any_to_i64(value: AnyValue<'_>) -> Option<i64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Int8(v) => Some(i64::from(v)),
        AnyValue::Int16(v) => Some(i64::from(v)),
        AnyValue::Int32(v) => Some(i64::from(v)),
        AnyValue::Int64(v) => Some(v),
        AnyValue::UInt8(v) => Some(i64::from(v)),
        AnyValue::UInt16(v) => Some(i64::from(v)),
        AnyValue::UInt32(v) => Some(i64::from(v)),
        AnyValue::UInt64(v) => i64::try_from(v).ok(),
        AnyValue::String(s) => parse_i64(s),
        AnyValue::StringOwned(s) => parse_i64(&s),
        _ => None,
    }
}

/// Parses a string as `f64`, returning `None` for empty or invalid input.
pub fn parse_f64(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Parses a string as `i64`, returning `None` for empty or invalid input.
pub fn parse_i64(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok()
}

/// Reads a column as trimmed strings; nulls become empty strings.
pub fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df
        .column(name)
        .with_context(|| format!("column {name} not found"))?;
    Ok((0..df.height())
        .map(|idx| {
            any_to_string(series.get(idx).unwrap_or(AnyValue::Null))
                .trim()
                .to_string()
        })
        .collect())
}

/// Reads a column as optional strings; nulls and blanks become `None`.
pub fn opt_string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df
        .column(name)
        .with_context(|| format!("column {name} not found"))?;
    Ok((0..df.height())
        .map(|idx| any_to_string_non_empty(series.get(idx).unwrap_or(AnyValue::Null)))
        .collect())
}

/// Reads a column as optional integers; non-numeric cells become `None`.
pub fn opt_i64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let series = df
        .column(name)
        .with_context(|| format!("column {name} not found"))?;
    Ok((0..df.height())
        .map(|idx| any_to_i64(series.get(idx).unwrap_or(AnyValue::Null)))
        .collect())
}

/// Replaces (or inserts) an optional-string column; `None` becomes null.
pub fn set_opt_string_column(
    df: &mut DataFrame,
    name: &str,
    values: Vec<Option<String>>,
) -> Result<()> {
    let series = Series::new(name.into(), values);
    df.with_column(series)
        .with_context(|| format!("failed to write column {name}"))?;
    Ok(())
}

/// Builds a DataFrame from named optional-string columns.
pub fn frame_from_opt_strings(columns: Vec<(String, Vec<Option<String>>)>) -> Result<DataFrame> {
    let cols: Vec<Column> = columns
        .into_iter()
        .map(|(name, values)| Series::new(name.into(), values).into())
        .collect();
    DataFrame::new(cols).context("failed to assemble frame")
}
