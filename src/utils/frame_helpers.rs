//! DataFrame access helpers with column validation
//!
//! Polars infers CSV dtypes per file, so a position column can arrive as
//! i64, f64 or (when every cell is empty) string. These helpers fail loudly
//! on missing columns and normalise the rest through an explicit cast.

use anyhow::{anyhow, Context, Result};
use polars::prelude::*;
use std::collections::HashSet;
use std::path::Path;

/// Read a headered CSV, treating empty cells and `NA` as missing
pub fn read_csv(path: &Path, context: &str) -> Result<DataFrame> {
    let parse_options = CsvParseOptions::default()
        .with_null_values(Some(NullValues::AllColumnsSingle("NA".into())));

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_parse_options(parse_options)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("{}: Failed to create CSV reader: {}", context, path.display()))?
        .finish()
        .with_context(|| format!("{}: Failed to load CSV: {}", context, path.display()))
}

/// Check that every column in `columns` is present
pub fn require_columns(df: &DataFrame, columns: &[&str], context: &str) -> Result<()> {
    let actual: HashSet<&str> = df.get_columns().iter().map(|c| c.name().as_str()).collect();

    for &expected in columns {
        if !actual.contains(expected) {
            let mut available: Vec<&str> = actual.iter().copied().collect();
            available.sort_unstable();
            return Err(anyhow!(
                "{}: Missing expected column '{}'. Available columns: {:?}",
                context,
                expected,
                available
            ));
        }
    }
    Ok(())
}

/// Column values as `f64`, nulls as `None`
pub fn float_column(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .with_context(|| format!("{}: Missing {} column", context, name))?;
    let cast = column
        .cast(&DataType::Float64)
        .with_context(|| format!("{}: Column '{}' is not numeric", context, name))?;
    let values = cast.f64()?;
    Ok(values.into_iter().collect())
}

/// Column values as strings, nulls as `None`
pub fn string_column(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .with_context(|| format!("{}: Missing {} column", context, name))?;
    let cast = column
        .cast(&DataType::String)
        .with_context(|| format!("{}: Column '{}' cannot be read as text", context, name))?;
    let values = cast.str()?;
    Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Names of numeric columns, in frame order, excluding `skip`
///
/// A column that is entirely null counts as numeric; it is a position with
/// no observations, not a text column.
pub fn numeric_column_names(df: &DataFrame, skip: &[&str]) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| !skip.contains(&c.name().as_str()))
        .filter(|c| {
            let dtype = c.dtype();
            dtype.is_float() || dtype.is_integer() || c.null_count() == c.len()
        })
        .map(|c| c.name().to_string())
        .collect()
}
