//! Shared helpers for reading and writing lease table columns.
//!
//! Raw exports are loosely typed (numbers may arrive as text, zips as floats),
//! so every reader here coerces to the type the pipeline works in.

use crate::error::{NormalizeError, Result};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;

// =============================================================================
// Column Access
// =============================================================================

/// Get a column as a Series or fail with `ColumnNotFound`.
pub fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|col| col.as_materialized_series())
        .map_err(|_| NormalizeError::ColumnNotFound(name.to_string()))
}

/// Read a column as optional strings, casting non-string columns.
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = require_column(df, name)?;
    let as_str = series.cast(&DataType::String)?;
    Ok(as_str
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Read a column as optional floats.
///
/// Text columns are parsed leniently (currency symbols and thousands
/// separators are stripped); unparseable text and NaN read as absent.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = require_column(df, name)?;
    if series.dtype() == &DataType::String {
        return Ok(series
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_numeric_string))
            .collect());
    }

    let floats = series.cast(&DataType::Float64)?;
    Ok(floats
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Read a column as optional integers. Fractional values read as absent.
pub fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    Ok(f64_values(df, name)?
        .into_iter()
        .map(|v| v.filter(|x| x.fract() == 0.0).map(|x| x as i64))
        .collect())
}

/// Like [`string_values`], but a missing column reads as all-absent.
pub fn optional_string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    if df.column(name).is_err() {
        return Ok(vec![None; df.height()]);
    }
    string_values(df, name)
}

/// Like [`f64_values`], but a missing column reads as all-absent.
pub fn optional_f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    if df.column(name).is_err() {
        return Ok(vec![None; df.height()]);
    }
    f64_values(df, name)
}

/// Like [`i64_values`], but a missing column reads as all-absent.
pub fn optional_i64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    if df.column(name).is_err() {
        return Ok(vec![None; df.height()]);
    }
    i64_values(df, name)
}

/// Replace (or add) a string column.
pub fn set_string_column(df: &mut DataFrame, name: &str, values: Vec<Option<String>>) -> Result<()> {
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}

/// Replace (or add) a float column.
pub fn set_f64_column(df: &mut DataFrame, name: &str, values: Vec<Option<f64>>) -> Result<()> {
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}

/// Keep only the rows whose flag is `true`.
pub fn filter_rows(df: &DataFrame, keep: Vec<bool>) -> Result<DataFrame> {
    let mask = Series::new("keep".into(), keep);
    Ok(df.filter(mask.bool()?)?)
}

/// Fraction of non-null cells in the frame (0.0 - 1.0).
pub fn completeness_score(df: &DataFrame) -> f32 {
    if df.height() == 0 || df.width() == 0 {
        return 0.0;
    }

    let total_cells = df.height() * df.width();
    let null_count: usize = df.get_columns().iter().map(|col| col.null_count()).sum();

    total_cells.saturating_sub(null_count) as f32 / total_cells as f32
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Characters commonly used in numeric formatting that should be stripped.
pub const NUMERIC_FORMAT_CHARS: [char; 3] = [',', '$', ' '];

/// Spellings of "no value" found in spreadsheet exports.
pub const MISSING_MARKERS: [&str; 8] = ["", "nan", "n/a", "na", "null", "none", "missing", "#n/a"];

/// Check if a string is a missing-value marker.
pub fn is_missing_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    MISSING_MARKERS.iter().any(|&marker| lower == marker)
}

/// Try to parse a string as a numeric value (f64).
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let mut cleaned = s.trim().to_string();
    for c in NUMERIC_FORMAT_CHARS {
        cleaned = cleaned.replace(c, "");
    }
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| !v.is_nan())
}

static ZIP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{3,5})(?:-\d{4})?(?:\.0+)?$").expect("Invalid regex: zip code")
});

/// Normalize a postal code to five-digit text.
///
/// Accepts ZIP+4 (`90001-1234`), float renderings from spreadsheets
/// (`90001.0`) and codes that lost their leading zeros (`2134` -> `02134`).
/// Returns `None` for anything else.
pub fn normalize_zip(raw: &str) -> Option<String> {
    let caps = ZIP_PATTERN.captures(raw.trim())?;
    let digits = caps.get(1)?.as_str();
    Some(format!("{:0>5}", digits))
}
