//! Text sanitization applied to the raw table before any stage runs.

use crate::utils::is_missing_marker;
use anyhow::Result;
use polars::prelude::*;
use tracing::debug;

/// Trim every string column, strip wrapping quotes and turn missing markers into nulls.
///
/// Returns the cleaned frame and how many cells were changed.
pub(crate) fn sanitize_text_columns(df: DataFrame) -> Result<(DataFrame, usize)> {
    let mut df = df;
    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let mut total_changed = 0;

    for col_name in &column_names {
        let series = df.column(col_name)?.as_materialized_series().clone();
        if series.dtype() != &DataType::String {
            continue;
        }

        let (cleaned, changed) = sanitize_series(&series)?;
        if changed > 0 {
            total_changed += changed;
            df.replace(col_name, cleaned)?;
        }
    }

    if total_changed > 0 {
        debug!("Sanitized {} text cells", total_changed);
    }

    Ok((df, total_changed))
}

fn sanitize_series(series: &Series) -> Result<(Series, usize)> {
    let values = series.str()?;
    let mut cleaned = Vec::with_capacity(values.len());
    let mut changed = 0;

    for value in values.into_iter() {
        match value {
            Some(raw) => {
                let stripped = strip_quotes(raw);
                if is_missing_marker(&stripped) {
                    cleaned.push(None);
                    changed += 1;
                } else {
                    if stripped != raw {
                        changed += 1;
                    }
                    cleaned.push(Some(stripped));
                }
            }
            None => cleaned.push(None),
        }
    }

    Ok((Series::new(series.name().clone(), cleaned), changed))
}

/// Remove whitespace and any number of matching quote pairs around a value.
pub(crate) fn strip_quotes(value: &str) -> String {
    let mut cleaned = value.trim();

    // Bounded so malformed input cannot loop forever
    for _ in 0..10 {
        let unwrapped = ['"', '\'']
            .iter()
            .find_map(|&q| {
                cleaned
                    .strip_prefix(q)
                    .and_then(|rest| rest.strip_suffix(q))
            })
            .map(str::trim);

        match unwrapped {
            Some(inner) => cleaned = inner,
            None => break,
        }
    }

    cleaned.to_string()
}
