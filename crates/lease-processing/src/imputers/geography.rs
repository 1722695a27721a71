//! Zip-based refill of state and city.

use crate::error::Result;
use crate::geo::{ZipLookup, ZipLookupResult};
use crate::types::columns;
use crate::utils::{is_missing_marker, normalize_zip, optional_string_values, set_string_column};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Counts from one geography fill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeographyFillOutcome {
    /// Rows that had a zip and were looked up.
    pub looked_up: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub errors: usize,
}

/// Overwrites `State` and `City ID Name` for rows whose zip resolves.
///
/// Rows without a zip, or whose lookup returns `NotFound` or `Error`, keep
/// their existing values. Each distinct zip is looked up once per pass.
pub struct GeographyImputer<'a> {
    lookup: &'a dyn ZipLookup,
}

impl<'a> GeographyImputer<'a> {
    pub fn new(lookup: &'a dyn ZipLookup) -> Self {
        Self { lookup }
    }

    pub fn apply(&self, df: DataFrame) -> Result<(DataFrame, GeographyFillOutcome)> {
        let mut outcome = GeographyFillOutcome::default();

        if df.column(columns::ZIP).is_err() {
            debug!("No '{}' column; skipping geography fill", columns::ZIP);
            return Ok((df, outcome));
        }

        let mut df = df;
        let zips = optional_string_values(&df, columns::ZIP)?;
        let mut states = optional_string_values(&df, columns::STATE)?;
        let mut cities = optional_string_values(&df, columns::CITY_ID_NAME)?;

        let mut cache: HashMap<String, ZipLookupResult> = HashMap::new();

        for (row, zip) in zips.iter().enumerate() {
            let Some(raw) = zip.as_deref().filter(|z| !is_missing_marker(z)) else {
                continue;
            };

            let query = normalize_zip(raw).unwrap_or_else(|| raw.trim().to_string());
            let result = cache
                .entry(query)
                .or_insert_with_key(|key| self.lookup.lookup(key));

            outcome.looked_up += 1;
            match result {
                ZipLookupResult::Found(location) => {
                    states[row] = Some(location.state.clone());
                    cities[row] = Some(location.city.clone());
                    outcome.resolved += 1;
                }
                ZipLookupResult::NotFound => outcome.not_found += 1,
                ZipLookupResult::Error(reason) => {
                    debug!("Zip lookup failed at row {}: {}", row, reason);
                    outcome.errors += 1;
                }
            }
        }

        if outcome.resolved > 0 {
            set_string_column(&mut df, columns::STATE, states)?;
            set_string_column(&mut df, columns::CITY_ID_NAME, cities)?;
        }

        if outcome.errors > 0 {
            warn!(
                "{} zip lookups failed against '{}'",
                outcome.errors,
                self.lookup.name()
            );
        }
        debug!(
            "Geography fill: {} looked up, {} resolved, {} not found",
            outcome.looked_up, outcome.resolved, outcome.not_found
        );

        Ok((df, outcome))
    }
}
