//! In-memory zip reference table.

use super::lookup::{GeoLocation, ZipLookup, ZipLookupResult};
use crate::error::{NormalizeError, Result};
use crate::utils::{normalize_zip, string_values};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

const ZIP_HEADERS: [&str; 4] = ["zip", "zipcode", "zip_code", "postal_code"];
const STATE_HEADERS: [&str; 2] = ["state", "state_code"];
const CITY_HEADERS: [&str; 2] = ["city", "city_name"];

/// Zip reference data held in a hash map keyed by five-digit zip.
#[derive(Debug, Clone, Default)]
pub struct ZipReferenceTable {
    name: String,
    entries: HashMap<String, GeoLocation>,
}

impl ZipReferenceTable {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    /// Load a reference table from a CSV with zip, state and city columns.
    ///
    /// Header names are matched case-insensitively. All columns are read as
    /// text so zips keep their leading zeros. Rows with a malformed zip or a
    /// blank state are skipped; later rows win on duplicate zips.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let load_error = |reason: String| NormalizeError::ZipReferenceLoad {
            path: path.display().to_string(),
            reason,
        };

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .and_then(|reader| reader.finish())
            .map_err(|e| load_error(e.to_string()))?;

        let zip_col = find_header(&df, &ZIP_HEADERS)
            .ok_or_else(|| load_error("no zip column".to_string()))?;
        let state_col = find_header(&df, &STATE_HEADERS)
            .ok_or_else(|| load_error("no state column".to_string()))?;
        let city_col = find_header(&df, &CITY_HEADERS)
            .ok_or_else(|| load_error("no city column".to_string()))?;

        let zips = string_values(&df, &zip_col)?;
        let states = string_values(&df, &state_col)?;
        let cities = string_values(&df, &city_col)?;

        let mut table = Self::new(path.display().to_string());
        let mut skipped = 0usize;

        for ((zip, state), city) in zips.into_iter().zip(states).zip(cities) {
            let key = zip.as_deref().and_then(normalize_zip);
            let state = state.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
            match (key, state) {
                (Some(key), Some(state)) => {
                    let city = city.map(|c| c.trim().to_string()).unwrap_or_default();
                    table.entries.insert(key, GeoLocation::new(state, city));
                }
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!("Skipped {} unusable zip reference rows", skipped);
        }
        info!(
            "Loaded {} zip codes from reference '{}'",
            table.len(),
            path.display()
        );

        Ok(table)
    }

    /// Add one entry; the zip is normalized first. Returns false if it is malformed.
    pub fn insert(&mut self, zip: &str, location: GeoLocation) -> bool {
        match normalize_zip(zip) {
            Some(key) => {
                self.entries.insert(key, location);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<Z: AsRef<str>> FromIterator<(Z, GeoLocation)> for ZipReferenceTable {
    fn from_iter<I: IntoIterator<Item = (Z, GeoLocation)>>(iter: I) -> Self {
        let mut table = Self::new("in-memory");
        for (zip, location) in iter {
            table.insert(zip.as_ref(), location);
        }
        table
    }
}

impl ZipLookup for ZipReferenceTable {
    fn lookup(&self, zip: &str) -> ZipLookupResult {
        let Some(key) = normalize_zip(zip) else {
            return ZipLookupResult::Error(format!("malformed zip code '{}'", zip.trim()));
        };

        match self.entries.get(&key) {
            Some(location) => ZipLookupResult::Found(location.clone()),
            None => ZipLookupResult::NotFound,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Find the first column whose lowercased name is one of `candidates`.
fn find_header(df: &DataFrame, candidates: &[&str]) -> Option<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .find(|name| candidates.contains(&name.trim().to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_table() -> ZipReferenceTable {
        [
            ("90001", GeoLocation::new("CA", "Los Angeles")),
            ("02134", GeoLocation::new("MA", "Boston")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_lookup_found() {
        let table = sample_table();
        assert_eq!(
            table.lookup("90001"),
            ZipLookupResult::Found(GeoLocation::new("CA", "Los Angeles"))
        );
    }

    #[test]
    fn test_lookup_normalizes_input() {
        let table = sample_table();
        assert!(table.lookup("2134").is_found());
        assert!(table.lookup("90001.0").is_found());
    }

    #[test]
    fn test_lookup_not_found() {
        let table = sample_table();
        assert_eq!(table.lookup("10001"), ZipLookupResult::NotFound);
    }

    #[test]
    fn test_lookup_malformed_is_error() {
        let table = sample_table();
        assert!(matches!(table.lookup("ABCDE"), ZipLookupResult::Error(_)));
    }

    #[test]
    fn test_insert_rejects_malformed() {
        let mut table = ZipReferenceTable::new("test");
        assert!(!table.insert("x1", GeoLocation::new("CA", "Nowhere")));
        assert!(table.is_empty());
    }

    #[test]
    fn test_from_csv_keeps_leading_zeros() {
        let path = std::env::temp_dir().join(format!(
            "lease_processing_zip_ref_{}.csv",
            std::process::id()
        ));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "ZIP,State,City").unwrap();
            writeln!(file, "02134,MA,Boston").unwrap();
            writeln!(file, "90001,CA,Los Angeles").unwrap();
            writeln!(file, "bad,NV,Nowhere").unwrap();
            writeln!(file, "89101,,Las Vegas").unwrap();
        }

        let table = ZipReferenceTable::from_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.lookup("02134"),
            ZipLookupResult::Found(GeoLocation::new("MA", "Boston"))
        );
    }

    #[test]
    fn test_from_csv_missing_file() {
        let err = ZipReferenceTable::from_csv("/definitely/not/here.csv").unwrap_err();
        assert_eq!(err.error_code(), "ZIP_REFERENCE_LOAD_FAILED");
    }
}
