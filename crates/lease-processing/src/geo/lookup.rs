//! Zip lookup trait and its per-row result.

use serde::{Deserialize, Serialize};

/// State and city a postal code belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub state: String,
    pub city: String,
}

impl GeoLocation {
    pub fn new(state: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            city: city.into(),
        }
    }
}

/// Outcome of looking up one zip code.
///
/// `NotFound` and `Error` both leave the record unchanged; they are kept
/// apart so the summary can tell missing reference data from broken input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZipLookupResult {
    Found(GeoLocation),
    NotFound,
    Error(String),
}

impl ZipLookupResult {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Source of postal-code geography.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so the normalizer can be moved to a
/// worker thread.
///
/// # Error Handling
///
/// Failures are returned as [`ZipLookupResult::Error`] rather than panicking
/// or aborting; the normalizer counts them and moves on to the next record.
pub trait ZipLookup: Send + Sync {
    /// Look up the geography of a zip code.
    ///
    /// The normalizer passes five-digit codes when the raw value could be
    /// normalized and the trimmed raw text otherwise.
    fn lookup(&self, zip: &str) -> ZipLookupResult;

    /// Name of the lookup source for logging.
    fn name(&self) -> &str;
}
