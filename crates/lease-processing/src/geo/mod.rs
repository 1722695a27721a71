//! Postal-code geography lookup.
//!
//! The normalizer refills `State` and `City ID Name` from reference data
//! keyed by zip code. The reference data is an external collaborator, so it
//! sits behind the [`ZipLookup`] trait and is injected into the pipeline.
//!
//! # Implementations
//!
//! - [`ZipReferenceTable`] - in-memory table loaded from a `zip,state,city` CSV
//!
//! To plug in another source (a database, a web service), implement
//! [`ZipLookup`] and pass it to [`crate::Normalizer::builder`].
//!
//! # Example
//!
//! ```rust,ignore
//! use lease_processing::geo::ZipReferenceTable;
//! use lease_processing::Normalizer;
//! use std::sync::Arc;
//!
//! let table = Arc::new(ZipReferenceTable::from_csv("zips.csv")?);
//!
//! let result = Normalizer::builder()
//!     .zip_lookup(table)
//!     .build()?
//!     .normalize(dataframe)?;
//! ```

mod lookup;
mod reference;

pub use lookup::{GeoLocation, ZipLookup, ZipLookupResult};
pub use reference::ZipReferenceTable;
