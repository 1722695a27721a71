//! Lease Record Normalizer Library
//!
//! Cleaning and fleet reporting for vehicle lease records, built on Polars.
//!
//! # Overview
//!
//! The normalizer takes a raw lease table and runs four stages over it:
//!
//! - **Condition Fill**: Missing `New/Used` values are filled from mileage at inception
//! - **Geography Fill**: `State` and `City ID Name` are refilled from an injectable zip lookup
//! - **Payback Period**: `Payback_Period = Invoiced Amount / Weekly Payment`, in weeks
//! - **Exclusion**: Records matching a declarative list of known-bad patterns are removed
//!
//! A fleet report (counts per make and model, payback period per condition,
//! monthly purchases, purchases per state) can be computed over the result.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lease_processing::{Normalizer, NormalizerConfig, ZipReferenceTable};
//! use polars::prelude::*;
//! use std::sync::Arc;
//!
//! let df = CsvReadOptions::default()
//!     .try_into_reader_with_file_path(Some("leases.csv".into()))?
//!     .finish()?;
//!
//! let zips = Arc::new(ZipReferenceTable::from_csv("zips.csv")?);
//!
//! let output = Normalizer::builder()
//!     .zip_lookup(zips)
//!     .config(NormalizerConfig::builder().save_to_disk(false).build()?)
//!     .build()?
//!     .normalize(df)?;
//!
//! println!("{} rows kept", output.result.summary.rows_after);
//! ```
//!
//! # Zip Lookups
//!
//! Geography comes from any [`geo::ZipLookup`] implementation. Each lookup
//! returns an explicit [`geo::ZipLookupResult`]; failures are counted in the
//! summary and never abort the run. [`geo::ZipReferenceTable`] is the
//! CSV-backed implementation used by the CLI.
//!
//! # Configuration
//!
//! ```rust,ignore
//! use lease_processing::config::*;
//!
//! let config = NormalizerConfig::builder()
//!     .new_mileage_threshold(30.0)
//!     .missing_mileage_policy(MissingMileagePolicy::AssumeUsed)
//!     .zero_payment_policy(ZeroPaymentPolicy::DropRow)
//!     .exclude(ExclusionRule::make_model("Ford", "Civic"))
//!     .build()?;
//! ```

pub mod cleaner;
pub mod config;
pub mod derived;
pub mod error;
pub mod geo;
pub mod imputers;
pub mod pipeline;
pub mod reporting;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use cleaner::{ExclusionOutcome, RecordCleaner};
pub use config::{
    ConfigValidationError, ExclusionRule, FieldMatch, MissingMileagePolicy, NormalizerConfig,
    NormalizerConfigBuilder, ZeroPaymentPolicy,
};
pub use derived::{PaybackCalculator, PaybackOutcome};
pub use error::{NormalizeError, Result as NormalizeResult, ResultExt};
pub use geo::{GeoLocation, ZipLookup, ZipLookupResult, ZipReferenceTable};
pub use imputers::{ConditionFillOutcome, ConditionImputer, GeographyFillOutcome, GeographyImputer};
pub use pipeline::{
    ClosureProgressReporter, NormalizationOutput, NormalizationStage, Normalizer,
    NormalizerBuilder, ProgressReporter, ProgressUpdate,
};
pub use reporting::{FleetReport, NormalizationReport, ReportGenerator};
pub use types::{
    ActionType, Condition, LeaseRecord, NormalizationAction, NormalizationResult,
    NormalizationSummary, RuleHits,
};
pub use utils::{is_missing_marker, normalize_zip, parse_numeric_string};
