//! Report generation module.
//!
//! This module provides the fleet aggregates computed over a normalized
//! table and the writer that saves the cleaned table and JSON reports.
//!
//! # Example
//!
//! ```rust,ignore
//! use lease_processing::reporting::{FleetReport, ReportGenerator};
//!
//! let fleet = FleetReport::from_frame(&cleaned)?;
//! let report = ReportGenerator::build_report("leases.csv", &result, &rules, Some(&fleet));
//!
//! let generator = ReportGenerator::new(PathBuf::from("output"), "cleaned_leases");
//! generator.write_report_to_file(&report, "leases")?;
//! ```

mod fleet;
mod generator;

pub use fleet::{
    CategoryCount, ConditionModelFleet, ConditionPayback, FleetReport, MakeModelCount, ModelFleet,
    ModelYearPayment, MonthlyFleet, VehicleGroup, purchase_month,
};
pub use generator::{NormalizationReport, ReportGenerator};
