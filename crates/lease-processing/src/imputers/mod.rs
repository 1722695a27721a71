//! Imputation module for filling missing lease values.
//!
//! This module provides the deterministic fills the normalizer applies:
//! - Condition from mileage at inception
//! - State and city from the zip code

mod condition;
mod geography;

pub use condition::{ConditionFillOutcome, ConditionImputer};
pub use geography::{GeographyFillOutcome, GeographyImputer};
