//! Pipeline module.
//!
//! This module provides the main normalizer and its progress reporting.

mod builder;
pub mod progress;

pub use builder::{NormalizationOutput, Normalizer, NormalizerBuilder};
pub use progress::{ClosureProgressReporter, NormalizationStage, ProgressReporter, ProgressUpdate};
