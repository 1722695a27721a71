//! Mileage-based fill for missing car conditions.

use crate::config::{MissingMileagePolicy, NormalizerConfig};
use crate::error::Result;
use crate::types::{Condition, columns};
use crate::utils::{is_missing_marker, optional_f64_values, set_string_column, string_values};
use polars::prelude::*;
use tracing::debug;

/// Counts from one condition fill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionFillOutcome {
    pub filled_new: usize,
    pub filled_used: usize,
    pub left_absent: usize,
}

impl ConditionFillOutcome {
    pub fn total_filled(&self) -> usize {
        self.filled_new + self.filled_used
    }
}

/// Fills an absent `New/Used` value from `Mileage @ Inception`.
///
/// Mileage at or below the threshold means `New`, anything above means
/// `Used`. Conditions that are already present are never touched.
#[derive(Debug, Clone, Copy)]
pub struct ConditionImputer {
    threshold: f64,
    missing_mileage: MissingMileagePolicy,
}

impl ConditionImputer {
    pub fn new(threshold: f64, missing_mileage: MissingMileagePolicy) -> Self {
        Self {
            threshold,
            missing_mileage,
        }
    }

    pub fn from_config(config: &NormalizerConfig) -> Self {
        Self::new(config.new_mileage_threshold, config.missing_mileage_policy)
    }

    /// Condition for a record with no recorded condition.
    pub fn classify(&self, mileage: Option<f64>) -> Option<Condition> {
        match mileage {
            Some(m) if m <= self.threshold => Some(Condition::New),
            Some(_) => Some(Condition::Used),
            None => match self.missing_mileage {
                MissingMileagePolicy::AssumeUsed => Some(Condition::Used),
                MissingMileagePolicy::LeaveAbsent => None,
            },
        }
    }

    /// Fill absent conditions, returning the new frame and what was filled.
    pub fn apply(&self, df: DataFrame) -> Result<(DataFrame, ConditionFillOutcome)> {
        let mut df = df;
        let conditions = string_values(&df, columns::CONDITION)?;
        let mileage = optional_f64_values(&df, columns::MILEAGE)?;

        let mut outcome = ConditionFillOutcome::default();
        let mut markers_cleared = 0usize;

        let filled: Vec<Option<String>> = conditions
            .into_iter()
            .zip(mileage)
            .map(|(condition, mileage)| match condition {
                Some(c) if !is_missing_marker(&c) => Some(c),
                marker => match self.classify(mileage) {
                    Some(Condition::New) => {
                        outcome.filled_new += 1;
                        Some(Condition::New.to_string())
                    }
                    Some(other) => {
                        outcome.filled_used += 1;
                        Some(other.to_string())
                    }
                    None => {
                        outcome.left_absent += 1;
                        if marker.is_some() {
                            markers_cleared += 1;
                        }
                        None
                    }
                },
            })
            .collect();

        // Markers left unfilled still become nulls
        if outcome.total_filled() > 0 || markers_cleared > 0 {
            set_string_column(&mut df, columns::CONDITION, filled)?;
        }

        debug!(
            "Condition fill: {} new, {} used, {} left absent",
            outcome.filled_new, outcome.filled_used, outcome.left_absent
        );

        Ok((df, outcome))
    }
}
