//! Record cleaning for lease tables.
//!
//! This module provides functionality for:
//! - Sanitizing raw text cells (trimming, quote stripping, missing markers)
//! - Removing records that match a known-bad pattern

mod sanitizers;

pub(crate) use sanitizers::sanitize_text_columns;

use crate::config::{ExclusionRule, FieldMatch};
use crate::error::Result;
use crate::types::RuleHits;
use crate::utils::{filter_rows, optional_string_values};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// Counts from one exclusion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionOutcome {
    pub rows_removed: usize,
    /// Hits per rule, in rule order. A row matching several rules counts for the first.
    pub by_rule: Vec<RuleHits>,
}

/// Removes records matching any configured [`ExclusionRule`].
///
/// Values are compared after trimming, case-sensitively. An absent value
/// or a missing column never matches, so a rule naming an unknown column
/// removes nothing.
#[derive(Debug, Clone)]
pub struct RecordCleaner {
    rules: Vec<ExclusionRule>,
}

impl RecordCleaner {
    pub fn new(rules: Vec<ExclusionRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    pub fn apply(&self, df: DataFrame) -> Result<(DataFrame, ExclusionOutcome)> {
        let mut outcome = ExclusionOutcome {
            rows_removed: 0,
            by_rule: self
                .rules
                .iter()
                .map(|rule| RuleHits {
                    reason: rule.reason.clone(),
                    rows: 0,
                })
                .collect(),
        };

        if self.rules.is_empty() || df.height() == 0 {
            return Ok((df, outcome));
        }

        let columns = self.load_columns(&df)?;
        let mut keep = Vec::with_capacity(df.height());

        for row in 0..df.height() {
            let hit = self
                .rules
                .iter()
                .position(|rule| rule_matches(rule, &columns, row));
            if let Some(index) = hit {
                outcome.by_rule[index].rows += 1;
                outcome.rows_removed += 1;
            }
            keep.push(hit.is_none());
        }

        if outcome.rows_removed == 0 {
            return Ok((df, outcome));
        }

        for hits in outcome.by_rule.iter().filter(|h| h.rows > 0) {
            debug!("Excluded {} rows: {}", hits.rows, hits.reason);
        }

        let df = filter_rows(&df, keep)?;
        Ok((df, outcome))
    }

    /// Read every column named by a rule once.
    fn load_columns(&self, df: &DataFrame) -> Result<HashMap<String, Vec<Option<String>>>> {
        let mut columns = HashMap::new();
        for condition in self.rules.iter().flat_map(|r| &r.conditions) {
            if !columns.contains_key(&condition.column) {
                let values = optional_string_values(df, &condition.column)?;
                columns.insert(condition.column.clone(), values);
            }
        }
        Ok(columns)
    }
}

impl Default for RecordCleaner {
    fn default() -> Self {
        Self::new(crate::config::default_exclusion_rules())
    }
}

fn rule_matches(
    rule: &ExclusionRule,
    columns: &HashMap<String, Vec<Option<String>>>,
    row: usize,
) -> bool {
    !rule.conditions.is_empty()
        && rule
            .conditions
            .iter()
            .all(|condition| field_matches(condition, columns, row))
}

fn field_matches(
    condition: &FieldMatch,
    columns: &HashMap<String, Vec<Option<String>>>,
    row: usize,
) -> bool {
    columns
        .get(&condition.column)
        .and_then(|values| values.get(row))
        .and_then(|value| value.as_deref())
        .is_some_and(|value| value.trim() == condition.value.trim())
}
