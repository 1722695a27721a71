use crate::error::Result;
use crate::utils::{optional_f64_values, optional_i64_values, optional_string_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column headers of the lease dataset.
pub mod columns {
    pub const DATE: &str = "Date";
    pub const WEEKLY_PAYMENT: &str = "Weekly Payment";
    pub const CONDITION: &str = "New/Used";
    pub const DEALER: &str = "Dealer";
    pub const MAKE: &str = "Make";
    pub const MODEL: &str = "Model";
    pub const YEAR: &str = "Year";
    pub const INVOICED_AMOUNT: &str = "Invoiced Amount";
    pub const STATE: &str = "State";
    pub const CITY: &str = "City";
    pub const CITY_ID_NAME: &str = "City ID Name";
    pub const MILEAGE: &str = "Mileage @ Inception";
    pub const ZIP: &str = "ZIP";

    /// Derived: invoiced amount divided by weekly payment, in weeks.
    pub const PAYBACK_PERIOD: &str = "Payback_Period";

    /// The 13 columns of a raw export, in file order.
    pub const RAW: [&str; 13] = [
        DATE,
        WEEKLY_PAYMENT,
        CONDITION,
        DEALER,
        MAKE,
        MODEL,
        YEAR,
        INVOICED_AMOUNT,
        STATE,
        CITY,
        CITY_ID_NAME,
        MILEAGE,
        ZIP,
    ];
}

/// Condition of a car at purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    New,
    Used,
    Reassignment,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Used => "Used",
            Self::Reassignment => "Reassignment",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "used" => Ok(Self::Used),
            "reassignment" => Ok(Self::Reassignment),
            other => Err(format!("unknown condition '{}'", other)),
        }
    }
}

/// Typed view of one row of a lease table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub date: Option<String>,
    pub weekly_payment: Option<f64>,
    pub condition: Option<String>,
    pub dealer: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i64>,
    pub invoiced_amount: Option<f64>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub city_id_name: Option<String>,
    pub mileage_at_inception: Option<f64>,
    pub zip: Option<String>,
    pub payback_period: Option<f64>,
}

impl LeaseRecord {
    /// Materialize every row of a lease table.
    ///
    /// Columns absent from the frame read as absent values.
    pub fn from_frame(df: &DataFrame) -> Result<Vec<LeaseRecord>> {
        let height = df.height();
        let date = optional_string_values(df, columns::DATE)?;
        let weekly_payment = optional_f64_values(df, columns::WEEKLY_PAYMENT)?;
        let condition = optional_string_values(df, columns::CONDITION)?;
        let dealer = optional_string_values(df, columns::DEALER)?;
        let make = optional_string_values(df, columns::MAKE)?;
        let model = optional_string_values(df, columns::MODEL)?;
        let year = optional_i64_values(df, columns::YEAR)?;
        let invoiced_amount = optional_f64_values(df, columns::INVOICED_AMOUNT)?;
        let state = optional_string_values(df, columns::STATE)?;
        let city = optional_string_values(df, columns::CITY)?;
        let city_id_name = optional_string_values(df, columns::CITY_ID_NAME)?;
        let mileage = optional_f64_values(df, columns::MILEAGE)?;
        let zip = optional_string_values(df, columns::ZIP)?;
        let payback = optional_f64_values(df, columns::PAYBACK_PERIOD)?;

        let records = (0..height)
            .map(|i| LeaseRecord {
                date: date[i].clone(),
                weekly_payment: weekly_payment[i],
                condition: condition[i].clone(),
                dealer: dealer[i].clone(),
                make: make[i].clone(),
                model: model[i].clone(),
                year: year[i],
                invoiced_amount: invoiced_amount[i],
                state: state[i].clone(),
                city: city[i].clone(),
                city_id_name: city_id_name[i].clone(),
                mileage_at_inception: mileage[i],
                zip: zip[i].clone(),
                payback_period: payback[i],
            })
            .collect();

        Ok(records)
    }

    /// Parsed condition, if present and recognised.
    pub fn condition(&self) -> Option<Condition> {
        self.condition.as_deref().and_then(|c| c.parse().ok())
    }
}

/// Result of a normalization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationResult {
    pub success: bool,
    /// Where the cleaned table was written, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    pub processing_steps: Vec<String>,
    pub summary: NormalizationSummary,
}

// ============================================================================
// Normalization Summary Types
// ============================================================================

/// Counts and audit trail of one normalization run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizationSummary {
    /// Total execution time in milliseconds.
    pub duration_ms: u64,

    pub rows_before: usize,
    pub rows_after: usize,

    /// Conditions filled as New.
    pub conditions_filled_new: usize,
    /// Conditions filled as Used.
    pub conditions_filled_used: usize,
    /// Conditions left absent because mileage was also absent.
    pub conditions_left_absent: usize,

    /// Rows whose zip was resolved and geography overwritten.
    pub geography_resolved: usize,
    /// Rows whose zip had no match in the reference data.
    pub geography_not_found: usize,
    /// Rows whose lookup failed.
    pub geography_lookup_errors: usize,

    /// Rows with a computed payback period.
    pub paybacks_computed: usize,
    /// Rows whose payback period is absent (missing inputs or zero payment).
    pub paybacks_undefined: usize,
    /// Rows removed because the weekly payment was zero.
    pub zero_payment_rows_dropped: usize,

    /// Rows removed by the exclusion list.
    pub rows_excluded: usize,
    /// Rows removed per exclusion rule.
    pub exclusions: Vec<RuleHits>,

    /// Fraction of non-null cells before normalization (0.0 - 1.0).
    pub completeness_before: f32,
    /// Fraction of non-null cells after normalization (0.0 - 1.0).
    pub completeness_after: f32,

    pub actions: Vec<NormalizationAction>,
    pub warnings: Vec<String>,
}

impl NormalizationSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action(&mut self, action: NormalizationAction) {
        self.actions.push(action);
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Total number of rows removed by any stage.
    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }

    /// Calculate the percentage of rows removed.
    pub fn rows_removed_percentage(&self) -> f32 {
        if self.rows_before == 0 {
            0.0
        } else {
            (self.rows_removed() as f32 / self.rows_before as f32) * 100.0
        }
    }

    /// Total number of condition values filled.
    pub fn conditions_filled(&self) -> usize {
        self.conditions_filled_new + self.conditions_filled_used
    }
}

/// Rows removed by one exclusion rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHits {
    pub reason: String,
    pub rows: usize,
}

/// A single action taken during normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationAction {
    pub action_type: ActionType,
    /// Column name or "dataset".
    pub target: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl NormalizationAction {
    pub fn new(
        action_type: ActionType,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            target: target.into(),
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Types of actions that can be taken during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Raw text values were trimmed or nulled.
    ValueCleaned,
    /// Missing values were filled.
    ValueImputed,
    /// Values were replaced from reference data.
    ValueEnriched,
    /// A derived column was added.
    ColumnDerived,
    /// One or more rows were removed from the dataset.
    RowsRemoved,
}

impl ActionType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ValueCleaned => "Value Cleaned",
            Self::ValueImputed => "Value Imputed",
            Self::ValueEnriched => "Value Enriched",
            Self::ColumnDerived => "Column Derived",
            Self::RowsRemoved => "Rows Removed",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
