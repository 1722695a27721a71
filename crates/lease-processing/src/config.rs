//! Configuration types for the lease normalization pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup.

use crate::types::columns;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Mileage at or below this value marks a car with no recorded condition as new.
pub const DEFAULT_NEW_MILEAGE_THRESHOLD: f64 = 30.0;

/// What to do with a record whose condition and mileage are both absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MissingMileagePolicy {
    /// Treat the car as used (an absent mileage never counts as low mileage)
    #[default]
    AssumeUsed,
    /// Leave the condition absent
    LeaveAbsent,
}

/// How to derive the payback period when the weekly payment is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ZeroPaymentPolicy {
    /// Leave the payback period absent and record a warning
    #[default]
    Null,
    /// Remove the record from the table
    DropRow,
    /// Abort the pipeline with a division-by-zero error
    Fail,
}

/// A single condition of an exclusion rule: `column == value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub column: String,
    pub value: String,
}

impl FieldMatch {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// A known-bad record pattern. A record is excluded when every condition matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    /// Why records matching this rule are removed.
    pub reason: String,
    /// Conditions joined by AND.
    pub conditions: Vec<FieldMatch>,
}

impl ExclusionRule {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            conditions: Vec::new(),
        }
    }

    /// Add a `column == value` condition to the rule.
    pub fn matching(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(FieldMatch::new(column, value));
        self
    }

    /// Convenience constructor for the common make/model pattern.
    pub fn make_model(make: &str, model: &str) -> Self {
        Self::new(format!("{} {} is not a real make/model pair", make, model))
            .matching(columns::MAKE, make)
            .matching(columns::MODEL, model)
    }
}

/// The exclusion list used when none is configured.
pub fn default_exclusion_rules() -> Vec<ExclusionRule> {
    vec![ExclusionRule::make_model("Nissan", "Accord")]
}

/// Configuration for the normalization pipeline.
///
/// Use [`NormalizerConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use lease_processing::config::{NormalizerConfig, ZeroPaymentPolicy};
///
/// let config = NormalizerConfig::builder()
///     .new_mileage_threshold(50.0)
///     .zero_payment_policy(ZeroPaymentPolicy::DropRow)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Cars with no recorded condition and at most this mileage are new.
    /// Default: 30
    pub new_mileage_threshold: f64,

    /// Policy when both condition and mileage are absent.
    /// Default: AssumeUsed
    pub missing_mileage_policy: MissingMileagePolicy,

    /// Policy for a zero weekly payment.
    /// Default: Null
    pub zero_payment_policy: ZeroPaymentPolicy,

    /// Known-bad record patterns removed from the table.
    /// Default: Nissan Accord
    pub exclusion_rules: Vec<ExclusionRule>,

    /// Output directory for the cleaned table and report.
    /// Default: "output"
    pub output_dir: PathBuf,

    /// Output file name for the cleaned table (without extension).
    /// Default: "cleaned_leases"
    pub output_name: String,

    /// Whether to compute the fleet report after cleaning.
    /// Default: true
    pub generate_report: bool,

    /// Whether to write the cleaned table (and report) to disk.
    /// Default: true
    pub save_to_disk: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            new_mileage_threshold: DEFAULT_NEW_MILEAGE_THRESHOLD,
            missing_mileage_policy: MissingMileagePolicy::default(),
            zero_payment_policy: ZeroPaymentPolicy::default(),
            exclusion_rules: default_exclusion_rules(),
            output_dir: PathBuf::from("output"),
            output_name: "cleaned_leases".to_string(),
            generate_report: true,
            save_to_disk: true,
        }
    }
}

impl NormalizerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> NormalizerConfigBuilder {
        NormalizerConfigBuilder::default()
    }

    /// Load a configuration from a JSON file and validate it.
    ///
    /// Fields missing from the file take their default values.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: PartialConfig = serde_json::from_str(&content)?;
        let config = config.into_config();
        config
            .validate()
            .map_err(|e| crate::error::NormalizeError::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.new_mileage_threshold.is_finite() || self.new_mileage_threshold < 0.0 {
            return Err(ConfigValidationError::InvalidMileageThreshold(
                self.new_mileage_threshold,
            ));
        }

        for (index, rule) in self.exclusion_rules.iter().enumerate() {
            if rule.conditions.is_empty() {
                return Err(ConfigValidationError::EmptyExclusionRule { index });
            }
            if rule.conditions.iter().any(|c| c.column.trim().is_empty()) {
                return Err(ConfigValidationError::BlankExclusionColumn { index });
            }
        }

        if self.output_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyOutputName);
        }

        Ok(())
    }
}

/// On-disk configuration where every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialConfig {
    new_mileage_threshold: Option<f64>,
    missing_mileage_policy: Option<MissingMileagePolicy>,
    zero_payment_policy: Option<ZeroPaymentPolicy>,
    exclusion_rules: Option<Vec<ExclusionRule>>,
    output_dir: Option<PathBuf>,
    output_name: Option<String>,
    generate_report: Option<bool>,
    save_to_disk: Option<bool>,
}

impl PartialConfig {
    fn into_config(self) -> NormalizerConfig {
        let defaults = NormalizerConfig::default();
        NormalizerConfig {
            new_mileage_threshold: self
                .new_mileage_threshold
                .unwrap_or(defaults.new_mileage_threshold),
            missing_mileage_policy: self
                .missing_mileage_policy
                .unwrap_or(defaults.missing_mileage_policy),
            zero_payment_policy: self
                .zero_payment_policy
                .unwrap_or(defaults.zero_payment_policy),
            exclusion_rules: self.exclusion_rules.unwrap_or(defaults.exclusion_rules),
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
            output_name: self.output_name.unwrap_or(defaults.output_name),
            generate_report: self.generate_report.unwrap_or(defaults.generate_report),
            save_to_disk: self.save_to_disk.unwrap_or(defaults.save_to_disk),
        }
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid new-car mileage threshold: {0} (must be a finite value >= 0)")]
    InvalidMileageThreshold(f64),

    #[error("Exclusion rule #{index} has no conditions")]
    EmptyExclusionRule { index: usize },

    #[error("Exclusion rule #{index} has a condition with a blank column name")]
    BlankExclusionColumn { index: usize },

    #[error("Output name must not be empty")]
    EmptyOutputName,
}

/// Builder for [`NormalizerConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct NormalizerConfigBuilder {
    new_mileage_threshold: Option<f64>,
    missing_mileage_policy: Option<MissingMileagePolicy>,
    zero_payment_policy: Option<ZeroPaymentPolicy>,
    exclusion_rules: Option<Vec<ExclusionRule>>,
    output_dir: Option<PathBuf>,
    output_name: Option<String>,
    generate_report: Option<bool>,
    save_to_disk: Option<bool>,
}

impl NormalizerConfigBuilder {
    /// Set the mileage at or below which a car with no condition is new.
    pub fn new_mileage_threshold(mut self, threshold: f64) -> Self {
        self.new_mileage_threshold = Some(threshold);
        self
    }

    /// Set the policy for records missing both condition and mileage.
    pub fn missing_mileage_policy(mut self, policy: MissingMileagePolicy) -> Self {
        self.missing_mileage_policy = Some(policy);
        self
    }

    /// Set the policy for zero weekly payments.
    pub fn zero_payment_policy(mut self, policy: ZeroPaymentPolicy) -> Self {
        self.zero_payment_policy = Some(policy);
        self
    }

    /// Replace the exclusion list.
    pub fn exclusion_rules(mut self, rules: Vec<ExclusionRule>) -> Self {
        self.exclusion_rules = Some(rules);
        self
    }

    /// Append one rule to the exclusion list (starting from the defaults).
    pub fn exclude(mut self, rule: ExclusionRule) -> Self {
        self.exclusion_rules
            .get_or_insert_with(default_exclusion_rules)
            .push(rule);
        self
    }

    /// Set the output directory for the cleaned table and report.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Set the output file name (without extension).
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    /// Enable or disable the fleet report.
    pub fn generate_report(mut self, generate: bool) -> Self {
        self.generate_report = Some(generate);
        self
    }

    /// Enable or disable writing outputs to disk.
    pub fn save_to_disk(mut self, save: bool) -> Self {
        self.save_to_disk = Some(save);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `NormalizerConfig` or an error if validation fails.
    pub fn build(self) -> Result<NormalizerConfig, ConfigValidationError> {
        let config = NormalizerConfig {
            new_mileage_threshold: self
                .new_mileage_threshold
                .unwrap_or(DEFAULT_NEW_MILEAGE_THRESHOLD),
            missing_mileage_policy: self.missing_mileage_policy.unwrap_or_default(),
            zero_payment_policy: self.zero_payment_policy.unwrap_or_default(),
            exclusion_rules: self
                .exclusion_rules
                .unwrap_or_else(default_exclusion_rules),
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("output")),
            output_name: self
                .output_name
                .unwrap_or_else(|| "cleaned_leases".to_string()),
            generate_report: self.generate_report.unwrap_or(true),
            save_to_disk: self.save_to_disk.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}
