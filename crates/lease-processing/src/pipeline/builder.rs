//! Main normalization pipeline module.
//!
//! This module provides the core `Normalizer` struct and builder for
//! orchestrating the lease normalization workflow.

use crate::cleaner::{ExclusionOutcome, RecordCleaner, sanitize_text_columns};
use crate::config::{ConfigValidationError, NormalizerConfig};
use crate::derived::{PaybackCalculator, PaybackOutcome};
use crate::error::{NormalizeError, Result, ResultExt};
use crate::geo::ZipLookup;
use crate::imputers::{ConditionFillOutcome, ConditionImputer, GeographyFillOutcome, GeographyImputer};
use crate::pipeline::progress::{
    ClosureProgressReporter, NormalizationStage, ProgressReporter, ProgressUpdate,
};
use crate::reporting::{FleetReport, ReportGenerator};
use crate::types::{
    ActionType, NormalizationAction, NormalizationResult, NormalizationSummary, columns,
};
use crate::utils::completeness_score;
use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Everything one normalization run produces.
#[derive(Debug, Clone)]
pub struct NormalizationOutput {
    /// The cleaned table.
    pub data: DataFrame,
    pub result: NormalizationResult,
    /// Fleet aggregates, when report generation is enabled.
    pub fleet: Option<FleetReport>,
}

/// The lease record normalizer.
///
/// Use [`Normalizer::builder()`] to create a new normalizer with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use lease_processing::{Normalizer, NormalizerConfig, ZipReferenceTable};
/// use std::sync::Arc;
///
/// let zips = Arc::new(ZipReferenceTable::from_csv("zips.csv")?);
///
/// let output = Normalizer::builder()
///     .zip_lookup(zips)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .config(NormalizerConfig::default())
///     .build()?
///     .normalize(dataframe)?;
/// ```
pub struct Normalizer {
    config: NormalizerConfig,
    zip_lookup: Option<Arc<dyn ZipLookup>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    condition_imputer: ConditionImputer,
    payback: PaybackCalculator,
    cleaner: RecordCleaner,
    reporter: ReportGenerator,
}

// Ensure Normalizer is Send (can be moved to a worker thread)
static_assertions::assert_impl_all!(Normalizer: Send);

impl Normalizer {
    /// Create a new normalizer builder.
    pub fn builder() -> NormalizerBuilder {
        NormalizerBuilder::default()
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Fill absent conditions from mileage.
    pub fn fill_missing_condition(&self, df: DataFrame) -> Result<(DataFrame, ConditionFillOutcome)> {
        self.condition_imputer.apply(df)
    }

    /// Overwrite state and city for rows whose zip resolves.
    ///
    /// Without a configured zip lookup the frame is returned unchanged.
    pub fn fill_geography_from_zip(&self, df: DataFrame) -> Result<(DataFrame, GeographyFillOutcome)> {
        match &self.zip_lookup {
            Some(lookup) => GeographyImputer::new(lookup.as_ref()).apply(df),
            None => Ok((df, GeographyFillOutcome::default())),
        }
    }

    /// Add the `Payback_Period` column.
    pub fn compute_payback_period(&self, df: DataFrame) -> Result<(DataFrame, PaybackOutcome)> {
        self.payback.apply(df)
    }

    /// Drop records matching the configured exclusion rules.
    pub fn remove_known_bad_records(&self, df: DataFrame) -> Result<(DataFrame, ExclusionOutcome)> {
        self.cleaner.apply(df)
    }

    /// Run every stage over a raw lease table.
    ///
    /// Stages run in order: condition fill, geography fill, payback period,
    /// exclusion. The cleaned CSV is written when `save_to_disk` is set.
    pub fn normalize(&self, df: DataFrame) -> Result<NormalizationOutput> {
        match self.normalize_internal(df) {
            Ok(output) => {
                self.report_progress(ProgressUpdate::complete("Normalization completed successfully"));
                Ok(output)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Normalization error: {}", e);
                Err(e)
            }
        }
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn normalize_internal(&self, df: DataFrame) -> Result<NormalizationOutput> {
        let start_time = Instant::now();

        info!("Starting lease normalization...");
        self.report_progress(ProgressUpdate::new(
            NormalizationStage::Initializing,
            0.0,
            "Starting lease normalization...",
        ));

        let mut summary = NormalizationSummary::new();
        summary.rows_before = df.height();
        summary.completeness_before = completeness_score(&df);

        let mut processing_steps: Vec<String> = Vec::new();

        let (df, cells_cleaned) =
            sanitize_text_columns(df).map_err(|e| NormalizeError::CleaningFailed(e.to_string()))?;
        if cells_cleaned > 0 {
            summary.add_action(NormalizationAction::new(
                ActionType::ValueCleaned,
                "dataset",
                format!("Trimmed or nulled {} raw text cells", cells_cleaned),
            ));
            processing_steps.push(format!("Sanitized {} text cells", cells_cleaned));
        }

        self.report_progress(ProgressUpdate::new(
            NormalizationStage::Initializing,
            1.0,
            format!("Loaded {} records", summary.rows_before),
        ));

        // Step 1: Condition fill
        self.report_progress(ProgressUpdate::new(
            NormalizationStage::ConditionFill,
            0.0,
            "Filling missing conditions...",
        ));
        info!("Step 1: Filling missing conditions from mileage...");

        let (df, filled) = self.fill_missing_condition(df)?;
        summary.conditions_filled_new = filled.filled_new;
        summary.conditions_filled_used = filled.filled_used;
        summary.conditions_left_absent = filled.left_absent;

        if filled.total_filled() > 0 {
            summary.add_action(
                NormalizationAction::new(
                    ActionType::ValueImputed,
                    columns::CONDITION,
                    format!("Filled {} missing conditions from mileage", filled.total_filled()),
                )
                .with_details(format!(
                    "{} New (mileage <= {}), {} Used",
                    filled.filled_new, self.config.new_mileage_threshold, filled.filled_used
                )),
            );
        }
        if filled.left_absent > 0 {
            summary.add_warning(format!(
                "{} records have neither a condition nor a mileage; condition left empty",
                filled.left_absent
            ));
        }
        processing_steps.push(format!(
            "Filled {} conditions ({} New, {} Used)",
            filled.total_filled(),
            filled.filled_new,
            filled.filled_used
        ));

        self.report_progress(ProgressUpdate::with_items(
            NormalizationStage::ConditionFill,
            df.height(),
            df.height(),
            format!("Filled {} conditions", filled.total_filled()),
        ));

        // Step 2: Geography fill
        self.report_progress(ProgressUpdate::new(
            NormalizationStage::GeographyFill,
            0.0,
            "Refilling geography from zip codes...",
        ));

        let df = match &self.zip_lookup {
            Some(lookup) => {
                info!("Step 2: Refilling geography using '{}'...", lookup.name());
                let (df, geo) = self.fill_geography_from_zip(df)?;
                summary.geography_resolved = geo.resolved;
                summary.geography_not_found = geo.not_found;
                summary.geography_lookup_errors = geo.errors;

                if geo.resolved > 0 {
                    summary.add_action(NormalizationAction::new(
                        ActionType::ValueEnriched,
                        format!("{}, {}", columns::STATE, columns::CITY_ID_NAME),
                        format!("Replaced geography for {} records from zip codes", geo.resolved),
                    ));
                }
                if geo.errors > 0 {
                    summary.add_warning(format!(
                        "{} zip lookups failed; those records keep their original geography",
                        geo.errors
                    ));
                }
                processing_steps.push(format!(
                    "Resolved {} of {} zip codes ({} not found, {} errors)",
                    geo.resolved, geo.looked_up, geo.not_found, geo.errors
                ));
                df
            }
            None => {
                info!("Step 2: Skipping geography fill (no zip lookup configured)");
                processing_steps.push("Skipped geography fill (no zip lookup)".to_string());
                df
            }
        };

        self.report_progress(ProgressUpdate::new(
            NormalizationStage::GeographyFill,
            1.0,
            "Geography fill complete",
        ));

        // Step 3: Payback period
        self.report_progress(ProgressUpdate::new(
            NormalizationStage::PaybackPeriod,
            0.0,
            "Computing payback period...",
        ));
        info!("Step 3: Computing payback period...");

        let (df, payback) = self.compute_payback_period(df)?;
        summary.paybacks_computed = payback.computed;
        summary.paybacks_undefined = payback.undefined;
        summary.zero_payment_rows_dropped = payback.dropped;

        summary.add_action(NormalizationAction::new(
            ActionType::ColumnDerived,
            columns::PAYBACK_PERIOD,
            format!(
                "Derived payback period for {} records ({} undefined)",
                payback.computed, payback.undefined
            ),
        ));
        if payback.dropped > 0 {
            summary.add_action(NormalizationAction::new(
                ActionType::RowsRemoved,
                columns::WEEKLY_PAYMENT,
                format!("Removed {} records with a zero weekly payment", payback.dropped),
            ));
        } else if payback.zero_payments > 0 {
            summary.add_warning(format!(
                "{} records have a zero weekly payment; payback period left empty",
                payback.zero_payments
            ));
        }
        processing_steps.push(format!(
            "Computed {} payback periods ({} undefined)",
            payback.computed, payback.undefined
        ));

        self.report_progress(ProgressUpdate::new(
            NormalizationStage::PaybackPeriod,
            1.0,
            "Payback period complete",
        ));

        // Step 4: Exclusion
        self.report_progress(ProgressUpdate::new(
            NormalizationStage::Exclusion,
            0.0,
            "Removing known-bad records...",
        ));
        info!("Step 4: Removing known-bad records...");

        let rows_before_exclusion = df.height();
        let (mut df, excluded) = self.remove_known_bad_records(df)?;
        summary.rows_excluded = excluded.rows_removed;

        for hits in excluded.by_rule.iter().filter(|h| h.rows > 0) {
            summary.add_action(
                NormalizationAction::new(
                    ActionType::RowsRemoved,
                    "dataset",
                    format!("Removed {} known-bad records", hits.rows),
                )
                .with_details(hits.reason.clone()),
            );
        }
        summary.exclusions = excluded.by_rule;
        processing_steps.push(format!("Excluded {} known-bad records", excluded.rows_removed));

        self.report_progress(ProgressUpdate::with_items(
            NormalizationStage::Exclusion,
            rows_before_exclusion,
            rows_before_exclusion,
            format!("Excluded {} records", excluded.rows_removed),
        ));

        // Step 5: Reporting
        self.report_progress(ProgressUpdate::new(
            NormalizationStage::Reporting,
            0.0,
            "Building reports...",
        ));

        let fleet = if self.config.generate_report {
            info!("Step 5: Computing fleet report...");
            Some(FleetReport::from_frame(&df).context("Failed to build fleet report")?)
        } else {
            None
        };

        let output_file = if self.config.save_to_disk {
            let path = self
                .reporter
                .write_cleaned_csv(&mut df)
                .map_err(|e| NormalizeError::ReportGenerationFailed(e.to_string()))?;
            Some(path.display().to_string())
        } else {
            None
        };

        self.report_progress(ProgressUpdate::new(
            NormalizationStage::Reporting,
            1.0,
            "Reports complete",
        ));

        // Finalize summary
        summary.duration_ms = start_time.elapsed().as_millis() as u64;
        summary.rows_after = df.height();
        summary.completeness_after = completeness_score(&df);

        if summary.rows_removed_percentage() > 30.0 {
            let message = format!(
                "High data loss: {:.1}% of rows were removed",
                summary.rows_removed_percentage()
            );
            warn!("{}", message);
            summary.add_warning(message);
        }

        info!(
            "Normalization finished: {} -> {} rows in {} ms",
            summary.rows_before, summary.rows_after, summary.duration_ms
        );

        Ok(NormalizationOutput {
            data: df,
            result: NormalizationResult {
                success: true,
                output_file,
                processing_steps,
                summary,
            },
            fleet,
        })
    }
}

/// Builder for creating a [`Normalizer`] with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// let normalizer = Normalizer::builder()
///     .config(NormalizerConfig::default())
///     .zip_lookup(Arc::new(table))
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?;
/// ```
#[derive(Default)]
pub struct NormalizerBuilder {
    config: Option<NormalizerConfig>,
    zip_lookup: Option<Arc<dyn ZipLookup>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(NormalizerBuilder: Send);

impl NormalizerBuilder {
    /// Set the normalizer configuration.
    pub fn config(mut self, config: NormalizerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the zip lookup used to refill geography.
    ///
    /// Use `Arc` so one reference table can be shared across normalizers.
    /// Without a lookup the geography stage is skipped.
    pub fn zip_lookup(mut self, lookup: Arc<dyn ZipLookup>) -> Self {
        self.zip_lookup = Some(lookup);
        self
    }

    /// Set a progress reporter for receiving updates during processing.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// This is a convenience method for simple progress handling.
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the normalizer.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Normalizer, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let reporter = ReportGenerator::new(config.output_dir.clone(), config.output_name.clone());

        Ok(Normalizer {
            condition_imputer: ConditionImputer::from_config(&config),
            payback: PaybackCalculator::new(config.zero_payment_policy),
            cleaner: RecordCleaner::new(config.exclusion_rules.clone()),
            reporter,
            zip_lookup: self.zip_lookup,
            progress_reporter: self.progress_reporter,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZeroPaymentPolicy;
    use crate::geo::{GeoLocation, ZipReferenceTable};
    use crate::utils::{f64_values, string_values};
    use parking_lot::Mutex;

    fn in_memory() -> NormalizerConfig {
        NormalizerConfig::builder()
            .save_to_disk(false)
            .build()
            .unwrap()
    }

    fn raw() -> DataFrame {
        df![
            "Weekly Payment" => [150.0, 200.0, 0.0],
            "New/Used" => [None, Some("New"), Some("Used")],
            "Make" => ["Toyota", "Nissan", "Honda"],
            "Model" => ["Corolla", "Accord", "Civic"],
            "Invoiced Amount" => [15000.0, 20000.0, 9000.0],
            "State" => [None, Some("TX"), Some(" NV ")],
            "Mileage @ Inception" => [Some(450i64), Some(5), None],
            "ZIP" => [Some("90001"), None, Some("N/A")],
        ]
        .unwrap()
    }

    #[test]
    fn test_builder_default() {
        let normalizer = Normalizer::builder().build().unwrap();
        assert!(normalizer.zip_lookup.is_none());
        assert_eq!(normalizer.config().new_mileage_threshold, 30.0);
        assert_eq!(normalizer.cleaner.rules().len(), 1);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = NormalizerConfig {
            new_mileage_threshold: -1.0,
            ..NormalizerConfig::default()
        };
        assert!(Normalizer::builder().config(config).build().is_err());
    }

    #[test]
    fn test_normalize_runs_all_stages() {
        let table: ZipReferenceTable = [("90001", GeoLocation::new("CA", "Los Angeles"))]
            .into_iter()
            .collect();

        let output = Normalizer::builder()
            .config(in_memory())
            .zip_lookup(Arc::new(table))
            .build()
            .unwrap()
            .normalize(raw())
            .unwrap();

        let df = &output.data;
        assert_eq!(df.height(), 2);
        assert_eq!(
            string_values(df, "New/Used").unwrap(),
            vec![Some("Used".to_string()), Some("Used".to_string())]
        );
        assert_eq!(
            string_values(df, "State").unwrap(),
            vec![Some("CA".to_string()), Some("NV".to_string())]
        );
        assert_eq!(f64_values(df, "Payback_Period").unwrap(), vec![Some(100.0), None]);

        let summary = &output.result.summary;
        assert_eq!(summary.rows_before, 3);
        assert_eq!(summary.rows_after, 2);
        assert_eq!(summary.conditions_filled_used, 1);
        assert_eq!(summary.geography_resolved, 1);
        assert_eq!(summary.paybacks_undefined, 1);
        assert_eq!(summary.rows_excluded, 1);
        assert_eq!(summary.exclusions[0].rows, 1);
        assert!(summary.warnings.iter().any(|w| w.contains("zero weekly payment")));
        assert!(summary.warnings.iter().any(|w| w.contains("High data loss")));
        assert!(output.result.output_file.is_none());
        assert!(output.fleet.is_some());
    }

    #[test]
    fn test_normalize_without_zip_lookup_keeps_geography() {
        let output = Normalizer::builder()
            .config(in_memory())
            .build()
            .unwrap()
            .normalize(raw())
            .unwrap();

        assert_eq!(string_values(&output.data, "State").unwrap()[0], None);
        assert_eq!(output.result.summary.geography_resolved, 0);
    }

    #[test]
    fn test_progress_stages_in_order() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = stages.clone();

        Normalizer::builder()
            .config(in_memory())
            .on_progress(move |update| seen.lock().push(update.stage))
            .build()
            .unwrap()
            .normalize(raw())
            .unwrap();

        let mut stages = stages.lock().clone();
        stages.dedup();
        assert_eq!(
            stages,
            vec![
                NormalizationStage::Initializing,
                NormalizationStage::ConditionFill,
                NormalizationStage::GeographyFill,
                NormalizationStage::PaybackPeriod,
                NormalizationStage::Exclusion,
                NormalizationStage::Reporting,
                NormalizationStage::Complete,
            ]
        );
    }

    #[test]
    fn test_exclusion_stage_reports_completion() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let seen = updates.clone();

        Normalizer::builder()
            .config(in_memory())
            .on_progress(move |update| seen.lock().push(update))
            .build()
            .unwrap()
            .normalize(raw())
            .unwrap();

        let updates = updates.lock();
        let last = updates
            .iter()
            .rev()
            .find(|u| u.stage == NormalizationStage::Exclusion)
            .unwrap();
        assert_eq!(last.stage_progress, 1.0);
        assert_eq!(last.items_processed, Some(3));
        assert_eq!(last.items_total, Some(3));
        assert!((last.progress - NormalizationStage::Reporting.base_progress()).abs() < 1e-6);
    }

    #[test]
    fn test_zero_payment_fail_reports_failure() {
        let config = NormalizerConfig::builder()
            .save_to_disk(false)
            .zero_payment_policy(ZeroPaymentPolicy::Fail)
            .build()
            .unwrap();
        let last = Arc::new(Mutex::new(None));
        let seen = last.clone();

        let err = Normalizer::builder()
            .config(config)
            .on_progress(move |update| *seen.lock() = Some(update.stage))
            .build()
            .unwrap()
            .normalize(raw())
            .unwrap_err();

        assert!(matches!(err, NormalizeError::DivisionByZero { row: 2 }));
        assert_eq!(*last.lock(), Some(NormalizationStage::Failed));
    }

    #[test]
    fn test_missing_condition_column_fails() {
        let df = df!["Weekly Payment" => [1.0], "Invoiced Amount" => [2.0]].unwrap();
        let err = Normalizer::builder()
            .config(in_memory())
            .build()
            .unwrap()
            .normalize(df)
            .unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }
}
