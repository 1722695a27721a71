//! Progress reporting for the normalization pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use lease_processing::Normalizer;
//!
//! let output = Normalizer::builder()
//!     .on_progress(|update| {
//!         println!("[{:?}] {}", update.stage, update.message);
//!     })
//!     .build()?
//!     .normalize(df)?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of the normalization pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationStage {
    /// Validating input and sanitizing raw text
    Initializing,
    /// Filling missing car conditions from mileage
    ConditionFill,
    /// Refilling state and city from zip codes
    GeographyFill,
    /// Deriving the payback period
    PaybackPeriod,
    /// Removing known-bad records
    Exclusion,
    /// Building the fleet report and writing output files
    Reporting,
    /// Pipeline completed successfully
    Complete,
    /// Pipeline failed with an error
    Failed,
}

impl NormalizationStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::ConditionFill => "Filling Conditions",
            Self::GeographyFill => "Filling Geography",
            Self::PaybackPeriod => "Computing Payback Period",
            Self::Exclusion => "Removing Known-Bad Records",
            Self::Reporting => "Reporting",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Returns the typical weight of this stage in the overall pipeline (0.0 - 1.0).
    ///
    /// The working stages sum to 1.0; terminal states weigh nothing.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.05,
            Self::ConditionFill => 0.15,
            Self::GeographyFill => 0.35,
            Self::PaybackPeriod => 0.10,
            Self::Exclusion => 0.10,
            Self::Reporting => 0.25,
            Self::Complete => 0.0,
            Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::ConditionFill => 0.05,
            Self::GeographyFill => 0.20,
            Self::PaybackPeriod => 0.55,
            Self::Exclusion => 0.65,
            Self::Reporting => 0.75,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// Progress update emitted by the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current pipeline stage
    pub stage: NormalizationStage,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    /// Human-readable message describing current activity
    pub message: String,

    /// Rows handled so far in the current stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    /// Rows the current stage works on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    pub fn new(stage: NormalizationStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a progress update with row counts.
    pub fn with_items(
        stage: NormalizationStage,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::new(stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            stage: NormalizationStage::Complete,
            progress: 1.0,
            stage_progress: 1.0,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: NormalizationStage::Failed,
            progress: 0.0,
            stage_progress: 0.0,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }
}

/// Trait for receiving progress updates during normalization.
///
/// Implementations must be `Send + Sync` so the normalizer can run on a
/// worker thread while the reporter lives elsewhere.
pub trait ProgressReporter: Send + Sync {
    /// Called at the start and end of every stage. Should not block.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WORKING_STAGES: [NormalizationStage; 6] = [
        NormalizationStage::Initializing,
        NormalizationStage::ConditionFill,
        NormalizationStage::GeographyFill,
        NormalizationStage::PaybackPeriod,
        NormalizationStage::Exclusion,
        NormalizationStage::Reporting,
    ];

    #[test]
    fn test_stage_weights_sum() {
        let total_weight: f32 = WORKING_STAGES.iter().map(|s| s.weight()).sum();
        assert!((total_weight - 1.0).abs() < 0.01, "Weights should sum to ~1.0");
    }

    #[test]
    fn test_base_progress_is_cumulative() {
        let mut expected = 0.0f32;
        for stage in WORKING_STAGES {
            assert!(
                (stage.base_progress() - expected).abs() < 1e-4,
                "{:?} should start at {}",
                stage,
                expected
            );
            expected += stage.weight();
        }
    }

    #[test]
    fn test_progress_update_new() {
        let update = ProgressUpdate::new(NormalizationStage::GeographyFill, 0.5, "Looking up zips");
        assert_eq!(update.stage, NormalizationStage::GeographyFill);
        assert_eq!(update.stage_progress, 0.5);
        assert!((update.progress - 0.375).abs() < 1e-6);
        assert!(update.items_total.is_none());
    }

    #[test]
    fn test_progress_update_with_items() {
        let update = ProgressUpdate::with_items(NormalizationStage::Exclusion, 3, 12, "Excluded 3 rows");
        assert_eq!(update.stage_progress, 0.25);
        assert_eq!(update.items_processed, Some(3));
        assert_eq!(update.items_total, Some(12));
    }

    #[test]
    fn test_progress_update_terminal_states() {
        assert_eq!(ProgressUpdate::complete("Done").progress, 1.0);
        let failed = ProgressUpdate::failed("boom");
        assert_eq!(failed.stage, NormalizationStage::Failed);
        assert_eq!(failed.progress, 0.0);
    }

    #[test]
    fn test_stage_json_values() {
        let json = serde_json::to_string(&NormalizationStage::PaybackPeriod).unwrap();
        assert_eq!(json, "\"payback_period\"");
        let json = serde_json::to_string(&NormalizationStage::GeographyFill).unwrap();
        assert_eq!(json, "\"geography_fill\"");
    }

    #[test]
    fn test_progress_reporter_across_threads() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let reporter = Arc::new(ClosureProgressReporter::new(move |_update| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let reporter_clone = reporter.clone();
        let handle = std::thread::spawn(move || {
            reporter_clone.report(ProgressUpdate::new(
                NormalizationStage::ConditionFill,
                0.5,
                "Test from background thread",
            ));
        });

        handle.join().expect("Thread should not panic");
        reporter.report(ProgressUpdate::complete("Done"));
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }
}
