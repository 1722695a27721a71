//! Integration tests for the lease normalization pipeline.
//!
//! These tests run the normalizer end to end over the sample lease export.

use lease_processing::{
    ExclusionRule, GeoLocation, LeaseRecord, MissingMileagePolicy, NormalizationStage,
    NormalizeError, Normalizer, NormalizerConfig, ReportGenerator, ZeroPaymentPolicy, ZipLookup,
    ZipLookupResult, ZipReferenceTable,
};
use parking_lot::Mutex;
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_csv(filename: &str) -> DataFrame {
    let path = fixtures_path().join(filename);
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .expect("Failed to create CSV reader")
        .finish()
        .expect("Failed to read CSV file")
}

fn zip_reference() -> Arc<ZipReferenceTable> {
    Arc::new(
        ZipReferenceTable::from_csv(fixtures_path().join("zip_reference.csv"))
            .expect("Failed to load zip reference"),
    )
}

fn in_memory_config() -> NormalizerConfig {
    NormalizerConfig::builder()
        .save_to_disk(false)
        .build()
        .unwrap()
}

fn normalizer(config: NormalizerConfig) -> Normalizer {
    Normalizer::builder()
        .config(config)
        .zip_lookup(zip_reference())
        .build()
        .unwrap()
}

fn records(df: &DataFrame) -> Vec<LeaseRecord> {
    LeaseRecord::from_frame(df).expect("Failed to read records")
}

fn find<'a>(records: &'a [LeaseRecord], make: &str, model: &str) -> Option<&'a LeaseRecord> {
    records
        .iter()
        .find(|r| r.make.as_deref() == Some(make) && r.model.as_deref() == Some(model))
}

struct BrokenLookup;

impl ZipLookup for BrokenLookup {
    fn lookup(&self, _zip: &str) -> ZipLookupResult {
        ZipLookupResult::Error("reference service unavailable".to_string())
    }

    fn name(&self) -> &str {
        "broken"
    }
}

// ============================================================================
// Full Pipeline Tests
// ============================================================================

#[test]
fn test_full_pipeline_sample_export() {
    let df = load_csv("leases_sample.csv");
    assert_eq!(df.height(), 7);

    let output = normalizer(in_memory_config()).normalize(df).unwrap();
    let summary = &output.result.summary;

    assert!(output.result.success);
    assert_eq!(summary.rows_before, 7);
    assert_eq!(summary.rows_after, 6);
    assert_eq!(summary.conditions_filled_new, 1);
    assert_eq!(summary.conditions_filled_used, 2);
    assert_eq!(summary.geography_resolved, 5);
    assert_eq!(summary.geography_not_found, 1);
    assert_eq!(summary.paybacks_computed, 6);
    assert_eq!(summary.paybacks_undefined, 1);
    assert_eq!(summary.rows_excluded, 1);
    assert!(output.result.output_file.is_none());
    assert!(output.data.column("Payback_Period").is_ok());
}

#[test]
fn test_nissan_accord_is_removed() {
    let df = load_csv("leases_sample.csv");
    let output = normalizer(in_memory_config()).normalize(df).unwrap();
    let rows = records(&output.data);

    assert!(find(&rows, "Nissan", "Accord").is_none());
    assert!(find(&rows, "Nissan", "Altima").is_some());
    assert_eq!(output.result.summary.exclusions[0].rows, 1);
}

#[test]
fn test_excluded_record_is_removed_after_condition_fill() {
    let df = df![
        "New/Used" => [Option::<&str>::None, None],
        "Make" => ["Nissan", "Toyota"],
        "Model" => ["Accord", "Corolla"],
        "Mileage @ Inception" => [15i64, 50],
        "Invoiced Amount" => [20000.0, 15000.0],
        "Weekly Payment" => [200.0, 150.0],
        "State" => [Option::<&str>::None, None],
        "City ID Name" => [Option::<&str>::None, None],
        "ZIP" => [None, Some("90001")],
    ]
    .unwrap();

    let lookup: ZipReferenceTable = [("90001", GeoLocation::new("CA", "Los Angeles"))]
        .into_iter()
        .collect();
    let output = Normalizer::builder()
        .config(in_memory_config())
        .zip_lookup(Arc::new(lookup))
        .build()
        .unwrap()
        .normalize(df)
        .unwrap();
    let summary = &output.result.summary;
    let rows = records(&output.data);

    assert_eq!(summary.rows_after, 1);
    assert_eq!(summary.rows_excluded, 1);
    // The Accord was filled as New before it was removed
    assert_eq!(summary.conditions_filled_new, 1);
    assert_eq!(summary.conditions_filled_used, 1);
    assert!(find(&rows, "Nissan", "Accord").is_none());

    let corolla = find(&rows, "Toyota", "Corolla").unwrap();
    assert_eq!(corolla.condition.as_deref(), Some("Used"));
    assert_eq!(corolla.state.as_deref(), Some("CA"));
    assert_eq!(corolla.city_id_name.as_deref(), Some("Los Angeles"));
    assert_eq!(corolla.payback_period, Some(100.0));
}

#[test]
fn test_corolla_is_filled_and_priced() {
    let df = load_csv("leases_sample.csv");
    let output = normalizer(in_memory_config()).normalize(df).unwrap();
    let rows = records(&output.data);

    let corolla = find(&rows, "Toyota", "Corolla").expect("Corolla should survive");
    assert_eq!(corolla.condition.as_deref(), Some("Used"));
    assert_eq!(corolla.state.as_deref(), Some("CA"));
    assert_eq!(corolla.city_id_name.as_deref(), Some("Los Angeles"));
    assert_eq!(corolla.payback_period, Some(100.0));
}

#[test]
fn test_leading_zero_zip_resolves() {
    let df = load_csv("leases_sample.csv");
    let output = normalizer(in_memory_config()).normalize(df).unwrap();
    let rows = records(&output.data);

    let focus = find(&rows, "Ford", "Focus").unwrap();
    assert_eq!(focus.condition.as_deref(), Some("New"));
    assert_eq!(focus.state.as_deref(), Some("MA"));
    assert_eq!(focus.city_id_name.as_deref(), Some("Boston"));
}

#[test]
fn test_unresolved_geography_is_kept() {
    let df = load_csv("leases_sample.csv");
    let output = normalizer(in_memory_config()).normalize(df).unwrap();
    let rows = records(&output.data);

    // No zip at all
    let camry = find(&rows, "Toyota", "Camry").unwrap();
    assert_eq!(camry.state.as_deref(), Some("FL"));
    assert_eq!(camry.city_id_name.as_deref(), Some("Miami FL"));

    // Zip missing from the reference
    let altima = find(&rows, "Nissan", "Altima").unwrap();
    assert_eq!(altima.state.as_deref(), Some("WA"));
    assert_eq!(altima.city_id_name.as_deref(), Some("Seattle WA"));
}

#[test]
fn test_lookup_errors_leave_rows_untouched() {
    let df = load_csv("leases_sample.csv");
    let output = Normalizer::builder()
        .config(in_memory_config())
        .zip_lookup(Arc::new(BrokenLookup))
        .build()
        .unwrap()
        .normalize(df)
        .unwrap();
    let rows = records(&output.data);

    assert_eq!(output.result.summary.geography_lookup_errors, 6);
    assert_eq!(output.result.summary.geography_resolved, 0);
    assert!(!output.result.summary.warnings.is_empty());

    let corolla = find(&rows, "Toyota", "Corolla").unwrap();
    assert_eq!(corolla.state.as_deref(), Some("TX"));
    assert_eq!(corolla.city_id_name.as_deref(), Some("Houston TX"));
}

#[test]
fn test_without_zip_lookup_geography_is_unchanged() {
    let df = load_csv("leases_sample.csv");
    let output = Normalizer::builder()
        .config(in_memory_config())
        .build()
        .unwrap()
        .normalize(df)
        .unwrap();
    let rows = records(&output.data);

    let corolla = find(&rows, "Toyota", "Corolla").unwrap();
    assert_eq!(corolla.state.as_deref(), Some("TX"));
    assert_eq!(corolla.condition.as_deref(), Some("Used"));
    assert_eq!(output.result.summary.geography_resolved, 0);
}

#[test]
fn test_normalize_is_idempotent() {
    let pipeline = normalizer(in_memory_config());
    let once = pipeline.normalize(load_csv("leases_sample.csv")).unwrap();
    let twice = pipeline.normalize(once.data.clone()).unwrap();

    assert!(once.data.equals_missing(&twice.data));
    assert_eq!(twice.result.summary.conditions_filled(), 0);
    assert_eq!(twice.result.summary.rows_excluded, 0);
}

// ============================================================================
// Policy Tests
// ============================================================================

#[test]
fn test_zero_payment_left_empty_by_default() {
    let df = load_csv("leases_sample.csv");
    let output = normalizer(in_memory_config()).normalize(df).unwrap();
    let rows = records(&output.data);

    let civic = find(&rows, "Honda", "Civic").unwrap();
    assert_eq!(civic.payback_period, None);
    assert!(
        output
            .result
            .summary
            .warnings
            .iter()
            .any(|w| w.contains("zero weekly payment"))
    );
}

#[test]
fn test_zero_payment_drop_row() {
    let config = NormalizerConfig::builder()
        .zero_payment_policy(ZeroPaymentPolicy::DropRow)
        .save_to_disk(false)
        .build()
        .unwrap();
    let output = normalizer(config)
        .normalize(load_csv("leases_sample.csv"))
        .unwrap();

    assert_eq!(output.result.summary.rows_after, 5);
    assert_eq!(output.result.summary.zero_payment_rows_dropped, 1);
    assert!(find(&records(&output.data), "Honda", "Civic").is_none());
}

#[test]
fn test_zero_payment_fail_reports_row() {
    let config = NormalizerConfig::builder()
        .zero_payment_policy(ZeroPaymentPolicy::Fail)
        .save_to_disk(false)
        .build()
        .unwrap();

    let stages = Arc::new(Mutex::new(Vec::new()));
    let stages_clone = stages.clone();

    let result = Normalizer::builder()
        .config(config)
        .zip_lookup(zip_reference())
        .on_progress(move |update| stages_clone.lock().push(update.stage))
        .build()
        .unwrap()
        .normalize(load_csv("leases_sample.csv"));

    match result {
        Err(NormalizeError::DivisionByZero { row }) => assert_eq!(row, 2),
        other => panic!("expected a division-by-zero error, got {:?}", other.map(|_| ())),
    }
    assert_eq!(stages.lock().last(), Some(&NormalizationStage::Failed));
}

#[test]
fn test_missing_mileage_left_absent() {
    let config = NormalizerConfig::builder()
        .missing_mileage_policy(MissingMileagePolicy::LeaveAbsent)
        .save_to_disk(false)
        .build()
        .unwrap();
    let output = normalizer(config)
        .normalize(load_csv("leases_sample.csv"))
        .unwrap();

    let malibu = find(&records(&output.data), "Chevrolet", "Malibu")
        .cloned()
        .unwrap();
    assert_eq!(malibu.condition, None);
    assert_eq!(output.result.summary.conditions_left_absent, 1);
}

#[test]
fn test_custom_exclusion_rule() {
    let config = NormalizerConfig::builder()
        .exclude(ExclusionRule::new("Dealer under review").matching("Dealer", "Capital Cars"))
        .save_to_disk(false)
        .build()
        .unwrap();
    let output = normalizer(config)
        .normalize(load_csv("leases_sample.csv"))
        .unwrap();
    let summary = &output.result.summary;

    assert_eq!(summary.rows_after, 4);
    assert_eq!(summary.exclusions.len(), 2);
    assert_eq!(summary.exclusions[0].rows, 1);
    assert_eq!(summary.exclusions[1].rows, 2);
    assert_eq!(summary.exclusions[1].reason, "Dealer under review");
}

#[test]
fn test_config_from_json_file() {
    let config = NormalizerConfig::from_json_file(fixtures_path().join("lease_config.json"))
        .expect("Failed to load config");

    assert_eq!(config.new_mileage_threshold, 50.0);
    assert_eq!(config.zero_payment_policy, ZeroPaymentPolicy::DropRow);
    assert_eq!(config.exclusion_rules.len(), 1);
    assert!(!config.save_to_disk);

    let output = normalizer(config)
        .normalize(load_csv("leases_sample.csv"))
        .unwrap();
    let corolla = find(&records(&output.data), "Toyota", "Corolla")
        .cloned()
        .unwrap();

    // 45 miles is under the raised threshold
    assert_eq!(corolla.condition.as_deref(), Some("New"));
    assert_eq!(output.result.summary.rows_after, 5);
}

// ============================================================================
// Fleet Report Tests
// ============================================================================

#[test]
fn test_fleet_report_over_sample() {
    let output = normalizer(in_memory_config())
        .normalize(load_csv("leases_sample.csv"))
        .unwrap();
    let fleet = output.fleet.expect("fleet report should be generated");

    assert_eq!(fleet.total_records, 6);
    assert_eq!(fleet.unparsed_dates, 0);
    assert_eq!(fleet.make_counts[0].value, "Toyota");
    assert_eq!(fleet.make_counts[0].count, 2);
    assert_eq!(fleet.mean_payback_for("Used"), Some(100.0));
    assert_eq!(fleet.mean_payback_for("New"), Some(110.0));

    let months: Vec<(i64, i64, usize)> = fleet
        .monthly_fleet
        .iter()
        .map(|m| (m.year, m.month, m.purchases))
        .collect();
    assert_eq!(months, vec![(2023, 1, 1), (2023, 2, 1), (2023, 3, 2), (2023, 4, 2)]);
}

#[test]
fn test_fleet_report_disabled() {
    let config = NormalizerConfig::builder()
        .generate_report(false)
        .save_to_disk(false)
        .build()
        .unwrap();
    let output = normalizer(config)
        .normalize(load_csv("leases_sample.csv"))
        .unwrap();
    assert!(output.fleet.is_none());
}

// ============================================================================
// Output Tests
// ============================================================================

#[test]
fn test_cleaned_csv_written_and_readable() {
    let dir = std::env::temp_dir().join(format!("lease_integration_{}", std::process::id()));
    let config = NormalizerConfig::builder()
        .output_dir(&dir)
        .output_name("sample_clean")
        .build()
        .unwrap();

    let output = normalizer(config)
        .normalize(load_csv("leases_sample.csv"))
        .unwrap();
    let written = output.result.output_file.clone().expect("CSV should be written");

    let reread = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(PathBuf::from(&written)))
        .unwrap()
        .finish()
        .unwrap();

    let report = ReportGenerator::build_report(
        "leases_sample.csv",
        &output.result,
        &[ExclusionRule::make_model("Nissan", "Accord")],
        output.fleet.as_ref(),
    );
    let report_path = ReportGenerator::new(dir.clone(), "sample_clean")
        .write_report_to_file(&report, "leases_sample")
        .unwrap();
    let report_exists = report_path.exists();

    std::fs::remove_dir_all(&dir).ok();

    assert!(written.ends_with("sample_clean.csv"));
    assert_eq!(reread.height(), 6);
    assert!(reread.column("Payback_Period").is_ok());
    assert!(report_exists);
}

#[test]
fn test_zip_reference_from_pairs() {
    let table: ZipReferenceTable = [("2108", GeoLocation::new("MA", "Boston"))]
        .into_iter()
        .collect();

    assert_eq!(
        table.lookup("02108"),
        ZipLookupResult::Found(GeoLocation::new("MA", "Boston"))
    );
    assert_eq!(table.lookup("90001"), ZipLookupResult::NotFound);
}
