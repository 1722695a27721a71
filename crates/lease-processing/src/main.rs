//! CLI entry point for the lease record normalizer.

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use lease_processing::types::columns;
use lease_processing::{
    ConditionImputer, MissingMileagePolicy, NormalizationOutput, NormalizationReport, Normalizer,
    NormalizerConfig, RecordCleaner, ReportGenerator, ZeroPaymentPolicy, ZipReferenceTable,
    is_missing_marker,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Environment variable naming the default zip reference CSV.
const ZIP_REFERENCE_ENV: &str = "LEASE_ZIP_REFERENCE";

/// CLI-compatible zero payment policy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliZeroPayment {
    /// Leave the payback period empty
    Null,
    /// Remove the record
    Drop,
    /// Stop with an error
    Fail,
}

impl From<CliZeroPayment> for ZeroPaymentPolicy {
    fn from(cli: CliZeroPayment) -> Self {
        match cli {
            CliZeroPayment::Null => ZeroPaymentPolicy::Null,
            CliZeroPayment::Drop => ZeroPaymentPolicy::DropRow,
            CliZeroPayment::Fail => ZeroPaymentPolicy::Fail,
        }
    }
}

/// CLI-compatible missing mileage policy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMissingMileage {
    /// Treat the car as Used
    AssumeUsed,
    /// Leave the condition empty
    LeaveAbsent,
}

impl From<CliMissingMileage> for MissingMileagePolicy {
    fn from(cli: CliMissingMileage) -> Self {
        match cli {
            CliMissingMileage::AssumeUsed => MissingMileagePolicy::AssumeUsed,
            CliMissingMileage::LeaveAbsent => MissingMileagePolicy::LeaveAbsent,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Vehicle lease record normalizer",
    long_about = "Fills missing lease values, derives the payback period and removes known-bad records.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  LEASE_ZIP_REFERENCE   Zip reference CSV used when --zip-reference is not given\n  \
                  RUST_LOG              Overrides --log-level\n\n\
                  EXAMPLES:\n  \
                  # Basic usage\n  \
                  lease-processing -i leases.csv\n\n  \
                  # Refill geography and write a report\n  \
                  lease-processing -i leases.csv --zip-reference zips.csv --emit-report\n\n  \
                  # Dry run to preview actions\n  \
                  lease-processing -i leases.csv --dry-run"
)]
struct Args {
    /// Path to the lease CSV file to process
    #[arg(short, long)]
    input: String,

    /// Output directory for results
    #[arg(short, long, default_value = "output")]
    output: String,

    /// Custom output file name (without extension)
    #[arg(long)]
    output_name: Option<String>,

    /// JSON configuration file
    ///
    /// Command-line flags override values from the file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Zip reference CSV with zip, state and city columns
    #[arg(short, long)]
    zip_reference: Option<PathBuf>,

    /// Highest mileage at inception that still counts as New
    #[arg(long)]
    new_mileage_threshold: Option<f64>,

    /// What to do with a zero weekly payment
    #[arg(long, value_enum)]
    zero_payment: Option<CliZeroPayment>,

    /// What to do when both condition and mileage are missing
    #[arg(long, value_enum)]
    missing_mileage: Option<CliMissingMileage>,

    /// Preview what the normalizer will do without processing
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON report.
    #[arg(long)]
    json: bool,

    /// Write a detailed JSON report to the output directory
    ///
    /// The report will be saved as <input_name>_report.json
    #[arg(short = 'r', long)]
    emit_report: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    // Load environment variables from .env file
    dotenv().ok();

    if !Path::new(&args.input).exists() {
        return Err(anyhow!("Input file not found: {}", args.input));
    }

    let config = build_config(&args)?;

    info!("Loading dataset from: {}", args.input);
    let data = load_csv_with_fallbacks(&args.input)?;
    info!("Dataset loaded successfully: {:?}", data.shape());

    if args.dry_run {
        return run_dry_run(&args, &config, &data);
    }

    let normalizer = build_normalizer(&args, config)?;
    run_normalizer(&normalizer, &args, data)
}

/// Merge the optional config file with command-line overrides.
fn build_config(args: &Args) -> Result<NormalizerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            NormalizerConfig::from_json_file(path)?
        }
        None => NormalizerConfig::default(),
    };

    config.output_dir = PathBuf::from(&args.output);
    if let Some(ref name) = args.output_name {
        config.output_name = name.clone();
    }
    if let Some(threshold) = args.new_mileage_threshold {
        config.new_mileage_threshold = threshold;
    }
    if let Some(policy) = args.zero_payment {
        config.zero_payment_policy = policy.into();
    }
    if let Some(policy) = args.missing_mileage {
        config.missing_mileage_policy = policy.into();
    }

    config.validate()?;
    Ok(config)
}

/// Zip reference path from the flag, falling back to the environment.
fn zip_reference_path(args: &Args) -> Option<PathBuf> {
    args.zip_reference
        .clone()
        .or_else(|| env::var(ZIP_REFERENCE_ENV).ok().map(PathBuf::from))
}

fn build_normalizer(args: &Args, config: NormalizerConfig) -> Result<Normalizer> {
    let mut builder = Normalizer::builder().config(config);

    match zip_reference_path(args) {
        Some(path) => {
            let table = ZipReferenceTable::from_csv(&path)?;
            builder = builder.zip_lookup(Arc::new(table));
        }
        None => {
            warn!(
                "No zip reference given (--zip-reference or {}); geography fill will be skipped",
                ZIP_REFERENCE_ENV
            );
        }
    }

    if !args.quiet {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }

    Ok(builder.build()?)
}

/// Run dry-run mode - show what would happen without processing
///
/// Note: This function uses `println!` intentionally for user-facing CLI output.
/// Unlike logging (`info!`, `debug!`), this output should always be visible
/// regardless of log level settings since it's the primary purpose of --dry-run.
fn run_dry_run(args: &Args, config: &NormalizerConfig, data: &DataFrame) -> Result<()> {
    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Preview of normalization actions");
    println!("{}\n", "=".repeat(80));

    println!("DATASET OVERVIEW");
    println!("{}", "-".repeat(40));
    println!("  File: {}", args.input);
    println!("  Rows: {}", data.height());
    println!("  Columns: {}", data.width());

    let missing_columns: Vec<&str> = columns::RAW
        .iter()
        .copied()
        .filter(|name| data.column(name).is_err())
        .collect();
    if missing_columns.is_empty() {
        println!("  All {} expected columns present", columns::RAW.len());
    } else {
        println!("  Missing columns: {:?}", missing_columns);
    }
    println!();

    println!("CONDITION FILL PREVIEW");
    println!("{}", "-".repeat(40));
    let imputer = ConditionImputer::from_config(config);
    match imputer.apply(data.clone()) {
        Ok((_, outcome)) => {
            println!(
                "  Will fill {} conditions: {} New (mileage <= {}), {} Used",
                outcome.total_filled(),
                outcome.filled_new,
                config.new_mileage_threshold,
                outcome.filled_used
            );
            if outcome.left_absent > 0 {
                println!("  {} conditions stay empty (no mileage)", outcome.left_absent);
            }
        }
        Err(e) => println!("  Cannot fill conditions: {}", e),
    }
    println!();

    println!("GEOGRAPHY FILL PREVIEW");
    println!("{}", "-".repeat(40));
    let zips_present = lease_processing::utils::optional_string_values(data, columns::ZIP)?
        .iter()
        .filter(|z| z.as_deref().is_some_and(|z| !is_missing_marker(z)))
        .count();
    println!("  Records with a zip code: {}", zips_present);
    match zip_reference_path(args) {
        Some(path) => println!("  Zip reference: {}", path.display()),
        None => println!("  No zip reference configured; geography will not change"),
    }
    println!();

    println!("PAYBACK PERIOD PREVIEW");
    println!("{}", "-".repeat(40));
    let zero_payments = lease_processing::utils::optional_f64_values(data, columns::WEEKLY_PAYMENT)?
        .iter()
        .filter(|p| **p == Some(0.0))
        .count();
    println!("  Records with a zero weekly payment: {}", zero_payments);
    println!("  Zero payment policy: {:?}", config.zero_payment_policy);
    println!();

    println!("EXCLUSION PREVIEW");
    println!("{}", "-".repeat(40));
    let cleaner = RecordCleaner::new(config.exclusion_rules.clone());
    let (_, outcome) = cleaner.apply(data.clone())?;
    for hits in &outcome.by_rule {
        println!("  - {}: {} records", hits.reason, hits.rows);
    }
    println!();

    println!("OUTPUT FILES (will be created)");
    println!("{}", "-".repeat(40));
    println!("  - {}/{}.csv", args.output, config.output_name);
    if args.emit_report {
        println!("  - {}/{}_report.json", args.output, extract_file_stem(&args.input));
    }
    println!();

    println!("{}", "=".repeat(80));
    println!("To execute this normalization, run without --dry-run");
    if !args.emit_report {
        println!("Add --emit-report to save a detailed JSON report");
    }
    println!("{}", "=".repeat(80));

    Ok(())
}

fn run_normalizer(normalizer: &Normalizer, args: &Args, data: DataFrame) -> Result<()> {
    info!("{}", "=".repeat(80));
    info!("Starting lease normalization...");
    info!("{}", "=".repeat(80));

    let original_shape = data.shape();

    match normalizer.normalize(data) {
        Ok(output) => handle_output(normalizer, output, original_shape, args),
        Err(e) => {
            error!("Normalization failed [{}]: {}", e.error_code(), e);
            if e.is_data_error() {
                error!("The input table needs fixing; run with --dry-run to inspect it");
            }
            Err(anyhow!("Normalization failed: {}", e))
        }
    }
}

/// Handle normalizer output based on CLI flags.
///
/// Output behavior:
/// - Default: Print human-readable summary to stdout
/// - `--json`: Print JSON to stdout only (no logs)
/// - `--emit-report`: Write JSON report to file
fn handle_output(
    normalizer: &Normalizer,
    output: NormalizationOutput,
    original_shape: (usize, usize),
    args: &Args,
) -> Result<()> {
    let config = normalizer.config();
    let report = ReportGenerator::build_report(
        &args.input,
        &output.result,
        &config.exclusion_rules,
        output.fleet.as_ref(),
    );

    if args.emit_report {
        let generator = ReportGenerator::new(config.output_dir.clone(), config.output_name.clone());
        let report_path = generator.write_report_to_file(&report, &extract_file_stem(&args.input))?;
        info!("Report written to: {}", report_path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_human_readable_summary(&report, original_shape, output.data.width());
    Ok(())
}

/// Extract the file stem (name without extension) from a path.
fn extract_file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Print a human-readable summary of the normalization results.
fn print_human_readable_summary(
    report: &NormalizationReport,
    original_shape: (usize, usize),
    final_width: usize,
) {
    let summary = &report.summary;

    println!();
    println!("{}", "=".repeat(80));
    println!("NORMALIZATION COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!(
        "Input:  {} ({} rows x {} columns)",
        report.input_file, original_shape.0, original_shape.1
    );
    if let Some(ref output_file) = report.output_file {
        println!(
            "Output: {} ({} rows x {} columns)",
            output_file, summary.rows_after, final_width
        );
    }
    println!();

    println!("Normalization Summary:");
    println!("  Duration: {}ms", summary.duration_ms);
    println!(
        "  Rows: {} -> {} ({} removed)",
        summary.rows_before,
        summary.rows_after,
        summary.rows_removed()
    );
    println!(
        "  Conditions filled: {} ({} New, {} Used)",
        summary.conditions_filled(),
        summary.conditions_filled_new,
        summary.conditions_filled_used
    );
    println!(
        "  Geography: {} resolved, {} not found, {} lookup errors",
        summary.geography_resolved, summary.geography_not_found, summary.geography_lookup_errors
    );
    println!(
        "  Payback period: {} computed, {} undefined",
        summary.paybacks_computed, summary.paybacks_undefined
    );
    println!("  Known-bad records removed: {}", summary.rows_excluded);
    println!(
        "  Completeness: {:.1}% -> {:.1}%",
        summary.completeness_before * 100.0,
        summary.completeness_after * 100.0
    );
    println!();

    if let Some(ref fleet) = report.fleet {
        println!("Fleet:");
        for make in fleet.make_counts.iter().take(5) {
            println!("  {:<20} {}", make.value, make.count);
        }
        for condition in &fleet.payback_by_condition {
            if let Some(weeks) = condition.mean_payback_weeks {
                println!(
                    "  Mean payback ({}): {:.1} weeks",
                    condition.condition, weeks
                );
            }
        }
        println!();
    }

    if !summary.warnings.is_empty() {
        println!("Warnings:");
        for warning in &summary.warnings {
            println!("  ! {}", warning);
        }
        println!();
    }

    println!("Use --json for machine-readable output");
    println!("Use --emit-report to save detailed JSON report");
    println!("{}", "=".repeat(80));
}

/// Load CSV with multiple fallback strategies
fn load_csv_with_fallbacks(path: &str) -> Result<DataFrame> {
    // Strategy 1: Standard loading with quote handling
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("Standard loading failed: {}", e);
        }
    }

    // Strategy 2: Every column as text
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(0))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("Loading as text failed: {}", e);
        }
    }

    // Strategy 3: Pre-clean content
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cleaned = clean_csv_content(&content);
            let cursor = std::io::Cursor::new(cleaned);

            CsvReadOptions::default()
                .with_infer_schema_length(Some(0))
                .with_has_header(true)
                .into_reader_with_file_handle(cursor)
                .finish()
                .map_err(|e| e.into())
        }
        Err(e) => {
            error!("Could not read file: {}", e);
            Err(e.into())
        }
    }
}

/// Collapse doubled quotes and drop blank lines.
fn clean_csv_content(content: &str) -> String {
    content
        .replace("\"\"\"", "\"")
        .replace("\"\"", "\"")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
