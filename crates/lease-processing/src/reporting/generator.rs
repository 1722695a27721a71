use super::fleet::FleetReport;
use crate::config::ExclusionRule;
use crate::types::{NormalizationResult, NormalizationSummary};
use anyhow::Result;
use chrono::Local;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Full report of one normalization run.
///
/// Used for both JSON output (`--json`) and file writing (`--emit-report`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationReport {
    /// Timestamp when the report was generated
    pub generated_at: String,
    /// Path to the input file
    pub input_file: String,
    /// Path to the cleaned CSV (if written)
    pub output_file: Option<String>,
    pub summary: NormalizationSummary,
    pub processing_steps: Vec<String>,
    /// Exclusion rules that were in effect
    pub exclusion_rules: Vec<ExclusionRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fleet: Option<FleetReport>,
}

/// Writes the cleaned table and the JSON report.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    output_dir: PathBuf,
    output_name: String,
}

impl ReportGenerator {
    pub fn new(output_dir: PathBuf, output_name: impl Into<String>) -> Self {
        Self {
            output_dir,
            output_name: output_name.into(),
        }
    }

    /// Path the cleaned CSV is written to.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.csv", self.output_name))
    }

    /// Write the cleaned table as `<output_dir>/<output_name>.csv`.
    pub fn write_cleaned_csv(&self, df: &mut DataFrame) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let output_path = self.output_path();
        let mut file = File::create(&output_path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(df)?;

        info!("Cleaned table saved: {}", output_path.display());
        Ok(output_path)
    }

    /// Assemble a report from a finished run.
    pub fn build_report(
        input_file: &str,
        result: &NormalizationResult,
        exclusion_rules: &[ExclusionRule],
        fleet: Option<&FleetReport>,
    ) -> NormalizationReport {
        NormalizationReport {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            input_file: input_file.to_string(),
            output_file: result.output_file.clone(),
            summary: result.summary.clone(),
            processing_steps: result.processing_steps.clone(),
            exclusion_rules: exclusion_rules.to_vec(),
            fleet: fleet.cloned(),
        }
    }

    /// Write a report to `<output_dir>/<report_base_name>_report.json`.
    pub fn write_report_to_file(
        &self,
        report: &NormalizationReport,
        report_base_name: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;

        let report_path = self
            .output_dir
            .join(format!("{}_report.json", report_base_name));
        let mut file = File::create(&report_path)?;
        file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;

        info!("Report saved: {}", report_path.display());

        Ok(report_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lease_processing_{}_{}", name, std::process::id()))
    }

    #[test]
    fn test_write_cleaned_csv() {
        let dir = scratch_dir("csv");
        let generator = ReportGenerator::new(dir.clone(), "leases");
        let mut df = df![
            "Make" => ["Toyota", "Honda"],
            "Payback_Period" => [Some(100.0), None],
        ]
        .unwrap();

        let path = generator.write_cleaned_csv(&mut df).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        fs::remove_dir_all(&dir).ok();

        assert!(path.ends_with("leases.csv"));
        assert!(content.starts_with("Make,Payback_Period"));
        assert!(content.contains("Toyota,100.0"));
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = scratch_dir("report");
        let generator = ReportGenerator::new(dir.clone(), "leases");
        let result = NormalizationResult {
            success: true,
            output_file: None,
            processing_steps: vec!["Filled 2 conditions".to_string()],
            summary: NormalizationSummary::new(),
        };
        let report = ReportGenerator::build_report("leases.csv", &result, &[], None);

        let path = generator.write_report_to_file(&report, "leases").unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        fs::remove_dir_all(&dir).ok();

        assert!(path.ends_with("leases_report.json"));
        assert_eq!(parsed["input_file"], "leases.csv");
        assert_eq!(parsed["processing_steps"][0], "Filled 2 conditions");
        assert!(parsed.get("fleet").is_none());
    }
}
