#![warn(missing_docs)]
//! trialbench Report
//!
//! The strongly typed experiment report:
//! - JSON (machine-readable, the durable artifact of a run)
//! - Strict loading that rejects malformed or inconsistent documents
//!
//! Human-readable rendering lives in the CLI.

mod json;
mod report;

pub use json::{ReportError, generate_json_report, load_report, load_report_file};
pub use report::{
    BootstrapDifference, DurationAnalysis, DurationSummary, ExperimentReport, ReportMetadata,
    RunConfig, SCHEMA_VERSION, Section, Significance, TrialAccounting, VariantAnalysis,
    VariantReport,
};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Pretty-printed JSON report
    Json,
    /// Human-readable terminal output
    #[default]
    Human,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
