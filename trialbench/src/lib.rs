#![warn(missing_docs)]
//! # trialbench
//!
//! Benchmark experiment engine for comparing feature-toggled workspace variants.
//!
//! trialbench answers "how much does this capability cost?" with numbers that
//! survive scrutiny:
//! - **Isolated Variants**: every trial gets a freshly provisioned workspace in which
//!   disabled capabilities are replaced by inert equivalents
//! - **Warmup Exclusion**: warmup trials are executed and discarded
//! - **Timeout Supervision**: hung operations are terminated by process group
//! - **Statistical Rigor**: quartiles, t-based confidence intervals, ordinal effect
//!   sizes, Mann-Whitney significance and a seeded bootstrap of the mean difference
//! - **Durable Reports**: a versioned JSON report with explicit `unavailable` sections
//!
//! ## Quick Start
//!
//! ```ignore
//! use trialbench::prelude::*;
//!
//! let table = CapabilityTable::standard();
//! let provisioner = VariantProvisioner::new(table.clone());
//! let runner = TrialRunner::new(vec![
//!     OperationSpec::shell("setup", "git status --short"),
//!     OperationSpec::shell("checkpoint", "./hooks/checkpoint.sh").requires("checkpoint_logging"),
//! ]);
//! let config = OrchestratorConfig::new("/tmp/trialbench");
//! let orchestrator = ExperimentOrchestrator::new(provisioner, runner, config);
//!
//! let variants = vec![VariantConfig::full(&table), VariantConfig::minimal()];
//! let report = orchestrator.run(&variants, 10, 2, "full")?;
//! println!("{}", generate_json_report(&report)?);
//! ```

// Re-export harness types
pub use trialbench_harness::{
    Capability, CapabilityTable, ExperimentOrchestrator, FULL_VARIANT, MINIMAL_VARIANT,
    NamedDuration, Neutralization, OperationSpec, OrchestratorConfig, OrchestratorError,
    Provision, ProvisionError, TrialFailure, TrialRecord, TrialRunner, VariantConfig,
    VariantError, VariantProvisioner, VcsInit,
};

// Re-export report types
pub use trialbench_report::{
    ExperimentReport, OutputFormat, ReportError, Section, generate_json_report, load_report,
    load_report_file,
};

// Re-export stats
pub use trialbench_stats::{
    BootstrapConfig, ConfidenceMethod, EffectComparison, EffectLabel, MeanDifference,
    StatisticalSummary, StatsError, bootstrap_mean_difference, compare, relative_percent,
    summarize,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CapabilityTable, ExperimentOrchestrator, ExperimentReport, OperationSpec,
        OrchestratorConfig, TrialRunner, VariantConfig, VariantProvisioner, generate_json_report,
    };
}

/// Run the trialbench CLI.
///
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     trialbench::run()
/// }
/// ```
pub use trialbench_cli::run;
