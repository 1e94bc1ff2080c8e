#![warn(missing_docs)]
//! trialbench Harness - Variants, Trials and Orchestration
//!
//! This crate runs the experiment:
//! - `CapabilityTable` / `VariantConfig` describe which capabilities a variant keeps
//! - `VariantProvisioner` materialises an isolated, feature-toggled workspace
//! - `TrialRunner` times external operations with timeout supervision
//! - `ExperimentOrchestrator` runs variants × trials and builds the report
//!
//! Process supervision relies on Unix process groups and signals.

mod measure;
mod orchestrator;
mod provision;
mod trial;
mod variant;

pub use measure::{Timer, nanos_to_millis};
pub use orchestrator::{ExperimentOrchestrator, OrchestratorConfig, OrchestratorError, VariantRun};
pub use provision::{Provision, ProvisionError, STATE_FILE, VariantProvisioner, VcsInit};
pub use trial::{
    DEFAULT_GRACE_PERIOD, NamedDuration, OperationSpec, TrialFailure, TrialRecord, TrialRunner,
};
pub use variant::{
    Capability, CapabilityTable, FULL_VARIANT, MINIMAL_VARIANT, NOOP_SCRIPT, Neutralization,
    VariantConfig, VariantError,
};
