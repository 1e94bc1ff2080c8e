//! Experiment Orchestration
//!
//! Drives the variant × trial matrix and folds retained trials into the
//! experiment report.
//!
//! ## Pipeline
//!
//! ```text
//! for each variant (declaration order, optionally on a worker pool)
//!   warmup trials ──► discarded
//!   measured trials ─► TrialRecord
//!              │
//!              ▼
//!   Sample per (variant, named duration), failed durations excluded
//!              │
//!              ▼
//!   summarize(sample)            compare(sample, baseline sample)
//!              │                          │
//!              ▼                          ▼
//!        variants section           analysis section
//! ```
//!
//! Each variant worker owns its records and its scratch subtree; results are
//! merged in declaration order after all workers finish.

use crate::provision::Provision;
use crate::trial::{TrialRecord, TrialRunner};
use crate::variant::VariantConfig;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use trialbench_report::{
    BootstrapDifference, DurationAnalysis, DurationSummary, ExperimentReport, ReportMetadata,
    RunConfig, SCHEMA_VERSION, Section, TrialAccounting, VariantAnalysis, VariantReport,
};
use trialbench_stats::{
    BootstrapConfig, ConfidenceMethod, bootstrap_mean_difference, compare, relative_percent,
    summarize_with,
};

/// Errors that prevent a run from starting
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no variants to run")]
    NoVariants,

    #[error("variant '{0}' is declared more than once")]
    DuplicateVariant(String),

    #[error("baseline '{0}' is not among the variants")]
    UnknownBaseline(String),

    #[error("trial_count must be at least 1")]
    NoTrials,

    #[error("failed to prepare scratch directory {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Parent of every per-variant scratch subtree
    pub scratch_root: PathBuf,
    /// Variants run concurrently (1 = sequential)
    pub jobs: usize,
    pub show_progress: bool,
    /// Bootstrap of the mean difference; `None` disables it
    pub bootstrap: Option<BootstrapConfig>,
    pub confidence_method: ConfidenceMethod,
}

impl OrchestratorConfig {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            jobs: 1,
            show_progress: false,
            bootstrap: None,
            confidence_method: ConfidenceMethod::default(),
        }
    }
}

/// Records retained for one variant, plus its skip accounting
#[derive(Debug, Clone)]
pub struct VariantRun {
    pub variant: VariantConfig,
    /// Measured trials only, in execution order
    pub records: Vec<TrialRecord>,
    pub attempted: usize,
    /// Measured trials skipped because provisioning failed
    pub provisioning_skips: usize,
    /// Warmup trials skipped because provisioning failed
    pub warmup_skips: usize,
}

impl VariantRun {
    /// Successful durations of one named operation, in trial order
    pub fn sample(&self, operation: &str) -> Vec<f64> {
        self.records
            .iter()
            .filter_map(|record| record.duration(operation))
            .filter(|d| d.success)
            .map(|d| d.duration_ms())
            .collect()
    }

    pub fn failed_trials(&self) -> usize {
        self.records.iter().filter(|r| !r.success).count()
    }
}

/// Trial counts and start time of one run
struct RunShape {
    trial_count: usize,
    warmup_count: usize,
    timestamp: DateTime<Utc>,
}

/// Runs experiments. Holds no state between runs.
pub struct ExperimentOrchestrator<P: Provision> {
    provisioner: P,
    runner: TrialRunner,
    config: OrchestratorConfig,
}

impl<P: Provision> ExperimentOrchestrator<P> {
    pub fn new(provisioner: P, runner: TrialRunner, config: OrchestratorConfig) -> Self {
        Self {
            provisioner,
            runner,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run `warmup_count + trial_count` trials per variant and build the report
    pub fn run(
        &self,
        variants: &[VariantConfig],
        trial_count: usize,
        warmup_count: usize,
        baseline: &str,
    ) -> Result<ExperimentReport, OrchestratorError> {
        validate(variants, trial_count, baseline)?;
        let timestamp = Utc::now();

        let total = (variants.len() * (trial_count + warmup_count)) as u64;
        let progress = self.progress_bar(total);

        let runs = if self.config.jobs <= 1 || variants.len() == 1 {
            variants
                .iter()
                .map(|v| self.run_trials(v, trial_count, warmup_count, &progress))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(self.config.jobs.min(variants.len()))
                .build()
                .map_err(|e| OrchestratorError::WorkerPool(e.to_string()))?;
            pool.install(|| {
                variants
                    .par_iter()
                    .map(|v| self.run_trials(v, trial_count, warmup_count, &progress))
                    .collect::<Result<Vec<_>, _>>()
            })?
        };
        progress.finish_and_clear();

        let shape = RunShape {
            trial_count,
            warmup_count,
            timestamp,
        };
        Ok(self.assemble(&runs, baseline, &shape))
    }

    /// Execute warmup then measured trials for one variant.
    ///
    /// Warmup records are dropped as soon as they are produced. Provisioning
    /// failures are logged and counted, never retried.
    pub fn run_trials(
        &self,
        variant: &VariantConfig,
        trial_count: usize,
        warmup_count: usize,
        progress: &ProgressBar,
    ) -> Result<VariantRun, OrchestratorError> {
        let scratch = self.config.scratch_root.join(variant.name());
        std::fs::create_dir_all(&scratch).map_err(|source| OrchestratorError::Scratch {
            path: scratch.clone(),
            source,
        })?;
        info!(
            variant = variant.name(),
            trials = trial_count,
            warmup = warmup_count,
            "running variant"
        );

        let mut warmup_skips = 0;
        for index in 0..warmup_count {
            progress.set_message(format!("{} warmup {}", variant.name(), index + 1));
            if self.execute(&scratch, variant, index, true).is_none() {
                warmup_skips += 1;
            }
            progress.inc(1);
        }

        let mut records = Vec::with_capacity(trial_count);
        let mut provisioning_skips = 0;
        for index in 0..trial_count {
            progress.set_message(format!("{} trial {}", variant.name(), index + 1));
            match self.execute(&scratch, variant, index, false) {
                Some(record) => records.push(record),
                None => provisioning_skips += 1,
            }
            progress.inc(1);
        }

        let run = VariantRun {
            variant: variant.clone(),
            records,
            attempted: trial_count,
            provisioning_skips,
            warmup_skips,
        };
        info!(
            variant = variant.name(),
            retained = run.records.len(),
            failed = run.failed_trials(),
            skipped = provisioning_skips + warmup_skips,
            "variant complete"
        );
        Ok(run)
    }

    /// Provision a fresh workspace and run one trial; `None` if provisioning failed
    fn execute(
        &self,
        scratch: &Path,
        variant: &VariantConfig,
        index: usize,
        is_warmup: bool,
    ) -> Option<TrialRecord> {
        let prefix = if is_warmup {
            format!("warmup-{:04}-", index)
        } else {
            format!("trial-{:04}-", index)
        };

        let workspace = match tempfile::Builder::new().prefix(&prefix).tempdir_in(scratch) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(
                    variant = variant.name(),
                    trial = index,
                    error = %e,
                    "failed to create trial workspace, skipping"
                );
                return None;
            }
        };

        if !self.provisioner.provision(workspace.path(), variant) {
            warn!(
                variant = variant.name(),
                trial = index,
                warmup = is_warmup,
                "provisioning failed, skipping trial"
            );
            return None;
        }

        Some(self.runner.run_trial(workspace, variant, index, is_warmup))
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }

    /// Fold variant runs into the report, baseline summaries first
    fn assemble(
        &self,
        runs: &[VariantRun],
        baseline: &str,
        shape: &RunShape,
    ) -> ExperimentReport {
        let operations: Vec<&str> = self
            .runner
            .operations()
            .iter()
            .map(|op| op.name.as_str())
            .collect();
        let method = self.config.confidence_method;

        let mut variants = BTreeMap::new();
        let mut provisioning_skips = BTreeMap::new();

        let baseline_run = runs.iter().find(|r| r.variant.name() == baseline);
        let ordered = baseline_run
            .into_iter()
            .chain(runs.iter().filter(|r| r.variant.name() != baseline));

        for run in ordered {
            let durations = operations
                .iter()
                .map(|&op| {
                    let section = match summarize_with(&run.sample(op), method) {
                        Ok(summary) => Section::Available(DurationSummary::from(&summary)),
                        Err(e) => {
                            warn!(
                                variant = run.variant.name(),
                                operation = op,
                                error = %e,
                                "summary unavailable"
                            );
                            Section::unavailable(e)
                        }
                    };
                    (op.to_string(), section)
                })
                .collect();

            variants.insert(
                run.variant.name().to_string(),
                VariantReport {
                    capabilities: run.variant.enabled().map(str::to_string).collect(),
                    durations,
                    trials: TrialAccounting::new(
                        run.attempted,
                        run.records.len(),
                        run.provisioning_skips,
                        run.failed_trials(),
                    ),
                },
            );
            provisioning_skips.insert(
                run.variant.name().to_string(),
                run.provisioning_skips + run.warmup_skips,
            );
        }

        let mut analysis = BTreeMap::new();
        if let Some(baseline_run) = baseline_run {
            for run in runs.iter().filter(|r| r.variant.name() != baseline) {
                let durations = operations
                    .iter()
                    .map(|&op| (op.to_string(), self.analyze(run, baseline_run, op)))
                    .collect();
                analysis.insert(
                    ExperimentReport::analysis_key(run.variant.name(), baseline),
                    VariantAnalysis {
                        variant: run.variant.name().to_string(),
                        baseline: baseline.to_string(),
                        durations,
                    },
                );
            }
        }

        ExperimentReport {
            schema_version: SCHEMA_VERSION,
            variants,
            analysis,
            metadata: ReportMetadata {
                variants: runs.iter().map(|r| r.variant.name().to_string()).collect(),
                baseline: baseline.to_string(),
                trial_count: shape.trial_count,
                warmup_count: shape.warmup_count,
                timestamp: shape.timestamp,
                version: env!("CARGO_PKG_VERSION").to_string(),
                provisioning_skips,
                config: RunConfig {
                    jobs: self.config.jobs.max(1),
                    timeout_ms: self.runner.timeout().map(|t| t.as_millis() as u64),
                    bootstrap_iterations: self
                        .config
                        .bootstrap
                        .as_ref()
                        .map_or(0, |b| b.iterations),
                    confidence_method: method.to_string(),
                    operations: operations.iter().map(|op| op.to_string()).collect(),
                },
            },
        }
    }

    /// Compare one named duration of `run` against the baseline run
    fn analyze(
        &self,
        run: &VariantRun,
        baseline_run: &VariantRun,
        operation: &str,
    ) -> Section<DurationAnalysis> {
        let candidate = run.sample(operation);
        let reference = baseline_run.sample(operation);

        let comparison = match compare(&candidate, &reference) {
            Ok(comparison) => comparison,
            Err(e) => {
                warn!(
                    variant = run.variant.name(),
                    operation,
                    error = %e,
                    "comparison unavailable"
                );
                return Section::unavailable(e);
            }
        };

        let relative = relative_percent(mean(&candidate), mean(&reference));
        let mut entry = DurationAnalysis::new(&comparison, relative);

        if let Some(config) = &self.config.bootstrap {
            match bootstrap_mean_difference(&candidate, &reference, config) {
                Ok(diff) => entry.bootstrap = Some(BootstrapDifference::from(&diff)),
                Err(e) => {
                    warn!(
                        variant = run.variant.name(),
                        operation,
                        error = %e,
                        "bootstrap skipped"
                    );
                }
            }
        }

        Section::Available(entry)
    }
}

fn mean(sample: &[f64]) -> f64 {
    sample.iter().sum::<f64>() / sample.len() as f64
}

fn validate(
    variants: &[VariantConfig],
    trial_count: usize,
    baseline: &str,
) -> Result<(), OrchestratorError> {
    if variants.is_empty() {
        return Err(OrchestratorError::NoVariants);
    }
    let mut seen = BTreeSet::new();
    for variant in variants {
        if !seen.insert(variant.name()) {
            return Err(OrchestratorError::DuplicateVariant(
                variant.name().to_string(),
            ));
        }
    }
    if !seen.contains(baseline) {
        return Err(OrchestratorError::UnknownBaseline(baseline.to_string()));
    }
    if trial_count == 0 {
        return Err(OrchestratorError::NoTrials);
    }
    Ok(())
}
