//! Configuration loading from trialbench.toml
//!
//! An experiment is described by a `trialbench.toml` file in the project root.
//! The configuration is discovered by walking up from the current directory.

use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use trialbench_harness::{
    Capability, CapabilityTable, Neutralization, OperationSpec, VariantConfig,
};
use trialbench_stats::{BootstrapConfig, ConfidenceMethod, DEFAULT_BOOTSTRAP_SEED};

/// Name of the configuration file looked up by [`TrialConfig::discover`]
pub const CONFIG_FILE: &str = "trialbench.toml";

/// trialbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrialConfig {
    /// Trial counts, baseline and execution settings
    #[serde(default)]
    pub experiment: ExperimentConfig,
    /// Workspace template and state descriptor
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Capability table; empty means the standard table
    #[serde(default)]
    pub capabilities: Vec<CapabilityEntry>,
    /// Variants in declaration order; empty means `full` and `minimal`
    #[serde(default)]
    pub variants: Vec<VariantEntry>,
    /// Timed operations in execution order
    #[serde(default)]
    pub operations: Vec<OperationEntry>,
    /// Bootstrap of the mean difference
    #[serde(default)]
    pub bootstrap: BootstrapSection,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Critical value used for confidence intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceSetting {
    /// Student-t quantile with n - 1 degrees of freedom (default)
    #[default]
    StudentT,
    /// Fixed z = 1.96
    Normal,
}

impl From<ConfidenceSetting> for ConfidenceMethod {
    fn from(setting: ConfidenceSetting) -> Self {
        match setting {
            ConfidenceSetting::StudentT => ConfidenceMethod::StudentT,
            ConfidenceSetting::Normal => ConfidenceMethod::Normal,
        }
    }
}

/// Experiment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Measured trials per variant
    #[serde(default = "default_trial_count")]
    pub trial_count: usize,
    /// Discarded trials per variant, run before the measured ones
    #[serde(default = "default_warmup_count")]
    pub warmup_count: usize,
    /// Variant every other variant is compared against
    #[serde(default = "default_baseline")]
    pub baseline: String,
    /// Parent directory for trial workspaces (system temp dir if unset)
    #[serde(default)]
    pub scratch_dir: Option<String>,
    /// Variants run concurrently
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    /// Per-operation timeout (e.g., "60s"); unset means no timeout
    #[serde(default)]
    pub timeout: Option<String>,
    /// "student-t" or "normal"
    #[serde(default)]
    pub confidence: ConfidenceSetting,
    /// Without explicit variants, run full, minimal and every single-capability ablation
    #[serde(default)]
    pub ablation: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            trial_count: default_trial_count(),
            warmup_count: default_warmup_count(),
            baseline: default_baseline(),
            scratch_dir: None,
            jobs: default_jobs(),
            timeout: None,
            confidence: ConfidenceSetting::default(),
            ablation: false,
        }
    }
}

fn default_trial_count() -> usize {
    10
}
fn default_warmup_count() -> usize {
    2
}
fn default_baseline() -> String {
    "full".to_string()
}
fn default_jobs() -> usize {
    1
}

/// Workspace provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory copied verbatim into every trial workspace
    #[serde(default)]
    pub template: Option<String>,
    /// Run `git init` in every trial workspace
    #[serde(default = "default_init_vcs")]
    pub init_vcs: bool,
    /// Project identity written to the state descriptor
    #[serde(default = "default_project")]
    pub project: String,
    /// Phase written to the state descriptor
    #[serde(default = "default_phase")]
    pub phase: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            template: None,
            init_vcs: default_init_vcs(),
            project: default_project(),
            phase: default_phase(),
        }
    }
}

fn default_init_vcs() -> bool {
    true
}
fn default_project() -> String {
    "trialbench".to_string()
}
fn default_phase() -> String {
    "baseline".to_string()
}

/// How a disabled capability is neutralised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NeutralizeKind {
    /// Replace with a script that exits 0
    NoopExecutable,
    /// Replace with `content`
    EmptyDocument,
}

/// One `[[capabilities]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityEntry {
    /// Capability name
    pub name: String,
    /// Artifact path relative to the workspace
    pub path: String,
    /// Neutralisation kind
    pub neutralize: NeutralizeKind,
    /// Content for `empty-document`
    #[serde(default)]
    pub content: Option<String>,
}

/// One `[[variants]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantEntry {
    /// Variant name
    pub name: String,
    /// Capabilities kept enabled
    #[serde(default)]
    pub enabled: Vec<String>,
}

/// One `[[operations]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEntry {
    /// Name of the duration this operation produces
    pub name: String,
    /// Executable to launch
    pub program: String,
    /// Arguments; `{trial}`, `{variant}` and `{workspace}` are substituted
    #[serde(default)]
    pub args: Vec<String>,
    /// Capability that must be enabled for the operation to run
    #[serde(default)]
    pub requires: Option<String>,
}

/// Bootstrap settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSection {
    /// Resamples per comparison; 0 disables the bootstrap
    #[serde(default = "default_bootstrap_iterations")]
    pub iterations: usize,
    /// Confidence level (e.g., 0.95 for 95%)
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    /// Base seed for resampling
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for BootstrapSection {
    fn default() -> Self {
        Self {
            iterations: default_bootstrap_iterations(),
            confidence_level: default_confidence_level(),
            seed: None,
        }
    }
}

fn default_bootstrap_iterations() -> usize {
    10_000
}
fn default_confidence_level() -> f64 {
    0.95
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human" or "json"
    #[serde(default = "default_format")]
    pub format: String,
    /// Directory the JSON report is written to after each run
    #[serde(default)]
    pub directory: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            directory: None,
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}

impl TrialConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Find `trialbench.toml` by walking up from the current directory
    pub fn discover_path() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Discover and load the configuration; `None` if no file exists
    pub fn discover() -> anyhow::Result<Option<Self>> {
        Self::discover_path().map(Self::load).transpose()
    }

    /// Capability table, the standard one when none is configured
    pub fn capability_table(&self) -> anyhow::Result<CapabilityTable> {
        if self.capabilities.is_empty() {
            return Ok(CapabilityTable::standard());
        }
        let entries = self
            .capabilities
            .iter()
            .map(|entry| {
                let neutralization = match entry.neutralize {
                    NeutralizeKind::NoopExecutable => Neutralization::NoopExecutable,
                    NeutralizeKind::EmptyDocument => Neutralization::EmptyDocument {
                        content: entry.content.clone().unwrap_or_default(),
                    },
                };
                Capability::new(&entry.name, &entry.path, neutralization)
            })
            .collect();
        Ok(CapabilityTable::new(entries)?)
    }

    /// Variants in declaration order, validated against `table`
    pub fn variants(&self, table: &CapabilityTable) -> anyhow::Result<Vec<VariantConfig>> {
        let variants = if !self.variants.is_empty() {
            self.variants
                .iter()
                .map(|entry| VariantConfig::new(&entry.name, entry.enabled.iter().cloned()))
                .collect::<Result<Vec<_>, _>>()?
        } else if self.experiment.ablation {
            table.ablation_variants()
        } else {
            vec![VariantConfig::full(table), VariantConfig::minimal()]
        };

        for variant in &variants {
            table.validate(variant)?;
        }
        Ok(variants)
    }

    /// Timed operations in execution order
    pub fn operations(&self) -> anyhow::Result<Vec<OperationSpec>> {
        if self.operations.is_empty() {
            bail!("no [[operations]] configured; run `trialbench init` for an example");
        }
        Ok(self
            .operations
            .iter()
            .map(|entry| {
                let op = OperationSpec::new(&entry.name, &entry.program).args(entry.args.clone());
                match &entry.requires {
                    Some(capability) => op.requires(capability),
                    None => op,
                }
            })
            .collect())
    }

    /// Parsed per-operation timeout
    pub fn timeout(&self) -> anyhow::Result<Option<Duration>> {
        self.experiment
            .timeout
            .as_deref()
            .map(|s| Self::parse_duration(s).map(Duration::from_nanos))
            .transpose()
    }

    /// Bootstrap configuration; `None` when disabled
    pub fn bootstrap_config(&self) -> Option<BootstrapConfig> {
        (self.bootstrap.iterations > 0).then(|| BootstrapConfig {
            iterations: self.bootstrap.iterations,
            confidence_level: self.bootstrap.confidence_level,
            parallel: true,
            seed: self.bootstrap.seed.unwrap_or(DEFAULT_BOOTSTRAP_SEED),
        })
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# trialbench configuration

[experiment]
# Measured trials per variant
trial_count = 10
# Discarded warmup trials per variant, run first
warmup_count = 2
# Variant every other variant is compared against
baseline = "full"
# Variants run concurrently (trials of one variant are always sequential)
jobs = 1
# Per-operation timeout (uncomment to enable)
# timeout = "60s"
# Confidence interval critical value: "student-t" or "normal"
confidence = "student-t"
# Parent directory for trial workspaces (uncomment to override the temp dir)
# scratch_dir = "target/trialbench/scratch"
# Without [[variants]], also run one variant per disabled capability
ablation = false

[workspace]
# Directory copied into every trial workspace (uncomment to enable)
# template = "fixtures/workspace"
# Initialise a git repository in every workspace
init_vcs = true
project = "trialbench"
phase = "baseline"

[[capabilities]]
name = "checkpoint_logging"
path = "hooks/checkpoint.sh"
neutralize = "noop-executable"

[[capabilities]]
name = "agent_registry"
path = "agents/registry.json"
neutralize = "empty-document"
content = "{\"agents\": []}\n"

[[capabilities]]
name = "skill_catalog"
path = "skills/catalog.json"
neutralize = "empty-document"
content = "{\"skills\": []}\n"

[[variants]]
name = "full"
enabled = ["checkpoint_logging", "agent_registry", "skill_catalog"]

[[variants]]
name = "minimal"
enabled = []

# Each operation is timed separately; {trial}, {variant} and {workspace}
# are substituted in program and args.
[[operations]]
name = "setup"
program = "git"
args = ["status", "--short"]

[[operations]]
name = "checkpoint"
program = "/bin/sh"
args = ["-c", "test ! -x hooks/checkpoint.sh || ./hooks/checkpoint.sh {trial}"]
requires = "checkpoint_logging"

[bootstrap]
# Resamples for the mean-difference interval (0 disables)
iterations = 10000
confidence_level = 0.95

[output]
# Default output format: human or json
format = "human"
# Directory the JSON report is written to (uncomment to enable)
# directory = "target/trialbench"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow!("Empty duration string"));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid duration number: {}", num_part))?;
        if !(value >= 0.0 && value.is_finite()) {
            return Err(anyhow!("Duration must be non-negative: {}", s));
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" => 1_000,
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => return Err(anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok((value * multiplier as f64) as u64)
    }
}
