#![warn(missing_docs)]
//! trialbench CLI Library
//!
//! Command-line driver for benchmark experiments. Use `trialbench_cli::run()`
//! in a main function to get the full `trialbench` command:
//!
//! ```text
//! trialbench run -n 20 --warmup 3 --baseline full --format json -o report.json
//! trialbench list
//! trialbench init
//! trialbench show report.json
//! ```
//!
//! Settings are layered: built-in defaults → `trialbench.toml` → CLI flags.

mod config;
mod formatting;

pub use config::*;
pub use formatting::format_human_output;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trialbench_harness::{
    ExperimentOrchestrator, OrchestratorConfig, TrialRunner, VariantConfig, VariantProvisioner,
    VcsInit,
};
use trialbench_report::{ExperimentReport, OutputFormat, generate_json_report, load_report_file};

/// File name of the JSON report written to `[output] directory`
pub const REPORT_FILE: &str = "report.json";

/// trialbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "trialbench")]
#[command(
    author,
    version,
    about = "trialbench - benchmark experiments over feature-toggled workspace variants"
)]
pub struct Cli {
    /// Optional subcommand (Run, List, Init, Show); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (discovered from the current directory if not specified)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Measured trials per variant
    #[arg(long, short = 'n', global = true)]
    pub trials: Option<usize>,

    /// Discarded warmup trials per variant
    #[arg(long, global = true)]
    pub warmup: Option<usize>,

    /// Variant every other variant is compared against
    #[arg(long, global = true)]
    pub baseline: Option<String>,

    /// Run only variants whose name matches this regex
    #[arg(long, global = true)]
    pub variants: Option<String>,

    /// Run full, minimal and every single-capability ablation
    #[arg(long, global = true)]
    pub ablation: bool,

    /// Number of variants run concurrently
    #[arg(long, short = 'j', global = true)]
    pub jobs: Option<usize>,

    /// Per-operation timeout (e.g., "30s", "500ms")
    #[arg(long, global = true)]
    pub timeout: Option<String>,

    /// Parent directory for trial workspaces
    #[arg(long, global = true)]
    pub scratch_dir: Option<PathBuf>,

    /// Output format: json, human
    #[arg(long, global = true)]
    pub format: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Hide the progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the experiment (default)
    Run,
    /// List variants, capabilities and operations without running anything
    List,
    /// Write a commented trialbench.toml to the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Render a previously written JSON report
    Show {
        /// Path to the report
        #[arg(name = "REPORT")]
        report: PathBuf,
    },
}

/// Fully resolved experiment settings (config file + CLI overrides)
#[derive(Debug, Clone)]
pub struct ExperimentPlan {
    /// Variants to run, in declaration order
    pub variants: Vec<VariantConfig>,
    pub trial_count: usize,
    pub warmup_count: usize,
    pub baseline: String,
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub scratch_root: PathBuf,
    pub format: OutputFormat,
}

/// Run the trialbench CLI with the process arguments.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the trialbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Init { force }) => init_config(Path::new(CONFIG_FILE), force),
        Some(Commands::Show { ref report }) => show_report(&cli, report),
        Some(Commands::List) => {
            let config = load_config(&cli)?;
            list_variants(&cli, &config)
        }
        Some(Commands::Run) | None => {
            let config = load_config(&cli)?;
            run_experiment(&cli, &config)
        }
    }
}

/// `RUST_LOG` wins over the verbosity flag when set
fn init_logging(verbose: bool) {
    let default = if verbose {
        "trialbench=debug,trialbench_harness=debug,trialbench_cli=debug"
    } else {
        "trialbench=info,trialbench_harness=info,trialbench_cli=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> anyhow::Result<TrialConfig> {
    match &cli.config {
        Some(path) => TrialConfig::load(path),
        None => Ok(TrialConfig::discover()?.unwrap_or_default()),
    }
}

/// Layer CLI overrides on top of the configuration file
pub fn build_plan(cli: &Cli, config: &TrialConfig) -> anyhow::Result<ExperimentPlan> {
    let table = config.capability_table()?;

    let mut effective = config.clone();
    if cli.ablation {
        effective.experiment.ablation = true;
        effective.variants.clear();
    }
    let mut variants = effective.variants(&table)?;

    if let Some(pattern) = &cli.variants {
        let filter = Regex::new(pattern)
            .with_context(|| format!("invalid --variants pattern '{}'", pattern))?;
        variants.retain(|v| filter.is_match(v.name()));
        if variants.is_empty() {
            bail!("no variants match '{}'", pattern);
        }
    }

    let timeout = match &cli.timeout {
        Some(s) => Some(Duration::from_nanos(TrialConfig::parse_duration(s)?)),
        None => config.timeout()?,
    };

    let format_str = cli.format.as_deref().unwrap_or(&config.output.format);
    let format: OutputFormat = format_str.parse().map_err(anyhow::Error::msg)?;

    let scratch_root = cli
        .scratch_dir
        .clone()
        .or_else(|| config.experiment.scratch_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| std::env::temp_dir().join("trialbench"));

    Ok(ExperimentPlan {
        variants,
        trial_count: cli.trials.unwrap_or(config.experiment.trial_count),
        warmup_count: cli.warmup.unwrap_or(config.experiment.warmup_count),
        baseline: cli
            .baseline
            .clone()
            .unwrap_or_else(|| config.experiment.baseline.clone()),
        jobs: cli.jobs.unwrap_or(config.experiment.jobs).max(1),
        timeout,
        scratch_root,
        format,
    })
}

fn build_provisioner(config: &TrialConfig) -> anyhow::Result<VariantProvisioner> {
    let mut provisioner = VariantProvisioner::new(config.capability_table()?)
        .with_vcs(if config.workspace.init_vcs {
            VcsInit::Git
        } else {
            VcsInit::Skip
        })
        .with_project(&config.workspace.project)
        .with_phase(&config.workspace.phase);
    if let Some(template) = &config.workspace.template {
        provisioner = provisioner.with_template(template);
    }
    Ok(provisioner)
}

fn list_variants(cli: &Cli, config: &TrialConfig) -> anyhow::Result<()> {
    let plan = build_plan(cli, config)?;
    let table = config.capability_table()?;

    println!("trialbench Plan:");
    println!("├── capabilities");
    for capability in table.iter() {
        println!("│   ├── {} ({})", capability.name, capability.path.display());
    }
    println!("├── variants");
    for variant in &plan.variants {
        let enabled: Vec<&str> = variant.enabled().collect();
        let marker = if variant.name() == plan.baseline {
            " [baseline]"
        } else {
            ""
        };
        println!(
            "│   ├── {}{}: {}",
            variant.name(),
            marker,
            if enabled.is_empty() {
                "(none)".to_string()
            } else {
                enabled.join(", ")
            }
        );
    }
    println!("└── operations");
    for op in &config.operations {
        let requires = op
            .requires
            .as_deref()
            .map(|c| format!(" [requires {}]", c))
            .unwrap_or_default();
        println!(
            "    ├── {}: {} {}{}",
            op.name,
            op.program,
            op.args.join(" "),
            requires
        );
    }
    println!(
        "{} variants × ({} trials + {} warmup) = {} trials.",
        plan.variants.len(),
        plan.trial_count,
        plan.warmup_count,
        plan.variants.len() * (plan.trial_count + plan.warmup_count)
    );

    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, TrialConfig::default_toml())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Configuration written to: {}", path.display());
    Ok(())
}

fn show_report(cli: &Cli, path: &Path) -> anyhow::Result<()> {
    let report = load_report_file(path)?;
    let format: OutputFormat = cli
        .format
        .as_deref()
        .unwrap_or("human")
        .parse()
        .map_err(anyhow::Error::msg)?;
    emit(&render(&report, format)?, cli.output.as_deref())
}

fn render(report: &ExperimentReport, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => generate_json_report(report)?,
        OutputFormat::Human => format_human_output(report),
    })
}

fn emit(output: &str, path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            file.write_all(output.as_bytes())?;
            println!("Report written to: {}", path.display());
        }
        None => print!("{}", output),
    }
    Ok(())
}

fn run_experiment(cli: &Cli, config: &TrialConfig) -> anyhow::Result<()> {
    let plan = build_plan(cli, config)?;
    let operations = config.operations()?;

    let runner = TrialRunner::new(operations)
        .with_timeout(plan.timeout)
        .with_verbose(cli.verbose);

    let mut orchestrator_config = OrchestratorConfig::new(&plan.scratch_root);
    orchestrator_config.jobs = plan.jobs;
    orchestrator_config.show_progress = !cli.no_progress;
    orchestrator_config.bootstrap = config.bootstrap_config();
    orchestrator_config.confidence_method = config.experiment.confidence.into();

    if let Some(boot) = &orchestrator_config.bootstrap {
        if boot.iterations < 100 {
            warn!(
                iterations = boot.iterations,
                "bootstrap iterations very low; intervals will be unreliable"
            );
        }
    }

    // stdout carries only the rendered report
    eprintln!("{}", run_banner(&plan));

    let start_time = Instant::now();
    let orchestrator =
        ExperimentOrchestrator::new(build_provisioner(config)?, runner, orchestrator_config);
    let report = orchestrator.run(
        &plan.variants,
        plan.trial_count,
        plan.warmup_count,
        &plan.baseline,
    )?;
    info!(
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "experiment finished"
    );

    emit(&render(&report, plan.format)?, cli.output.as_deref())?;

    if let Some(dir) = &config.output.directory {
        let path = save_report(&report, Path::new(dir))?;
        info!(path = %path.display(), "report saved");
    }

    let unusable = report.unusable_variants();
    if !unusable.is_empty() {
        eprintln!(
            "\nNo usable samples for variant(s): {}",
            unusable.join(", ")
        );
        std::process::exit(1);
    }

    Ok(())
}

fn run_banner(plan: &ExperimentPlan) -> String {
    format!(
        "Running {} variants × {} trials (+{} warmup), {} job(s), scratch {}...\n",
        plan.variants.len(),
        plan.trial_count,
        plan.warmup_count,
        plan.jobs,
        plan.scratch_root.display()
    )
}

/// Write the JSON report into `dir`, creating it if needed
pub fn save_report(report: &ExperimentReport, dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(REPORT_FILE);
    std::fs::write(&path, generate_json_report(report)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["trialbench"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_from_config() {
        let plan = build_plan(&cli(&[]), &TrialConfig::default()).unwrap();

        assert_eq!(plan.trial_count, 10);
        assert_eq!(plan.warmup_count, 2);
        assert_eq!(plan.baseline, "full");
        assert_eq!(plan.jobs, 1);
        assert_eq!(plan.format, OutputFormat::Human);
        assert!(plan.timeout.is_none());
        let names: Vec<_> = plan.variants.iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["full", "minimal"]);
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = cli(&[
            "run",
            "-n",
            "3",
            "--warmup",
            "0",
            "--baseline",
            "minimal",
            "--jobs",
            "0",
            "--timeout",
            "250ms",
            "--format",
            "json",
            "--scratch-dir",
            "/tmp/tb-scratch",
        ]);
        assert!(matches!(args.command, Some(Commands::Run)));

        let plan = build_plan(&args, &TrialConfig::default()).unwrap();
        assert_eq!(plan.trial_count, 3);
        assert_eq!(plan.warmup_count, 0);
        assert_eq!(plan.baseline, "minimal");
        assert_eq!(plan.jobs, 1);
        assert_eq!(plan.timeout, Some(Duration::from_millis(250)));
        assert_eq!(plan.format, OutputFormat::Json);
        assert_eq!(plan.scratch_root, PathBuf::from("/tmp/tb-scratch"));
    }

    #[test]
    fn test_run_banner_describes_plan() {
        let args = cli(&["run", "-n", "4", "--warmup", "1", "--scratch-dir", "/tmp/tb"]);
        let plan = build_plan(&args, &TrialConfig::default()).unwrap();

        let banner = run_banner(&plan);
        assert!(banner.starts_with("Running 2 variants × 4 trials (+1 warmup), 1 job(s)"));
        assert!(banner.contains("scratch /tmp/tb"));
    }

    #[test]
    fn test_variant_filter() {
        let plan = build_plan(&cli(&["--ablation", "--variants", "^no_"]), &TrialConfig::default())
            .unwrap();
        let names: Vec<_> = plan.variants.iter().map(|v| v.name()).collect();
        assert_eq!(
            names,
            vec!["no_checkpoint_logging", "no_agent_registry", "no_skill_catalog"]
        );

        assert!(build_plan(&cli(&["--variants", "^nothing$"]), &TrialConfig::default()).is_err());
        assert!(build_plan(&cli(&["--variants", "("]), &TrialConfig::default()).is_err());
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(build_plan(&cli(&["--format", "html"]), &TrialConfig::default()).is_err());
    }

    #[test]
    fn test_show_subcommand() {
        let args = cli(&["show", "out/report.json", "--format", "json"]);
        match args.command {
            Some(Commands::Show { report }) => {
                assert_eq!(report, PathBuf::from("out/report.json"))
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(args.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        init_config(&path, false).unwrap();
        let config = TrialConfig::load(&path).unwrap();
        assert_eq!(config.operations().unwrap().len(), 2);

        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();
    }

    #[test]
    fn test_build_provisioner_from_config() {
        let config: TrialConfig = toml::from_str(
            r#"
            [workspace]
            init_vcs = false
            project = "demo"
            "#,
        )
        .unwrap();
        let provisioner = build_provisioner(&config).unwrap();
        assert_eq!(provisioner.table().len(), 3);
    }
}
