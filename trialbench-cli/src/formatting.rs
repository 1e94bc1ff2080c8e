//! Output Formatting
//!
//! Human-readable rendering of an experiment report:
//! - Per-variant trial accounting and duration summaries (✓ available, ⊘ unavailable)
//! - Comparison tables against the baseline with relative change, effect and p-value

use trialbench_report::{DurationAnalysis, ExperimentReport, Section};

/// Format a report for human-readable terminal display
pub fn format_human_output(report: &ExperimentReport) -> String {
    let mut output = String::new();
    let meta = &report.metadata;

    output.push('\n');
    output.push_str("trialbench Results\n");
    output.push_str(&"=".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "baseline: {}  trials: {} (+{} warmup)  jobs: {}\n",
        meta.baseline, meta.trial_count, meta.warmup_count, meta.config.jobs
    ));
    output.push_str(&format!(
        "started: {}\n\n",
        meta.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    for name in &meta.variants {
        let Some(variant) = report.variants.get(name) else {
            continue;
        };

        output.push_str(&format!("Variant: {}\n", name));
        output.push_str(&"-".repeat(60));
        output.push('\n');

        let capabilities = if variant.capabilities.is_empty() {
            "(none)".to_string()
        } else {
            variant.capabilities.join(", ")
        };
        output.push_str(&format!("  capabilities: {}\n", capabilities));

        let trials = &variant.trials;
        output.push_str(&format!(
            "  trials: {} attempted, {} executed, {} failed ({:.1}%)",
            trials.attempted,
            trials.executed,
            trials.failed,
            trials.failure_rate * 100.0
        ));
        if trials.provisioning_skips > 0 {
            output.push_str(&format!(
                ", {} skipped (provisioning)",
                trials.provisioning_skips
            ));
        }
        output.push('\n');

        for (operation, section) in &variant.durations {
            match section {
                Section::Available(summary) => {
                    output.push_str(&format!("  ✓ {}\n", operation));
                    output.push_str(&format!(
                        "      mean: {:.2} ms  median: {:.2} ms  stddev: {:.2} ms\n",
                        summary.mean_ms, summary.median_ms, summary.std_dev_ms
                    ));
                    output.push_str(&format!(
                        "      min: {:.2} ms  max: {:.2} ms  samples: {}\n",
                        summary.min_ms, summary.max_ms, summary.count
                    ));
                    output.push_str(&format!(
                        "      q1: {:.2} ms  q3: {:.2} ms  iqr: {:.2} ms  cv: {:.1}%\n",
                        summary.q1_ms, summary.q3_ms, summary.iqr_ms, summary.cv_percent
                    ));
                    output.push_str(&format!(
                        "      {:.0}% CI: [{:.2}, {:.2}] ms ({})\n",
                        summary.ci_level * 100.0,
                        summary.ci_lower_ms,
                        summary.ci_upper_ms,
                        summary.ci_method
                    ));
                }
                Section::Unavailable { reason } => {
                    output.push_str(&format!("  ⊘ {}: unavailable ({})\n", operation, reason));
                }
            }
        }
        output.push('\n');
    }

    for name in &meta.variants {
        let key = ExperimentReport::analysis_key(name, &meta.baseline);
        let Some(analysis) = report.analysis.get(&key) else {
            continue;
        };

        output.push_str(&format!("\n{} vs {}\n", analysis.variant, analysis.baseline));
        output.push_str(&"-".repeat(60));
        output.push('\n');

        let width = analysis
            .durations
            .keys()
            .map(|k| k.len())
            .max()
            .unwrap_or(10)
            .max("Operation".len());

        output.push_str(&format!(
            "  {:<width$}  {:>10}  {:>8}  {:>10}  {:>8}\n",
            "Operation",
            "Change",
            "Effect",
            "Magnitude",
            "p-value",
            width = width
        ));
        output.push_str(&format!("  {}\n", "-".repeat(width + 44)));

        for (operation, section) in &analysis.durations {
            match section {
                Section::Available(entry) => {
                    output.push_str(&format_analysis_row(operation, entry, width));
                    if let Some(boot) = &entry.bootstrap {
                        output.push_str(&format!(
                            "  {:<width$}  Δmean {:+.2} ms  {:.0}% CI [{:+.2}, {:+.2}]  P(slower) {:.2}\n",
                            "",
                            boot.point_estimate_ms,
                            boot.ci_level * 100.0,
                            boot.ci_lower_ms,
                            boot.ci_upper_ms,
                            boot.probability_slower,
                            width = width
                        ));
                    }
                }
                Section::Unavailable { reason } => {
                    output.push_str(&format!(
                        "  {:<width$}  unavailable ({})\n",
                        operation,
                        reason,
                        width = width
                    ));
                }
            }
        }
    }

    let unusable = report.unusable_variants();
    let skips = report.total_provisioning_skips();
    if !unusable.is_empty() || skips > 0 {
        output.push('\n');
        output.push_str(&"=".repeat(60));
        output.push('\n');
        if skips > 0 {
            output.push_str(&format!(
                "{} trial(s) skipped because provisioning failed\n",
                skips
            ));
        }
        if !unusable.is_empty() {
            output.push_str(&format!(
                "no usable samples for: {}\n",
                unusable.join(", ")
            ));
        }
    }

    output
}

fn format_analysis_row(operation: &str, entry: &DurationAnalysis, width: usize) -> String {
    let change = match entry.relative_percent {
        Some(pct) => format!("{:+.1}%", pct),
        None => "n/a".to_string(),
    };
    let p_value = match (entry.significance.p_value, entry.significance.significant) {
        (Some(p), Some(true)) => format!("{:.4}*", p),
        (Some(p), _) => format!("{:.4}", p),
        (None, _) => "n/a".to_string(),
    };
    format!(
        "  {:<width$}  {:>10}  {:>+8.3}  {:>10}  {:>8}\n",
        operation,
        change,
        entry.effect_size,
        entry.effect_label,
        p_value,
        width = width
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use trialbench_report::{
        DurationSummary, ReportMetadata, RunConfig, SCHEMA_VERSION, TrialAccounting,
        VariantAnalysis, VariantReport,
    };
    use trialbench_stats::{compare, summarize};

    fn variant_report(sample: &[f64], attempted: usize, skips: usize) -> VariantReport {
        let mut durations = BTreeMap::new();
        durations.insert(
            "setup".to_string(),
            Section::Available(DurationSummary::from(&summarize(sample).unwrap())),
        );
        durations.insert(
            "checkpoint".to_string(),
            Section::unavailable("no successful samples"),
        );
        VariantReport {
            capabilities: vec!["checkpoint_logging".to_string()],
            durations,
            trials: TrialAccounting::new(attempted, sample.len(), skips, 0),
        }
    }

    fn dummy_report() -> ExperimentReport {
        let full = [10.0, 11.0, 12.0, 10.5, 11.5];
        let minimal = [8.0, 8.5, 9.0, 8.2, 8.8];

        let mut variants = BTreeMap::new();
        variants.insert("full".to_string(), variant_report(&full, 5, 0));
        variants.insert("minimal".to_string(), variant_report(&minimal, 6, 1));

        let comparison = compare(&minimal, &full).unwrap();
        let mut durations = BTreeMap::new();
        durations.insert(
            "setup".to_string(),
            Section::Available(DurationAnalysis::new(&comparison, Some(-22.6))),
        );
        durations.insert(
            "checkpoint".to_string(),
            Section::unavailable("baseline has no samples"),
        );
        let mut analysis = BTreeMap::new();
        analysis.insert(
            "minimal_vs_full".to_string(),
            VariantAnalysis {
                variant: "minimal".to_string(),
                baseline: "full".to_string(),
                durations,
            },
        );

        let mut skips = BTreeMap::new();
        skips.insert("minimal".to_string(), 1);

        ExperimentReport {
            schema_version: SCHEMA_VERSION,
            variants,
            analysis,
            metadata: ReportMetadata {
                variants: vec!["full".to_string(), "minimal".to_string()],
                baseline: "full".to_string(),
                trial_count: 5,
                warmup_count: 1,
                timestamp: chrono::Utc::now(),
                version: "0.1.0".to_string(),
                provisioning_skips: skips,
                config: RunConfig {
                    jobs: 1,
                    timeout_ms: None,
                    bootstrap_iterations: 0,
                    confidence_method: "student_t".to_string(),
                    operations: vec!["setup".to_string(), "checkpoint".to_string()],
                },
            },
        }
    }

    #[test]
    fn test_human_output_sections() {
        let output = format_human_output(&dummy_report());

        assert!(output.contains("trialbench Results"));
        assert!(output.contains("Variant: full"));
        assert!(output.contains("Variant: minimal"));
        assert!(output.contains("✓ setup"));
        assert!(output.contains("⊘ checkpoint: unavailable (no successful samples)"));
        assert!(output.contains("minimal vs full"));
        assert!(output.contains("-22.6%"));
        assert!(output.contains("large"));
        assert!(output.contains("1 skipped (provisioning)"));
        assert!(output.contains("1 trial(s) skipped because provisioning failed"));
    }

    #[test]
    fn test_variants_in_declaration_order() {
        let mut report = dummy_report();
        report.metadata.variants = vec!["minimal".to_string(), "full".to_string()];
        report.metadata.baseline = "minimal".to_string();

        let output = format_human_output(&report);
        let minimal = output.find("Variant: minimal").unwrap();
        let full = output.find("Variant: full").unwrap();
        assert!(minimal < full);
        // Keyed against the old baseline, so no comparison is rendered
        assert!(!output.contains("minimal vs full"));
    }

    #[test]
    fn test_unusable_variants_listed() {
        let mut report = dummy_report();
        if let Some(minimal) = report.variants.get_mut("minimal") {
            for section in minimal.durations.values_mut() {
                *section = Section::unavailable("all trials failed");
            }
        }

        let output = format_human_output(&report);
        assert!(output.contains("no usable samples for: minimal"));
    }
}
