//! Report Data Structures
//!
//! The persisted experiment artifact. Durations are stored in milliseconds.
//! Every field is required. `Option` fields must be present and may be
//! `null`. A section whose statistics could not be computed is marked
//! `unavailable` with a reason instead of carrying a placeholder number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trialbench_stats::{EffectComparison, MeanDifference, SignificanceTest, StatisticalSummary};

/// Current report schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Complete experiment report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub schema_version: u32,
    /// Variant name → per-duration summaries and trial accounting
    pub variants: BTreeMap<String, VariantReport>,
    /// `"<variant>_vs_<baseline>"` → per-duration comparison
    pub analysis: BTreeMap<String, VariantAnalysis>,
    pub metadata: ReportMetadata,
}

impl ExperimentReport {
    /// Key under which `variant` is compared against `baseline`
    pub fn analysis_key(variant: &str, baseline: &str) -> String {
        format!("{}_vs_{}", variant, baseline)
    }

    /// Variants, in declaration order, without a single usable duration sample
    pub fn unusable_variants(&self) -> Vec<&str> {
        self.metadata
            .variants
            .iter()
            .filter(|name| {
                self.variants
                    .get(name.as_str())
                    .is_none_or(|v| !v.durations.values().any(Section::is_available))
            })
            .map(String::as_str)
            .collect()
    }

    /// Provisioning skips summed over all variants
    pub fn total_provisioning_skips(&self) -> usize {
        self.metadata.provisioning_skips.values().sum()
    }
}

/// A report section that is either computed or explicitly unavailable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> Section<T> {
    /// Mark a section unavailable with a reason
    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        Section::Unavailable {
            reason: reason.to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Section::Available(_))
    }

    /// The computed value, if any
    pub fn available(&self) -> Option<&T> {
        match self {
            Section::Available(value) => Some(value),
            Section::Unavailable { .. } => None,
        }
    }
}

/// Results for one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantReport {
    /// Enabled capabilities, sorted
    pub capabilities: Vec<String>,
    /// Named duration → summary of its retained sample
    pub durations: BTreeMap<String, Section<DurationSummary>>,
    pub trials: TrialAccounting,
}

/// How the retained trials of a variant came about
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrialAccounting {
    /// Measured trials requested
    pub attempted: usize,
    /// Measured trials that ran after successful provisioning
    pub executed: usize,
    /// Measured trials skipped because provisioning failed
    pub provisioning_skips: usize,
    /// Executed trials whose outcome flag is false
    pub failed: usize,
    /// failed / executed, 0 when nothing executed
    pub failure_rate: f64,
}

impl TrialAccounting {
    pub fn new(
        attempted: usize,
        executed: usize,
        provisioning_skips: usize,
        failed: usize,
    ) -> Self {
        let failure_rate = if executed == 0 {
            0.0
        } else {
            failed as f64 / executed as f64
        };
        Self {
            attempted,
            executed,
            provisioning_skips,
            failed,
            failure_rate,
        }
    }
}

/// Summary of one (variant, named duration) sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationSummary {
    pub count: usize,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub std_dev_ms: f64,
    pub q1_ms: f64,
    pub q3_ms: f64,
    pub iqr_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub ci_lower_ms: f64,
    pub ci_upper_ms: f64,
    pub ci_level: f64,
    /// `student_t` or `normal`
    pub ci_method: String,
    /// Coefficient of variation in percent
    pub cv_percent: f64,
}

impl From<&StatisticalSummary> for DurationSummary {
    fn from(stats: &StatisticalSummary) -> Self {
        Self {
            count: stats.count,
            mean_ms: stats.mean,
            median_ms: stats.median,
            std_dev_ms: stats.std_dev,
            q1_ms: stats.q1,
            q3_ms: stats.q3,
            iqr_ms: stats.iqr,
            min_ms: stats.min,
            max_ms: stats.max,
            ci_lower_ms: stats.confidence_interval.lower,
            ci_upper_ms: stats.confidence_interval.upper,
            ci_level: stats.confidence_interval.level,
            ci_method: stats.ci_method.to_string(),
            cv_percent: stats.coefficient_of_variation(),
        }
    }
}

/// One variant compared against the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantAnalysis {
    pub variant: String,
    pub baseline: String,
    pub durations: BTreeMap<String, Section<DurationAnalysis>>,
}

/// Comparison of one named duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationAnalysis {
    /// (variant_mean − baseline_mean) / baseline_mean × 100; `None` when the
    /// baseline mean is zero
    #[serde(deserialize_with = "Option::deserialize")]
    pub relative_percent: Option<f64>,
    /// Ordinal effect size in [-1, 1], positive when the variant is slower
    pub effect_size: f64,
    /// negligible, small, medium or large
    pub effect_label: String,
    pub significance: Significance,
    pub variant_count: usize,
    pub baseline_count: usize,
    /// `null` when the bootstrap was disabled or skipped
    #[serde(deserialize_with = "Option::deserialize")]
    pub bootstrap: Option<BootstrapDifference>,
}

impl DurationAnalysis {
    /// Combine an effect comparison with the relative change of the means
    pub fn new(comparison: &EffectComparison, relative_percent: Option<f64>) -> Self {
        Self {
            relative_percent,
            effect_size: comparison.effect_size,
            effect_label: comparison.label.to_string(),
            significance: Significance::from(&comparison.significance),
            variant_count: comparison.candidate_count,
            baseline_count: comparison.baseline_count,
            bootstrap: None,
        }
    }
}

/// Rank-sum test result. All fields are `null` when the test was not executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Significance {
    #[serde(deserialize_with = "Option::deserialize")]
    pub test: Option<String>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub statistic: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub z: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub p_value: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub significant: Option<bool>,
}

impl From<&SignificanceTest> for Significance {
    fn from(test: &SignificanceTest) -> Self {
        Self {
            test: test.is_executed().then(|| "mann_whitney_u".to_string()),
            statistic: test.statistic,
            z: test.z,
            p_value: test.p_value,
            significant: test.significant,
        }
    }
}

/// Bootstrap interval for mean(variant) − mean(baseline)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapDifference {
    pub point_estimate_ms: f64,
    pub ci_lower_ms: f64,
    pub ci_upper_ms: f64,
    pub ci_level: f64,
    pub standard_error_ms: f64,
    /// Fraction of resamples where the variant mean exceeds the baseline mean
    pub probability_slower: f64,
    pub iterations: usize,
}

impl From<&MeanDifference> for BootstrapDifference {
    fn from(diff: &MeanDifference) -> Self {
        Self {
            point_estimate_ms: diff.point_estimate,
            ci_lower_ms: diff.confidence_interval.lower,
            ci_upper_ms: diff.confidence_interval.upper,
            ci_level: diff.confidence_interval.level,
            standard_error_ms: diff.standard_error,
            probability_slower: diff.probability_slower,
            iterations: diff.iterations,
        }
    }
}

/// Run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Variant names in declaration order
    pub variants: Vec<String>,
    pub baseline: String,
    pub trial_count: usize,
    pub warmup_count: usize,
    pub timestamp: DateTime<Utc>,
    /// Tool version that produced the report
    pub version: String,
    /// Variant → provisioning failures (warmup and measured)
    pub provisioning_skips: BTreeMap<String, usize>,
    pub config: RunConfig,
}

/// Execution settings captured in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub jobs: usize,
    #[serde(deserialize_with = "Option::deserialize")]
    pub timeout_ms: Option<u64>,
    pub bootstrap_iterations: usize,
    pub confidence_method: String,
    /// Named operations in execution order
    pub operations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialbench_stats::{compare, summarize};

    #[test]
    fn test_summary_conversion() {
        let stats = summarize(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let summary = DurationSummary::from(&stats);

        assert_eq!(summary.count, 5);
        assert_eq!(summary.q1_ms, 2.0);
        assert_eq!(summary.q3_ms, 4.0);
        assert_eq!(summary.ci_method, "student_t");
        assert!(summary.ci_lower_ms < summary.mean_ms);
    }

    #[test]
    fn test_unexecuted_significance_is_empty() {
        let comparison = compare(&[5.0, 5.0], &[5.0, 5.0]).unwrap();
        let analysis = DurationAnalysis::new(&comparison, Some(0.0));

        assert_eq!(analysis.effect_label, "negligible");
        assert_eq!(analysis.significance.test, None);
        assert_eq!(analysis.significance.p_value, None);
        assert_eq!(analysis.significance.significant, None);
    }

    #[test]
    fn test_section_serializes_with_status_tag() {
        let section: Section<TrialAccounting> = Section::unavailable("cannot summarize");
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"], "cannot summarize");

        let available = Section::Available(TrialAccounting::new(10, 8, 2, 0));
        let json = serde_json::to_value(&available).unwrap();
        assert_eq!(json["status"], "available");
        assert_eq!(json["executed"], 8);
    }

    #[test]
    fn test_failure_rate() {
        assert_eq!(TrialAccounting::new(10, 0, 10, 0).failure_rate, 0.0);
        assert_eq!(TrialAccounting::new(10, 8, 2, 2).failure_rate, 0.25);
    }

    #[test]
    fn test_analysis_key() {
        assert_eq!(
            ExperimentReport::analysis_key("minimal", "full"),
            "minimal_vs_full"
        );
    }
}
