//! Candidate vs Baseline Comparison
//!
//! Ordinal, distribution-free effect size (how often candidate durations
//! exceed baseline durations) plus a Mann-Whitney rank-sum significance test.

use crate::distribution::normal_cdf;
use crate::error::{SampleRole, StatsError};
use crate::ranks::rank_sum;

/// Significance level for the rank-sum test
pub const SIGNIFICANCE_ALPHA: f64 = 0.05;

/// |effect| below this is negligible
pub const NEGLIGIBLE_THRESHOLD: f64 = 0.147;
/// |effect| below this is small
pub const SMALL_THRESHOLD: f64 = 0.33;
/// |effect| below this is medium, otherwise large
pub const MEDIUM_THRESHOLD: f64 = 0.474;

/// Qualitative magnitude of the ordinal effect size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectLabel {
    /// |δ| < 0.147
    Negligible,
    /// 0.147 <= |δ| < 0.33
    Small,
    /// 0.33 <= |δ| < 0.474
    Medium,
    /// |δ| >= 0.474
    Large,
}

impl EffectLabel {
    /// Label for an effect size; sign is ignored
    pub fn from_effect(effect: f64) -> Self {
        let magnitude = effect.abs();
        if magnitude < NEGLIGIBLE_THRESHOLD {
            EffectLabel::Negligible
        } else if magnitude < SMALL_THRESHOLD {
            EffectLabel::Small
        } else if magnitude < MEDIUM_THRESHOLD {
            EffectLabel::Medium
        } else {
            EffectLabel::Large
        }
    }

    /// Lowercase name as written to reports
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectLabel::Negligible => "negligible",
            EffectLabel::Small => "small",
            EffectLabel::Medium => "medium",
            EffectLabel::Large => "large",
        }
    }
}

impl std::fmt::Display for EffectLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EffectLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "negligible" => Ok(EffectLabel::Negligible),
            "small" => Ok(EffectLabel::Small),
            "medium" => Ok(EffectLabel::Medium),
            "large" => Ok(EffectLabel::Large),
            other => Err(format!("Unknown effect label: {}", other)),
        }
    }
}

/// Rank-sum test outcome.
///
/// All fields are `None` when the test could not be executed, which is
/// distinct from "executed and not significant".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignificanceTest {
    /// Mann-Whitney U of the candidate sample
    pub statistic: Option<f64>,
    /// Normal-approximation z score (continuity and tie corrected)
    pub z: Option<f64>,
    /// Two-sided p-value
    pub p_value: Option<f64>,
    /// p < 0.05
    pub significant: Option<bool>,
}

impl SignificanceTest {
    /// Whether the test ran
    pub fn is_executed(&self) -> bool {
        self.p_value.is_some()
    }
}

/// Result of comparing a candidate sample against a baseline sample
#[derive(Debug, Clone, PartialEq)]
pub struct EffectComparison {
    /// (more − less) / (|candidate| · |baseline|), in [-1, 1].
    /// Positive means candidate durations tend to be larger (slower).
    pub effect_size: f64,
    pub label: EffectLabel,
    pub significance: SignificanceTest,
    pub candidate_count: usize,
    pub baseline_count: usize,
}

/// Compare a candidate sample against a baseline sample.
///
/// Fails with [`StatsError::UndefinedComparison`] when either side is empty;
/// an undefined effect is never reported as zero.
pub fn compare(candidate: &[f64], baseline: &[f64]) -> Result<EffectComparison, StatsError> {
    if candidate.is_empty() {
        return Err(StatsError::UndefinedComparison(SampleRole::Candidate));
    }
    if baseline.is_empty() {
        return Err(StatsError::UndefinedComparison(SampleRole::Baseline));
    }

    let mut more: u64 = 0;
    let mut less: u64 = 0;
    for &c in candidate {
        for &b in baseline {
            if c > b {
                more += 1;
            } else if c < b {
                less += 1;
            }
        }
    }

    let pairs = (candidate.len() as f64) * (baseline.len() as f64);
    let effect_size = (more as f64 - less as f64) / pairs;

    Ok(EffectComparison {
        effect_size,
        label: EffectLabel::from_effect(effect_size),
        significance: mann_whitney(candidate, baseline),
        candidate_count: candidate.len(),
        baseline_count: baseline.len(),
    })
}

/// Two-sided Mann-Whitney U test via the normal approximation
fn mann_whitney(candidate: &[f64], baseline: &[f64]) -> SignificanceTest {
    let n1 = candidate.len() as f64;
    let n2 = baseline.len() as f64;
    let n = n1 + n2;

    let (rank_sum_candidate, tie_term) = rank_sum(candidate, baseline);
    let u = rank_sum_candidate - n1 * (n1 + 1.0) / 2.0;

    let mean_u = n1 * n2 / 2.0;
    let variance = if n > 1.0 {
        n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)))
    } else {
        0.0
    };

    if !(variance > 0.0) {
        // Every observation tied: the test is undefined
        return SignificanceTest::default();
    }

    let deviation = ((u - mean_u).abs() - 0.5).max(0.0);
    let z = deviation / variance.sqrt() * (u - mean_u).signum();
    let p_value = (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0);

    SignificanceTest {
        statistic: Some(u),
        z: Some(z),
        p_value: Some(p_value),
        significant: Some(p_value < SIGNIFICANCE_ALPHA),
    }
}

/// Relative change of the variant mean against the baseline mean, in percent.
///
/// `None` when the baseline mean is zero.
pub fn relative_percent(variant_mean: f64, baseline_mean: f64) -> Option<f64> {
    if baseline_mean == 0.0 {
        return None;
    }
    let change = (variant_mean - baseline_mean) / baseline_mean * 100.0;
    change.is_finite().then_some(change)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_samples_negligible() {
        let samples = vec![100.0, 102.0, 98.0, 101.0, 99.0, 100.0, 101.0, 99.0];
        let result = compare(&samples, &samples).unwrap();

        assert_eq!(result.effect_size, 0.0);
        assert_eq!(result.label, EffectLabel::Negligible);
        assert_eq!(result.significance.significant, Some(false));
    }

    #[test]
    fn test_clear_regression() {
        let baseline = vec![100.0, 102.0, 98.0, 101.0, 99.0, 100.0, 101.0, 99.0];
        let candidate = vec![200.0, 202.0, 198.0, 201.0, 199.0, 200.0, 201.0, 199.0];
        let result = compare(&candidate, &baseline).unwrap();

        assert_eq!(result.effect_size, 1.0);
        assert_eq!(result.label, EffectLabel::Large);
        assert_eq!(result.significance.statistic, Some(64.0));
        assert!(result.significance.p_value.unwrap() < 0.01);
        assert_eq!(result.significance.significant, Some(true));
    }

    #[test]
    fn test_clear_improvement() {
        let baseline = vec![200.0, 202.0, 198.0, 201.0, 199.0];
        let candidate = vec![100.0, 102.0, 98.0, 101.0, 99.0];
        let result = compare(&candidate, &baseline).unwrap();

        assert_eq!(result.effect_size, -1.0);
        assert_eq!(result.label, EffectLabel::Large);
        assert_eq!(result.significance.statistic, Some(0.0));
        assert!(result.significance.z.unwrap() < 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        let candidate = vec![2.0, 3.0, 4.0];
        let baseline = vec![1.0, 2.0, 3.0];
        // more: 2>1, 3>1, 3>2, 4>1, 4>2, 4>3 = 6; less: 2<3 = 1
        let result = compare(&candidate, &baseline).unwrap();
        assert!((result.effect_size - 5.0 / 9.0).abs() < 1e-12);
        assert_eq!(result.label, EffectLabel::Large);
    }

    #[test]
    fn test_antisymmetry() {
        let x = vec![3.0, 1.0, 4.0, 1.0, 5.0, 9.0];
        let y = vec![2.0, 6.0, 5.0, 3.0];
        let xy = compare(&x, &y).unwrap();
        let yx = compare(&y, &x).unwrap();
        assert_eq!(xy.effect_size, -yx.effect_size);
        assert_eq!(xy.label, yx.label);
    }

    #[test]
    fn test_all_tied_test_unexecuted() {
        let result = compare(&[5.0, 5.0, 5.0], &[5.0, 5.0]).unwrap();
        assert_eq!(result.effect_size, 0.0);
        assert!(!result.significance.is_executed());
        assert_eq!(result.significance.significant, None);
    }

    #[test]
    fn test_label_thresholds() {
        assert_eq!(EffectLabel::from_effect(0.0), EffectLabel::Negligible);
        assert_eq!(EffectLabel::from_effect(0.146), EffectLabel::Negligible);
        assert_eq!(EffectLabel::from_effect(0.147), EffectLabel::Small);
        assert_eq!(EffectLabel::from_effect(-0.32), EffectLabel::Small);
        assert_eq!(EffectLabel::from_effect(0.33), EffectLabel::Medium);
        assert_eq!(EffectLabel::from_effect(-0.474), EffectLabel::Large);
        assert_eq!(EffectLabel::from_effect(1.0), EffectLabel::Large);
    }

    #[test]
    fn test_label_round_trip_names() {
        for label in [
            EffectLabel::Negligible,
            EffectLabel::Small,
            EffectLabel::Medium,
            EffectLabel::Large,
        ] {
            assert_eq!(label.as_str().parse::<EffectLabel>(), Ok(label));
        }
        assert!("huge".parse::<EffectLabel>().is_err());
    }

    #[test]
    fn test_empty_samples() {
        assert_eq!(
            compare(&[], &[1.0, 2.0]),
            Err(StatsError::UndefinedComparison(SampleRole::Candidate))
        );
        assert_eq!(
            compare(&[1.0, 2.0], &[]),
            Err(StatsError::UndefinedComparison(SampleRole::Baseline))
        );
    }

    #[test]
    fn test_relative_percent() {
        assert_eq!(relative_percent(110.0, 100.0), Some(10.0));
        assert_eq!(relative_percent(50.0, 100.0), Some(-50.0));
        assert_eq!(relative_percent(5.0, 0.0), None);
    }
}
