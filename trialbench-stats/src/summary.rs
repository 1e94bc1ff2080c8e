//! Summary Statistics
//!
//! Reduces one sample of trial durations to a [`StatisticalSummary`]:
//! central tendency, spread, rank quartiles and a confidence interval for
//! the mean. Nothing is trimmed; every retained trial counts.

use crate::DEFAULT_CONFIDENCE_LEVEL;
use crate::distribution::student_t_quantile;
use crate::error::StatsError;
use crate::ranks::{median, rank_quartiles, sorted};

/// Critical value used when the t quantile cannot be evaluated
pub const FALLBACK_Z: f64 = 1.96;

/// How the confidence interval half-width is scaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfidenceMethod {
    /// Student-t quantile with n − 1 degrees of freedom
    #[default]
    StudentT,
    /// Fixed z = 1.96
    Normal,
}

impl std::fmt::Display for ConfidenceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceMethod::StudentT => write!(f, "student_t"),
            ConfidenceMethod::Normal => write!(f, "normal"),
        }
    }
}

/// Confidence interval bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

impl ConfidenceInterval {
    /// Whether `value` lies within the bounds (inclusive)
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Upper minus lower bound
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Summary of one sample. Immutable once computed.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticalSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (Bessel-corrected); 0 when count == 1
    pub std_dev: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub min: f64,
    pub max: f64,
    pub confidence_interval: ConfidenceInterval,
    /// Method that actually produced the interval
    pub ci_method: ConfidenceMethod,
}

impl StatisticalSummary {
    /// Coefficient of variation (relative stddev, percent)
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean == 0.0 {
            0.0
        } else {
            (self.std_dev / self.mean) * 100.0
        }
    }

    /// Check if distribution appears stable (low CV)
    pub fn is_stable(&self, cv_threshold: f64) -> bool {
        self.coefficient_of_variation() < cv_threshold
    }
}

/// Summarize a sample using a Student-t confidence interval.
///
/// # Examples
///
/// ```
/// # use trialbench_stats::summarize;
/// let summary = summarize(&[12.0, 10.0, 11.0, 13.0]).unwrap();
/// assert_eq!(summary.count, 4);
/// assert_eq!(summary.median, 11.5);
/// assert!(summary.confidence_interval.contains(summary.mean));
/// ```
pub fn summarize(samples: &[f64]) -> Result<StatisticalSummary, StatsError> {
    summarize_with(samples, ConfidenceMethod::default())
}

/// Summarize a sample with an explicit critical-value method
pub fn summarize_with(
    samples: &[f64],
    method: ConfidenceMethod,
) -> Result<StatisticalSummary, StatsError> {
    if samples.is_empty() {
        return Err(StatsError::EmptySample);
    }

    let sorted = sorted(samples);
    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;

    let std_dev = if n < 2 {
        0.0
    } else {
        let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt()
    };

    let quartiles = rank_quartiles(&sorted);

    let (confidence_interval, ci_method) = if n < 2 {
        (
            ConfidenceInterval {
                lower: mean,
                upper: mean,
                level: DEFAULT_CONFIDENCE_LEVEL,
            },
            method,
        )
    } else {
        let (critical, used) = critical_value(n - 1, method);
        let half_width = critical * (std_dev / (n as f64).sqrt());
        (
            ConfidenceInterval {
                lower: mean - half_width,
                upper: mean + half_width,
                level: DEFAULT_CONFIDENCE_LEVEL,
            },
            used,
        )
    };

    Ok(StatisticalSummary {
        count: n,
        mean,
        median: median(&sorted),
        std_dev,
        q1: quartiles.q1,
        q3: quartiles.q3,
        iqr: quartiles.iqr(),
        min: sorted[0],
        max: sorted[n - 1],
        confidence_interval,
        ci_method,
    })
}

/// Two-sided critical value at the default confidence level.
///
/// Falls back to z = 1.96 when the t quantile is unavailable.
fn critical_value(degrees_of_freedom: usize, method: ConfidenceMethod) -> (f64, ConfidenceMethod) {
    let p = 1.0 - (1.0 - DEFAULT_CONFIDENCE_LEVEL) / 2.0;
    match method {
        ConfidenceMethod::StudentT => match student_t_quantile(p, degrees_of_freedom) {
            Some(t) => (t, ConfidenceMethod::StudentT),
            None => (FALLBACK_Z, ConfidenceMethod::Normal),
        },
        ConfidenceMethod::Normal => (FALLBACK_Z, ConfidenceMethod::Normal),
    }
}
