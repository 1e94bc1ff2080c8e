//! Bootstrap Resampling
//!
//! Percentile bootstrap of the difference of means between a candidate and a
//! baseline sample. Each iteration draws from its own RNG seeded with
//! `seed + iteration`, so results are reproducible and do not depend on how
//! Rayon splits the work.

use crate::summary::ConfidenceInterval;
use crate::{DEFAULT_BOOTSTRAP_ITERATIONS, DEFAULT_BOOTSTRAP_SEED, DEFAULT_CONFIDENCE_LEVEL};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::cmp::Ordering;
use thiserror::Error;

/// Bootstrap configuration
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Number of bootstrap iterations (default: 10,000)
    pub iterations: usize,
    /// Confidence level (default: 0.95 for 95% CI)
    pub confidence_level: f64,
    /// Whether to use parallel computation
    pub parallel: bool,
    /// Base seed for resampling
    pub seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_BOOTSTRAP_ITERATIONS,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            parallel: true,
            seed: DEFAULT_BOOTSTRAP_SEED,
        }
    }
}

/// Bootstrap estimate of mean(candidate) − mean(baseline)
#[derive(Debug, Clone)]
pub struct MeanDifference {
    /// Observed difference of sample means
    pub point_estimate: f64,
    /// Percentile interval of the resampled differences
    pub confidence_interval: ConfidenceInterval,
    /// Standard deviation of the resampled differences
    pub standard_error: f64,
    /// Fraction of resamples in which the candidate mean exceeds the baseline mean
    pub probability_slower: f64,
    /// Number of resamples drawn
    pub iterations: usize,
}

/// Errors that can occur during bootstrap
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BootstrapError {
    #[error("Candidate samples are empty")]
    EmptyCandidate,

    #[error("Baseline samples are empty")]
    EmptyBaseline,

    #[error("Bootstrap needs at least one iteration")]
    NoIterations,

    #[error("Invalid confidence level: {0} (must be between 0 and 1)")]
    InvalidConfidenceLevel(f64),
}

/// Bootstrap the difference of means between `candidate` and `baseline`
pub fn bootstrap_mean_difference(
    candidate: &[f64],
    baseline: &[f64],
    config: &BootstrapConfig,
) -> Result<MeanDifference, BootstrapError> {
    if candidate.is_empty() {
        return Err(BootstrapError::EmptyCandidate);
    }
    if baseline.is_empty() {
        return Err(BootstrapError::EmptyBaseline);
    }
    if config.iterations == 0 {
        return Err(BootstrapError::NoIterations);
    }
    if !(config.confidence_level > 0.0 && config.confidence_level < 1.0) {
        return Err(BootstrapError::InvalidConfidenceLevel(
            config.confidence_level,
        ));
    }

    let point_estimate = mean(candidate) - mean(baseline);

    let resample = |iteration: usize| {
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(iteration as u64));
        resampled_mean(candidate, &mut rng) - resampled_mean(baseline, &mut rng)
    };

    let mut diffs: Vec<f64> = if config.parallel {
        (0..config.iterations).into_par_iter().map(resample).collect()
    } else {
        (0..config.iterations).map(resample).collect()
    };

    let slower = diffs.iter().filter(|&&d| d > 0.0).count();
    let probability_slower = slower as f64 / config.iterations as f64;

    let diff_mean = mean(&diffs);
    let standard_error = (diffs.iter().map(|d| (d - diff_mean).powi(2)).sum::<f64>()
        / diffs.len() as f64)
        .sqrt();

    diffs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let (lower, upper) = percentile_interval(&diffs, config.confidence_level);

    Ok(MeanDifference {
        point_estimate,
        confidence_interval: ConfidenceInterval {
            lower,
            upper,
            level: config.confidence_level,
        },
        standard_error,
        probability_slower,
        iterations: config.iterations,
    })
}

/// Mean of one resample drawn with replacement
fn resampled_mean(samples: &[f64], rng: &mut StdRng) -> f64 {
    let n = samples.len();
    let sum: f64 = (0..n).map(|_| samples[rng.gen_range(0..n)]).sum();
    sum / n as f64
}

/// Standard percentile interval over sorted resamples
fn percentile_interval(sorted: &[f64], confidence: f64) -> (f64, f64) {
    let n = sorted.len();
    let alpha = (1.0 - confidence) / 2.0;

    let lower_idx = ((alpha * n as f64).floor() as usize).min(n - 1);
    let upper_idx = (((1.0 - alpha) * n as f64).floor() as usize).min(n - 1);

    (sorted[lower_idx], sorted[upper_idx])
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}
