#![warn(missing_docs)]
//! trialbench Statistical Engine
//!
//! Pure, side-effect-free reduction of timing samples:
//! - Summaries with rank-truncated quartiles and Student-t confidence intervals
//! - Ordinal (dominance) effect size with a fixed four-level label
//! - Mann-Whitney rank-sum significance test
//! - Parallel, seeded bootstrap of the difference of means
//!
//! Every function takes borrowed samples and returns owned results, so any
//! number of independent samples can be processed concurrently.

mod bootstrap;
mod comparison;
mod distribution;
mod error;
mod ranks;
mod summary;

pub use bootstrap::{BootstrapConfig, BootstrapError, MeanDifference, bootstrap_mean_difference};
pub use comparison::{
    EffectComparison, EffectLabel, MEDIUM_THRESHOLD, NEGLIGIBLE_THRESHOLD, SIGNIFICANCE_ALPHA,
    SMALL_THRESHOLD, SignificanceTest, compare, relative_percent,
};
pub use distribution::{normal_cdf, normal_quantile, student_t_quantile};
pub use error::{SampleRole, StatsError};
pub use ranks::Quartiles;
pub use summary::{
    ConfidenceInterval, ConfidenceMethod, FALLBACK_Z, StatisticalSummary, summarize,
    summarize_with,
};

/// Default number of bootstrap iterations
pub const DEFAULT_BOOTSTRAP_ITERATIONS: usize = 10_000;

/// Default confidence level (95%)
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Default base seed for bootstrap resampling
pub const DEFAULT_BOOTSTRAP_SEED: u64 = 0x5EED_7A1A;
