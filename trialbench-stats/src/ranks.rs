//! Rank-Based Order Statistics
//!
//! Quartiles here follow a fixed truncation rule rather than an interpolated
//! quantile definition: Q1 = sorted[n / 4], Q3 = sorted[3n / 4] (0-based).
//! Published figures were produced with this rule, so it must not change.

use std::cmp::Ordering;

/// First and third quartile of a sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quartiles {
    /// Element at index ⌊n/4⌋ of the sorted sample
    pub q1: f64,
    /// Element at index ⌊3n/4⌋ of the sorted sample
    pub q3: f64,
}

impl Quartiles {
    /// Interquartile range
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

/// Sorted copy of the sample, ascending
pub(crate) fn sorted(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Rank-truncated quartiles of an already sorted, non-empty sample
pub(crate) fn rank_quartiles(sorted: &[f64]) -> Quartiles {
    let n = sorted.len();
    Quartiles {
        q1: sorted[n / 4],
        q3: sorted[(3 * n / 4).min(n - 1)],
    }
}

/// Median of an already sorted, non-empty sample (mean of the middle pair for even n)
pub(crate) fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Mid-ranks (1-based, ties share the average rank) of the pooled samples.
///
/// Returns the rank sum of `first` and the tie term Σ(t³ − t) over tie groups.
pub(crate) fn rank_sum(first: &[f64], second: &[f64]) -> (f64, f64) {
    let mut pooled: Vec<(f64, bool)> = first
        .iter()
        .map(|&v| (v, true))
        .chain(second.iter().map(|&v| (v, false)))
        .collect();
    pooled.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let mut rank_sum_first = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < pooled.len() {
        let mut j = i + 1;
        while j < pooled.len() && pooled[j].0 == pooled[i].0 {
            j += 1;
        }
        // Positions i..j share ranks i+1..=j
        let mid_rank = (i + 1 + j) as f64 / 2.0;
        let ties = (j - i) as f64;
        tie_term += ties.powi(3) - ties;
        let from_first = pooled[i..j].iter().filter(|(_, first)| *first).count();
        rank_sum_first += mid_rank * from_first as f64;
        i = j;
    }

    (rank_sum_first, tie_term)
}
