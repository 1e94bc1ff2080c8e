use thiserror::Error;

/// Which side of a comparison a sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRole {
    /// The variant being evaluated
    Candidate,
    /// The reference variant
    Baseline,
}

impl std::fmt::Display for SampleRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleRole::Candidate => write!(f, "candidate"),
            SampleRole::Baseline => write!(f, "baseline"),
        }
    }
}

/// Errors from summarizing or comparing samples
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    /// A summary was requested for zero observations
    #[error("cannot summarize an empty sample")]
    EmptySample,

    /// Effect size is undefined when either side has no observations
    #[error("comparison undefined: {0} sample is empty")]
    UndefinedComparison(SampleRole),
}
