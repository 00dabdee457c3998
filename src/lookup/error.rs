use std::fmt;

/// Errors constructing or driving a `LookupEngine`. Currently limited to
/// the concurrency-parameter validation spec.md §4.2 requires
/// (`0 < beta <= alpha`); the lookup itself never fails once started --
/// a silent peer is absorbed as a down contact, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    /// `alpha` (concurrency) must be positive.
    NonPositiveAlpha,
    /// `beta` (progress threshold) must be in `(0, alpha]`.
    InvalidBeta { alpha: usize, beta: usize },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LookupError::NonPositiveAlpha => write!(f, "alpha must be positive"),
            LookupError::InvalidBeta { alpha, beta } => {
                write!(f, "beta ({}) must be in (0, alpha={}]", beta, alpha)
            },
        }
    }
}

impl std::error::Error for LookupError {}
