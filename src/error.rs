//! Error and warning types.
//!
//! Structural problems (bad shapes, missing group index, invalid configuration) are
//! returned as [`ModelError`] before any sampling happens. Sampler quality issues are
//! not errors: they are collected as [`SamplerWarning`]s on the fitted model.

use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised by model construction, fitting, prediction and preprocessing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// `predict` (or a trace accessor) was called before a successful `fit`.
    #[error("model has not been fitted; call `fit` first")]
    NotFitted,

    /// A variant-specific input required to build the model graph is missing.
    #[error("cannot build the {variant} model: missing {missing}")]
    NotBuilt {
        variant: &'static str,
        missing: &'static str,
    },

    /// Lengths of X, y or the group index disagree, or a group code is out of range.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A declared group has no observations and cannot be fit independently.
    #[error("group {group} has no observations")]
    EmptyGroup { group: usize },

    /// A power transform received a value outside its domain.
    #[error("degenerate transform input at index {index}: {value}")]
    DegenerateTransform { index: usize, value: f64 },

    /// Sampler or cross-validation configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Quantile probabilities must lie strictly inside (0, 1).
    #[error("quantile probability {0} is outside (0, 1)")]
    InvalidQuantile(f64),

    /// The fit was cancelled through its [`CancellationToken`](crate::sampler::CancellationToken).
    #[error("sampling was cancelled")]
    Cancelled,

    /// A distribution could not be constructed from posterior values.
    #[error("invalid distribution parameters: {0}")]
    Distribution(String),

    /// The worker pool for parallel chains could not be created.
    #[error("failed to build sampler thread pool: {0}")]
    ThreadPool(String),
}

/// Non-fatal sampler diagnostics.
///
/// The trace is still stored when these are raised; consumers decide whether the
/// draws are reliable enough for their purpose.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerWarning {
    /// Post-warm-up transitions that hit a numerically failed or extreme proposal.
    Divergences { chain: usize, count: usize },
    /// Split R-hat above the convergence threshold.
    HighRhat { parameter: String, r_hat: f64 },
    /// Effective sample size below the reliability threshold.
    LowEffectiveSampleSize { parameter: String, ess: f64 },
}

impl fmt::Display for SamplerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Divergences { chain, count } => {
                write!(f, "chain {chain}: {count} divergent transitions after tuning")
            }
            Self::HighRhat { parameter, r_hat } => {
                write!(f, "{parameter}: R-hat {r_hat:.3}, chains may not have converged")
            }
            Self::LowEffectiveSampleSize { parameter, ess } => {
                write!(f, "{parameter}: effective sample size {ess:.0} is low")
            }
        }
    }
}
