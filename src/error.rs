//! Error type shared by every estimator and by the orchestrator.

use thiserror::Error;

/// Errors raised while validating inputs or computing estimates.
///
/// `Schema` and `Configuration` errors are raised eagerly, before any
/// estimator runs. The remaining kinds are attributed to a single estimator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpeError {
    /// Feedback record or tensor is malformed.
    #[error("schema error: {0}")]
    Schema(String),

    /// An estimator that needs a reward estimate was called without one.
    #[error("estimator `{estimator}` requires a reward estimate, but none was supplied")]
    MissingInput { estimator: String },

    /// Invalid estimator, bootstrap, or orchestrator configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Relative estimation error requested against a ground truth of exactly zero.
    #[error("relative estimation error is undefined for a ground truth of 0")]
    DivisionByZero,

    /// An importance weight (or a value weighted by it) overflowed to a non-finite number.
    #[error("estimator `{estimator}` produced a non-finite importance-weighted value at round {round}")]
    NonFiniteWeight { estimator: String, round: usize },

    /// Self-normalization divided by a zero total weight.
    #[error("estimator `{estimator}` cannot self-normalize: importance weights sum to 0")]
    ZeroWeightMass { estimator: String },
}

/// Crate result alias.
pub type Result<T> = std::result::Result<T, OpeError>;

impl OpeError {
    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn missing_input(estimator: &str) -> Self {
        Self::MissingInput {
            estimator: estimator.to_string(),
        }
    }
}
