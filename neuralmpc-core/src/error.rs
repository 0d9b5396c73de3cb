//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
///
/// Configuration and capability errors are fatal. A diverged rollout of a single
/// candidate is handled inside the optimizers, [`MpcError::DivergedRolloutError`]
/// reaches the caller only when no candidate survives.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MpcError {
    /// Invalid construction arguments, e.g. a dimension mismatch or a missing dynamics model.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The operation is not provided by this variant.
    #[error("Capability not provided by this variant: {0}")]
    CapabilityNotProvided(String),

    /// A simulated trajectory produced non-finite predictions.
    #[error("Diverged rollout: {0}")]
    DivergedRolloutError(String),

    /// An action or observation lies outside its declared bounds.
    #[error("Bounds violation: {0}")]
    BoundsViolationError(String),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}
