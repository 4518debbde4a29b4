use thiserror::Error;

/// everything that can go wrong inside the learning core. errors surface
/// immediately, nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// missing or malformed construction input. fatal for the model instance.
    #[error("configuration: {0}")]
    Configuration(String),

    /// a required parameter was absent from a measurement. the caller can
    /// supply a complete measurement and retry.
    #[error("missing measurement: {0}")]
    MissingParameter(String),

    /// the operation requires a prior set_state.
    #[error("state has not been set")]
    StateNotSet,

    /// an unknown criterion, test, or algorithm name.
    #[error("parameter: {0}")]
    Parameter(String),

    /// a broken invariant. these signal bugs, are never expected to fire, and
    /// may leave the model in an undefined state.
    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
