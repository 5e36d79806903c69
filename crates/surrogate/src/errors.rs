use thiserror::Error;

/// A result type for surrogate modeling
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when training or using a surrogate model
#[derive(Error, Debug)]
pub enum GpError {
    /// When LikelihoodComputation computation fails
    #[error("LikelihoodComputation computation error: {0}")]
    LikelihoodComputationError(String),
    #[error(transparent)]
    /// When linear algebra computation fails
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When error dur to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
    /// When there is not enough training data
    #[error("Not enough training data: {0}")]
    EmptyData(String),
}
