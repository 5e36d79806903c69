use thiserror::Error;

/// A result type for configuration space handling
pub type Result<T> = std::result::Result<T, SpaceError>;

/// An error when building or using a [`ConfigSpace`](crate::ConfigSpace)
#[derive(Error, Debug)]
pub enum SpaceError {
    /// When a hyperparameter definition is inconsistent
    #[error("Invalid hyperparameter `{0}`: {1}")]
    InvalidHyperparameter(String, String),
    /// When two hyperparameters share the same name
    #[error("Duplicate hyperparameter name: {0}")]
    DuplicateName(String),
    /// When a configuration refers to a name absent from the space
    #[error("Unknown hyperparameter name: {0}")]
    UnknownName(String),
    /// When a value is out of its hyperparameter domain
    #[error("InvalidValue error: {0}")]
    InvalidValue(String),
}
