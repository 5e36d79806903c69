use thiserror::Error;

/// A result type for black-box optimization errors
pub type Result<T> = std::result::Result<T, OpenBoxError>;

/// An error for black-box optimization
#[derive(Error, Debug)]
pub enum OpenBoxError {
    /// When configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfigError(String),
    /// When an invalid value is encountered
    #[error("Value error: {0}")]
    InvalidValue(String),
    /// When no new configuration can be suggested
    #[error("No more candidates: {0}")]
    NoMoreCandidates(String),
    /// When a configuration space error occurs
    #[error(transparent)]
    SpaceError(#[from] openbox_space::SpaceError),
    /// When a surrogate model error occurs
    #[error("Surrogate error")]
    GpError(#[from] openbox_surrogate::GpError),
    /// When IO fails
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    /// When (de)serialization fails
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// When master/worker communication breaks the protocol
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    /// When a worker is rejected
    #[error("Authentication error: {0}")]
    AuthError(String),
    /// When an async task fails
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<tokio::task::JoinError> for OpenBoxError {
    fn from(err: tokio::task::JoinError) -> Self {
        OpenBoxError::RuntimeError(err.to_string())
    }
}
