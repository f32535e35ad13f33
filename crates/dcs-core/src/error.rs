//! Error types for the device store seam

use thiserror::Error;

use crate::result::ResultCode;

/// Result type for device store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`DeviceStore`](crate::device::DeviceStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// Account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Device does not exist
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Backing store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Store file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store file content is invalid
    #[error("Parse error: {0}")]
    Parse(String),
}

impl StoreError {
    /// Result code reported to a dispatch caller for this error
    pub fn result_code(&self) -> ResultCode {
        match self {
            StoreError::AccountNotFound(_) => ResultCode::InvalidAccount,
            StoreError::DeviceNotFound(_) => ResultCode::InvalidDevice,
            StoreError::Unavailable(_) | StoreError::Io(_) | StoreError::Parse(_) => {
                ResultCode::InternalError
            }
        }
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(e: toml::de::Error) -> Self {
        StoreError::Parse(e.to_string())
    }
}
