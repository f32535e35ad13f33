//! Command transport errors

use dcs_core::ResultCode;
use thiserror::Error;

/// Result type for command transports
pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unknown host: {0}")]
    UnknownHost(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// Result code reported to the dispatch caller
    pub fn result_code(&self) -> ResultCode {
        match self {
            TransportError::UnknownHost(_) => ResultCode::UnknownHost,
            TransportError::InvalidConfig(_) => ResultCode::InternalError,
            _ => ResultCode::TransmitFail,
        }
    }
}
