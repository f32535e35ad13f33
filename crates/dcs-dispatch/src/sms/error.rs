//! SMS gateway errors

use dcs_core::ResultCode;
use thiserror::Error;

/// Result type for SMS gateways
pub type SmsResult<T> = Result<T, SmsError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SmsError {
    /// Gateway configuration is unusable
    #[error("Gateway configuration error: {0}")]
    Config(String),

    /// Gateway rejected the account credentials
    #[error("Gateway account error: {0}")]
    Account(String),

    #[error("Gateway user error: {0}")]
    User(String),

    /// Device cannot be reached by SMS (e.g. no SIM phone number)
    #[error("Gateway device error: {0}")]
    Device(String),

    #[error("Gateway host error: {0}")]
    Host(String),

    #[error("Gateway port error: {0}")]
    Port(String),

    #[error("Gateway connection failed: {0}")]
    Connect(String),

    /// Gateway accepted the request but reported a failure
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Message text is empty or otherwise not sendable
    #[error("Invalid SMS: {0}")]
    InvalidSms(String),
}

impl SmsError {
    /// Result code reported to the dispatch caller
    pub fn result_code(&self) -> ResultCode {
        match self {
            SmsError::Config(_) => ResultCode::GatewayConfig,
            SmsError::Account(_) => ResultCode::GatewayAccount,
            SmsError::User(_) => ResultCode::GatewayUser,
            SmsError::Device(_) => ResultCode::GatewayDevice,
            SmsError::Host(_) => ResultCode::GatewayHost,
            SmsError::Port(_) => ResultCode::GatewayPort,
            SmsError::Connect(_) => ResultCode::GatewayConnect,
            SmsError::Gateway(_) => ResultCode::GatewayError,
            SmsError::InvalidSms(_) => ResultCode::InvalidSms,
        }
    }
}

impl From<reqwest::Error> for SmsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            SmsError::Connect(e.to_string())
        } else if e.is_builder() {
            SmsError::Config(e.to_string())
        } else {
            SmsError::Gateway(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes() {
        assert_eq!(SmsError::Config("x".into()).result_code().code(), "GW010");
        assert_eq!(SmsError::Device("x".into()).result_code().code(), "GW013");
        assert_eq!(SmsError::Connect("x".into()).result_code().code(), "GW021");
        assert_eq!(SmsError::InvalidSms("x".into()).result_code().code(), "PR002");
    }
}
