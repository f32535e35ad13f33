//! Command result codes shared by every dispatch path

use std::collections::BTreeMap;
use std::fmt;

/// Normalized outcome of a device command request.
///
/// Every failure branch of the dispatcher maps onto one of these codes;
/// callers branch on the code, never on transport error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    InvalidAccount,
    InvalidDevice,
    InvalidServer,
    NotAuthorized,
    OverLimit,
    InvalidCommand,
    InvalidArg,
    InvalidType,
    EmptyRequest,
    NotSupported,
    UnknownHost,
    TransmitFail,
    NoSession,
    InvalidProto,
    InvalidSms,
    InvalidPacket,
    InvalidEmailFrom,
    InvalidEmailTo,
    InternalError,
    GatewayError,
    GatewayConfig,
    GatewayAccount,
    GatewayUser,
    GatewayDevice,
    GatewayHost,
    GatewayPort,
    GatewayConnect,
}

impl ResultCode {
    /// All codes, in wire-code order
    pub const ALL: [ResultCode; 28] = [
        Self::Success,
        Self::InvalidAccount,
        Self::InvalidDevice,
        Self::InvalidServer,
        Self::NotAuthorized,
        Self::OverLimit,
        Self::InvalidCommand,
        Self::InvalidArg,
        Self::InvalidType,
        Self::EmptyRequest,
        Self::NotSupported,
        Self::UnknownHost,
        Self::TransmitFail,
        Self::NoSession,
        Self::InvalidProto,
        Self::InvalidSms,
        Self::InvalidPacket,
        Self::InvalidEmailFrom,
        Self::InvalidEmailTo,
        Self::InternalError,
        Self::GatewayError,
        Self::GatewayConfig,
        Self::GatewayAccount,
        Self::GatewayUser,
        Self::GatewayDevice,
        Self::GatewayHost,
        Self::GatewayPort,
        Self::GatewayConnect,
    ];

    /// Short wire code, e.g. `OK000` or `TX001`
    pub fn code(&self) -> &'static str {
        match self {
            Self::Success => "OK000",
            Self::InvalidAccount => "AC001",
            Self::InvalidDevice => "DV001",
            Self::InvalidServer => "SR001",
            Self::NotAuthorized => "AU001",
            Self::OverLimit => "AU002",
            Self::InvalidCommand => "CM001",
            Self::InvalidArg => "CM002",
            Self::InvalidType => "CM003",
            Self::EmptyRequest => "CM004",
            Self::NotSupported => "CM005",
            Self::UnknownHost => "HP001",
            Self::TransmitFail => "TX001",
            Self::NoSession => "TX002",
            Self::InvalidProto => "PR001",
            Self::InvalidSms => "PR002",
            Self::InvalidPacket => "PK001",
            Self::InvalidEmailFrom => "EM001",
            Self::InvalidEmailTo => "EM002",
            Self::InternalError => "XX001",
            Self::GatewayError => "GW001",
            Self::GatewayConfig => "GW010",
            Self::GatewayAccount => "GW011",
            Self::GatewayUser => "GW012",
            Self::GatewayDevice => "GW013",
            Self::GatewayHost => "GW014",
            Self::GatewayPort => "GW015",
            Self::GatewayConnect => "GW021",
        }
    }

    /// Default human-readable message
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "Successful",
            Self::InvalidAccount => "Invalid Account",
            Self::InvalidDevice => "Invalid Device",
            Self::InvalidServer => "Invalid Server",
            Self::NotAuthorized => "Not Authorized",
            Self::OverLimit => "Over Limit",
            Self::InvalidCommand => "Invalid command",
            Self::InvalidArg => "Invalid command/argument",
            Self::InvalidType => "Invalid command type",
            Self::EmptyRequest => "Invalid/Empty request",
            Self::NotSupported => "Not Supported by Device",
            Self::UnknownHost => "Invalid host",
            Self::TransmitFail => "Transmit failure",
            Self::NoSession => "No Active Session Found",
            Self::InvalidProto => "Invalid Protocol",
            Self::InvalidSms => "Invalid SMS specification",
            Self::InvalidPacket => "Invalid Packet",
            Self::InvalidEmailFrom => "Invalid EMail 'From' address",
            Self::InvalidEmailTo => "Invalid EMail 'To' address",
            Self::InternalError => "Internal Error",
            Self::GatewayError => "Gateway Error",
            Self::GatewayConfig => "Gateway Config",
            Self::GatewayAccount => "Gateway Account",
            Self::GatewayUser => "Gateway User",
            Self::GatewayDevice => "Gateway Device",
            Self::GatewayHost => "Gateway Host",
            Self::GatewayPort => "Gateway Port",
            Self::GatewayConnect => "Gateway Connect",
        }
    }

    /// Look up a code by its wire form (case-insensitive)
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|rc| rc.code().eq_ignore_ascii_case(code))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Outcome of one dispatch call. Created per call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub code: ResultCode,
    pub message: String,
    /// Parsed key/value response line, when a server answered
    pub response: Option<BTreeMap<String, String>>,
}

impl CommandResult {
    pub fn new(code: ResultCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            response: None,
        }
    }

    pub fn with_message(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            response: None,
        }
    }

    /// Interpret a server response line already split into key/value pairs.
    ///
    /// A blank or absent `result` counts as success. Codes this side does
    /// not know map to `InternalError`, keeping the raw code in the message.
    pub fn from_response(response: BTreeMap<String, String>) -> Self {
        let raw = response
            .get(RESPONSE_RESULT)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let reported = response
            .get(RESPONSE_MESSAGE)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let (code, message) = if raw.is_empty() {
            (ResultCode::Success, reported)
        } else {
            match ResultCode::from_code(&raw) {
                Some(code) => (code, reported),
                None => (
                    ResultCode::InternalError,
                    Some(format!("Unrecognized result code: {}", raw)),
                ),
            }
        };

        Self {
            code,
            message: message.unwrap_or_else(|| code.message().to_string()),
            response: Some(response),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

/// Response key carrying the result code
pub const RESPONSE_RESULT: &str = "result";
/// Response key carrying the result message
pub const RESPONSE_MESSAGE: &str = "message";
