//! dcs-dispatch - Command dispatch for device communication servers
//!
//! Sends operator commands to devices through the server that owns them:
//! as a `key=value` line over the server's TCP command port, or as SMS text
//! through a registered gateway when the server has no command port.

pub mod dispatcher;
pub mod locks;
pub mod sms;
pub mod transport;

pub use dispatcher::{command_request, CommandDispatcher, DispatcherSettings};
pub use locks::DeviceLocks;
pub use sms::{
    create_gateway, SmsError, SmsGateway, SmsGatewayConfig, SmsGatewayRegistry, SmsResult,
    DEFAULT_GATEWAY_NAME,
};
pub use transport::{
    create_transport, CommandTransport, IoTimeouts, TransportConfig, TransportError,
    TransportResult,
};
