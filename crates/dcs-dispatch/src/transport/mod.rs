//! Transport layer for command dispatch
//!
//! A communication server accepts commands on its dispatch port as one
//! `key=value` line and answers with one line:
//! - TCP adapter for live servers
//! - Mock adapter for testing
//!
//! # Example
//!
//! ```ignore
//! use dcs_dispatch::transport::{create_transport, TransportConfig};
//!
//! let transport = create_transport(&TransportConfig::default())?;
//! let reply = transport
//!     .send_line("localhost", 30400, "account=demo device=t1", IoTimeouts::default())
//!     .await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;
pub mod tcp;

pub use adapter::{CommandTransport, IoTimeouts};
pub use error::{TransportError, TransportResult};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Plain TCP to the server's dispatch port
    Tcp,
    /// Canned responses for testing
    Mock(mock::MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Tcp
    }
}

/// Create a command transport based on configuration
pub fn create_transport(config: &TransportConfig) -> TransportResult<Arc<dyn CommandTransport>> {
    match config {
        TransportConfig::Tcp => Ok(Arc::new(tcp::TcpCommandTransport::new())),
        TransportConfig::Mock(cfg) => Ok(Arc::new(mock::MockCommandTransport::new(cfg))),
    }
}
