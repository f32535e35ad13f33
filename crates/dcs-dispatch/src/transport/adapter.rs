//! Command transport trait

use std::time::Duration;

use async_trait::async_trait;

use super::TransportResult;

/// Bounds for one request/response exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoTimeouts {
    pub connect: Duration,
    /// Applies to the write and to the response read separately
    pub io: Duration,
}

impl Default for IoTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            io: Duration::from_secs(5),
        }
    }
}

/// Transport-agnostic interface for the server command port
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Send one request line to `host:port` and return the first response
    /// line, without its line terminator.
    ///
    /// `request` must already end in `\n`. The connection is closed before
    /// returning on every path.
    async fn send_line(
        &self,
        host: &str,
        port: u16,
        request: &str,
        timeouts: IoTimeouts,
    ) -> TransportResult<String>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
