//! Mock command transport for testing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{CommandTransport, IoTimeouts, TransportError, TransportResult};

/// Mock transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Line returned for every request
    #[serde(default = "default_response")]
    pub response: String,
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_response() -> String {
    "result=OK000".to_string()
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            response: default_response(),
            latency_ms: 0,
        }
    }
}

/// One request seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentLine {
    pub host: String,
    pub port: u16,
    pub request: String,
}

/// Records every request and answers with a canned line or error
pub struct MockCommandTransport {
    config: MockConfig,
    response: RwLock<Result<String, TransportError>>,
    sent: RwLock<Vec<SentLine>>,
    calls: AtomicUsize,
}

impl MockCommandTransport {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            config: config.clone(),
            response: RwLock::new(Ok(config.response.clone())),
            sent: RwLock::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer subsequent requests with `line`
    pub fn set_response(&self, line: impl Into<String>) {
        *self.response.write() = Ok(line.into());
    }

    /// Fail subsequent requests with `error`
    pub fn set_failure(&self, error: TransportError) {
        *self.response.write() = Err(error);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentLine> {
        self.sent.read().clone()
    }
}

impl Default for MockCommandTransport {
    fn default() -> Self {
        Self::new(&MockConfig::default())
    }
}

#[async_trait]
impl CommandTransport for MockCommandTransport {
    async fn send_line(
        &self,
        host: &str,
        port: u16,
        request: &str,
        _timeouts: IoTimeouts,
    ) -> TransportResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.write().push(SentLine {
            host: host.to_string(),
            port,
            request: request.to_string(),
        });

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        self.response.read().clone()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_requests() {
        let mock = MockCommandTransport::default();
        let reply = mock
            .send_line("localhost", 30400, "cmd\n", IoTimeouts::default())
            .await
            .unwrap();
        assert_eq!(reply, "result=OK000");
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.sent()[0].port, 30400);
    }

    #[tokio::test]
    async fn test_configured_failure() {
        let mock = MockCommandTransport::default();
        mock.set_failure(TransportError::ConnectionClosed);
        let err = mock
            .send_line("localhost", 1, "cmd\n", IoTimeouts::default())
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::ConnectionClosed);
    }

    #[test]
    fn test_config_from_toml() {
        let config: super::super::TransportConfig =
            toml::from_str("type = \"mock\"\nresponse = \"result=TX001\"\n").unwrap();
        match config {
            super::super::TransportConfig::Mock(cfg) => assert_eq!(cfg.response, "result=TX001"),
            other => panic!("unexpected config: {:?}", other),
        }
    }
}
