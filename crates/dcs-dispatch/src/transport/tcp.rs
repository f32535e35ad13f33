//! TCP command transport

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{CommandTransport, IoTimeouts, TransportError, TransportResult};

/// Longest response line accepted, terminator included
pub const MAX_RESPONSE_LINE: u64 = 8 * 1024;

/// Opens a fresh connection per request
#[derive(Debug, Clone, Default)]
pub struct TcpCommandTransport;

impl TcpCommandTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandTransport for TcpCommandTransport {
    async fn send_line(
        &self,
        host: &str,
        port: u16,
        request: &str,
        timeouts: IoTimeouts,
    ) -> TransportResult<String> {
        let addr = format!("{}:{}", host, port);

        let mut addrs = timeout(timeouts.connect, tokio::net::lookup_host(addr.as_str()))
            .await
            .map_err(|_| TransportError::Timeout("Host lookup timeout".into()))?
            .map_err(|e| TransportError::UnknownHost(format!("{}: {}", host, e)))?;
        let target = addrs
            .next()
            .ok_or_else(|| TransportError::UnknownHost(host.to_string()))?;

        let mut stream = timeout(timeouts.connect, TcpStream::connect(target))
            .await
            .map_err(|_| TransportError::Timeout("Connection timeout".into()))?
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        debug!(addr = %addr, "Connected to command port");

        timeout(timeouts.io, async {
            stream.write_all(request.as_bytes()).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| TransportError::Timeout("Write timeout".into()))?
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let mut reader = BufReader::new(stream.take(MAX_RESPONSE_LINE));
        let mut line = String::new();
        let read = timeout(timeouts.io, reader.read_line(&mut line))
            .await
            .map_err(|_| TransportError::Timeout("Response timeout".into()))?
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        if read == 0 {
            return Err(TransportError::ConnectionClosed);
        }
        if read as u64 >= MAX_RESPONSE_LINE && !line.ends_with('\n') {
            return Err(TransportError::ReceiveFailed(format!(
                "Response line exceeds {} bytes",
                MAX_RESPONSE_LINE
            )));
        }

        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}
