//! Gateway that only logs

use async_trait::async_trait;
use dcs_core::Device;
use tracing::info;

use super::{SmsError, SmsGateway, SmsResult};

/// Writes each message to the log and reports success
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSmsGateway;

#[async_trait]
impl SmsGateway for LogSmsGateway {
    fn kind(&self) -> &'static str {
        "log"
    }

    async fn send(&self, device: &Device, text: &str) -> SmsResult<()> {
        if text.trim().is_empty() {
            return Err(SmsError::InvalidSms("empty message".into()));
        }
        info!(
            device = %device.key(),
            sim = device.sim_phone.as_deref().unwrap_or(""),
            text = %text,
            "SMS command"
        );
        Ok(())
    }
}
