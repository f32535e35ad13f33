//! Mock SMS gateway for testing

use async_trait::async_trait;
use dcs_core::Device;
use parking_lot::RwLock;

use super::{SmsError, SmsGateway, SmsResult};

/// Records every message; optionally fails
#[derive(Default)]
pub struct MockSmsGateway {
    sent: RwLock<Vec<(String, String)>>,
    failure: RwLock<Option<SmsError>>,
}

impl MockSmsGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail subsequent sends with `error`
    pub fn set_failure(&self, error: Option<SmsError>) {
        *self.failure.write() = error;
    }

    /// `(device key, text)` pairs in send order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.read().clone()
    }
}

#[async_trait]
impl SmsGateway for MockSmsGateway {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, device: &Device, text: &str) -> SmsResult<()> {
        if let Some(err) = self.failure.read().clone() {
            return Err(err);
        }
        self.sent.write().push((device.key(), text.to_string()));
        Ok(())
    }
}
