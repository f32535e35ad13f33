//! HTTP URL-template gateway
//!
//! The message goes out as one GET request built from a template such as
//! `https://sms.example.com/send?to=${mobile}&text=${message}`. Placeholder
//! values are form-urlencoded. Any 2xx status counts as delivered.

use std::time::Duration;

use async_trait::async_trait;
use dcs_core::Device;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::{sim_phone, SmsError, SmsGateway, SmsResult};

/// HTTP gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpGatewayConfig {
    /// URL template with `${mobile}`, `${message}`, `${account}` and
    /// `${device}` placeholders
    pub url: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

pub struct HttpSmsGateway {
    client: Client,
    template: String,
}

impl HttpSmsGateway {
    pub fn new(config: &HttpGatewayConfig) -> SmsResult<Self> {
        let template = config.url.trim().to_string();
        if template.is_empty() {
            return Err(SmsError::Config("gateway URL is blank".into()));
        }
        if !template.contains("${mobile}") {
            return Err(SmsError::Config(format!(
                "gateway URL has no ${{mobile}} placeholder: {}",
                template
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| SmsError::Config(e.to_string()))?;

        Ok(Self { client, template })
    }

    /// Expand the template for one message
    pub fn request_url(&self, device: &Device, text: &str) -> SmsResult<Url> {
        let mobile = sim_phone(device)?;
        let expanded = self
            .template
            .replace("${mobile}", &encode(mobile))
            .replace("${message}", &encode(text))
            .replace("${account}", &encode(&device.account_id))
            .replace("${device}", &encode(&device.device_id));

        let url = Url::parse(&expanded).map_err(|e| SmsError::Config(e.to_string()))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(SmsError::Host(format!("no host in {}", self.template)));
        }
        if url.port_or_known_default().is_none() {
            return Err(SmsError::Port(format!("no port for {}", url.scheme())));
        }
        Ok(url)
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn send(&self, device: &Device, text: &str) -> SmsResult<()> {
        if text.trim().is_empty() {
            return Err(SmsError::InvalidSms("empty message".into()));
        }
        let url = self.request_url(device, text)?;
        debug!(device = %device.key(), host = url.host_str().unwrap_or(""), "Sending SMS via HTTP");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            warn!(device = %device.key(), %status, "SMS gateway rejected message");
            Err(SmsError::Gateway(format!("HTTP {}", status)))
        }
    }
}
