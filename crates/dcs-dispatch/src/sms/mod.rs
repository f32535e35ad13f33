//! Outbound SMS gateways
//!
//! Commands for devices without a reachable command port are sent as SMS
//! text through a named gateway. Gateways are registered explicitly in a
//! [`SmsGatewayRegistry`]; [`create_gateway`] builds one from configuration.

pub mod error;
pub mod http;
pub mod logger;
pub mod mock;

pub use error::{SmsError, SmsResult};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dcs_core::Device;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Gateway used when a command names no handler
pub const DEFAULT_GATEWAY_NAME: &str = "default";

/// An SMS delivery backend
#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Gateway kind, for logs
    fn kind(&self) -> &'static str;

    /// Deliver `text` to the device's SIM
    async fn send(&self, device: &Device, text: &str) -> SmsResult<()>;
}

/// SIM phone number of `device`, required by every real gateway
pub(crate) fn sim_phone(device: &Device) -> SmsResult<&str> {
    device
        .sim_phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| SmsError::Device(format!("{} has no SIM phone number", device.key())))
}

// =============================================================================
// Configuration
// =============================================================================

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SmsGatewayConfig {
    /// Log the message and report success
    Log,
    /// Send through an HTTP GET URL template
    Http(http::HttpGatewayConfig),
    /// Record messages for testing
    Mock,
}

impl Default for SmsGatewayConfig {
    fn default() -> Self {
        Self::Log
    }
}

/// Create a gateway based on configuration
pub fn create_gateway(config: &SmsGatewayConfig) -> SmsResult<Arc<dyn SmsGateway>> {
    match config {
        SmsGatewayConfig::Log => Ok(Arc::new(logger::LogSmsGateway)),
        SmsGatewayConfig::Http(cfg) => Ok(Arc::new(http::HttpSmsGateway::new(cfg)?)),
        SmsGatewayConfig::Mock => Ok(Arc::new(mock::MockSmsGateway::new())),
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Named gateways
#[derive(Default)]
pub struct SmsGatewayRegistry {
    gateways: RwLock<HashMap<String, Arc<dyn SmsGateway>>>,
}

impl SmsGatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gateway, replacing any previous one with the same name
    pub fn register(&self, name: impl Into<String>, gateway: Arc<dyn SmsGateway>) {
        let name = name.into();
        debug!(gateway = %name, kind = gateway.kind(), "SMS gateway registered");
        if self.gateways.write().insert(name.clone(), gateway).is_some() {
            warn!(gateway = %name, "SMS gateway replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SmsGateway>> {
        self.gateways.read().get(name).cloned()
    }

    /// Gateway for a command's handler name; a blank name means `default`
    pub fn resolve(
        &self,
        handler: Option<&str>,
        default: &str,
    ) -> (String, Option<Arc<dyn SmsGateway>>) {
        let name = handler
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(default)
            .to_string();
        let gateway = self.get(&name);
        (name, gateway)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.gateways.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.gateways.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.read().is_empty()
    }
}
