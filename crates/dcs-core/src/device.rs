//! Device records and the device store seam
//!
//! Persistence is owned elsewhere; this crate only needs to load a device,
//! find devices by unique ID, and bump the ping counter after a successful
//! command. [`MemoryDeviceStore`] backs the CLI and tests from a TOML file.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Maximum pings allowed; 0 means unlimited
    #[serde(default)]
    pub max_ping_count: u32,
    #[serde(default)]
    pub total_ping_count: u32,
    #[serde(default)]
    pub last_ping_time: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            active: true,
            max_ping_count: 0,
            total_ping_count: 0,
            last_ping_time: None,
        }
    }

    pub fn exceeds_max_ping_count(&self) -> bool {
        self.max_ping_count > 0 && self.total_ping_count >= self.max_ping_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub account_id: String,
    pub device_id: String,
    #[serde(default)]
    pub unique_id: String,
    /// Name of the communication server that owns this device
    #[serde(default)]
    pub server_id: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// SIM phone number used by SMS gateways
    #[serde(default)]
    pub sim_phone: Option<String>,
    /// Maximum pings allowed; 0 means unlimited
    #[serde(default)]
    pub max_ping_count: u32,
    #[serde(default)]
    pub total_ping_count: u32,
    #[serde(default)]
    pub last_ping_time: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(account_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            device_id: device_id.into(),
            unique_id: String::new(),
            server_id: String::new(),
            active: true,
            sim_phone: None,
            max_ping_count: 0,
            total_ping_count: 0,
            last_ping_time: None,
        }
    }

    /// `account/device`, used as a log and lock key
    pub fn key(&self) -> String {
        format!("{}/{}", self.account_id, self.device_id)
    }

    pub fn exceeds_max_ping_count(&self) -> bool {
        self.max_ping_count > 0 && self.total_ping_count >= self.max_ping_count
    }
}

/// Device persistence consumed by the registry and the dispatcher
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn load_account(&self, account_id: &str) -> StoreResult<Option<Account>>;

    async fn load_device(&self, account_id: &str, device_id: &str) -> StoreResult<Option<Device>>;

    /// Find the device registered under an exact (already prefixed) unique ID
    async fn load_by_unique_id(&self, unique_id: &str) -> StoreResult<Option<Device>>;

    /// Add one to the device and account ping counters and stamp the time
    async fn increment_ping_count(
        &self,
        account_id: &str,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// True when either the device or its account is at its ping limit
    async fn exceeds_max_ping_count(&self, device: &Device) -> StoreResult<bool> {
        if device.exceeds_max_ping_count() {
            return Ok(true);
        }
        Ok(self
            .load_account(&device.account_id)
            .await?
            .map(|a| a.exceeds_max_ping_count())
            .unwrap_or(false))
    }
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct StoreFile {
    #[serde(default)]
    account: Vec<Account>,
    #[serde(default)]
    device: Vec<Device>,
}

/// In-memory [`DeviceStore`], loadable from a TOML file of `[[account]]`
/// and `[[device]]` tables
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    accounts: RwLock<HashMap<String, Account>>,
    devices: RwLock<HashMap<(String, String), Device>>,
    unique_id_lookups: Mutex<Vec<String>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        let file: StoreFile = toml::from_str(content)?;
        let store = Self::new();
        for account in file.account {
            store.insert_account(account);
        }
        for device in file.device {
            store.insert_device(device);
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn insert_account(&self, account: Account) {
        self.accounts
            .write()
            .insert(account.account_id.clone(), account);
    }

    pub fn insert_device(&self, device: Device) {
        self.devices.write().insert(
            (device.account_id.clone(), device.device_id.clone()),
            device,
        );
    }

    /// Unique IDs queried through [`DeviceStore::load_by_unique_id`], in order
    pub fn unique_id_lookups(&self) -> Vec<String> {
        self.unique_id_lookups.lock().clone()
    }

    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn load_account(&self, account_id: &str) -> StoreResult<Option<Account>> {
        Ok(self.accounts.read().get(account_id).cloned())
    }

    async fn load_device(&self, account_id: &str, device_id: &str) -> StoreResult<Option<Device>> {
        Ok(self
            .devices
            .read()
            .get(&(account_id.to_string(), device_id.to_string()))
            .cloned())
    }

    async fn load_by_unique_id(&self, unique_id: &str) -> StoreResult<Option<Device>> {
        self.unique_id_lookups.lock().push(unique_id.to_string());
        Ok(self
            .devices
            .read()
            .values()
            .find(|d| !d.unique_id.is_empty() && d.unique_id == unique_id)
            .cloned())
    }

    async fn increment_ping_count(
        &self,
        account_id: &str,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        {
            let mut devices = self.devices.write();
            let device = devices
                .get_mut(&(account_id.to_string(), device_id.to_string()))
                .ok_or_else(|| {
                    StoreError::DeviceNotFound(format!("{}/{}", account_id, device_id))
                })?;
            device.total_ping_count += 1;
            device.last_ping_time = Some(at);
            debug!(
                device = %device.key(),
                total = device.total_ping_count,
                "Incremented ping count"
            );
        }
        if let Some(account) = self.accounts.write().get_mut(account_id) {
            account.total_ping_count += 1;
            account.last_ping_time = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = r#"
        [[account]]
        account_id = "demo"
        max_ping_count = 2
        total_ping_count = 1

        [[device]]
        account_id = "demo"
        device_id = "truck1"
        unique_id = "imei:123"
        server_id = "acme"
    "#;

    #[test]
    fn test_exceeds_max_ping_count() {
        let mut device = Device::new("demo", "truck1");
        assert!(!device.exceeds_max_ping_count());
        device.max_ping_count = 3;
        device.total_ping_count = 3;
        assert!(device.exceeds_max_ping_count());
    }

    #[tokio::test]
    async fn test_load_from_toml() {
        let store = MemoryDeviceStore::from_toml_str(STORE).unwrap();
        let device = store.load_device("demo", "truck1").await.unwrap().unwrap();
        assert_eq!(device.server_id, "acme");
        assert!(device.active);

        let found = store.load_by_unique_id("imei:123").await.unwrap();
        assert_eq!(found.map(|d| d.device_id), Some("truck1".to_string()));
        assert_eq!(store.unique_id_lookups(), vec!["imei:123".to_string()]);
    }

    #[tokio::test]
    async fn test_increment_updates_device_and_account() {
        let store = MemoryDeviceStore::from_toml_str(STORE).unwrap();
        let now = Utc::now();
        store.increment_ping_count("demo", "truck1", now).await.unwrap();

        let device = store.load_device("demo", "truck1").await.unwrap().unwrap();
        assert_eq!(device.total_ping_count, 1);
        assert_eq!(device.last_ping_time, Some(now));

        let account = store.load_account("demo").await.unwrap().unwrap();
        assert_eq!(account.total_ping_count, 2);
        assert!(store.exceeds_max_ping_count(&device).await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_unknown_device() {
        let store = MemoryDeviceStore::new();
        let err = store
            .increment_ping_count("x", "y", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DeviceNotFound(_)));
    }
}
