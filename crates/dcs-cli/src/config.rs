//! Settings file handling for the dcs CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dcs_dispatch::{DispatcherSettings, SmsGatewayConfig, DEFAULT_GATEWAY_NAME};
use serde::{Deserialize, Serialize};

/// Default DCS configuration file, relative to the working directory
pub const DEFAULT_DCSERVERS_FILE: &str = "dcservers.toml";
/// Default device store file, relative to the working directory
pub const DEFAULT_DEVICES_FILE: &str = "devices.toml";

/// Settings for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// DCS configuration file
    pub dcservers: Option<PathBuf>,
    /// Device store file
    pub devices: Option<PathBuf>,
    /// Extra include directory for the DCS configuration
    pub include_dir: Option<PathBuf>,
    /// Directory holding server artifacts; unset means every server counts
    /// as deployed
    pub artifact_dir: Option<PathBuf>,
    /// Artifact file extension
    pub artifact_extension: Option<String>,
    /// Keep undeployed servers registered (recorded as missing)
    pub web_app: Option<bool>,
    /// Disable colored output
    pub no_color: Option<bool>,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    /// Gateway used for SMS commands that name none
    pub default_gateway: Option<String>,
    /// Named SMS gateways
    #[serde(default)]
    pub sms_gateways: BTreeMap<String, SmsGatewayConfig>,
    /// Runtime properties (`DCServer.<name>.<path>` overrides and friends)
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Config {
    /// Load settings from the default settings file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load settings from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Get the default settings file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("dcs");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over settings file values
    pub fn merge_with_args(
        &self,
        dcservers: Option<&Path>,
        devices: Option<&Path>,
        no_color: bool,
    ) -> MergedConfig {
        let mut dispatch = DispatcherSettings::default();
        if let Some(ms) = self.connect_timeout_ms {
            dispatch.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.read_timeout_ms {
            dispatch.read_timeout = Duration::from_millis(ms);
        }
        dispatch.default_gateway = self
            .default_gateway
            .clone()
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GATEWAY_NAME.to_string());

        MergedConfig {
            dcservers: dcservers
                .map(Path::to_path_buf)
                .or_else(|| self.dcservers.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DCSERVERS_FILE)),
            devices: devices
                .map(Path::to_path_buf)
                .or_else(|| self.devices.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICES_FILE)),
            include_dir: self.include_dir.clone(),
            artifact_dir: self.artifact_dir.clone(),
            artifact_extension: self
                .artifact_extension
                .clone()
                .unwrap_or_else(|| "jar".to_string()),
            web_app: self.web_app.unwrap_or(false),
            no_color: no_color || self.no_color.unwrap_or(false),
            dispatch,
            sms_gateways: self.sms_gateways.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// Fully resolved settings after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub dcservers: PathBuf,
    pub devices: PathBuf,
    pub include_dir: Option<PathBuf>,
    pub artifact_dir: Option<PathBuf>,
    pub artifact_extension: String,
    pub web_app: bool,
    pub no_color: bool,
    pub dispatch: DispatcherSettings,
    pub sms_gateways: BTreeMap<String, SmsGatewayConfig>,
    pub properties: BTreeMap<String, String>,
}
