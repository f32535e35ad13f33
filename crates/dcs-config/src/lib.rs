//! dcs-config - Configuration loading for device communication servers
//!
//! Reads the TOML server configuration (with includes, runtime overrides
//! and port offsets) and produces server descriptors ready to register.
//!
//! ```no_run
//! use dcs_config::{ConfigLoader, LoaderOptions};
//! use dcs_core::{RuntimeProperties, ServerRegistry};
//!
//! let loader = ConfigLoader::new(RuntimeProperties::new(), LoaderOptions::default());
//! let loaded = loader.load("dcservers.toml".as_ref()).unwrap();
//! let registry = ServerRegistry::default();
//! loaded.register_into(&registry);
//! ```

pub mod document;
pub mod error;
pub mod include;
pub mod loader;
pub mod overrides;
pub mod report;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, GlobalSettings, LoadedConfig, LoaderOptions};
pub use overrides::OverrideScope;
pub use report::LoadReport;
