//! dcs-core - Core types for device communication server registries
//!
//! This crate holds the server descriptor model, the result-code taxonomy,
//! runtime properties, port conflict tracking, the server registry and the
//! device store seam shared by the loader and the dispatcher.

pub mod command;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod event_code;
pub mod ports;
pub mod properties;
pub mod registry;
pub mod result;
pub mod unique_id;

pub use command::{ArgTooLong, CommandArg, CommandDefinition, CommandProtocol};
pub use descriptor::{AttributeFlags, PortSet, ServerDescriptor};
pub use device::{Account, Device, DeviceStore, MemoryDeviceStore};
pub use error::{StoreError, StoreResult};
pub use event_code::{EventCode, EventCodeKey, EventCodeMap};
pub use ports::{PortConflict, PortProtocol, PortRegistry};
pub use properties::RuntimeProperties;
pub use registry::{
    load_device_by_prefixed_modem_id, AlwaysDeployed, ArtifactCheck, DeploymentContext,
    DirectoryArtifactCheck, ServerRegistry,
};
pub use result::{CommandResult, ResultCode};
