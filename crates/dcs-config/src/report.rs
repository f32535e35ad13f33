//! Diagnostics collected during one load pass

use std::path::PathBuf;

use dcs_core::PortConflict;
use tracing::{error, warn};

/// Everything a load pass had to say about the configuration.
///
/// Warnings leave the affected value degraded; errors abandoned one server
/// entry or one included file.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// Server names seen again after their first definition
    pub duplicates: Vec<String>,
    /// Servers skipped because they were marked inactive
    pub inactive: Vec<String>,
    pub port_conflicts: Vec<PortConflict>,
    /// Files actually loaded, in load order
    pub loaded_files: Vec<PathBuf>,
    /// Non-optional include directives that matched nothing
    pub missing_includes: Vec<String>,
}

impl LoadReport {
    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.errors.push(message);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty() && self.port_conflicts.is_empty()
    }
}
