//! Listen-port conflict detection for a single configuration load pass

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortProtocol {
    Tcp,
    Udp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("TCP"),
            Self::Udp => f.write_str("UDP"),
        }
    }
}

/// A second server claiming a port that already has an owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConflict {
    pub protocol: PortProtocol,
    pub port: u16,
    /// Server that claimed the port first and keeps it
    pub owner: String,
    /// Server whose claim was refused
    pub claimant: String,
}

impl fmt::Display for PortConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} port {} claimed by '{}' is already owned by '{}'",
            self.protocol, self.port, self.claimant, self.owner
        )
    }
}

/// Tracks (protocol, port) ownership. The first claim always wins.
#[derive(Debug, Default)]
pub struct PortRegistry {
    owners: HashMap<(PortProtocol, u16), String>,
    conflicts: Vec<PortConflict>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `port` for `owner`.
    ///
    /// Returns `true` if `owner` holds the port afterwards. A conflicting
    /// claim is recorded and leaves ownership unchanged; it is logged as a
    /// warning only when `warn_on_conflict` is set.
    pub fn register_port(
        &mut self,
        protocol: PortProtocol,
        port: u16,
        owner: &str,
        warn_on_conflict: bool,
    ) -> bool {
        if port == 0 {
            return false;
        }
        match self.owners.get(&(protocol, port)) {
            None => {
                debug!(%protocol, port, server = %owner, "Port claimed");
                self.owners.insert((protocol, port), owner.to_string());
                true
            }
            Some(existing) if existing == owner => true,
            Some(existing) => {
                let conflict = PortConflict {
                    protocol,
                    port,
                    owner: existing.clone(),
                    claimant: owner.to_string(),
                };
                if warn_on_conflict {
                    warn!(
                        %protocol,
                        port,
                        owner = %conflict.owner,
                        claimant = %conflict.claimant,
                        "Port conflict"
                    );
                }
                self.conflicts.push(conflict);
                false
            }
        }
    }

    pub fn owner(&self, protocol: PortProtocol, port: u16) -> Option<&str> {
        self.owners.get(&(protocol, port)).map(String::as_str)
    }

    pub fn conflicts(&self) -> &[PortConflict] {
        &self.conflicts
    }

    pub fn into_conflicts(self) -> Vec<PortConflict> {
        self.conflicts
    }
}
