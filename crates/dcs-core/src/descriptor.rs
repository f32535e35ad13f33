//! Server descriptors
//!
//! A [`ServerDescriptor`] is the static definition of one device
//! communication server: its listen ports, command-dispatch endpoint,
//! accepted commands, unique-ID prefixes, event-code translation and
//! tuning properties. Descriptors are built by the config loader and are
//! read-only once registered; only the runtime-property lookups they
//! perform are late-bound.

use std::collections::BTreeMap;
use std::fmt;

use crate::command::{CommandDefinition, CommandProtocol};
use crate::event_code::EventCodeMap;
use crate::properties::{parse_bool, parse_i64, RuntimeProperties, GLOBAL_BIND_ADDRESS};
use crate::unique_id::normalize_prefixes;

/// Namespaces checked, in order, for fully-qualified runtime overrides
pub const OVERRIDE_NAMESPACES: [&str; 2] = ["DCServer", "dcs"];

/// Property group id for ungrouped properties
pub const DEFAULT_PROPERTY_GROUP: &str = "default";

const DEFAULT_COMMAND_HOST: &str = "localhost";

// =============================================================================
// Attribute flags
// =============================================================================

/// Capability bitmask derived from named boolean attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeFlags(u32);

impl AttributeFlags {
    pub const HAS_INPUTS: u32 = 0x0000_0002;
    pub const HAS_OUTPUTS: u32 = 0x0000_0004;
    pub const COMMAND_TCP: u32 = 0x0000_0100;
    pub const COMMAND_UDP: u32 = 0x0000_0200;
    pub const COMMAND_SMS: u32 = 0x0000_0400;
    pub const TRANSMIT_TCP: u32 = 0x0000_1000;
    pub const TRANSMIT_UDP: u32 = 0x0000_2000;
    pub const TRANSMIT_SMS: u32 = 0x0000_4000;
    pub const TRANSMIT_SAT: u32 = 0x0000_8000;
    pub const JAR_OPTIONAL: u32 = 0x0001_0000;

    /// Bit for a named attribute, if it is a known flag
    pub fn for_attribute(name: &str) -> Option<u32> {
        let bit = match name {
            "hasInputs" => Self::HAS_INPUTS,
            "hasOutputs" => Self::HAS_OUTPUTS,
            "commandTcp" => Self::COMMAND_TCP,
            "commandUdp" => Self::COMMAND_UDP,
            "commandSms" => Self::COMMAND_SMS,
            "transmitTcp" => Self::TRANSMIT_TCP,
            "transmitUdp" => Self::TRANSMIT_UDP,
            "transmitSms" => Self::TRANSMIT_SMS,
            "transmitSat" => Self::TRANSMIT_SAT,
            "jarOptional" => Self::JAR_OPTIONAL,
            _ => return None,
        };
        Some(bit)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u32, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

// =============================================================================
// Ports
// =============================================================================

/// Listen ports for one transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSet {
    pub bind_address: Option<String>,
    pub ports: Vec<u16>,
    pub ssl: bool,
}

impl PortSet {
    fn assign(&mut self, bind_address: Option<&str>, ports: &[u16], authoritative: bool) {
        if !authoritative && !self.ports.is_empty() {
            return;
        }
        self.ports = ports.iter().copied().filter(|p| *p > 0).collect();
        if let Some(addr) = bind_address.filter(|a| !a.trim().is_empty()) {
            self.bind_address = Some(addr.trim().to_string());
        }
    }
}

/// Parse a comma-separated port list, dropping anything that is not a
/// valid, non-zero port
pub fn parse_port_list(list: &str) -> Vec<u16> {
    list.split(',')
        .filter_map(|p| p.trim().parse::<u16>().ok())
        .filter(|p| *p > 0)
        .collect()
}

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// Descriptor
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerDescriptor {
    name: String,
    description: String,
    tcp: PortSet,
    udp: PortSet,
    command_host: Option<String>,
    command_port: i32,
    command_protocol: CommandProtocol,
    unique_id_prefixes: Vec<String>,
    commands: Vec<CommandDefinition>,
    event_codes: EventCodeMap,
    attribute_flags: AttributeFlags,
    attributes: BTreeMap<String, String>,
    properties: BTreeMap<String, BTreeMap<String, String>>,
    runtime: RuntimeProperties,
}

impl ServerDescriptor {
    /// Create an empty descriptor bound to a runtime property set
    pub fn new(name: impl Into<String>, runtime: RuntimeProperties) -> Self {
        Self {
            name: name.into().trim().to_string(),
            description: String::new(),
            tcp: PortSet::default(),
            udp: PortSet::default(),
            command_host: None,
            command_port: 0,
            command_protocol: CommandProtocol::default(),
            unique_id_prefixes: vec![String::new()],
            commands: Vec::new(),
            event_codes: EventCodeMap::new(),
            attribute_flags: AttributeFlags::default(),
            attributes: BTreeMap::new(),
            properties: BTreeMap::new(),
            runtime,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into().trim().to_string();
    }

    pub fn runtime(&self) -> &RuntimeProperties {
        &self.runtime
    }

    /// Runtime keys for `path` under every override namespace
    fn override_keys(&self, path: &str) -> Vec<String> {
        OVERRIDE_NAMESPACES
            .iter()
            .map(|ns| format!("{}.{}.{}", ns, self.name, path))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Ports
    // -------------------------------------------------------------------------

    /// Assign TCP listen ports. A non-authoritative call keeps ports that
    /// were already set.
    pub fn set_tcp_ports(&mut self, bind_address: Option<&str>, ports: &[u16], authoritative: bool) {
        self.tcp.assign(bind_address, ports, authoritative);
    }

    /// Assign UDP listen ports. A non-authoritative call keeps ports that
    /// were already set.
    pub fn set_udp_ports(&mut self, bind_address: Option<&str>, ports: &[u16], authoritative: bool) {
        self.udp.assign(bind_address, ports, authoritative);
    }

    pub fn set_tcp_ssl(&mut self, ssl: bool) {
        self.tcp.ssl = ssl;
    }

    pub fn set_udp_ssl(&mut self, ssl: bool) {
        self.udp.ssl = ssl;
    }

    /// TCP listen port set as configured, without runtime overrides
    pub fn tcp(&self) -> &PortSet {
        &self.tcp
    }

    /// UDP listen port set as configured, without runtime overrides
    pub fn udp(&self) -> &PortSet {
        &self.udp
    }

    fn port_override(&self, kind: &str) -> Option<Vec<u16>> {
        let keys = [
            format!("DCServer.{}.{}Port", self.name, kind),
            format!("DCServer.{}.port", self.name),
            format!("{}.{}Port", self.name, kind),
            format!("{}.port", self.name),
        ];
        self.runtime
            .get_first(&keys)
            .map(|v| parse_port_list(&v))
            .filter(|ports| !ports.is_empty())
    }

    /// Effective TCP listen ports, honoring runtime overrides
    pub fn tcp_ports(&self) -> Vec<u16> {
        self.port_override("tcp")
            .unwrap_or_else(|| self.tcp.ports.clone())
    }

    /// Effective UDP listen ports, honoring runtime overrides
    pub fn udp_ports(&self) -> Vec<u16> {
        self.port_override("udp")
            .unwrap_or_else(|| self.udp.ports.clone())
    }

    // -------------------------------------------------------------------------
    // Command dispatch
    // -------------------------------------------------------------------------

    pub fn set_command_dispatch(&mut self, host: Option<&str>, port: i32) {
        self.command_host = host
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from);
        self.command_port = port;
    }

    /// Command-dispatch port as configured, without runtime overrides
    pub fn configured_command_port(&self) -> i32 {
        self.command_port
    }

    /// Command-dispatch port.
    ///
    /// `DCServer.{name}.commandPort` and `{name}.commandPort` runtime
    /// properties take precedence over the configured value and are read
    /// on every call.
    pub fn command_dispatch_port(&self) -> i32 {
        let keys = [
            format!("DCServer.{}.commandPort", self.name),
            format!("{}.commandPort", self.name),
        ];
        self.runtime
            .get_first(&keys)
            .and_then(|v| parse_i64(&v))
            .and_then(|p| i32::try_from(p).ok())
            .unwrap_or(self.command_port)
    }

    /// Command-dispatch host: configured host, global bind address,
    /// `DCServer.{name}.bindAddress`, then `localhost`.
    pub fn command_dispatch_host(&self) -> String {
        if let Some(host) = &self.command_host {
            return host.clone();
        }
        self.runtime
            .get(GLOBAL_BIND_ADDRESS)
            .or_else(|| {
                self.runtime
                    .get(&format!("DCServer.{}.bindAddress", self.name))
            })
            .unwrap_or_else(|| DEFAULT_COMMAND_HOST.to_string())
    }

    pub fn set_command_protocol(&mut self, protocol: CommandProtocol) {
        self.command_protocol = protocol;
    }

    pub fn command_protocol(&self) -> CommandProtocol {
        self.command_protocol
    }

    /// True when commands can reach this server: a dispatch port is
    /// configured or the server talks SMS.
    pub fn supports_command_dispatch(&self) -> bool {
        self.command_dispatch_port() > 0 || self.command_protocol.is_sms()
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Add a command. A command with the same name is replaced in place.
    pub fn add_command(&mut self, command: CommandDefinition) {
        match self.commands.iter_mut().find(|c| c.name == command.name) {
            Some(existing) => *existing = command,
            None => self.commands.push(command),
        }
    }

    pub fn command(&self, name: &str) -> Option<&CommandDefinition> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn commands(&self) -> &[CommandDefinition] {
        &self.commands
    }

    // -------------------------------------------------------------------------
    // Unique-ID prefixes / event codes / attributes
    // -------------------------------------------------------------------------

    pub fn set_unique_id_prefixes<S: AsRef<str>>(&mut self, prefixes: &[S]) {
        self.unique_id_prefixes = normalize_prefixes(prefixes);
    }

    pub fn unique_id_prefixes(&self) -> &[String] {
        &self.unique_id_prefixes
    }

    pub fn event_codes(&self) -> &EventCodeMap {
        &self.event_codes
    }

    pub fn event_codes_mut(&mut self) -> &mut EventCodeMap {
        &mut self.event_codes
    }

    /// Record an attribute. Known flag names also update the bitmask.
    pub fn set_attribute(&mut self, key: &str, value: &str) {
        if let Some(bit) = AttributeFlags::for_attribute(key) {
            self.attribute_flags
                .set(bit, parse_bool(value).unwrap_or(false));
        }
        self.attributes.insert(key.to_string(), value.to_string());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attribute_flags(&self) -> AttributeFlags {
        self.attribute_flags
    }

    pub fn has_flag(&self, bit: u32) -> bool {
        self.attribute_flags.contains(bit)
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    /// Store a property. Default-group keys are qualified with the server
    /// name (`{name}.{key}`); other groups keep the key as given.
    pub fn set_property(&mut self, group: Option<&str>, key: &str, value: impl Into<String>) {
        let group = match group.map(str::trim) {
            None | Some("") => DEFAULT_PROPERTY_GROUP,
            Some(g) if g.eq_ignore_ascii_case(DEFAULT_PROPERTY_GROUP) => DEFAULT_PROPERTY_GROUP,
            Some(g) => g,
        };
        let stored_key = if group == DEFAULT_PROPERTY_GROUP {
            self.qualified_key(key)
        } else {
            key.to_string()
        };
        self.properties
            .entry(group.to_string())
            .or_default()
            .insert(stored_key, value.into());
    }

    /// Prefix `key` with this server's name unless already prefixed
    pub fn qualified_key(&self, key: &str) -> String {
        let prefix = format!("{}.", self.name);
        if key.starts_with(&prefix) {
            key.to_string()
        } else {
            format!("{}{}", prefix, key)
        }
    }

    pub fn property_group(&self, id: &str) -> Option<&BTreeMap<String, String>> {
        self.properties.get(id)
    }

    pub fn property_group_ids(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Look up a tuning property: namespaced runtime override, this
    /// server's default group, then the plain `{name}.{key}` runtime value.
    pub fn property(&self, key: &str) -> Option<String> {
        let qualified = self.qualified_key(key);
        self.runtime
            .get_first(&self.override_keys(key))
            .or_else(|| {
                self.properties
                    .get(DEFAULT_PROPERTY_GROUP)
                    .and_then(|g| g.get(&qualified))
                    .filter(|v| !v.trim().is_empty())
                    .cloned()
            })
            .or_else(|| self.runtime.get(&qualified))
    }

    pub fn int_property(&self, key: &str, default: i64) -> i64 {
        self.property(key)
            .and_then(|v| parse_i64(&v))
            .unwrap_or(default)
    }

    pub fn float_property(&self, key: &str, default: f64) -> f64 {
        self.property(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn bool_property(&self, key: &str, default: bool) -> bool {
        self.property(key)
            .and_then(|v| parse_bool(&v))
            .unwrap_or(default)
    }

    // -------------------------------------------------------------------------
    // Tuning accessors
    // -------------------------------------------------------------------------

    pub fn tcp_idle_timeout_ms(&self, default: i64) -> i64 {
        self.int_property("tcpIdleTimeoutMS", default)
    }

    pub fn tcp_packet_timeout_ms(&self, default: i64) -> i64 {
        self.int_property("tcpPacketTimeoutMS", default)
    }

    pub fn tcp_session_timeout_ms(&self, default: i64) -> i64 {
        self.int_property("tcpSessionTimeoutMS", default)
    }

    pub fn udp_idle_timeout_ms(&self, default: i64) -> i64 {
        self.int_property("udpIdleTimeoutMS", default)
    }

    pub fn udp_packet_timeout_ms(&self, default: i64) -> i64 {
        self.int_property("udpPacketTimeoutMS", default)
    }

    pub fn udp_session_timeout_ms(&self, default: i64) -> i64 {
        self.int_property("udpSessionTimeoutMS", default)
    }

    pub fn minimum_speed_kph(&self, default: f64) -> f64 {
        self.float_property("minimumSpeedKPH", default)
    }

    pub fn estimate_odometer(&self, default: bool) -> bool {
        self.bool_property("estimateOdometer", default)
    }

    pub fn simulate_geozones(&self, default: bool) -> bool {
        self.bool_property("simulateGeozones", default)
    }

    pub fn maximum_hdop(&self, default: f64) -> f64 {
        self.float_property("maximumHDOP", default)
    }

    pub fn minimum_moved_meters(&self, default: f64) -> f64 {
        self.float_property("minimumMovedMeters", default)
    }

    pub fn save_raw_data_packets(&self, default: bool) -> bool {
        self.bool_property("saveRawDataPackets", default)
    }

    pub fn ack_response_port(&self, default: i64) -> i64 {
        self.int_property("ackResponsePort", default)
    }

    pub fn client_command_port_tcp(&self, default: i64) -> i64 {
        self.int_property("clientCommandPort.tcp", default)
    }

    pub fn client_command_port_udp(&self, default: i64) -> i64 {
        self.int_property("clientCommandPort.udp", default)
    }
}

impl fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {} [", self.name, self.description)?;
        let tcp = self.tcp_ports();
        let udp = self.udp_ports();
        let cmd = self.command_dispatch_port();
        let mut parts = Vec::new();
        if !tcp.is_empty() {
            parts.push(format!("TCP={}", join_ports(&tcp)));
        }
        if !udp.is_empty() {
            parts.push(format!("UDP={}", join_ports(&udp)));
        }
        if cmd > 0 {
            parts.push(format!("CMD={}", cmd));
        }
        if parts.is_empty() {
            f.write_str("no-ports")?;
        } else {
            f.write_str(&parts.join(" "))?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor(name: &str) -> ServerDescriptor {
        ServerDescriptor::new(name, RuntimeProperties::new())
    }

    #[test]
    fn test_command_port_runtime_override() {
        let runtime = RuntimeProperties::new();
        let mut dcs = ServerDescriptor::new("acme", runtime.clone());
        dcs.set_command_dispatch(None, 5000);
        assert_eq!(dcs.command_dispatch_port(), 5000);

        runtime.set("DCServer.acme.commandPort", "6000");
        assert_eq!(dcs.command_dispatch_port(), 6000);
        assert_eq!(dcs.configured_command_port(), 5000);
    }

    #[test]
    fn test_command_port_plain_override() {
        let runtime = RuntimeProperties::new();
        let mut dcs = ServerDescriptor::new("acme", runtime.clone());
        dcs.set_command_dispatch(None, 5000);
        runtime.set("acme.commandPort", "7000");
        assert_eq!(dcs.command_dispatch_port(), 7000);
    }

    #[test]
    fn test_add_command_last_wins() {
        let mut dcs = descriptor("acme");
        let mut first = CommandDefinition::new("output", "OUT1");
        first.description = "first".into();
        let mut second = CommandDefinition::new("output", "OUT2");
        second.description = "second".into();
        dcs.add_command(first);
        dcs.add_command(second);

        assert_eq!(dcs.commands().len(), 1);
        assert_eq!(dcs.command("output").map(|c| c.template.as_str()), Some("OUT2"));
    }

    #[test]
    fn test_non_authoritative_ports_keep_existing() {
        let mut dcs = descriptor("acme");
        dcs.set_tcp_ports(Some("10.0.0.1"), &[31400], true);
        dcs.set_tcp_ports(None, &[40000], false);
        assert_eq!(dcs.tcp_ports(), vec![31400]);
        assert_eq!(dcs.tcp().bind_address.as_deref(), Some("10.0.0.1"));

        dcs.set_tcp_ports(None, &[40000], true);
        assert_eq!(dcs.tcp_ports(), vec![40000]);
    }

    #[test]
    fn test_non_authoritative_fills_empty() {
        let mut dcs = descriptor("acme");
        dcs.set_udp_ports(None, &[0, 31401], false);
        assert_eq!(dcs.udp_ports(), vec![31401]);
    }

    #[test]
    fn test_port_runtime_override() {
        let runtime = RuntimeProperties::new();
        let mut dcs = ServerDescriptor::new("acme", runtime.clone());
        dcs.set_tcp_ports(None, &[31400], true);
        runtime.set("acme.tcpPort", "32000,32001");
        assert_eq!(dcs.tcp_ports(), vec![32000, 32001]);
        assert_eq!(dcs.tcp().ports, vec![31400]);
    }

    #[test]
    fn test_command_host_resolution() {
        let runtime = RuntimeProperties::new();
        let mut dcs = ServerDescriptor::new("acme", runtime.clone());
        assert_eq!(dcs.command_dispatch_host(), "localhost");

        runtime.set("DCServer.acme.bindAddress", "10.1.1.1");
        assert_eq!(dcs.command_dispatch_host(), "10.1.1.1");

        runtime.set(GLOBAL_BIND_ADDRESS, "10.2.2.2");
        assert_eq!(dcs.command_dispatch_host(), "10.2.2.2");

        dcs.set_command_dispatch(Some("cmd.local"), 5000);
        assert_eq!(dcs.command_dispatch_host(), "cmd.local");
    }

    #[test]
    fn test_supports_command_dispatch() {
        let mut dcs = descriptor("acme");
        assert!(!dcs.supports_command_dispatch());
        dcs.set_command_protocol(CommandProtocol::Sms);
        assert!(dcs.supports_command_dispatch());

        let mut tcp = descriptor("beta");
        tcp.set_command_dispatch(None, 31000);
        assert!(tcp.supports_command_dispatch());
    }

    #[test]
    fn test_attribute_flags() {
        let mut dcs = descriptor("acme");
        dcs.set_attribute("hasOutputs", "true");
        dcs.set_attribute("jarOptional", "yes");
        dcs.set_attribute("vendor", "Acme Inc");
        assert!(dcs.has_flag(AttributeFlags::HAS_OUTPUTS));
        assert!(dcs.has_flag(AttributeFlags::JAR_OPTIONAL));
        assert!(!dcs.has_flag(AttributeFlags::HAS_INPUTS));
        assert_eq!(dcs.attribute_flags().bits(), 0x10004);
        assert_eq!(dcs.attribute("vendor"), Some("Acme Inc"));
    }

    #[test]
    fn test_property_groups_and_lookup() {
        let runtime = RuntimeProperties::new();
        let mut dcs = ServerDescriptor::new("acme", runtime.clone());
        dcs.set_property(None, "minimumSpeedKPH", "3.5");
        dcs.set_property(Some("alt"), "minimumSpeedKPH", "9");

        assert_eq!(
            dcs.property_group(DEFAULT_PROPERTY_GROUP)
                .and_then(|g| g.get("acme.minimumSpeedKPH"))
                .map(String::as_str),
            Some("3.5")
        );
        assert_eq!(dcs.minimum_speed_kph(0.0), 3.5);
        assert!(!dcs.estimate_odometer(false));

        runtime.set("dcs.acme.minimumSpeedKPH", "7");
        assert_eq!(dcs.minimum_speed_kph(0.0), 7.0);
    }

    #[test]
    fn test_unique_id_prefixes_normalized() {
        let mut dcs = descriptor("acme");
        assert_eq!(dcs.unique_id_prefixes(), &[String::new()]);
        dcs.set_unique_id_prefixes(&["imei:*", "<blank>"]);
        assert_eq!(dcs.unique_id_prefixes(), &["imei:".to_string(), String::new()]);
    }

    #[test]
    fn test_display() {
        let mut dcs = descriptor("acme");
        dcs.set_description("Acme tracker");
        assert_eq!(dcs.to_string(), "(acme) Acme tracker [no-ports]");

        dcs.set_tcp_ports(None, &[31400, 31401], true);
        dcs.set_udp_ports(None, &[31400], true);
        dcs.set_command_dispatch(None, 30400);
        assert_eq!(
            dcs.to_string(),
            "(acme) Acme tracker [TCP=31400,31401 UDP=31400 CMD=30400]"
        );
    }
}
