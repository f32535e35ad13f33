//! Serde model of the DCS configuration document
//!
//! ```toml
//! [dcservers]
//! bind_address = "0.0.0.0"
//! warn_port_conflict = true
//!
//! [dcservers.properties]
//! "acme.minimumSpeedKPH" = 3
//!
//! [[dcservers.include]]
//! file = "dcserver_*.toml"
//! dir = "dcservers.d"
//! optional = true
//!
//! [[dcservers.server]]
//! name = "acme"
//! description = "Acme tracker"
//! command_protocol = "tcp"
//! unique_id_prefixes = ["imei:", "*"]
//! listen = { tcp_port = 31400, udp_port = "31400,31401" }
//!
//! [dcservers.server.commands]
//! port = 30400
//!
//! [[dcservers.server.commands.command]]
//! name = "output"
//! protocol = "tcp"
//! template = "OUT,${arg0}"
//! ```
//!
//! Server and include entries are kept as raw TOML values by the root so
//! that one malformed entry does not reject the whole file.

use std::collections::BTreeMap;

use dcs_core::properties::parse_bool;
use serde::Deserialize;

// =============================================================================
// Flexible scalar shapes
// =============================================================================

/// `active` indicator: a boolean, or a string that must name the entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ActiveFlag {
    Bool(bool),
    Name(String),
}

impl ActiveFlag {
    /// Whether the entry called `name` is active.
    ///
    /// Boolean spellings (`"true"`, `"no"`, ...) are honored as such; any
    /// other string must equal `name`, ignoring case.
    pub fn is_active_for(&self, name: &str) -> bool {
        match self {
            ActiveFlag::Bool(b) => *b,
            ActiveFlag::Name(s) => match parse_bool(s) {
                Some(b) => b,
                None => s.trim().eq_ignore_ascii_case(name.trim()),
            },
        }
    }
}

/// Port value: a number, a list of numbers, or a comma-separated string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    Number(i64),
    List(Vec<i64>),
    Text(String),
}

impl PortSpec {
    /// Raw port tokens; strings that are not numbers come back as `Err`
    pub fn values(&self) -> Vec<Result<i64, String>> {
        match self {
            PortSpec::Number(n) => vec![Ok(*n)],
            PortSpec::List(list) => list.iter().copied().map(Ok).collect(),
            PortSpec::Text(s) => s
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| t.parse::<i64>().map_err(|_| t.to_string()))
                .collect(),
        }
    }
}

/// A list given either as an array or a comma-separated string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    One(String),
    Many(Vec<String>),
}

impl StringList {
    pub fn items(&self) -> Vec<String> {
        match self {
            StringList::One(s) => dcs_core::unique_id::split_prefix_list(s),
            StringList::Many(v) => v.iter().map(|s| s.trim().to_string()).collect(),
        }
    }
}

/// Render a scalar TOML value as a property string
pub fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

// =============================================================================
// Root
// =============================================================================

fn default_true() -> bool {
    true
}

/// `[dcservers]` root table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRoot {
    pub bind_address: Option<String>,
    pub listen_backlog: Option<u32>,
    pub include_dir: Option<String>,
    pub warn_port_conflict: Option<bool>,
    #[serde(default)]
    pub properties: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub server: Vec<toml::Value>,
    #[serde(default)]
    pub include: Vec<toml::Value>,
}

/// `[[dcservers.include]]` directive
#[derive(Debug, Clone, Deserialize)]
pub struct RawInclude {
    pub file: String,
    pub dir: Option<String>,
    pub alt_dir: Option<String>,
    #[serde(default)]
    pub optional: bool,
    pub active: Option<ActiveFlag>,
}

// =============================================================================
// Server entry
// =============================================================================

/// `[[dcservers.server]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct RawServer {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "protocol")]
    pub command_protocol: Option<String>,
    pub active: Option<ActiveFlag>,
    pub warn_port_conflict: Option<bool>,
    #[serde(default)]
    pub listen: RawListen,
    pub unique_id_prefixes: Option<StringList>,
    #[serde(default)]
    pub attributes: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub properties: Vec<RawPropertyGroup>,
    pub event_codes: Option<RawEventCodes>,
    pub commands: Option<RawCommands>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListen {
    pub bind_address: Option<String>,
    pub tcp_port: Option<PortSpec>,
    pub udp_port: Option<PortSpec>,
    #[serde(default)]
    pub ssl: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPropertyGroup {
    pub id: Option<String>,
    #[serde(default)]
    pub entries: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEventCodes {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub code: Vec<RawEventCode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEventCode {
    pub key: toml::Value,
    pub status: Option<toml::Value>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommands {
    pub host: Option<String>,
    pub port: Option<i64>,
    #[serde(default)]
    pub command: Vec<RawCommand>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommand {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: Option<toml::Value>,
    pub types: Option<StringList>,
    pub acl: Option<String>,
    pub acl_default: Option<String>,
    pub protocol: Option<String>,
    #[serde(default)]
    pub template: String,
    pub has_args: Option<bool>,
    #[serde(default)]
    pub expect_ack: bool,
    pub status_code: Option<toml::Value>,
    #[serde(default)]
    pub arg: Vec<RawArg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawArg {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub read_only: bool,
    pub session_var: Option<String>,
    pub default: Option<String>,
    pub length: Option<toml::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_flag() {
        assert!(ActiveFlag::Bool(true).is_active_for("acme"));
        assert!(!ActiveFlag::Bool(false).is_active_for("acme"));
        assert!(ActiveFlag::Name("ACME".into()).is_active_for("acme"));
        assert!(!ActiveFlag::Name("beta".into()).is_active_for("acme"));
        assert!(ActiveFlag::Name("yes".into()).is_active_for("acme"));
    }

    #[test]
    fn test_port_spec_values() {
        assert_eq!(PortSpec::Number(31400).values(), vec![Ok(31400)]);
        assert_eq!(
            PortSpec::Text("1, x ,3".into()).values(),
            vec![Ok(1), Err("x".to_string()), Ok(3)]
        );
        assert_eq!(PortSpec::List(vec![5, 6]).values(), vec![Ok(5), Ok(6)]);
    }

    #[test]
    fn test_parse_server_entry() {
        let server: RawServer = toml::from_str(
            r#"
            name = "acme"
            active = "acme"
            unique_id_prefixes = "imei:,*"
            listen = { tcp_port = [31400, 31401], udp_port = "31400" }

            [attributes]
            hasOutputs = true

            [[properties]]
            entries = { minimumSpeedKPH = 3 }

            [commands]
            port = 30400

            [[commands.command]]
            name = "output"
            template = "OUT,${arg0}"

            [[commands.command.arg]]
            name = "state"
            length = "1,3"
            "#,
        )
        .unwrap();

        assert_eq!(server.name, "acme");
        assert_eq!(server.active, Some(ActiveFlag::Name("acme".into())));
        assert_eq!(
            server.unique_id_prefixes.map(|p| p.items()),
            Some(vec!["imei:".to_string(), "*".to_string()])
        );
        assert_eq!(server.listen.tcp_port, Some(PortSpec::List(vec![31400, 31401])));
        let commands = server.commands.unwrap();
        assert_eq!(commands.port, Some(30400));
        assert_eq!(commands.command[0].arg[0].name, "state");
    }

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string(&toml::Value::Integer(3)), Some("3".into()));
        assert_eq!(scalar_to_string(&toml::Value::Boolean(true)), Some("true".into()));
        assert_eq!(scalar_to_string(&toml::Value::Array(vec![])), None);
    }
}
