//! Configuration loader
//!
//! Turns a DCS configuration file (and everything it includes) into
//! [`ServerDescriptor`]s. One call to [`ConfigLoader::load`] is one load
//! pass: duplicate detection and port-conflict tracking are scoped to it.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use dcs_core::command::{CommandArg, CommandDefinition, CommandProtocol};
use dcs_core::descriptor::DEFAULT_PROPERTY_GROUP;
use dcs_core::event_code::{parse_status_code, EventCode, EventCodeKey};
use dcs_core::properties::{parse_bool, parse_i64, GLOBAL_BIND_ADDRESS};
use dcs_core::{PortProtocol, PortRegistry, RuntimeProperties, ServerDescriptor, ServerRegistry};
use tracing::{debug, info};

use crate::document::{
    scalar_to_string, ActiveFlag, PortSpec, RawCommand, RawEventCodes, RawInclude, RawRoot,
    RawServer,
};
use crate::error::{ConfigError, ConfigResult};
use crate::include::resolve_include;
use crate::overrides::OverrideScope;
use crate::report::LoadReport;

/// Root table name
pub const ROOT_TABLE: &str = "dcservers";

// =============================================================================
// Options and results
// =============================================================================

/// Load-time switches set by the embedding application
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Load only this server; everything else is skipped unparsed
    pub only_server: Option<String>,
    /// Added to every configured port
    pub port_offset: i32,
    /// Extra directory searched for includes
    pub include_dir: Option<PathBuf>,
}

impl LoaderOptions {
    /// Restrict loading to one server. `"*"` or blank clears the restriction.
    pub fn with_only_server(mut self, name: Option<&str>) -> Self {
        self.only_server = name
            .map(str::trim)
            .filter(|n| !n.is_empty() && *n != "*")
            .map(String::from);
        self
    }

    pub fn with_port_offset(mut self, offset: i32) -> Self {
        self.port_offset = offset;
        self
    }

    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dir = Some(dir.into());
        self
    }
}

/// Settings from the root table(s)
#[derive(Debug, Clone)]
pub struct GlobalSettings {
    pub bind_address: Option<String>,
    pub listen_backlog: Option<u32>,
    pub include_dir: Option<PathBuf>,
    pub warn_port_conflict: bool,
    pub properties: BTreeMap<String, String>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            bind_address: None,
            listen_backlog: None,
            include_dir: None,
            warn_port_conflict: true,
            properties: BTreeMap::new(),
        }
    }
}

/// Outcome of a load pass
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Accepted descriptors, first definition per name, in load order
    pub servers: Vec<ServerDescriptor>,
    pub globals: GlobalSettings,
    pub report: LoadReport,
}

impl LoadedConfig {
    pub fn server(&self, name: &str) -> Option<&ServerDescriptor> {
        self.servers.iter().find(|s| s.name() == name)
    }

    /// Register every loaded descriptor; returns how many were accepted
    pub fn register_into(&self, registry: &ServerRegistry) -> usize {
        self.servers
            .iter()
            .filter(|dcs| registry.register((*dcs).clone()))
            .count()
    }
}

// =============================================================================
// Loader
// =============================================================================

pub struct ConfigLoader {
    runtime: RuntimeProperties,
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Create a loader. Descriptors share `runtime` for late-bound
    /// overrides, and root-level properties are written into it.
    pub fn new(runtime: RuntimeProperties, options: LoaderOptions) -> Self {
        Self { runtime, options }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Load `path` and its includes.
    ///
    /// Fails only when `path` itself is unreadable, malformed or lacks the
    /// root table. Failures inside included files and individual entries
    /// are collected in the report.
    pub fn load(&self, path: &Path) -> ConfigResult<LoadedConfig> {
        let mut pass = LoadPass::new(self);
        pass.load_file(path, 0)?;
        Ok(pass.finish())
    }
}

struct LoadPass<'a> {
    loader: &'a ConfigLoader,
    servers: Vec<ServerDescriptor>,
    seen: HashSet<String>,
    ports: PortRegistry,
    globals: GlobalSettings,
    globals_set: bool,
    report: LoadReport,
    stack: Vec<PathBuf>,
}

impl<'a> LoadPass<'a> {
    fn new(loader: &'a ConfigLoader) -> Self {
        Self {
            loader,
            servers: Vec::new(),
            seen: HashSet::new(),
            ports: PortRegistry::new(),
            globals: GlobalSettings::default(),
            globals_set: false,
            report: LoadReport::default(),
            stack: Vec::new(),
        }
    }

    fn finish(mut self) -> LoadedConfig {
        self.report.port_conflicts = self.ports.into_conflicts();
        info!(
            servers = self.servers.len(),
            warnings = self.report.warnings.len(),
            errors = self.report.errors.len(),
            "DCS configuration loaded"
        );
        LoadedConfig {
            servers: self.servers,
            globals: self.globals,
            report: self.report,
        }
    }

    fn load_file(&mut self, path: &Path, depth: usize) -> ConfigResult<()> {
        let canonical = path
            .canonicalize()
            .map_err(|e| ConfigError::io(path, e))?;
        let content =
            std::fs::read_to_string(&canonical).map_err(|e| ConfigError::io(path, e))?;
        let doc: toml::Table = toml::from_str(&content).map_err(|e| ConfigError::parse(path, e))?;
        let root_value = doc
            .get(ROOT_TABLE)
            .cloned()
            .ok_or_else(|| ConfigError::MissingRoot(path.to_path_buf()))?;
        let root: RawRoot = root_value
            .try_into()
            .map_err(|e| ConfigError::parse(path, e))?;

        info!(path = %path.display(), depth, "Loading DCS configuration");
        self.report.loaded_files.push(canonical.clone());
        self.stack.push(canonical.clone());

        self.apply_root(&root, &canonical);

        for entry in &root.server {
            self.load_server(entry, path);
        }

        let base_dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        for entry in &root.include {
            self.load_include(entry, path, &base_dir, &canonical, depth);
        }

        self.stack.pop();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Root settings
    // -------------------------------------------------------------------------

    fn apply_root(&mut self, root: &RawRoot, file: &Path) {
        // The top-level file decides the root settings
        if !self.globals_set {
            self.globals_set = true;
            self.globals.bind_address = root
                .bind_address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from);
            self.globals.listen_backlog = root.listen_backlog;
            self.globals.include_dir = root.include_dir.as_deref().map(|d| {
                let d = Path::new(d);
                if d.is_absolute() {
                    d.to_path_buf()
                } else {
                    file.parent().unwrap_or(Path::new("")).join(d)
                }
            });
            if let Some(warn) = root.warn_port_conflict {
                self.globals.warn_port_conflict = warn;
            }
            if let Some(addr) = &self.globals.bind_address {
                self.loader.runtime.set(GLOBAL_BIND_ADDRESS, addr.clone());
            }
        }

        for (key, value) in &root.properties {
            let Some(value) = scalar_to_string(value) else {
                self.report
                    .warn(format!("{}: property '{}' is not a scalar", file.display(), key));
                continue;
            };
            if !self.global_property_applies(key) {
                debug!(key = %key, "Skipping global property for unselected server");
                continue;
            }
            if self.globals.properties.contains_key(key) {
                continue;
            }
            self.loader.runtime.set(key.clone(), value.clone());
            self.globals.properties.insert(key.clone(), value);
        }
    }

    /// In only-server mode, global properties must be scoped to that server
    fn global_property_applies(&self, key: &str) -> bool {
        let Some(only) = &self.loader.options.only_server else {
            return true;
        };
        let plain = format!("{}.", only);
        key.starts_with(&plain)
            || dcs_core::descriptor::OVERRIDE_NAMESPACES
                .iter()
                .any(|ns| key.starts_with(&format!("{}.{}", ns, plain)))
    }

    // -------------------------------------------------------------------------
    // Includes
    // -------------------------------------------------------------------------

    fn load_include(
        &mut self,
        entry: &toml::Value,
        file: &Path,
        base_dir: &Path,
        current: &Path,
        depth: usize,
    ) {
        let include: RawInclude = match entry.clone().try_into() {
            Ok(inc) => inc,
            Err(e) => {
                self.report.error(format!(
                    "{}: invalid include directive: {}",
                    file.display(),
                    e
                ));
                return;
            }
        };

        if let Some(active) = &include.active {
            if !active.is_active_for(&include.file) {
                debug!(file = %include.file, "Include inactive, skipping");
                return;
            }
        }

        let include_dir = self
            .loader
            .options
            .include_dir
            .clone()
            .or_else(|| self.globals.include_dir.clone());
        let targets = resolve_include(&include, base_dir, include_dir.as_deref());

        if targets.is_empty() {
            if include.optional {
                debug!(file = %include.file, "Optional include not found");
            } else {
                self.report.missing_includes.push(include.file.clone());
                self.report.error(format!(
                    "{}: include file not found: {}",
                    file.display(),
                    include.file
                ));
            }
            return;
        }

        for target in targets {
            let canonical = match target.canonicalize() {
                Ok(c) => c,
                Err(e) => {
                    self.report
                        .error(format!("Unable to resolve include {}: {}", target.display(), e));
                    continue;
                }
            };
            if canonical == current {
                self.report.warn(format!(
                    "{}: file includes itself, skipping",
                    file.display()
                ));
                continue;
            }
            if self.stack.contains(&canonical) {
                self.report.warn(format!(
                    "{}: include cycle through {}, skipping",
                    file.display(),
                    target.display()
                ));
                continue;
            }
            debug!(file = %target.display(), depth = depth + 1, "Including configuration");
            if let Err(e) = self.load_file(&target, depth + 1) {
                self.report.error(e.to_string());
            }
        }
    }

    // -------------------------------------------------------------------------
    // Server entries
    // -------------------------------------------------------------------------

    fn load_server(&mut self, entry: &toml::Value, file: &Path) {
        let name = entry
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("")
            .to_string();
        if name.is_empty() {
            self.report.error(format!(
                "{}: server entry is missing a name",
                file.display()
            ));
            return;
        }

        if let Some(only) = &self.loader.options.only_server {
            if *only != name {
                debug!(server = %name, "Not the selected server, skipping");
                return;
            }
        }

        if let Some(active) = entry.get("active") {
            let flag: Result<ActiveFlag, _> = active.clone().try_into();
            match flag {
                Ok(flag) if !flag.is_active_for(&name) => {
                    debug!(server = %name, "Server inactive, skipping");
                    self.report.inactive.push(name);
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    self.report
                        .warn(format!("[{}] invalid active flag: {}", name, e));
                }
            }
        }

        if self.seen.contains(&name) {
            self.report.duplicates.push(name.clone());
            self.report.warn(format!(
                "[{}] duplicate server definition in {}, keeping the first",
                name,
                file.display()
            ));
            return;
        }

        let raw: RawServer = match entry.clone().try_into() {
            Ok(raw) => raw,
            Err(e) => {
                self.report.error(format!(
                    "[{}] invalid server entry in {}: {}",
                    name,
                    file.display(),
                    e
                ));
                return;
            }
        };

        let warn_conflict = raw
            .warn_port_conflict
            .unwrap_or(self.globals.warn_port_conflict);
        let descriptor = self.build_descriptor(raw);
        self.claim_ports(&descriptor, warn_conflict);

        info!(server = %name, "Loaded server descriptor");
        self.seen.insert(name);
        self.servers.push(descriptor);
    }

    fn claim_ports(&mut self, dcs: &ServerDescriptor, warn_conflict: bool) {
        for (protocol, ports) in [
            (PortProtocol::Tcp, &dcs.tcp().ports),
            (PortProtocol::Udp, &dcs.udp().ports),
        ] {
            for port in ports {
                if !self
                    .ports
                    .register_port(protocol, *port, dcs.name(), warn_conflict)
                    && warn_conflict
                {
                    let owner = self.ports.owner(protocol, *port).unwrap_or_default();
                    self.report.warnings.push(format!(
                        "{} port {} of '{}' is already used by '{}'",
                        protocol,
                        port,
                        dcs.name(),
                        owner
                    ));
                }
            }
        }
    }

    fn offset_port(&mut self, server: &str, raw: i64) -> Option<u16> {
        if raw <= 0 {
            return None;
        }
        let shifted = raw + i64::from(self.loader.options.port_offset);
        match u16::try_from(shifted) {
            Ok(p) if p > 0 => Some(p),
            _ => {
                self.report.warn(format!(
                    "[{}] port {} is out of range after offset {}",
                    server, raw, self.loader.options.port_offset
                ));
                None
            }
        }
    }

    fn parse_ports(&mut self, server: &str, spec: Option<&PortSpec>) -> Vec<u16> {
        let Some(spec) = spec else {
            return Vec::new();
        };
        let mut ports = Vec::new();
        for value in spec.values() {
            match value {
                Ok(raw) => {
                    if let Some(p) = self.offset_port(server, raw) {
                        ports.push(p);
                    }
                }
                Err(bad) => self
                    .report
                    .warn(format!("[{}] invalid port number: {}", server, bad)),
            }
        }
        ports
    }

    fn build_descriptor(&mut self, raw: RawServer) -> ServerDescriptor {
        let runtime = self.loader.runtime.clone();
        let name = raw.name.trim().to_string();
        let mut dcs = ServerDescriptor::new(&name, runtime.clone());
        dcs.set_description(raw.description.as_str());

        // Properties first: later overrides consult them
        for group in &raw.properties {
            for (key, value) in &group.entries {
                let literal = scalar_to_string(value);
                if literal.is_none() {
                    self.report
                        .warn(format!("[{}] property '{}' is not a scalar", name, key));
                    continue;
                }
                let resolved = OverrideScope::new(
                    &runtime,
                    &name,
                    dcs.property_group(DEFAULT_PROPERTY_GROUP),
                )
                .resolve_any(&[key.clone(), format!("Properties.{}", key)], literal);
                if let Some(v) = resolved {
                    dcs.set_property(group.id.as_deref(), key, v);
                }
            }
        }

        let tcp = self.parse_ports(&name, raw.listen.tcp_port.as_ref());
        let udp = self.parse_ports(&name, raw.listen.udp_port.as_ref());
        let bind = raw.listen.bind_address.as_deref();
        dcs.set_tcp_ports(bind, &tcp, true);
        dcs.set_udp_ports(bind, &udp, true);
        dcs.set_tcp_ssl(raw.listen.ssl);

        if let Some(proto) = raw.command_protocol.as_deref() {
            match proto.parse::<CommandProtocol>() {
                Ok(p) => dcs.set_command_protocol(p),
                Err(e) => self.report.warn(format!("[{}] {}", name, e)),
            }
        }

        if let Some(prefixes) = &raw.unique_id_prefixes {
            dcs.set_unique_id_prefixes(&prefixes.items());
        }

        for (key, value) in &raw.attributes {
            let resolved = OverrideScope::new(
                &runtime,
                &name,
                dcs.property_group(DEFAULT_PROPERTY_GROUP),
            )
            .resolve(&format!("Attribute.{}", key), scalar_to_string(value));
            match resolved {
                Some(v) => dcs.set_attribute(key, &v),
                None => self
                    .report
                    .warn(format!("[{}] attribute '{}' is not a scalar", name, key)),
            }
        }

        if let Some(codes) = &raw.event_codes {
            self.load_event_codes(&mut dcs, codes);
        }

        if let Some(commands) = &raw.commands {
            let port = match commands.port {
                Some(p) => self.offset_port(&name, p).map(i32::from).unwrap_or(0),
                None => 0,
            };
            dcs.set_command_dispatch(commands.host.as_deref(), port);
            for command in &commands.command {
                if let Some(def) = self.build_command(&dcs, command) {
                    dcs.add_command(def);
                }
            }
        }

        dcs
    }

    fn load_event_codes(&mut self, dcs: &mut ServerDescriptor, raw: &RawEventCodes) {
        let name = dcs.name().to_string();
        dcs.event_codes_mut().enabled = raw.enabled;
        for code in &raw.code {
            let key = match &code.key {
                toml::Value::Integer(i) => EventCodeKey::Int(*i),
                toml::Value::String(s) if !s.trim().is_empty() => EventCodeKey::parse(s),
                other => {
                    self.report
                        .warn(format!("[{}] invalid event code key: {}", name, other));
                    continue;
                }
            };
            let status = match &code.status {
                None => parse_status_code(""),
                Some(toml::Value::Integer(i)) => i32::try_from(*i).ok(),
                Some(toml::Value::String(s)) => parse_status_code(s),
                Some(_) => None,
            };
            let Some(status_code) = status else {
                self.report
                    .warn(format!("[{}] invalid status code for event {:?}", name, key));
                continue;
            };
            dcs.event_codes_mut().insert(EventCode {
                key,
                status_code,
                data: code.data.clone().filter(|d| !d.is_empty()),
            });
        }
    }

    fn build_command(
        &mut self,
        dcs: &ServerDescriptor,
        raw: &RawCommand,
    ) -> Option<CommandDefinition> {
        let server = dcs.name();
        let cmd_name = raw.name.trim();
        if cmd_name.is_empty() {
            self.report
                .warn(format!("[{}] command without a name ignored", server));
            return None;
        }

        let literal = raw.enabled.as_ref().and_then(scalar_to_string);
        let enabled = OverrideScope::new(
            dcs.runtime(),
            server,
            dcs.property_group(DEFAULT_PROPERTY_GROUP),
        )
        .resolve(&format!("Command.{}.enabled", cmd_name), literal)
        .map(|v| parse_bool(&v).unwrap_or_else(|| v.trim().eq_ignore_ascii_case(cmd_name)))
        .unwrap_or(true);
        if !enabled {
            debug!(server = %server, command = %cmd_name, "Command disabled");
            return None;
        }

        let (protocol, sms_handler) = raw
            .protocol
            .as_deref()
            .map(CommandProtocol::parse_spec)
            .unwrap_or_default();
        if dcs.configured_command_port() <= 0 && !protocol.is_sms() {
            self.report.warn(format!(
                "[{}] Command ignored (not an SMS protocol command): {}",
                server, cmd_name
            ));
            return None;
        }

        let status_code = match &raw.status_code {
            None => 0,
            Some(toml::Value::Integer(i)) => i32::try_from(*i).unwrap_or(0),
            Some(toml::Value::String(s)) => parse_i64(s)
                .and_then(|n| i32::try_from(n).ok())
                .unwrap_or_else(|| {
                    self.report.warn(format!(
                        "[{}] invalid status code for command {}: {}",
                        server, cmd_name, s
                    ));
                    0
                }),
            Some(other) => {
                self.report.warn(format!(
                    "[{}] invalid status code for command {}: {}",
                    server, cmd_name, other
                ));
                0
            }
        };

        let mut def = CommandDefinition::new(cmd_name, raw.template.trim());
        def.description = raw.description.trim().to_string();
        def.types = raw.types.as_ref().map(|t| t.items()).unwrap_or_default();
        def.acl_name = raw.acl.clone().filter(|a| !a.trim().is_empty());
        def.acl_default = raw.acl_default.clone().filter(|a| !a.trim().is_empty());
        def.protocol = protocol;
        def.sms_handler = sms_handler;
        def.has_args = raw.has_args.unwrap_or(false) || def.has_args;
        def.expect_ack = raw.expect_ack;
        def.status_code = status_code;
        def.args = raw
            .arg
            .iter()
            .map(|a| {
                let mut arg = CommandArg::new(a.name.trim());
                arg.description = a.description.clone();
                arg.read_only = a.read_only;
                arg.session_var = a.session_var.clone().filter(|s| !s.is_empty());
                arg.default_value = a.default.clone();
                match a.length.as_ref().and_then(scalar_to_string) {
                    Some(spec) => arg.with_length(&spec),
                    None => arg,
                }
            })
            .collect();
        Some(def)
    }
}
