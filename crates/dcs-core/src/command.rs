//! Device command definitions
//!
//! A command is what an operator may send to a device through its
//! communication server: a protocol-tagged string template plus declared
//! arguments.

use std::fmt;
use std::str::FromStr;

/// Default display length of a command argument
pub const DEFAULT_ARG_DISPLAY_LEN: usize = 70;
/// Maximum argument length when none is declared
pub const DEFAULT_ARG_MAX_LEN: usize = 500;

/// How the *device* receives a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandProtocol {
    #[default]
    Udp,
    Tcp,
    Sms,
}

impl CommandProtocol {
    /// Split a `proto[:handler]` spec, e.g. `sms:twilio`.
    ///
    /// Unknown protocol names fall back to UDP.
    pub fn parse_spec(spec: &str) -> (Self, Option<String>) {
        let (proto, handler) = match spec.split_once(':') {
            Some((p, h)) => (p, Some(h.trim().to_string()).filter(|h| !h.is_empty())),
            None => (spec, None),
        };
        (proto.parse().unwrap_or_default(), handler)
    }

    pub fn is_sms(&self) -> bool {
        matches!(self, Self::Sms)
    }
}

impl FromStr for CommandProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            "sms" => Ok(Self::Sms),
            other => Err(format!("Unknown command protocol: {}", other)),
        }
    }
}

impl fmt::Display for CommandProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Sms => "sms",
        };
        f.write_str(s)
    }
}

/// One declared argument of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArg {
    pub name: String,
    pub description: String,
    pub read_only: bool,
    /// Session variable the argument value is remembered under
    pub session_var: Option<String>,
    pub default_value: Option<String>,
    pub display_len: usize,
    pub max_len: usize,
}

impl CommandArg {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            read_only: false,
            session_var: None,
            default_value: None,
            display_len: DEFAULT_ARG_DISPLAY_LEN,
            max_len: DEFAULT_ARG_MAX_LEN,
        }
    }

    /// Apply a `"disp[,max]"` length spec.
    ///
    /// A missing or invalid display length keeps the default, a missing max
    /// equals the display length, and max is never below the display length.
    pub fn with_length(mut self, spec: &str) -> Self {
        let (disp, max) = match spec.split_once(',') {
            Some((d, m)) => (d.trim(), Some(m.trim())),
            None => (spec.trim(), None),
        };
        let disp = disp
            .parse::<usize>()
            .ok()
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_ARG_DISPLAY_LEN);
        let max = max
            .and_then(|m| m.parse::<usize>().ok())
            .unwrap_or(disp)
            .max(disp);
        self.display_len = disp;
        self.max_len = max;
        self
    }
}

/// An argument value longer than its declared maximum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgTooLong {
    pub index: usize,
    pub name: String,
    pub len: usize,
    pub max_len: usize,
}

impl fmt::Display for ArgTooLong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Argument {} ({}) is {} chars, maximum is {}",
            self.index, self.name, self.len, self.max_len
        )
    }
}

/// A command a server accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    /// Command types this applies to; empty means every type
    pub types: Vec<String>,
    pub acl_name: Option<String>,
    pub acl_default: Option<String>,
    pub args: Vec<CommandArg>,
    pub protocol: CommandProtocol,
    /// SMS gateway name, from a `sms:<handler>` protocol spec
    pub sms_handler: Option<String>,
    pub template: String,
    pub has_args: bool,
    pub expect_ack: bool,
    pub status_code: i32,
}

impl CommandDefinition {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        let template = template.into();
        let has_args = template.contains("${");
        Self {
            name: name.into(),
            description: String::new(),
            enabled: true,
            types: Vec::new(),
            acl_name: None,
            acl_default: None,
            args: Vec::new(),
            protocol: CommandProtocol::default(),
            sms_handler: None,
            template,
            has_args,
            expect_ack: false,
            status_code: 0,
        }
    }

    /// Whether this command may be issued as `cmd_type`
    pub fn applies_to(&self, cmd_type: &str) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t.eq_ignore_ascii_case(cmd_type))
    }

    pub fn uses_sms(&self) -> bool {
        self.protocol.is_sms()
    }

    /// Reject argument values longer than their declared maximum.
    ///
    /// Undeclared trailing arguments are held to the default maximum.
    pub fn check_args(&self, args: &[String]) -> Result<(), ArgTooLong> {
        for (index, value) in args.iter().enumerate() {
            let (name, max_len) = match self.args.get(index) {
                Some(decl) => (decl.name.clone(), decl.max_len),
                None => (format!("arg{}", index), DEFAULT_ARG_MAX_LEN),
            };
            let len = value.chars().count();
            if len > max_len {
                return Err(ArgTooLong {
                    index,
                    name,
                    len,
                    max_len,
                });
            }
        }
        Ok(())
    }

    /// Expand the command template with `args`.
    ///
    /// `${arg}` is the first argument, `${argN}` the Nth, and `${name}` the
    /// argument at the position of the declared argument called `name`.
    /// `${key=default}` falls back to `default`; otherwise a declared
    /// argument default applies, then the empty string.
    pub fn expand(&self, args: &[String]) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    out.push_str(&self.resolve_key(&after[..end], args));
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn resolve_key(&self, expr: &str, args: &[String]) -> String {
        let (key, inline_default) = match expr.split_once('=') {
            Some((k, d)) => (k.trim(), Some(d)),
            None => (expr.trim(), None),
        };

        let index = if key == "arg" {
            Some(0)
        } else if let Some(n) = key.strip_prefix("arg").and_then(|n| n.parse::<usize>().ok()) {
            Some(n)
        } else {
            self.args.iter().position(|a| a.name == key)
        };

        let supplied = index
            .and_then(|i| args.get(i))
            .filter(|v| !v.is_empty())
            .cloned();
        supplied
            .or_else(|| inline_default.map(String::from))
            .or_else(|| {
                index
                    .and_then(|i| self.args.get(i))
                    .and_then(|a| a.default_value.clone())
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_spec() {
        assert_eq!(
            CommandProtocol::parse_spec("sms:twilio"),
            (CommandProtocol::Sms, Some("twilio".to_string()))
        );
        assert_eq!(CommandProtocol::parse_spec("TCP"), (CommandProtocol::Tcp, None));
        assert_eq!(CommandProtocol::parse_spec("sms:"), (CommandProtocol::Sms, None));
        assert_eq!(CommandProtocol::parse_spec("bogus"), (CommandProtocol::Udp, None));
    }

    #[test]
    fn test_arg_length_spec() {
        let a = CommandArg::new("x").with_length("10,20");
        assert_eq!((a.display_len, a.max_len), (10, 20));

        let a = CommandArg::new("x").with_length("15");
        assert_eq!((a.display_len, a.max_len), (15, 15));

        let a = CommandArg::new("x").with_length("30,5");
        assert_eq!((a.display_len, a.max_len), (30, 30));

        let a = CommandArg::new("x");
        assert_eq!((a.display_len, a.max_len), (70, 500));
    }

    #[test]
    fn test_has_args_from_template() {
        assert!(CommandDefinition::new("out", "OUT,${arg0}").has_args);
        assert!(!CommandDefinition::new("loc", "LOCATE").has_args);
    }

    #[test]
    fn test_expand_positional() {
        let cmd = CommandDefinition::new("out", "SET ${arg} ${arg1} ${arg2=off}");
        assert_eq!(cmd.expand(&args(&["1", "on"])), "SET 1 on off");
    }

    #[test]
    fn test_expand_named_and_declared_default() {
        let mut cmd = CommandDefinition::new("speed", "SPD:${limit}:${unit}");
        cmd.args.push(CommandArg::new("limit"));
        let mut unit = CommandArg::new("unit");
        unit.default_value = Some("kph".to_string());
        cmd.args.push(unit);
        assert_eq!(cmd.expand(&args(&["80"])), "SPD:80:kph");
    }

    #[test]
    fn test_expand_unterminated() {
        let cmd = CommandDefinition::new("x", "A ${arg");
        assert_eq!(cmd.expand(&args(&["1"])), "A ${arg");
    }

    #[test]
    fn test_check_args() {
        let mut cmd = CommandDefinition::new("msg", "MSG ${arg}");
        cmd.args.push(CommandArg::new("text").with_length("5,8"));
        assert!(cmd.check_args(&args(&["12345678"])).is_ok());
        let err = cmd.check_args(&args(&["123456789"])).unwrap_err();
        assert_eq!(err.index, 0);
        assert_eq!(err.max_len, 8);
    }

    #[test]
    fn test_applies_to() {
        let mut cmd = CommandDefinition::new("x", "X");
        assert!(cmd.applies_to("map"));
        cmd.types = vec!["admin".to_string()];
        assert!(cmd.applies_to("ADMIN"));
        assert!(!cmd.applies_to("map"));
    }
}
