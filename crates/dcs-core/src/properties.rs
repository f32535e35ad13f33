//! Runtime properties and the `key=value` line codec
//!
//! Runtime properties are the late-bound override layer consulted by
//! descriptors after configuration load (deployment-time port changes,
//! tuning values). The line codec is the wire form used by the command
//! dispatch socket: one line of space-separated `key=value` pairs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

/// Property key holding the process-wide listen/bind address
pub const GLOBAL_BIND_ADDRESS: &str = "DCServerConfig.bindAddress";

/// Shared, mutable key/value property set.
///
/// Cloning is cheap and every clone observes the same underlying map,
/// which is what lets a descriptor see overrides set after it was built.
#[derive(Debug, Clone, Default)]
pub struct RuntimeProperties {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl RuntimeProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.inner.write().remove(key)
    }

    /// Insert every pair, overwriting existing keys
    pub fn extend<I, K, V>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = self.inner.write();
        for (k, v) in pairs {
            map.insert(k.into(), v.into());
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Value for `key`, ignoring blank values
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner
            .read()
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    /// First non-blank value among `keys`, in order
    pub fn get_first<S: AsRef<str>>(&self, keys: &[S]) -> Option<String> {
        let map = self.inner.read();
        keys.iter().find_map(|k| {
            map.get(k.as_ref())
                .filter(|v| !v.trim().is_empty())
                .cloned()
        })
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| parse_i64(&v))
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| parse_bool(&v))
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Parse a decimal or `0x`-prefixed hex integer
pub fn parse_i64(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

/// Parse the boolean spellings accepted in configuration values
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Line codec
// =============================================================================

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '=' || c == '\\')
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            // Line breaks would end the request early on the wire
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Encode ordered pairs as one `key=value` line (no trailing newline).
///
/// ```
/// # use dcs_core::properties::encode_line;
/// let line = encode_line([("account", "demo"), ("arg0", "two words")]);
/// assert_eq!(line, r#"account=demo arg0="two words""#);
/// ```
pub fn encode_line<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|(k, v)| {
            let v = v.as_ref();
            if needs_quotes(v) {
                format!("{}={}", k.as_ref(), quote(v))
            } else {
                format!("{}={}", k.as_ref(), v)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a `key=value` line. Keys without `=` map to an empty value.
///
/// ```
/// # use dcs_core::properties::parse_line;
/// let map = parse_line(r#"result=OK000 message="All good""#);
/// assert_eq!(map["result"], "OK000");
/// assert_eq!(map["message"], "All good");
/// ```
pub fn parse_line(line: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let mut chars = line.trim().chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            key.push(c);
        }

        let mut value = String::new();
        if chars.next_if_eq(&'=').is_some() {
            if chars.next_if_eq(&'"').is_some() {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            match chars.next() {
                                Some('n') => value.push('\n'),
                                Some('r') => value.push('\r'),
                                Some(escaped) => value.push(escaped),
                                None => {}
                            }
                        }
                        '"' => break,
                        other => value.push(other),
                    }
                }
            } else {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
            }
        }

        if !key.is_empty() {
            map.insert(key, value);
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_properties_shared_between_clones() {
        let props = RuntimeProperties::new();
        let view = props.clone();
        props.set("acme.commandPort", "6000");
        assert_eq!(view.get_i64("acme.commandPort"), Some(6000));
    }

    #[test]
    fn test_get_first_skips_blank() {
        let props = RuntimeProperties::new();
        props.set("a", "  ");
        props.set("b", "x");
        assert_eq!(props.get_first(&["a", "b"]), Some("x".to_string()));
        assert_eq!(props.get_first(&["c"]), None);
    }

    #[test]
    fn test_parse_i64_hex() {
        assert_eq!(parse_i64("0xF020"), Some(0xF020));
        assert_eq!(parse_i64(" 42 "), Some(42));
        assert_eq!(parse_i64("abc"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_quoting_escapes() {
        let line = encode_line([("arg0", r#"say "hi""#)]);
        assert_eq!(line, r#"arg0="say \"hi\"""#);
        let map = parse_line(&line);
        assert_eq!(map["arg0"], r#"say "hi""#);
    }

    #[test]
    fn test_line_breaks_stay_on_one_line() {
        let line = encode_line([
            ("account", "demo"),
            ("arg0", "on\r\naccount=other cmdname=reboot"),
        ]);
        assert_eq!(line.lines().count(), 1);
        assert_eq!(
            line,
            r#"account=demo arg0="on\r\naccount=other cmdname=reboot""#
        );

        let map = parse_line(&line);
        assert_eq!(map.len(), 2);
        assert_eq!(map["account"], "demo");
        assert_eq!(map["arg0"], "on\r\naccount=other cmdname=reboot");
    }

    #[test]
    fn test_empty_value_is_quoted() {
        let line = encode_line([("cmdname", "")]);
        assert_eq!(line, r#"cmdname="""#);
        assert_eq!(parse_line(&line)["cmdname"], "");
    }

    #[test]
    fn test_parse_bare_key() {
        let map = parse_line("flag result=OK000");
        assert_eq!(map["flag"], "");
        assert_eq!(map["result"], "OK000");
    }
}
