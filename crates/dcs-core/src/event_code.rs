//! Protocol event-code translation

use std::collections::HashMap;

use crate::properties::parse_i64;

/// Status code meaning "drop this event"
pub const STATUS_IGNORE: i32 = -1;
/// Status code meaning "no specific status"
pub const STATUS_NONE: i32 = 0;

/// A raw code as reported by a device: numeric or textual
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventCodeKey {
    Int(i64),
    /// Stored lower-cased
    Text(String),
}

impl EventCodeKey {
    /// Numeric (decimal or `0x` hex) keys become `Int`, everything else a
    /// lower-cased `Text`.
    pub fn parse(raw: &str) -> Self {
        match parse_i64(raw) {
            Some(n) => Self::Int(n),
            None => Self::Text(raw.trim().to_ascii_lowercase()),
        }
    }
}

/// Translation target for one raw code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCode {
    pub key: EventCodeKey,
    pub status_code: i32,
    pub data: Option<String>,
}

/// Parse a status code value.
///
/// Blank or `ignore` is [`STATUS_IGNORE`]; `default`, `none` and `0` are
/// [`STATUS_NONE`]; otherwise a decimal or hex integer.
pub fn parse_status_code(raw: &str) -> Option<i32> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("ignore") {
        return Some(STATUS_IGNORE);
    }
    if s.eq_ignore_ascii_case("default") || s.eq_ignore_ascii_case("none") {
        return Some(STATUS_NONE);
    }
    parse_i64(s).and_then(|n| i32::try_from(n).ok())
}

#[derive(Debug, Clone)]
pub struct EventCodeMap {
    pub enabled: bool,
    codes: HashMap<EventCodeKey, EventCode>,
}

impl Default for EventCodeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl EventCodeMap {
    pub fn new() -> Self {
        Self {
            enabled: true,
            codes: HashMap::new(),
        }
    }

    pub fn insert(&mut self, code: EventCode) {
        self.codes.insert(code.key.clone(), code);
    }

    pub fn get(&self, key: &EventCodeKey) -> Option<&EventCode> {
        if self.enabled {
            self.codes.get(key)
        } else {
            None
        }
    }

    pub fn get_int(&self, code: i64) -> Option<&EventCode> {
        self.get(&EventCodeKey::Int(code))
    }

    pub fn get_text(&self, code: &str) -> Option<&EventCode> {
        self.get(&EventCodeKey::Text(code.trim().to_ascii_lowercase()))
    }

    /// Translated status for `code`, or `fallback` when unmapped
    pub fn status_for(&self, key: &EventCodeKey, fallback: i32) -> i32 {
        self.get(key).map(|c| c.status_code).unwrap_or(fallback)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
