//! Override resolution for configurable values.
//!
//! Precedence, highest first:
//! 1. runtime property `{ns}.{server}.{path}` for each override namespace
//! 2. the server's locally accumulated property `{server}.{path}`
//! 3. the literal from the document

use std::collections::BTreeMap;

use dcs_core::descriptor::OVERRIDE_NAMESPACES;
use dcs_core::RuntimeProperties;

/// Resolution context for one server entry
pub struct OverrideScope<'a> {
    runtime: &'a RuntimeProperties,
    server: &'a str,
    local: Option<&'a BTreeMap<String, String>>,
}

impl<'a> OverrideScope<'a> {
    pub fn new(
        runtime: &'a RuntimeProperties,
        server: &'a str,
        local: Option<&'a BTreeMap<String, String>>,
    ) -> Self {
        Self {
            runtime,
            server,
            local,
        }
    }

    /// Resolve a value reachable under several alternative paths.
    ///
    /// Each precedence level is checked for every path before moving on to
    /// the next level.
    pub fn resolve_any<S: AsRef<str>>(&self, paths: &[S], literal: Option<String>) -> Option<String> {
        let runtime_keys: Vec<String> = paths
            .iter()
            .flat_map(|p| {
                OVERRIDE_NAMESPACES
                    .iter()
                    .map(move |ns| format!("{}.{}.{}", ns, self.server, p.as_ref()))
            })
            .collect();
        if let Some(v) = self.runtime.get_first(&runtime_keys) {
            return Some(v);
        }

        if let Some(local) = self.local {
            let hit = paths.iter().find_map(|p| {
                local
                    .get(&format!("{}.{}", self.server, p.as_ref()))
                    .filter(|v| !v.trim().is_empty())
                    .cloned()
            });
            if hit.is_some() {
                return hit;
            }
        }

        literal
    }

    pub fn resolve(&self, path: &str, literal: Option<String>) -> Option<String> {
        self.resolve_any(&[path], literal)
    }
}
