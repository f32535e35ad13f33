//! Unique-ID prefix helpers.
//!
//! Device families that share a numbering space (IMEI, ESN, ...) are kept
//! apart by prefixing the hardware ID per protocol, e.g. `imei:3520...`.
//! These helpers centralise the prefix normalization so the loader and the
//! registry lookups agree on it.

/// Normalize one configured prefix.
///
/// `"<blank>"` and `"*"` mean "no prefix"; a trailing `*` wildcard is
/// dropped.
///
/// ```
/// # use dcs_core::unique_id::normalize_prefix;
/// assert_eq!(normalize_prefix("imei_*"), "imei_");
/// assert_eq!(normalize_prefix("<blank>"), "");
/// assert_eq!(normalize_prefix("*"), "");
/// ```
pub fn normalize_prefix(prefix: &str) -> String {
    let p = prefix.trim();
    if p.eq_ignore_ascii_case("<blank>") || p == "*" {
        return String::new();
    }
    p.strip_suffix('*').unwrap_or(p).to_string()
}

/// Normalize a prefix list, dropping duplicates while keeping order.
/// An empty list becomes `[""]`.
///
/// ```
/// # use dcs_core::unique_id::normalize_prefixes;
/// assert_eq!(normalize_prefixes::<&str>(&[]), vec![String::new()]);
/// assert_eq!(normalize_prefixes(&["imei_", "imei_*", "*"]), vec!["imei_", ""]);
/// ```
pub fn normalize_prefixes<S: AsRef<str>>(prefixes: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(prefixes.len());
    for p in prefixes {
        let p = normalize_prefix(p.as_ref());
        if !out.contains(&p) {
            out.push(p);
        }
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

/// Split a comma-separated prefix attribute.
pub fn split_prefix_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Join a prefix and a raw ID.
///
/// ```
/// # use dcs_core::unique_id::prefixed_unique_id;
/// assert_eq!(prefixed_unique_id("imei:", "1234"), "imei:1234");
/// assert_eq!(prefixed_unique_id("", "1234"), "1234");
/// ```
pub fn prefixed_unique_id(prefix: &str, id: &str) -> String {
    format!("{}{}", prefix, id)
}
