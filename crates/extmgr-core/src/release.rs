//! Flat `KEY=VALUE` release-file parsing.
//!
//! The same format backs both the host's os-release file and the
//! extension-release file embedded in every image.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Parse `KEY=VALUE` lines into a key/value map.
///
/// `#` starts a comment, blank lines are skipped, and values may be
/// wrapped in single or double quotes. Any other line shape is a parse
/// error. `origin` is only used for error messages.
pub fn parse(content: &str, origin: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(Error::MalformedRelease {
                path: origin.to_string(),
                line: idx + 1,
            });
        };

        values.insert(key.trim().to_string(), unquote(value.trim()).to_string());
    }

    Ok(values)
}

/// Fetch `key`, treating an empty value the same as an absent one.
pub fn get(values: &BTreeMap<String, String>, key: &str) -> Option<String> {
    values.get(key).filter(|v| !v.is_empty()).cloned()
}

/// Fetch `key` or fail with a missing-key error naming `origin`.
pub fn require(values: &BTreeMap<String, String>, key: &str, origin: &str) -> Result<String> {
    get(values, key).ok_or_else(|| Error::missing_key(key, origin))
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}
