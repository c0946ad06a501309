//! JSON sidecar catalog parsing.
//!
//! A sidecar is the per-image `<image>.json` published next to an image,
//! or a bulk file holding an array of such objects. Unknown keys are
//! tolerated; a nested `sysext` object is folded into the record with
//! its fields taking precedence.

use std::path::Path;

use extmgr_core::error::{Error, Result};
use extmgr_core::types::ExtensionMetadata;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RawSidecar {
    #[serde(flatten)]
    top: ExtensionMetadata,
    #[serde(default)]
    sysext: Option<ExtensionMetadata>,
}

/// Parse one sidecar object into a metadata record.
pub fn metadata_from_value(value: &Value) -> Result<ExtensionMetadata> {
    if !value.is_object() {
        return Err(Error::metadata("sidecar entry is not a JSON object"));
    }

    let raw: RawSidecar = serde_json::from_value(value.clone())?;

    let mut meta = raw.top;
    if let Some(nested) = raw.sysext {
        meta.overlay(nested);
    }
    Ok(meta)
}

/// Parse a sidecar document holding either one object or an array of
/// objects. Every array element must be an object.
pub fn load_sidecar_slice(bytes: &[u8]) -> Result<Vec<ExtensionMetadata>> {
    let value: Value = serde_json::from_slice(bytes)?;

    match value {
        Value::Array(entries) => entries.iter().map(metadata_from_value).collect(),
        other => Ok(vec![metadata_from_value(&other)?]),
    }
}

/// Load a sidecar document from a file.
pub fn load_sidecar_path(path: &Path) -> Result<Vec<ExtensionMetadata>> {
    let bytes = std::fs::read(path)?;
    load_sidecar_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_object_with_unknown_keys() {
        let json = br#"{
            "image_name": "gcc-30.3.x86-64.raw",
            "ID": "tumbleweed",
            "VERSION_ID": "20250101",
            "SOMETHING_ELSE": "ignored"
        }"#;

        let records = load_sidecar_slice(json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_deref(), Some("tumbleweed"));
        assert_eq!(
            records[0].image_name.as_deref(),
            Some("gcc-30.3.x86-64.raw")
        );
    }

    #[test]
    fn nested_sysext_object_wins() {
        let json = br#"{
            "image_name": "gcc-30.3.x86-64.raw",
            "ID": "outer",
            "sysext": {
                "ID": "tumbleweed",
                "SYSEXT_VERSION_ID": "30.3",
                "ARCHITECTURE": "x86-64"
            }
        }"#;

        let records = load_sidecar_slice(json).unwrap();
        let meta = &records[0];
        assert_eq!(meta.id.as_deref(), Some("tumbleweed"));
        assert_eq!(meta.sysext_version_id.as_deref(), Some("30.3"));
        assert_eq!(meta.architecture.as_deref(), Some("x86-64"));
        // The synthetic outer name is kept when the nested object has none.
        assert_eq!(meta.image_name.as_deref(), Some("gcc-30.3.x86-64.raw"));
    }

    #[test]
    fn array_of_objects() {
        let json = br#"[
            {"ID": "a", "SYSEXT_VERSION_ID": "1"},
            {"ID": "b", "SYSEXT_VERSION_ID": "2"}
        ]"#;

        let records = load_sidecar_slice(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id.as_deref(), Some("b"));
    }

    #[test]
    fn non_object_array_element_is_an_error() {
        let json = br#"[{"ID": "a"}, "not an object"]"#;
        assert!(load_sidecar_slice(json).is_err());
    }

    #[test]
    fn top_level_scalar_is_an_error() {
        assert!(load_sidecar_slice(b"42").is_err());
    }
}
