//! Build-manifest parsing.
//!
//! Image builders publish a `<image>.manifest.gz` describing what they
//! produced. The interesting part is the single `["sysext", {...}]`
//! entry in `extensions` plus the `config` object, from which the image
//! file name is synthesized.

use std::io::Read;
use std::path::Path;

use extmgr_core::error::{Error, Result};
use extmgr_core::types::ExtensionMetadata;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;

use crate::sidecar;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    config: Option<ManifestConfig>,
    #[serde(default)]
    extensions: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ManifestConfig {
    name: Option<String>,
    architecture: Option<String>,
    version: Option<String>,
}

/// Parse a build-manifest document into the one metadata record it
/// describes. Any deviation from the expected shape is an error.
pub fn metadata_from_manifest(value: &Value) -> Result<ExtensionMetadata> {
    let manifest: Manifest = serde_json::from_value(value.clone())?;

    let Some(Value::Array(extensions)) = manifest.extensions else {
        return Err(Error::metadata("manifest 'extensions' is not an array"));
    };
    if extensions.len() != 1 {
        return Err(Error::metadata(format!(
            "manifest 'extensions' holds {} entries, expected exactly 1",
            extensions.len()
        )));
    }

    let Value::Array(entry) = &extensions[0] else {
        return Err(Error::metadata("manifest extension entry is not a tuple"));
    };
    if entry.len() != 2 {
        return Err(Error::metadata(format!(
            "manifest extension tuple has {} elements, expected 2",
            entry.len()
        )));
    }
    if entry[0].as_str() != Some("sysext") {
        return Err(Error::metadata("manifest extension entry is not a sysext"));
    }

    let mut meta = sidecar::metadata_from_value(&entry[1])?;
    meta.image_name = Some(image_name_from_config(manifest.config.as_ref())?);

    Ok(meta)
}

fn image_name_from_config(config: Option<&ManifestConfig>) -> Result<String> {
    let config = config.ok_or_else(|| Error::metadata("manifest has no 'config' object"))?;

    match (&config.name, &config.version, &config.architecture) {
        (Some(name), Some(version), Some(arch)) => Ok(format!("{name}-{version}.{arch}.raw")),
        _ => Err(Error::metadata(
            "manifest 'config' lacks name, version or architecture",
        )),
    }
}

/// Load a manifest from a file, transparently decompressing gzip input.
pub fn load_manifest_path(path: &Path) -> Result<Vec<ExtensionMetadata>> {
    let bytes = std::fs::read(path)?;
    load_manifest_slice(&bytes)
}

/// Parse manifest bytes, sniffing for the gzip magic first.
pub fn load_manifest_slice(bytes: &[u8]) -> Result<Vec<ExtensionMetadata>> {
    let value: Value = if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoded = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut decoded)?;
        serde_json::from_slice(&decoded)?
    } else {
        serde_json::from_slice(bytes)?
    };

    Ok(vec![metadata_from_manifest(&value)?])
}
