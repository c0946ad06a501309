//! Image metadata records shared across the workspace.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::release;

/// Identity of the running host OS, loaded once from its release file
/// and treated as read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
    /// OS identifier, e.g. "tumbleweed"
    pub id: String,
    /// Space-separated list of related OS identifiers
    pub id_like: Option<String>,
    /// OS version; rolling releases typically leave this unset
    pub version_id: Option<String>,
    /// Coarse API-compatibility level, preferred over `version_id`
    pub sysext_level: Option<String>,
}

impl OsRelease {
    /// Load the host's os-release file, optionally below `prefix`.
    ///
    /// `/etc/os-release` wins over `/usr/lib/os-release` when both exist.
    pub fn load(prefix: Option<&Utf8Path>) -> Result<Self> {
        let candidates = ["etc/os-release", "usr/lib/os-release"];

        let mut path = match prefix {
            Some(p) => p.join(candidates[0]),
            None => Utf8Path::new("/").join(candidates[0]),
        };
        if !path.exists() {
            path = match prefix {
                Some(p) => p.join(candidates[1]),
                None => Utf8Path::new("/").join(candidates[1]),
            };
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_release(&content, path.as_str())
    }

    /// Build from release-file content. `ID` is mandatory, everything
    /// else optional.
    pub fn from_release(content: &str, origin: &str) -> Result<Self> {
        let values = release::parse(content, origin)?;

        Ok(Self {
            id: release::require(&values, "ID", origin)?,
            id_like: release::get(&values, "ID_LIKE"),
            version_id: release::get(&values, "VERSION_ID"),
            sysext_level: release::get(&values, "SYSEXT_LEVEL"),
        })
    }

    /// A host without version information cannot be version-checked.
    pub fn is_rolling(&self) -> bool {
        self.version_id.is_none() && self.sysext_level.is_none()
    }
}

/// Compatibility attributes one image declares about itself.
///
/// The serde field names follow the sidecar JSON schema, so a record
/// round-trips through `serde_json` unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionMetadata {
    /// Full image file name, e.g. "gcc-30.3.x86-64.raw"
    #[serde(rename = "image_name", default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,

    /// The extension's own release version, distinct from the OS version
    #[serde(
        rename = "SYSEXT_VERSION_ID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sysext_version_id: Option<String>,

    /// Scope the extension applies to, e.g. "system"
    #[serde(rename = "SYSEXT_SCOPE", default, skip_serializing_if = "Option::is_none")]
    pub sysext_scope: Option<String>,

    /// OS the extension was built for; "_any" means no OS dependency
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// API level the extension targets
    #[serde(rename = "SYSEXT_LEVEL", default, skip_serializing_if = "Option::is_none")]
    pub sysext_level: Option<String>,

    /// OS version the extension targets
    #[serde(rename = "VERSION_ID", default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,

    /// Architecture the extension was built for
    #[serde(rename = "ARCHITECTURE", default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

impl ExtensionMetadata {
    /// Build from an extension-release file. `ID` and `VERSION_ID` are
    /// mandatory there, the remaining keys optional.
    pub fn from_release(content: &str, origin: &str) -> Result<Self> {
        let values = release::parse(content, origin)?;

        Ok(Self {
            image_name: None,
            id: Some(release::require(&values, "ID", origin)?),
            version_id: Some(release::require(&values, "VERSION_ID", origin)?),
            sysext_level: release::get(&values, "SYSEXT_LEVEL"),
            sysext_version_id: release::get(&values, "SYSEXT_VERSION_ID"),
            sysext_scope: release::get(&values, "SYSEXT_SCOPE"),
            architecture: release::get(&values, "ARCHITECTURE"),
        })
    }

    /// Take every field `other` has set, overriding this record's.
    pub fn overlay(&mut self, other: ExtensionMetadata) {
        let ExtensionMetadata {
            image_name,
            sysext_version_id,
            sysext_scope,
            id,
            sysext_level,
            version_id,
            architecture,
        } = other;

        if image_name.is_some() {
            self.image_name = image_name;
        }
        if sysext_version_id.is_some() {
            self.sysext_version_id = sysext_version_id;
        }
        if sysext_scope.is_some() {
            self.sysext_scope = sysext_scope;
        }
        if id.is_some() {
            self.id = id;
        }
        if sysext_level.is_some() {
            self.sysext_level = sysext_level;
        }
        if version_id.is_some() {
            self.version_id = version_id;
        }
        if architecture.is_some() {
            self.architecture = architecture;
        }
    }
}

/// Derive the logical product name from an image file name: strip the
/// two trailing dot-suffixes (file extension, architecture), then the
/// trailing `-version` segment.
///
/// "gcc-30.3.x86-64.raw" becomes "gcc". The rule is purely positional;
/// names with extra dots or hyphens split accordingly.
pub fn logical_name(image_name: &str) -> String {
    let mut name = image_name;

    for _ in 0..2 {
        if let Some(idx) = name.rfind('.') {
            name = &name[..idx];
        }
    }
    if let Some(idx) = name.rfind('-') {
        name = &name[..idx];
    }

    name.to_string()
}

/// One discovered image plus where it was found and how it relates to
/// the host. The unit every listing and update decision operates on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageEntry {
    /// Logical product name, e.g. "gcc"
    pub logical_name: String,
    /// Full image file name, e.g. "gcc-30.3.x86-64.raw"
    pub image_name: String,
    /// Declared compatibility attributes, when resolved
    pub metadata: Option<ExtensionMetadata>,
    /// Listed in the remote catalog
    pub is_remote: bool,
    /// Present in the local image store
    pub is_local: bool,
    /// Linked into the extensions directory
    pub is_installed: bool,
    /// Passed the compatibility check against the host
    pub is_compatible: bool,
    /// Number of snapshots still referencing the image
    pub reference_count: u32,
}

impl ImageEntry {
    /// Create an entry for a discovered image name; all flags start unset.
    pub fn new(image_name: impl Into<String>) -> Self {
        let image_name = image_name.into();
        Self {
            logical_name: logical_name(&image_name),
            image_name,
            ..Self::default()
        }
    }

    /// OR `other`'s provenance and status flags into this entry.
    pub fn merge_provenance(&mut self, other: &ImageEntry) {
        self.is_remote |= other.is_remote;
        self.is_local |= other.is_local;
        self.is_installed |= other.is_installed;
        self.is_compatible |= other.is_compatible;
    }

    /// The extension's own version, if metadata carries one.
    pub fn sysext_version(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.sysext_version_id.as_deref())
    }

    /// The architecture the image declares, if any.
    pub fn architecture(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.architecture.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_name_strips_version_arch_and_suffix() {
        assert_eq!(logical_name("gcc-30.3.x86-64.raw"), "gcc");
        assert_eq!(logical_name("debug-tools-23.7.x86-64.raw"), "debug-tools");
        assert_eq!(logical_name("strace-6.9.aarch64.img"), "strace");
    }

    #[test]
    fn logical_name_handles_short_names() {
        // A linked alias like "gcc.raw" has neither arch nor version.
        assert_eq!(logical_name("gcc.raw"), "gcc");
        assert_eq!(logical_name("gcc"), "gcc");
    }

    #[test]
    fn os_release_mandatory_id() {
        let err = OsRelease::from_release("VERSION_ID=1\n", "f").unwrap_err();
        assert!(err.to_string().contains("'ID'"));
    }

    #[test]
    fn os_release_rolling_detection() {
        let rolling = OsRelease::from_release("ID=arch\n", "f").unwrap();
        assert!(rolling.is_rolling());

        let versioned = OsRelease::from_release("ID=x\nVERSION_ID=1\n", "f").unwrap();
        assert!(!versioned.is_rolling());
    }

    #[test]
    fn extension_release_requires_id_and_version() {
        let err = ExtensionMetadata::from_release("ID=x\n", "f").unwrap_err();
        assert!(err.to_string().contains("VERSION_ID"));

        let meta =
            ExtensionMetadata::from_release("ID=x\nVERSION_ID=1\nSYSEXT_VERSION_ID=5\n", "f")
                .unwrap();
        assert_eq!(meta.sysext_version_id.as_deref(), Some("5"));
        assert_eq!(meta.sysext_level, None);
    }

    #[test]
    fn metadata_json_round_trip_preserves_fields() {
        let meta = ExtensionMetadata {
            image_name: Some("gcc-30.3.x86-64.raw".into()),
            sysext_version_id: Some("30.3".into()),
            sysext_scope: Some("system".into()),
            id: Some("tumbleweed".into()),
            sysext_level: Some("2".into()),
            version_id: Some("20250101".into()),
            architecture: Some("x86-64".into()),
        };

        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"SYSEXT_VERSION_ID\":\"30.3\""));
        assert!(json.contains("\"image_name\":\"gcc-30.3.x86-64.raw\""));

        let back: ExtensionMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn overlay_prefers_the_other_record() {
        let mut base = ExtensionMetadata {
            id: Some("old".into()),
            version_id: Some("1".into()),
            ..Default::default()
        };
        base.overlay(ExtensionMetadata {
            id: Some("new".into()),
            sysext_level: Some("2".into()),
            ..Default::default()
        });

        assert_eq!(base.id.as_deref(), Some("new"));
        assert_eq!(base.version_id.as_deref(), Some("1"));
        assert_eq!(base.sysext_level.as_deref(), Some("2"));
    }

    #[test]
    fn entry_flag_merge() {
        let mut a = ImageEntry::new("gcc-30.3.x86-64.raw");
        a.is_remote = true;
        let mut b = ImageEntry::new("gcc-30.3.x86-64.raw");
        b.is_local = true;
        b.is_installed = true;

        a.merge_provenance(&b);
        assert!(a.is_remote && a.is_local && a.is_installed);
        assert_eq!(a.logical_name, "gcc");
    }
}
