//! Compatibility checking between the host OS and an extension image.

use extmgr_core::arch::{host_architecture, ANY_ARCHITECTURE};
use extmgr_core::types::{ExtensionMetadata, OsRelease};
use tracing::info;

/// Scope required of extensions managed here.
pub const SYSTEM_SCOPE: &str = "system";

/// OS-identity sentinel matching any host (static binaries, scripts).
pub const ANY_OS: &str = "_any";

/// Decide whether `ext` can be layered onto `host`.
///
/// The checks run in a fixed order and the first failing one decides:
/// scope, architecture, OS identity, then version. A matching
/// `SYSEXT_LEVEL` on both sides replaces the raw `VERSION_ID`
/// comparison entirely, and a host without any version information
/// accepts every identity-matched extension. With `verbose` set, the
/// deciding check is reported for `name`.
pub fn extension_compatible(
    name: &str,
    host: &OsRelease,
    host_scope: Option<&str>,
    ext: &ExtensionMetadata,
    verbose: bool,
) -> bool {
    if let (Some(scope), Some(wanted)) = (ext.sysext_scope.as_deref(), host_scope) {
        if !scope.contains(wanted) {
            if verbose {
                info!("Extension '{name}' is not suitable for scope {wanted}, ignoring.");
            }
            return false;
        }
    }

    // When the architecture field is present and not '_any' it must match
    // the host; only the machine architecture is consulted.
    if let Some(arch) = ext.architecture.as_deref() {
        if arch != ANY_ARCHITECTURE && arch != host_architecture() {
            if verbose {
                info!(
                    "Extension '{name}' is for architecture '{arch}', but deployed on top of '{}'.",
                    host_architecture()
                );
            }
            return false;
        }
    }

    let Some(id) = ext.id.as_deref().filter(|id| !id.is_empty()) else {
        if verbose {
            info!(
                "Extension '{name}' does not contain ID in release file but requested to match '{}' or be '_any'",
                host.id
            );
        }
        return false;
    };

    if id == ANY_OS {
        if verbose {
            info!("Extension '{name}' matches '_any' OS.");
        }
        return true;
    }

    let id_like_match = host
        .id_like
        .as_deref()
        .is_some_and(|like| like.split_whitespace().any(|token| token == id));
    if host.id != id && !id_like_match {
        if verbose {
            info!(
                "Extension '{name}' is for OS '{id}', but deployed on top of '{}'.",
                host.id
            );
        }
        return false;
    }

    // Rolling releases do not typically set VERSION_ID (eg. ArchLinux)
    if host.is_rolling() {
        if verbose {
            info!("No version info on the host (rolling release?), but ID in {name} matched.");
        }
        return true;
    }

    if let (Some(host_level), Some(ext_level)) =
        (host.sysext_level.as_deref(), ext.sysext_level.as_deref())
    {
        if host_level != ext_level {
            if verbose {
                info!(
                    "Extension '{name}' is for API level '{ext_level}', but running on API level '{host_level}'"
                );
            }
            return false;
        }
    } else if let Some(host_version) = host.version_id.as_deref() {
        match ext.version_id.as_deref() {
            None => {
                if verbose {
                    info!(
                        "Extension '{name}' does not contain VERSION_ID in release file but requested to match '{host_version}'"
                    );
                }
                return false;
            }
            Some(ext_version) if ext_version != host_version => {
                if verbose {
                    info!(
                        "Extension '{name}' is for version '{ext_version}', but deployed on top of '{host_version}'."
                    );
                }
                return false;
            }
            Some(_) => {}
        }
    }

    if verbose {
        info!("Version info of extension '{name}' matches host.");
    }
    true
}
