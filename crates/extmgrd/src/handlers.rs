//! Request handlers and method dispatch.
//!
//! Every handler turns its outcome into a structured reply; errors
//! become `Success: false` plus a message, and only `Quit` ends the
//! serve loop. Mutating methods require the peer to be root.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use extmgr_catalog::discover::{count_snapshot_references, discover_images};
use extmgr_catalog::{best_upgrade, merge_inventory, MetadataResolver};
use extmgr_core::arch::host_architecture;
use extmgr_core::types::{ExtensionMetadata, ImageEntry, OsRelease};
use extmgr_proto::{
    methods, CheckParams, CheckReply, CleanupParams, CleanupReply, EnvironmentReply, GenericReply,
    ImageNameRecord, ImageRecord, InstallParams, InstallReply, ListImagesReply, ListParams,
    PingReply, QuitParams, Request, SetLogLevelParams, UpdateRecord, UpdateReply,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

use crate::server::{Action, Daemon};
use crate::store;

/// Handle one request and decide how the connection loop proceeds.
pub async fn dispatch(daemon: &Daemon, request: &Request, peer_uid: Option<u32>) -> (Value, Action) {
    info!("Method \"{}\" called...", request.method);

    let mut action = Action::Continue;
    let reply = match request.method.as_str() {
        methods::PING => to_value(PingReply { alive: true }),
        methods::LIST_IMAGES => match parse_params::<ListParams>(&request.parameters) {
            Ok(params) => to_value(list_images(daemon, params, peer_uid).await),
            Err(err) => to_value(err),
        },
        methods::CHECK => match parse_params::<CheckParams>(&request.parameters) {
            Ok(params) => to_value(check(daemon, params, peer_uid).await),
            Err(err) => to_value(err),
        },
        methods::UPDATE => match parse_params::<CheckParams>(&request.parameters) {
            Ok(params) => to_value(update(daemon, params, peer_uid).await),
            Err(err) => to_value(err),
        },
        methods::INSTALL => match parse_params::<InstallParams>(&request.parameters) {
            Ok(params) => to_value(install(daemon, params, peer_uid).await),
            Err(err) => to_value(err),
        },
        methods::CLEANUP => match parse_params::<CleanupParams>(&request.parameters) {
            Ok(params) => to_value(cleanup(daemon, params, peer_uid).await),
            Err(err) => to_value(err),
        },
        methods::SET_LOG_LEVEL => match parse_params::<SetLogLevelParams>(&request.parameters) {
            Ok(params) => to_value(set_log_level(daemon, params, peer_uid)),
            Err(err) => to_value(err),
        },
        methods::GET_ENVIRONMENT => to_value(get_environment(peer_uid)),
        methods::QUIT => match parse_params::<QuitParams>(&request.parameters) {
            Ok(params) => match require_root(methods::QUIT, peer_uid) {
                Ok(()) => {
                    action = Action::Quit(params.exit_code);
                    to_value(GenericReply::ok())
                }
                Err(denied) => to_value(denied),
            },
            Err(err) => to_value(err),
        },
        unknown => {
            warn!("Unknown method '{unknown}' requested");
            to_value(GenericReply::error(format!("unknown method '{unknown}'")))
        }
    };

    (reply, action)
}

/// Root check for privileged methods. An unknown peer identity denies.
fn require_root(method: &str, peer_uid: Option<u32>) -> std::result::Result<(), GenericReply> {
    if peer_uid == Some(0) {
        return Ok(());
    }
    warn!("{method}: peer UID {peer_uid:?} denied");
    Err(GenericReply::error("permission denied"))
}

fn parse_params<T>(value: &Value) -> std::result::Result<T, GenericReply>
where
    T: DeserializeOwned + HasDefault,
{
    if value.is_null() {
        return T::try_default()
            .ok_or_else(|| GenericReply::error("missing request parameters"));
    }
    serde_json::from_value(value.clone())
        .map_err(|err| GenericReply::error(format!("invalid request parameters: {err}")))
}

/// `Default` where it exists; `Install` has a mandatory parameter and
/// opts out.
trait HasDefault: Sized {
    fn try_default() -> Option<Self> {
        None
    }
}

impl HasDefault for ListParams {
    fn try_default() -> Option<Self> {
        Some(Self::default())
    }
}
impl HasDefault for CheckParams {
    fn try_default() -> Option<Self> {
        Some(Self::default())
    }
}
impl HasDefault for CleanupParams {
    fn try_default() -> Option<Self> {
        Some(Self::default())
    }
}
impl HasDefault for QuitParams {
    fn try_default() -> Option<Self> {
        Some(Self::default())
    }
}
impl HasDefault for InstallParams {}
impl HasDefault for SetLogLevelParams {}

fn to_value<T: serde::Serialize>(reply: T) -> Value {
    serde_json::to_value(reply).unwrap_or_else(|err| {
        serde_json::json!({"Success": false, "ErrorMsg": format!("encoding reply failed: {err}")})
    })
}

impl Daemon {
    fn resolver<'a>(&'a self, host: &'a OsRelease, verbose: bool) -> MetadataResolver<'a> {
        MetadataResolver {
            fetcher: self.fetcher.as_ref(),
            extractor: self.extractor.as_ref(),
            host: Some(host),
            verbose,
        }
    }

    fn host(&self) -> Result<OsRelease> {
        OsRelease::load(self.os_release_prefix.as_deref())
            .context("Couldn't read os-release file")
    }

    /// The verbose flag a request takes effect with, and whether it
    /// deviates from the configured default (which only root may do).
    fn effective_verbose(&self, requested: Option<bool>) -> (bool, bool) {
        let verbose = requested.unwrap_or(self.config.verbose);
        (verbose, verbose != self.config.verbose)
    }

    fn catalog_url(&self, requested: Option<String>) -> Option<String> {
        requested.or_else(|| self.config.url.clone())
    }

    /// The extensions directory, optionally relocated below `prefix`.
    fn extensions_dir(&self, prefix: Option<&str>) -> Utf8PathBuf {
        match prefix {
            Some(prefix) => {
                let relative = self.config.extensions_dir.as_str().trim_start_matches('/');
                Utf8Path::new(prefix).join(relative)
            }
            None => self.config.extensions_dir.clone(),
        }
    }

    /// Best upgrade for one installed image, consulting the remote
    /// catalog (when a URL is known) and the local store.
    async fn latest_version(
        &self,
        resolver: &MetadataResolver<'_>,
        installed: &ImageEntry,
        url: Option<&str>,
    ) -> Result<Option<ImageEntry>> {
        let remote = match url {
            Some(url) => resolver
                .remote_entries(url, Some(&installed.logical_name))
                .await
                .with_context(|| format!("Fetching image data from '{url}' failed"))?,
            None => Vec::new(),
        };

        let store = &self.config.sysext_store_dir;
        let local = resolver
            .local_entries(store, store, Some(&installed.logical_name), true)
            .await
            .with_context(|| format!("Searching for images in '{store}' failed"))?;

        Ok(best_upgrade(installed, &remote, &local))
    }
}

async fn list_images(daemon: &Daemon, params: ListParams, peer_uid: Option<u32>) -> ListImagesReply {
    let (verbose, changed) = daemon.effective_verbose(params.verbose);
    if params.url.is_some() || changed {
        if let Err(denied) = require_root(methods::LIST_IMAGES, peer_uid) {
            return ListImagesReply {
                success: false,
                error_msg: denied.error_msg,
                images: None,
            };
        }
    }

    match list_images_inner(daemon, params, verbose).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!("{err:#}");
            ListImagesReply {
                success: false,
                error_msg: Some(format!("{err:#}")),
                images: None,
            }
        }
    }
}

async fn list_images_inner(
    daemon: &Daemon,
    params: ListParams,
    verbose: bool,
) -> Result<ListImagesReply> {
    let host = daemon.host()?;
    let resolver = daemon.resolver(&host, verbose);

    let remote = match daemon.catalog_url(params.url) {
        Some(url) => resolver
            .remote_entries(&url, None)
            .await
            .with_context(|| format!("Fetching image data from '{url}' failed"))?,
        None => Vec::new(),
    };

    let store = &daemon.config.sysext_store_dir;
    let local = resolver
        .local_entries(store, store, None, true)
        .await
        .with_context(|| format!("Searching for images in '{store}' failed"))?;

    if remote.is_empty() && local.is_empty() {
        info!("No images found");
        return Ok(ListImagesReply {
            success: true,
            error_msg: None,
            images: None,
        });
    }

    let extensions_dir = &daemon.config.extensions_dir;
    let installed = discover_images(extensions_dir)
        .with_context(|| format!("Searching for images in '{extensions_dir}' failed"))?;

    let inventory = merge_inventory(remote, local, &installed);
    let images = inventory.iter().map(ImageRecord::from).collect();

    Ok(ListImagesReply {
        success: true,
        error_msg: None,
        images: Some(images),
    })
}

async fn check(daemon: &Daemon, mut params: CheckParams, peer_uid: Option<u32>) -> CheckReply {
    let (_, changed) = daemon.effective_verbose(params.verbose);
    if params.url.is_some() || changed {
        if require_root(methods::CHECK, peer_uid).is_err() {
            if params.url.is_some() {
                return CheckReply {
                    success: false,
                    error_msg: Some("permission denied".into()),
                    ..Default::default()
                };
            }
            // Only root may change the verbosity; quietly keep the default.
            params.verbose = None;
        }
    }

    match check_inner(daemon, params).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!("{err:#}");
            CheckReply {
                success: false,
                error_msg: Some(format!("{err:#}")),
                ..Default::default()
            }
        }
    }
}

async fn check_inner(daemon: &Daemon, params: CheckParams) -> Result<CheckReply> {
    let (verbose, _) = daemon.effective_verbose(params.verbose);
    let host = daemon.host()?;
    let resolver = daemon.resolver(&host, verbose);

    let url = daemon.catalog_url(params.url);
    let extensions_dir = daemon.extensions_dir(params.prefix.as_deref());

    let installed = resolver
        .local_entries(&extensions_dir, &daemon.config.sysext_store_dir, None, true)
        .await
        .with_context(|| format!("Searching for images in '{extensions_dir}' failed"))?;

    if installed.is_empty() {
        info!("No installed images found.");
        return Ok(CheckReply {
            success: true,
            ..Default::default()
        });
    }

    let mut updates = Vec::new();
    let mut broken = Vec::new();
    for entry in &installed {
        let update = daemon.latest_version(&resolver, entry, url.as_deref()).await?;
        match update {
            Some(update) => {
                info!(
                    "Update available: {} -> {}",
                    entry.image_name, update.image_name
                );
                updates.push(UpdateRecord {
                    old_name: entry.image_name.clone(),
                    new_name: Some(update.image_name),
                });
            }
            None => {
                if !entry.is_compatible {
                    broken.push(ImageNameRecord {
                        image_name: entry.image_name.clone(),
                    });
                }
                updates.push(UpdateRecord {
                    old_name: entry.image_name.clone(),
                    new_name: None,
                });
            }
        }
    }

    Ok(CheckReply {
        success: true,
        error_msg: None,
        images: Some(updates),
        broken_images: (!broken.is_empty()).then_some(broken),
    })
}

async fn update(daemon: &Daemon, params: CheckParams, peer_uid: Option<u32>) -> UpdateReply {
    if let Err(denied) = require_root(methods::UPDATE, peer_uid) {
        return UpdateReply {
            success: false,
            error_msg: denied.error_msg,
            updated: None,
        };
    }

    match update_inner(daemon, params).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!("{err:#}");
            UpdateReply {
                success: false,
                error_msg: Some(format!("{err:#}")),
                updated: None,
            }
        }
    }
}

async fn update_inner(daemon: &Daemon, params: CheckParams) -> Result<UpdateReply> {
    let (verbose, _) = daemon.effective_verbose(params.verbose);
    let host = daemon.host()?;
    let resolver = daemon.resolver(&host, verbose);

    let url = daemon.catalog_url(params.url);
    let extensions_dir = daemon.extensions_dir(params.prefix.as_deref());
    let store_dir = &daemon.config.sysext_store_dir;

    let installed = resolver
        .local_entries(&extensions_dir, store_dir, None, true)
        .await
        .with_context(|| format!("Searching for images in '{extensions_dir}' failed"))?;

    if installed.is_empty() {
        info!("No installed images found.");
        return Ok(UpdateReply {
            success: true,
            ..Default::default()
        });
    }

    let mut updated = Vec::new();
    for entry in &installed {
        let update = daemon.latest_version(&resolver, entry, url.as_deref()).await?;
        let Some(update) = update else {
            updated.push(UpdateRecord {
                old_name: entry.image_name.clone(),
                new_name: None,
            });
            continue;
        };

        info!("Updating {} -> {}", entry.image_name, update.image_name);

        let store_path = if !update.is_local && update.is_remote {
            let url = url
                .as_deref()
                .context("remote-only update without a catalog URL")?;
            store::download_into_store(daemon.fetcher.as_ref(), url, &update.image_name, store_dir)
                .await?
        } else {
            store_dir.join(&update.image_name)
        };

        store::unlink_image(&extensions_dir, &entry.image_name)?;
        // Several older versions may be replaced by one new image, so an
        // existing link to it is fine.
        store::link_image(&store_path, &extensions_dir, &update.image_name, true)?;

        updated.push(UpdateRecord {
            old_name: entry.image_name.clone(),
            new_name: Some(update.image_name),
        });
    }

    Ok(UpdateReply {
        success: true,
        error_msg: None,
        updated: Some(updated),
    })
}

async fn install(daemon: &Daemon, params: InstallParams, peer_uid: Option<u32>) -> InstallReply {
    if let Err(denied) = require_root(methods::INSTALL, peer_uid) {
        return InstallReply {
            success: false,
            error_msg: denied.error_msg,
            installed: None,
        };
    }

    match install_inner(daemon, params).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!("{err:#}");
            InstallReply {
                success: false,
                error_msg: Some(format!("{err:#}")),
                installed: None,
            }
        }
    }
}

async fn install_inner(daemon: &Daemon, params: InstallParams) -> Result<InstallReply> {
    let (verbose, _) = daemon.effective_verbose(params.verbose);
    let host = daemon.host()?;
    let resolver = daemon.resolver(&host, verbose);
    let url = daemon.catalog_url(params.url);

    // What we are looking for: the logical name on the host's
    // architecture, any version.
    let mut wanted = ImageEntry::new(params.install.clone());
    wanted.metadata = Some(ExtensionMetadata {
        architecture: Some(host_architecture().to_string()),
        ..Default::default()
    });

    let found = daemon
        .latest_version(&resolver, &wanted, url.as_deref())
        .await
        .with_context(|| format!("Failed to get latest version for '{}'", params.install))?;
    let Some(found) = found else {
        return Ok(InstallReply {
            success: false,
            error_msg: Some(format!(
                "Failed to find compatible version for '{}'",
                params.install
            )),
            installed: None,
        });
    };

    info!("Installing {}", found.image_name);

    let store_dir = &daemon.config.sysext_store_dir;
    let store_path = if !found.is_local && found.is_remote {
        let url = url
            .as_deref()
            .context("remote-only install without a catalog URL")?;
        store::download_into_store(daemon.fetcher.as_ref(), url, &found.image_name, store_dir)
            .await?
    } else {
        store_dir.join(&found.image_name)
    };

    store::link_image(
        &store_path,
        &daemon.config.extensions_dir,
        &found.image_name,
        false,
    )?;

    Ok(InstallReply {
        success: true,
        error_msg: None,
        installed: Some(found.image_name),
    })
}

async fn cleanup(daemon: &Daemon, params: CleanupParams, peer_uid: Option<u32>) -> CleanupReply {
    if let Err(denied) = require_root(methods::CLEANUP, peer_uid) {
        return CleanupReply {
            success: false,
            error_msg: denied.error_msg,
            images: None,
        };
    }

    match cleanup_inner(daemon, params).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!("{err:#}");
            CleanupReply {
                success: false,
                error_msg: Some(format!("{err:#}")),
                images: None,
            }
        }
    }
}

async fn cleanup_inner(daemon: &Daemon, params: CleanupParams) -> Result<CleanupReply> {
    let (verbose, _) = daemon.effective_verbose(params.verbose);
    let host = daemon.host()?;
    let resolver = daemon.resolver(&host, verbose);

    let store_dir = &daemon.config.sysext_store_dir;
    let mut entries = resolver
        .local_entries(store_dir, store_dir, None, false)
        .await
        .with_context(|| format!("Searching for images in '{store_dir}' failed"))?;

    let extensions_dir = &daemon.config.extensions_dir;
    let installed = discover_images(extensions_dir)
        .with_context(|| format!("Searching for images in '{extensions_dir}' failed"))?;
    for entry in &mut entries {
        if installed.iter().any(|name| *name == entry.image_name) {
            entry.is_installed = true;
        }
    }

    count_snapshot_references(&daemon.config.snapshots_dir, extensions_dir, &mut entries)
        .context("Counting snapshot references failed")?;

    let mut removed = Vec::new();
    for entry in &entries {
        if entry.is_installed || entry.reference_count > 0 {
            continue;
        }

        let path = store_dir.join(&entry.image_name);
        std::fs::remove_file(&path).with_context(|| format!("Failed to delete '{path}'"))?;
        info!("Removed unreferenced image '{}'", entry.image_name);
        removed.push(ImageNameRecord {
            image_name: entry.image_name.clone(),
        });
    }

    Ok(CleanupReply {
        success: true,
        error_msg: None,
        images: (!removed.is_empty()).then_some(removed),
    })
}

fn set_log_level(
    daemon: &Daemon,
    params: SetLogLevelParams,
    peer_uid: Option<u32>,
) -> GenericReply {
    if let Err(denied) = require_root(methods::SET_LOG_LEVEL, peer_uid) {
        return denied;
    }

    // Syslog-style numeric levels, as clients know them.
    let level = match params.level {
        0..=3 => LevelFilter::ERROR,
        4 => LevelFilter::WARN,
        5 | 6 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };

    match daemon.log_reload.as_ref() {
        Some(handle) => match handle.reload(level) {
            Ok(()) => {
                info!("New log setting: level={level}");
                GenericReply::ok()
            }
            Err(err) => GenericReply::error(format!("changing the log level failed: {err}")),
        },
        None => GenericReply::error("log level reloading is not wired up"),
    }
}

fn get_environment(peer_uid: Option<u32>) -> EnvironmentReply {
    if let Err(denied) = require_root(methods::GET_ENVIRONMENT, peer_uid) {
        return EnvironmentReply {
            success: false,
            error_msg: denied.error_msg,
            environment: None,
        };
    }

    let environment = std::env::vars()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();

    EnvironmentReply {
        success: true,
        error_msg: None,
        environment: Some(environment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_root_passes_the_privilege_check() {
        assert!(require_root("Update", Some(0)).is_ok());
        assert!(require_root("Update", Some(1000)).is_err());
        assert!(require_root("Update", None).is_err());
    }

    #[test]
    fn params_default_when_absent() {
        let params: ListParams = parse_params(&Value::Null).unwrap();
        assert!(params.url.is_none());

        let err = parse_params::<InstallParams>(&Value::Null).unwrap_err();
        assert!(!err.success);
    }

    #[test]
    fn malformed_params_are_rejected() {
        let err =
            parse_params::<SetLogLevelParams>(&serde_json::json!({"Level": "high"})).unwrap_err();
        assert!(err.error_msg.unwrap().contains("invalid request parameters"));
    }
}
