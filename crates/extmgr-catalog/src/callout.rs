//! External tool invocation: the verifying downloader and the image
//! dissection tool.
//!
//! Both run as short-lived child processes the caller waits on. The
//! traits exist so the resolver and the daemon can be exercised with
//! canned data instead of spawned processes.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use camino::Utf8Path;
use extmgr_core::error::{Error, Result};
use tokio::process::Command;
use tracing::debug;

use crate::discover::is_image_name;

/// Path of the downloader used for all remote transfers.
pub const SYSTEMD_PULL: &str = "/usr/lib/systemd/systemd-pull";

/// Path of the dissection tool used to read files out of images.
pub const SYSTEMD_DISSECT: &str = "/usr/bin/systemd-dissect";

/// Downloads one file from a remote catalog.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `file`, relative to the catalog base `url`, into `dest`.
    ///
    /// A clean non-zero exit of the tool is reported as
    /// [`Error::NotFound`]; callers decide whether that is fatal.
    async fn fetch(&self, url: &str, file: &str, dest: &Path) -> Result<()>;
}

/// Reads the embedded extension-release file out of an image.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Copy the release file of `image` (living in `dir`) to `dest`.
    async fn copy_release(&self, dir: &Utf8Path, image: &str, dest: &Path) -> Result<()>;
}

/// Join a base URL and a file name with exactly one slash.
pub fn join_url(base: &str, file: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file)
}

/// `systemd-pull`-backed downloader. Signature verification of the
/// transferred data is the tool's job, not ours.
pub struct SystemdPull {
    pub verify_signature: bool,
}

#[async_trait]
impl Fetcher for SystemdPull {
    async fn fetch(&self, url: &str, file: &str, dest: &Path) -> Result<()> {
        let full_url = join_url(url, file);
        debug!("Downloading '{full_url}'");

        let status = Command::new(SYSTEMD_PULL)
            .arg("raw")
            .arg("--direct")
            .arg("--verify")
            .arg(if self.verify_signature {
                "signature"
            } else {
                "no"
            })
            .arg(&full_url)
            .arg(dest)
            .status()
            .await
            .map_err(|err| Error::CalloutSpawn {
                tool: SYSTEMD_PULL.into(),
                source: err,
            })?;

        if status.success() {
            Ok(())
        } else if status.code().is_some() {
            // The tool ran and reported failure; for remote files that
            // means "not there", which some callers can fall back from.
            Err(Error::not_found(full_url))
        } else {
            Err(Error::Callout {
                tool: SYSTEMD_PULL.into(),
                status: describe_status(status),
            })
        }
    }
}

/// `systemd-dissect`-backed release-file extraction.
pub struct SystemdDissect;

#[async_trait]
impl Extractor for SystemdDissect {
    async fn copy_release(&self, dir: &Utf8Path, image: &str, dest: &Path) -> Result<()> {
        if !is_image_name(image) {
            return Err(Error::UnsupportedSuffix { name: image.into() });
        }
        // "gcc-30.3.x86-64.raw" carries its release file under
        // extension-release.d/extension-release.gcc-30.3.x86-64
        let stem = &image[..image.len() - 4];
        let release_path = format!("/usr/lib/extension-release.d/extension-release.{stem}");

        let image_path = dir.join(image);
        debug!("Extracting '{release_path}' from '{image_path}'");

        let output = std::fs::File::create(dest)?;
        let status = Command::new(SYSTEMD_DISSECT)
            .arg("--copy-from")
            .arg(&image_path)
            .arg(&release_path)
            .arg("-")
            .stdout(Stdio::from(output))
            .status()
            .await
            .map_err(|err| Error::CalloutSpawn {
                tool: SYSTEMD_DISSECT.into(),
                source: err,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Callout {
                tool: SYSTEMD_DISSECT.into(),
                status: describe_status(status),
            })
        }
    }
}

fn describe_status(status: std::process::ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => format!("failed with exit status {code}"),
        (None, Some(signal)) => format!("killed by signal {signal}"),
        (None, None) => "failed with unknown status".to_string(),
    }
}
