//! Metadata resolution for discovered images.
//!
//! Resolution turns bare image names into [`ImageEntry`] values with
//! metadata, provenance flags, and a computed compatibility flag. It
//! never filters: incompatible entries are kept and reported, the
//! callers decide what to do with them.

use camino::Utf8Path;
use extmgr_core::error::{Error, Result};
use extmgr_core::types::{logical_name, ExtensionMetadata, ImageEntry, OsRelease};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::callout::{Extractor, Fetcher};
use crate::compat::{extension_compatible, SYSTEM_SCOPE};
use crate::discover::{discover_images, parse_checksum_manifest};
use crate::{manifest, sidecar};

/// Name of the checksum manifest listing a remote catalog's images.
pub const CHECKSUM_MANIFEST: &str = "SHA256SUMS";

/// Resolves image names to metadata-bearing entries.
pub struct MetadataResolver<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub extractor: &'a dyn Extractor,
    /// Host to compute compatibility against; `None` skips the check.
    pub host: Option<&'a OsRelease>,
    /// Emit a per-image compatibility trace.
    pub verbose: bool,
}

impl MetadataResolver<'_> {
    /// Enumerate the remote catalog at `url` and resolve every image's
    /// metadata, preferring the JSON sidecar and falling back to the
    /// build manifest. `filter` restricts the result to one logical name.
    pub async fn remote_entries(
        &self,
        url: &str,
        filter: Option<&str>,
    ) -> Result<Vec<ImageEntry>> {
        let names = self.remote_image_list(url).await?;

        let mut entries = Vec::new();
        for name in names {
            if filter.is_some_and(|wanted| wanted != logical_name(&name)) {
                continue;
            }

            let mut entry = ImageEntry::new(name.clone());
            entry.is_remote = true;

            let mut meta = match self.sidecar_from_url(url, &name).await {
                Ok(meta) => meta,
                Err(err) if err.is_not_found() => {
                    debug!("No sidecar for '{name}', trying the build manifest");
                    self.manifest_from_url(url, &name).await?
                }
                Err(err) => return Err(err),
            };
            if meta.image_name.is_none() {
                meta.image_name = Some(name);
            }
            entry.metadata = Some(meta);

            self.compute_compatibility(&mut entry);
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Enumerate images in `scan_dir` and, with `read_metadata`, pull
    /// each one's release file out of `store_dir`.
    ///
    /// The two directories differ for installed images: the extensions
    /// directory holds links whose targets live in the store, and
    /// discovery resolves to the target name.
    pub async fn local_entries(
        &self,
        scan_dir: &Utf8Path,
        store_dir: &Utf8Path,
        filter: Option<&str>,
        read_metadata: bool,
    ) -> Result<Vec<ImageEntry>> {
        let names = discover_images(scan_dir)?;

        let mut entries = Vec::new();
        for name in names {
            if filter.is_some_and(|wanted| wanted != logical_name(&name)) {
                continue;
            }

            let mut entry = ImageEntry::new(name.clone());
            entry.is_local = true;

            if read_metadata {
                let mut meta = self.image_release(store_dir, &name).await?;
                if meta.image_name.is_none() {
                    meta.image_name = Some(name);
                }
                entry.metadata = Some(meta);
            }

            self.compute_compatibility(&mut entry);
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Fetch and parse the remote catalog's checksum manifest.
    pub async fn remote_image_list(&self, url: &str) -> Result<Vec<String>> {
        let scratch = NamedTempFile::new()?;
        self.fetcher
            .fetch(url, CHECKSUM_MANIFEST, scratch.path())
            .await?;

        let content = std::fs::read_to_string(scratch.path())?;
        Ok(parse_checksum_manifest(&content))
    }

    async fn sidecar_from_url(&self, url: &str, image: &str) -> Result<ExtensionMetadata> {
        let sidecar_name = format!("{image}.json");

        let scratch = NamedTempFile::new()?;
        self.fetcher
            .fetch(url, &sidecar_name, scratch.path())
            .await?;

        let records = sidecar::load_sidecar_path(scratch.path())?;
        self.single_record(records, image, &sidecar_name)
    }

    async fn manifest_from_url(&self, url: &str, image: &str) -> Result<ExtensionMetadata> {
        let Some(stem) = image.strip_suffix(".raw") else {
            return Err(Error::UnsupportedSuffix { name: image.into() });
        };
        let manifest_name = format!("{stem}.manifest.gz");

        let scratch = NamedTempFile::new()?;
        self.fetcher
            .fetch(url, &manifest_name, scratch.path())
            .await?;

        let records = manifest::load_manifest_path(scratch.path())?;
        self.single_record(records, image, &manifest_name)
    }

    async fn image_release(&self, store_dir: &Utf8Path, image: &str) -> Result<ExtensionMetadata> {
        let scratch = NamedTempFile::new()?;
        self.extractor
            .copy_release(store_dir, image, scratch.path())
            .await?;

        let content = std::fs::read_to_string(scratch.path())?;
        ExtensionMetadata::from_release(&content, image)
    }

    /// A metadata source must describe exactly the one image asked for.
    /// Several records for one name cannot be told apart, so the whole
    /// resolution is aborted rather than guessed at.
    fn single_record(
        &self,
        mut records: Vec<ExtensionMetadata>,
        image: &str,
        source: &str,
    ) -> Result<ExtensionMetadata> {
        match records.len() {
            0 => {
                warn!("No entry with dependencies found ({source})");
                Err(Error::not_found(source.to_string()))
            }
            1 => Ok(records.remove(0)),
            _ => Err(Error::AmbiguousMetadata {
                image: image.into(),
            }),
        }
    }

    fn compute_compatibility(&self, entry: &mut ImageEntry) {
        if let (Some(host), Some(meta)) = (self.host, entry.metadata.as_ref()) {
            entry.is_compatible = extension_compatible(
                &entry.image_name,
                host,
                Some(SYSTEM_SCOPE),
                meta,
                self.verbose,
            );
        }
    }
}
