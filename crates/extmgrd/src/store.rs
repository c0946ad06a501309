//! Image store maintenance: downloads into the store and the install
//! links marking images as active.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use extmgr_catalog::Fetcher;
use tracing::debug;

/// Download `image` from the catalog at `url` into the store.
///
/// The transfer lands in a hidden scratch file next to its final place
/// and is renamed in once complete, so a failed download never leaves a
/// half-written image behind.
pub async fn download_into_store(
    fetcher: &dyn Fetcher,
    url: &str,
    image: &str,
    store_dir: &Utf8Path,
) -> Result<Utf8PathBuf> {
    std::fs::create_dir_all(store_dir)
        .with_context(|| format!("Failed to create directory '{store_dir}'"))?;

    let scratch = tempfile::Builder::new()
        .prefix(&format!(".{image}."))
        .tempfile_in(store_dir)
        .with_context(|| format!("Failed to create scratch file in '{store_dir}'"))?;

    fetcher
        .fetch(url, image, scratch.path())
        .await
        .with_context(|| format!("Failed to download '{image}' from '{url}'"))?;

    let dest = store_dir.join(image);
    scratch
        .persist(&dest)
        .map_err(|err| err.error)
        .with_context(|| format!("Failed to rename downloaded image to '{dest}'"))?;

    debug!("Downloaded '{image}' into '{store_dir}'");
    Ok(dest)
}

/// Link `image` (already in the store at `store_path`) into the
/// extensions directory. With `replace`, an existing link of the same
/// name is acceptable; several older versions may all end up pointing
/// at the one new image.
pub fn link_image(
    store_path: &Utf8Path,
    extensions_dir: &Utf8Path,
    image: &str,
    replace: bool,
) -> Result<Utf8PathBuf> {
    std::fs::create_dir_all(extensions_dir)
        .with_context(|| format!("Failed to create directory '{extensions_dir}'"))?;

    let link = extensions_dir.join(image);
    match std::os::unix::fs::symlink(store_path, &link) {
        Ok(()) => Ok(link),
        Err(err) if replace && err.kind() == std::io::ErrorKind::AlreadyExists => Ok(link),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to symlink '{store_path}' to '{link}'"))
        }
    }
}

/// Remove the install link of `image`.
pub fn unlink_image(extensions_dir: &Utf8Path, image: &str) -> Result<()> {
    let link = extensions_dir.join(image);
    std::fs::remove_file(&link).with_context(|| format!("Failed to delete '{link}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use extmgr_core::error::{Error as CoreError, Result as CoreResult};
    use std::path::Path;

    struct OneFileFetcher {
        content: Vec<u8>,
    }

    #[async_trait]
    impl Fetcher for OneFileFetcher {
        async fn fetch(&self, _url: &str, _file: &str, dest: &Path) -> CoreResult<()> {
            std::fs::write(dest, &self.content)?;
            Ok(())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, _url: &str, file: &str, _dest: &Path) -> CoreResult<()> {
            Err(CoreError::not_found(file.to_string()))
        }
    }

    fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn download_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = utf8_dir(&dir).join("store");

        let fetcher = OneFileFetcher {
            content: b"image bytes".to_vec(),
        };
        let dest = download_into_store(&fetcher, "https://example.com", "a-1.x86-64.raw", &store)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"image bytes");
        // No scratch files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(&store)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn failed_download_cleans_up_its_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = utf8_dir(&dir).join("store");

        let result =
            download_into_store(&FailingFetcher, "https://example.com", "a-1.x86-64.raw", &store)
                .await;
        assert!(result.is_err());

        let entries: Vec<_> = std::fs::read_dir(&store)
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn linking_and_unlinking() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8_dir(&dir);
        let store_path = root.join("store/a-1.x86-64.raw");
        let extensions = root.join("extensions");

        std::fs::create_dir_all(store_path.parent().unwrap()).unwrap();
        std::fs::write(&store_path, b"").unwrap();

        let link = link_image(&store_path, &extensions, "a-1.x86-64.raw", false).unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), store_path);

        // Installing over an existing link is an error, updating is not.
        assert!(link_image(&store_path, &extensions, "a-1.x86-64.raw", false).is_err());
        assert!(link_image(&store_path, &extensions, "a-1.x86-64.raw", true).is_ok());

        unlink_image(&extensions, "a-1.x86-64.raw").unwrap();
        assert!(!link.exists());
    }
}
