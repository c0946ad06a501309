//! Resolver behavior against canned catalog data, no child processes.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use extmgr_catalog::{Extractor, Fetcher, MetadataResolver};
use extmgr_core::error::{Error, Result};
use extmgr_core::types::OsRelease;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

/// Serves files from a map, like a remote catalog would.
#[derive(Default)]
struct MapFetcher {
    files: HashMap<String, Vec<u8>>,
}

impl MapFetcher {
    fn insert(&mut self, name: &str, content: impl Into<Vec<u8>>) {
        self.files.insert(name.to_string(), content.into());
    }
}

#[async_trait]
impl Fetcher for MapFetcher {
    async fn fetch(&self, _url: &str, file: &str, dest: &Path) -> Result<()> {
        match self.files.get(file) {
            Some(content) => {
                std::fs::write(dest, content)?;
                Ok(())
            }
            None => Err(Error::not_found(file.to_string())),
        }
    }
}

/// Hands out canned release files instead of dissecting images.
#[derive(Default)]
struct MapExtractor {
    releases: HashMap<String, String>,
}

#[async_trait]
impl Extractor for MapExtractor {
    async fn copy_release(&self, _dir: &Utf8Path, image: &str, dest: &Path) -> Result<()> {
        match self.releases.get(image) {
            Some(content) => {
                std::fs::write(dest, content)?;
                Ok(())
            }
            None => Err(Error::Callout {
                tool: "test-extractor".into(),
                status: "failed with exit status 1".into(),
            }),
        }
    }
}

fn host() -> OsRelease {
    OsRelease {
        id: "tumbleweed".into(),
        id_like: None,
        version_id: Some("20250101".into()),
        sysext_level: Some("2".into()),
    }
}

fn gzip(data: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn arch() -> &'static str {
    extmgr_core::arch::host_architecture()
}

#[tokio::test]
async fn remote_resolution_prefers_the_json_sidecar() {
    let mut fetcher = MapFetcher::default();
    let image = format!("gcc-30.3.{}.raw", arch());
    fetcher.insert(
        "SHA256SUMS",
        format!("0123abcd  {image}\n").into_bytes(),
    );
    fetcher.insert(
        &format!("{image}.json"),
        format!(
            r#"{{"image_name": "{image}", "ID": "tumbleweed", "SYSEXT_LEVEL": "2",
                "SYSEXT_VERSION_ID": "30.3", "ARCHITECTURE": "{}"}}"#,
            arch()
        )
        .into_bytes(),
    );

    let extractor = MapExtractor::default();
    let host = host();
    let resolver = MetadataResolver {
        fetcher: &fetcher,
        extractor: &extractor,
        host: Some(&host),
        verbose: false,
    };

    let entries = resolver
        .remote_entries("https://example.com/images", None)
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_remote);
    assert!(entries[0].is_compatible);
    assert_eq!(entries[0].logical_name, "gcc");
    assert_eq!(entries[0].sysext_version(), Some("30.3"));
}

#[tokio::test]
async fn missing_sidecar_falls_back_to_the_build_manifest() {
    let mut fetcher = MapFetcher::default();
    let image = format!("vim-9.1.{}.raw", arch());
    fetcher.insert("SHA256SUMS", format!("deadbeef  {image}\n").into_bytes());
    fetcher.insert(
        &format!("vim-9.1.{}.manifest.gz", arch()),
        gzip(&format!(
            r#"{{
                "manifest_version": 1,
                "config": {{"name": "vim", "architecture": "{0}", "version": "9.1"}},
                "extensions": [["sysext", {{"ID": "tumbleweed", "SYSEXT_LEVEL": "2",
                                            "SYSEXT_VERSION_ID": "9.1",
                                            "ARCHITECTURE": "{0}"}}]]
            }}"#,
            arch()
        )),
    );

    let extractor = MapExtractor::default();
    let host = host();
    let resolver = MetadataResolver {
        fetcher: &fetcher,
        extractor: &extractor,
        host: Some(&host),
        verbose: false,
    };

    let entries = resolver
        .remote_entries("https://example.com/images", None)
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].image_name, image);
    assert!(entries[0].is_compatible);
}

#[tokio::test]
async fn missing_sidecar_and_manifest_is_fatal() {
    let mut fetcher = MapFetcher::default();
    fetcher.insert("SHA256SUMS", b"0123  lost-1.x86-64.raw\n".to_vec());

    let extractor = MapExtractor::default();
    let resolver = MetadataResolver {
        fetcher: &fetcher,
        extractor: &extractor,
        host: None,
        verbose: false,
    };

    let err = resolver
        .remote_entries("https://example.com/images", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn ambiguous_sidecar_aborts_the_batch() {
    let mut fetcher = MapFetcher::default();
    fetcher.insert("SHA256SUMS", b"0123  dup-1.x86-64.raw\n".to_vec());
    fetcher.insert(
        "dup-1.x86-64.raw.json",
        br#"[{"ID": "a", "VERSION_ID": "1"}, {"ID": "b", "VERSION_ID": "2"}]"#.to_vec(),
    );

    let extractor = MapExtractor::default();
    let resolver = MetadataResolver {
        fetcher: &fetcher,
        extractor: &extractor,
        host: None,
        verbose: false,
    };

    let err = resolver
        .remote_entries("https://example.com/images", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AmbiguousMetadata { .. }));
}

#[tokio::test]
async fn logical_name_filter_narrows_the_catalog() {
    let mut fetcher = MapFetcher::default();
    fetcher.insert(
        "SHA256SUMS",
        b"0123  gcc-30.3.x86-64.raw\n4567  vim-9.1.x86-64.raw\n".to_vec(),
    );
    fetcher.insert(
        "gcc-30.3.x86-64.raw.json",
        br#"{"ID": "_any", "SYSEXT_VERSION_ID": "30.3"}"#.to_vec(),
    );

    let extractor = MapExtractor::default();
    let resolver = MetadataResolver {
        fetcher: &fetcher,
        extractor: &extractor,
        host: None,
        verbose: false,
    };

    // The vim sidecar is absent, but the filter means it is never asked for.
    let entries = resolver
        .remote_entries("https://example.com/images", Some("gcc"))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].logical_name, "gcc");
}

#[tokio::test]
async fn local_entries_extract_and_parse_release_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let image = format!("gcc-30.3.{}.raw", arch());
    std::fs::write(store.join(&image), b"not a real image").unwrap();

    let fetcher = MapFetcher::default();
    let mut extractor = MapExtractor::default();
    extractor.releases.insert(
        image.clone(),
        format!(
            "ID=tumbleweed\nVERSION_ID=20250101\nSYSEXT_LEVEL=2\nSYSEXT_VERSION_ID=30.3\nARCHITECTURE={}\n",
            arch()
        ),
    );

    let host = host();
    let resolver = MetadataResolver {
        fetcher: &fetcher,
        extractor: &extractor,
        host: Some(&host),
        verbose: false,
    };

    let entries = resolver
        .local_entries(&store, &store, None, true)
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_local);
    assert!(!entries[0].is_remote);
    assert!(entries[0].is_compatible);
    assert_eq!(entries[0].sysext_version(), Some("30.3"));
    assert_eq!(
        entries[0].metadata.as_ref().unwrap().image_name.as_deref(),
        Some(image.as_str())
    );
}

#[tokio::test]
async fn local_entries_without_metadata_skip_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let store = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    std::fs::write(store.join("gcc-30.3.x86-64.raw"), b"").unwrap();

    let fetcher = MapFetcher::default();
    // An extractor with no canned data: any extraction attempt would fail.
    let extractor = MapExtractor::default();
    let resolver = MetadataResolver {
        fetcher: &fetcher,
        extractor: &extractor,
        host: None,
        verbose: false,
    };

    let entries = resolver
        .local_entries(&store, &store, None, false)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].metadata.is_none());
}
