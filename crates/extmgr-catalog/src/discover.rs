//! Catalog discovery: image names in a local directory or a remote
//! checksum manifest, plus snapshot reference counting.

use camino::Utf8Path;
use extmgr_core::error::Result;
use extmgr_core::types::ImageEntry;
use tracing::debug;

/// File suffixes recognized as extension images.
pub const IMAGE_SUFFIXES: [&str; 2] = [".raw", ".img"];

/// Whether a file name looks like an extension image.
pub fn is_image_name(name: &str) -> bool {
    IMAGE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// List image names in `dir`, sorted by name.
///
/// Symlinks are resolved to their target's base name: the link is the
/// install alias, the target is the real image. A missing directory is
/// an empty catalog, not an error.
pub fn discover_images(dir: &Utf8Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        if !is_image_name(&file_name) {
            continue;
        }

        if entry.file_type()?.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            match target.file_name().and_then(|n| n.to_str()) {
                Some(base) => names.push(base.to_string()),
                None => debug!("Ignoring link '{file_name}' with unusable target"),
            }
        } else {
            names.push(file_name);
        }
    }

    names.sort();
    Ok(names)
}

/// Extract image names from a checksum manifest.
///
/// Each line is `<hex-hash><spaces><filename>`; only filenames with a
/// recognized image suffix are kept. Lines without a separating space
/// are skipped rather than misread as names.
pub fn parse_checksum_manifest(content: &str) -> Vec<String> {
    let mut names = Vec::new();

    for line in content.lines() {
        if !is_image_name(line.trim_end()) {
            continue;
        }
        let Some((_hash, name)) = line.split_once(' ') else {
            continue;
        };
        names.push(name.trim_start().to_string());
    }

    names
}

/// Count, for every entry, how many snapshots still reference its image
/// through a link below `<snapshots_dir>/<snapshot>/snapshot/<extensions_dir>`.
///
/// Snapshots without an extensions directory contribute nothing. A
/// missing snapshot tree leaves all counts at zero.
pub fn count_snapshot_references(
    snapshots_dir: &Utf8Path,
    extensions_dir: &Utf8Path,
    entries: &mut [ImageEntry],
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }

    let snapshots = match std::fs::read_dir(snapshots_dir) {
        Ok(snapshots) => snapshots,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    let relative = extensions_dir
        .as_str()
        .trim_start_matches('/')
        .to_string();

    for snapshot in snapshots {
        let snapshot = snapshot?;
        if !snapshot.file_type()?.is_dir() {
            continue;
        }

        let Some(path) = Utf8Path::from_path(&snapshot.path()).map(|p| p.to_owned()) else {
            continue;
        };
        let extensions = path.join("snapshot").join(&relative);

        for name in discover_images(&extensions)? {
            for entry in entries.iter_mut() {
                if entry.image_name == name {
                    entry.reference_count += 1;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8Path::from_path(path).unwrap().to_owned()
    }

    #[test]
    fn missing_directory_is_empty() {
        let names = discover_images(Utf8Path::new("/nonexistent/images")).unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn lists_images_and_resolves_links() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(dir.path());

        std::fs::write(root.join("gcc-30.3.x86-64.raw"), b"").unwrap();
        std::fs::write(root.join("strace-6.9.x86-64.img"), b"").unwrap();
        std::fs::write(root.join("README"), b"").unwrap();
        std::os::unix::fs::symlink(
            root.join("gcc-30.3.x86-64.raw"),
            root.join("gcc.raw"),
        )
        .unwrap();

        let names = discover_images(&root).unwrap();
        assert_eq!(
            names,
            vec![
                "gcc-30.3.x86-64.raw".to_string(),
                "gcc-30.3.x86-64.raw".to_string(),
                "strace-6.9.x86-64.img".to_string(),
            ]
        );
    }

    #[test]
    fn checksum_manifest_extracts_image_names() {
        let manifest = "\
0123abcd  gcc-30.3.x86-64.raw
deadbeef  notes.txt
cafebabe  strace-6.9.x86-64.img
brokenlinewithoutspace.raw
feedface  vim-9.1.x86-64.raw
";
        let names = parse_checksum_manifest(manifest);
        assert_eq!(
            names,
            vec![
                "gcc-30.3.x86-64.raw",
                "strace-6.9.x86-64.img",
                "vim-9.1.x86-64.raw",
            ]
        );
    }

    #[test]
    fn reference_counting_across_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(dir.path());

        for snapshot in ["1", "2", "3"] {
            let extensions = root.join(snapshot).join("snapshot/etc/extensions");
            std::fs::create_dir_all(&extensions).unwrap();
            if snapshot != "3" {
                std::fs::write(extensions.join("gcc-30.3.x86-64.raw"), b"").unwrap();
            }
        }

        let mut entries = vec![
            ImageEntry::new("gcc-30.3.x86-64.raw"),
            ImageEntry::new("vim-9.1.x86-64.raw"),
        ];
        count_snapshot_references(&root, Utf8Path::new("/etc/extensions"), &mut entries).unwrap();

        assert_eq!(entries[0].reference_count, 2);
        assert_eq!(entries[1].reference_count, 0);
    }

    #[test]
    fn missing_snapshot_tree_leaves_counts_alone() {
        let mut entries = vec![ImageEntry::new("gcc-30.3.x86-64.raw")];
        count_snapshot_references(
            Utf8Path::new("/nonexistent/.snapshots"),
            Utf8Path::new("/etc/extensions"),
            &mut entries,
        )
        .unwrap();
        assert_eq!(entries[0].reference_count, 0);
    }
}
