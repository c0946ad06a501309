//! Inventory listing: one de-duplicated view over the remote catalog,
//! the local store, and the set of installed images.

use extmgr_core::types::ImageEntry;
use extmgr_core::version::version_cmp;

/// Merge remote and local entries into one sorted inventory.
///
/// Entries are the same image iff their `image_name` matches; duplicates
/// collapse into the remote entry with the local provenance flags OR-ed
/// in. `installed` is the set of image names currently linked into the
/// extensions directory.
pub fn merge_inventory(
    remote: Vec<ImageEntry>,
    local: Vec<ImageEntry>,
    installed: &[String],
) -> Vec<ImageEntry> {
    let mut images = remote;

    for mut entry in local {
        if installed.iter().any(|name| *name == entry.image_name) {
            entry.is_installed = true;
        }

        match images.iter_mut().find(|e| e.image_name == entry.image_name) {
            Some(existing) => {
                existing.is_local = true;
                existing.is_installed |= entry.is_installed;
            }
            None => images.push(entry),
        }
    }

    images.sort_by(|a, b| version_cmp(&a.image_name, &b.image_name));
    images
}
