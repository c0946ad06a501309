//! Upgrade selection: the best available candidate for an installed
//! image.

use std::cmp::Ordering;

use extmgr_core::types::ImageEntry;
use extmgr_core::version::version_cmp;

/// Pick the highest-versioned compatible candidate that is strictly
/// newer than `installed`, or `None` when nothing qualifies.
///
/// Remote candidates are considered before local ones; with equal
/// versions the first seen wins, and the same image appearing in both
/// pools merges its provenance flags instead of competing with itself.
/// An installed image without a recorded version accepts any candidate.
pub fn best_upgrade(
    installed: &ImageEntry,
    remote: &[ImageEntry],
    local: &[ImageEntry],
) -> Option<ImageEntry> {
    let mut best: Option<ImageEntry> = None;

    for candidate in remote.iter().chain(local.iter()) {
        consider(installed, candidate, &mut best);
    }

    best
}

fn consider(installed: &ImageEntry, candidate: &ImageEntry, best: &mut Option<ImageEntry>) {
    if !candidate.is_compatible {
        return;
    }
    if candidate.logical_name != installed.logical_name {
        return;
    }
    if candidate.architecture() != installed.architecture() {
        return;
    }
    let Some(candidate_version) = candidate.sysext_version() else {
        return;
    };

    if let Some(current) = best.as_mut() {
        // The same image showing up again, e.g. once remote and once in
        // the local store: reconcile the flags, don't compare versions.
        if current.image_name == candidate.image_name
            && current.sysext_version() == Some(candidate_version)
        {
            current.merge_provenance(candidate);
            return;
        }
    }

    let newer_than_installed = match installed.sysext_version() {
        // Not versioned yet: a fresh install request, anything goes.
        None => true,
        Some(installed_version) => {
            version_cmp(candidate_version, installed_version) == Ordering::Greater
        }
    };
    if !newer_than_installed {
        return;
    }

    if let Some(current) = best.as_ref() {
        let current_version = current.sysext_version().unwrap_or_default();
        if version_cmp(current_version, candidate_version) != Ordering::Less {
            return;
        }
    }

    *best = Some(candidate.clone());
}
