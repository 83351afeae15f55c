use std::path::{Path, PathBuf};

use log::warn;
use walkdir::WalkDir;

use crate::danbooru::io::INFOS_SUFFIX;

/// Replaces every character the filesystem rejects in a path segment with `_`.
pub(crate) fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect()
}

/// Builds the directory that holds every artifact of a tag/rating pair.
pub(crate) fn item_directory(root: &Path, tag: &str, rating: &str) -> PathBuf {
    root.join(sanitize_component(tag))
        .join(sanitize_component(rating))
}

/// Returns the highest post id already mirrored under the tag's directory.
///
/// Walks every rating subdirectory for `<id>_infos.json` files and takes the
/// largest numeric prefix found. A missing directory means nothing was
/// mirrored yet and is reported as 0 rather than an error.
pub(crate) fn scan_latest_id(root: &Path, tag: &str) -> u32 {
    let tag_dir = root.join(sanitize_component(tag));
    if !tag_dir.is_dir() {
        return 0;
    }

    let mut latest = 0;
    for entry in WalkDir::new(&tag_dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(
                    "Failed to read an entry under {}: {}",
                    tag_dir.display(),
                    error
                );
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let Some(prefix) = name.strip_suffix(INFOS_SUFFIX) else {
            continue;
        };
        match prefix.parse::<u32>() {
            Ok(id) => latest = latest.max(id),
            Err(_) => warn!("Ignoring a metadata file with a malformed name: {name}"),
        }
    }
    latest
}
