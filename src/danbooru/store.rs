use std::fs::{create_dir_all, write};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::danbooru::io::ArtifactPaths;
use crate::danbooru::io::directory;
use crate::danbooru::sender::{PostEntry, SenderError, SenderResult};

/// Extensions the store refuses to download (video and archive content).
pub(crate) const UNSUPPORTED_EXTENSIONS: &[&str] = &["mp4", "webm", "zip", "swf"];

/// Error types for materializing a post
#[derive(Error, Debug)]
pub(crate) enum StoreError {
    #[error("failed to fetch the image: {0}")]
    Fetch(#[from] SenderError),

    #[error("failed to write {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to encode the metadata record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for store operations
pub(crate) type StoreResult<T> = Result<T, StoreError>;

/// Why a post was skipped without touching the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    AlreadyComplete,
    UnsupportedMedia,
}

/// What became of one post handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreOutcome {
    Downloaded,
    Skipped(SkipReason),
    Malformed,
}

/// Capability the store needs from the network: fetch one url into memory.
pub(crate) trait ImageFetch {
    fn fetch_image(&self, url: &str) -> SenderResult<Vec<u8>>;
}

impl<F: ImageFetch> ImageFetch for Arc<F> {
    fn fetch_image(&self, url: &str) -> SenderResult<Vec<u8>> {
        (**self).fetch_image(url)
    }
}

/// Writes posts into the on-disk mirror, one directory per tag/rating pair.
pub(crate) struct ItemStore<F> {
    fetcher: F,
    root: PathBuf,
}

impl<F: ImageFetch> ItemStore<F> {
    pub(crate) fn new(fetcher: F, root: PathBuf) -> Self {
        ItemStore { fetcher, root }
    }

    /// Materializes one post into its artifacts.
    ///
    /// Every check runs before the fetch, so a skipped or malformed post
    /// causes no network traffic. Artifacts are written image first and
    /// metadata last, so an interrupted write leaves the post incomplete
    /// for the next run rather than half-claimed.
    pub(crate) fn materialize(
        &self,
        post: &PostEntry,
        tag: &str,
        metadata_only: bool,
    ) -> StoreResult<StoreOutcome> {
        let (Some(id), Some(file_url), Some(file_ext), Some(tag_string), Some(rating)) = (
            post.id,
            post.file_url.as_deref(),
            post.file_ext.as_deref(),
            post.tag_string.as_deref(),
            post.rating.as_deref(),
        ) else {
            return Ok(StoreOutcome::Malformed);
        };

        let item_dir = directory::item_directory(&self.root, tag, rating);
        // Workers race on this; an existing directory is success.
        create_dir_all(&item_dir).map_err(|source| StoreError::Io {
            path: item_dir.clone(),
            source,
        })?;

        let paths = ArtifactPaths::new(&item_dir, id, file_ext);
        if paths.is_complete(metadata_only) {
            return Ok(StoreOutcome::Skipped(SkipReason::AlreadyComplete));
        }
        if UNSUPPORTED_EXTENSIONS.contains(&file_ext) {
            return Ok(StoreOutcome::Skipped(SkipReason::UnsupportedMedia));
        }

        if !metadata_only {
            let bytes = self.fetcher.fetch_image(file_url)?;
            write(&paths.image, &bytes).map_err(|source| StoreError::Io {
                path: paths.image.clone(),
                source,
            })?;
        }

        let tag_lines = tag_string.split_whitespace().collect::<Vec<_>>().join("\n");
        write(&paths.tags, tag_lines).map_err(|source| StoreError::Io {
            path: paths.tags.clone(),
            source,
        })?;

        let record = serde_json::to_string_pretty(post)?;
        write(&paths.infos, record).map_err(|source| StoreError::Io {
            path: paths.infos.clone(),
            source,
        })?;

        Ok(StoreOutcome::Downloaded)
    }
}
