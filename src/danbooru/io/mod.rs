use std::path::{Path, PathBuf};

pub(crate) mod directory;

/// File name suffix shared by every metadata artifact.
pub(crate) const INFOS_SUFFIX: &str = "_infos.json";

/// Paths of the three artifacts a post materializes into.
#[derive(Debug, Clone)]
pub(crate) struct ArtifactPaths {
    pub(crate) image: PathBuf,
    pub(crate) tags: PathBuf,
    pub(crate) infos: PathBuf,
}

impl ArtifactPaths {
    pub(crate) fn new(directory: &Path, id: u32, extension: &str) -> Self {
        ArtifactPaths {
            image: directory.join(format!("{id}_image.{extension}")),
            tags: directory.join(format!("{id}_tags.txt")),
            infos: directory.join(format!("{id}{INFOS_SUFFIX}")),
        }
    }

    /// A post is complete once every artifact of the active mode is on disk.
    pub(crate) fn is_complete(&self, metadata_only: bool) -> bool {
        let metadata_present = self.tags.is_file() && self.infos.is_file();
        if metadata_only {
            metadata_present
        } else {
            metadata_present && self.image.is_file()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::tempdir;

    #[test]
    fn artifact_names_are_keyed_by_id() {
        let paths = ArtifactPaths::new(Path::new("images/tag/s"), 41, "png");
        assert_eq!(paths.image, Path::new("images/tag/s/41_image.png"));
        assert_eq!(paths.tags, Path::new("images/tag/s/41_tags.txt"));
        assert_eq!(paths.infos, Path::new("images/tag/s/41_infos.json"));
    }

    #[test]
    fn a_partial_write_counts_as_incomplete() {
        let dir = tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), 7, "jpg");
        assert!(!paths.is_complete(false));

        fs::write(&paths.tags, "sky").unwrap();
        fs::write(&paths.infos, "{}").unwrap();
        assert!(!paths.is_complete(false));

        fs::write(&paths.image, [0u8; 4]).unwrap();
        assert!(paths.is_complete(false));
    }

    #[test]
    fn metadata_only_mode_ignores_the_image_artifact() {
        let dir = tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), 7, "jpg");
        fs::write(&paths.tags, "sky").unwrap();
        fs::write(&paths.infos, "{}").unwrap();
        assert!(paths.is_complete(true));
        assert!(!paths.is_complete(false));
    }
}
