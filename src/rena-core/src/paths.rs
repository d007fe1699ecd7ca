use crate::{APP_AUTHOR, APP_NAME, APP_QUALIFIER};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory holding the song-info cache, relative to the user cache root.
const INFO_CACHE_DIR: &str = "info";

#[derive(Debug, Clone)]
pub struct AppDirs {
    config_dir: PathBuf,
    data_dir: PathBuf,
    cache_dir: PathBuf,
    log_dir: PathBuf,
}

impl AppDirs {
    pub fn discover() -> Result<Self, DirsError> {
        let dirs = ProjectDirs::from(APP_QUALIFIER, APP_AUTHOR, APP_NAME)
            .ok_or(DirsError::MissingProjectDirs)?;
        Ok(Self::from_parts(
            dirs.config_dir().to_path_buf(),
            dirs.data_dir().to_path_buf(),
            dirs.cache_dir().to_path_buf(),
        ))
    }

    /// Self-contained layout rooted at `root` (`config/`, `data/`, `cache/`).
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::from_parts(root.join("config"), root.join("data"), root.join("cache"))
    }

    fn from_parts(config_dir: PathBuf, data_dir: PathBuf, cache_dir: PathBuf) -> Self {
        let log_dir = data_dir.join("logs");
        Self {
            config_dir,
            data_dir,
            cache_dir,
            log_dir,
        }
    }

    pub fn ensure_exists(&self) -> Result<(), DirsError> {
        for dir in [&self.config_dir, &self.data_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|source| DirsError::CreateDirectory {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Root of the lyrics/biography/similar-songs cache.
    ///
    /// Not created here; [`crate::InfoCache::open`] creates it on demand.
    pub fn info_cache_dir(&self) -> PathBuf {
        self.cache_dir.join(INFO_CACHE_DIR)
    }
}

#[derive(Debug, Error)]
pub enum DirsError {
    #[error("unable to determine project directories for Rena")]
    MissingProjectDirs,
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn discover_returns_dirs() {
        let dirs = AppDirs::discover().expect("should build dirs");
        assert!(dirs.log_dir().ends_with("logs"));
        assert!(dirs.info_cache_dir().ends_with(INFO_CACHE_DIR));
    }

    #[test]
    fn rooted_layout_nests_info_cache_under_cache_dir() {
        let root = tempdir().unwrap();
        let dirs = AppDirs::from_root(root.path());
        assert_eq!(
            dirs.info_cache_dir(),
            root.path().join("cache").join("info")
        );

        dirs.ensure_exists().unwrap();
        assert!(dirs.config_dir().is_dir());
        assert!(dirs.log_dir().is_dir());
        assert!(!dirs.info_cache_dir().exists());
    }
}
