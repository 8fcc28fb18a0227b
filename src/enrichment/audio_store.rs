//! Filesystem storage for synthesized audio blobs.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Stores one mp3 per article under `<media_dir>/audio/`. The database only
/// holds the relative path, so the media directory can move between hosts.
pub struct AudioStore {
    media_dir: PathBuf,
}

impl AudioStore {
    pub fn new<P: AsRef<Path>>(media_dir: P) -> Result<Self> {
        let media_dir = media_dir.as_ref().to_path_buf();
        fs::create_dir_all(media_dir.join("audio"))
            .with_context(|| format!("Failed to create media dir at {:?}", media_dir))?;
        Ok(AudioStore { media_dir })
    }

    /// Write the blob and return the relative path to persist.
    pub fn store(&self, article_id: i64, bytes: &[u8]) -> Result<String> {
        let relative = format!("audio/{}.mp3", article_id);
        let path = self.media_dir.join(&relative);
        fs::write(&path, bytes).with_context(|| format!("Failed to write audio to {:?}", path))?;
        Ok(relative)
    }

    /// Remove a previously stored blob. Missing files are only logged, the
    /// database row is the source of truth.
    pub fn delete(&self, relative_path: &str) {
        match self.resolve(relative_path) {
            Ok(path) => {
                if let Err(err) = fs::remove_file(&path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove audio file {:?}: {}", path, err);
                    }
                }
            }
            Err(err) => warn!("Refusing to delete audio path: {}", err),
        }
    }

    /// Resolve a stored relative path to an absolute one, rejecting anything
    /// that would escape the media directory.
    pub fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let relative = Path::new(relative_path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            bail!("invalid audio path: {}", relative_path);
        }
        Ok(self.media_dir.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_resolve_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = AudioStore::new(dir.path()).unwrap();

        let relative = store.store(42, b"mp3 bytes").unwrap();
        assert_eq!(relative, "audio/42.mp3");

        let absolute = store.resolve(&relative).unwrap();
        assert_eq!(fs::read(&absolute).unwrap(), b"mp3 bytes");

        store.delete(&relative);
        assert!(!absolute.exists());
        // Deleting again must not panic
        store.delete(&relative);
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = AudioStore::new(dir.path()).unwrap();
        assert!(store.resolve("../outside.mp3").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
    }
}
