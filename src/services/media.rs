//! Media storage
//!
//! Uploaded images are written below the configured media root under a
//! fresh UUID file name. Stored values are paths relative to that root,
//! e.g. `articles/images/<uuid>.png`; the site serves them under `/media/`.

use crate::config::UploadConfig;
use crate::models::DEFAULT_AVATAR;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Where an upload belongs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    ArticleImage,
    Avatar,
}

impl MediaKind {
    /// Directory relative to the media root
    pub fn dir(&self) -> &'static str {
        match self {
            MediaKind::ArticleImage => "articles/images",
            MediaKind::Avatar => "avatars",
        }
    }
}

/// Error types for media operations
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File too large: {size} bytes (maximum {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Empty file")]
    Empty,

    #[error("Failed to store file: {0}")]
    Io(#[from] std::io::Error),
}

/// Stores uploads and picks default avatars
#[derive(Debug, Clone)]
pub struct MediaStore {
    config: UploadConfig,
}

impl MediaStore {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.path
    }

    /// Check type and size before anything touches the disk
    pub fn validate(&self, content_type: &str, size: u64) -> Result<(), MediaError> {
        if size == 0 {
            return Err(MediaError::Empty);
        }
        if !self.config.is_type_allowed(content_type) {
            return Err(MediaError::UnsupportedType(content_type.to_string()));
        }
        if size > self.config.max_file_size {
            return Err(MediaError::TooLarge {
                size,
                max: self.config.max_file_size,
            });
        }
        Ok(())
    }

    /// Save an uploaded image, returning its path relative to the media root
    pub async fn save(
        &self,
        kind: MediaKind,
        content_type: &str,
        data: &[u8],
    ) -> Result<String, MediaError> {
        self.validate(content_type, data.len() as u64)?;

        let dir = self.config.path.join(kind.dir());
        fs::create_dir_all(&dir).await?;

        let file_name = format!(
            "{}.{}",
            Uuid::new_v4(),
            self.config.get_extension(content_type)
        );
        fs::write(dir.join(&file_name), data).await?;

        let relative = format!("{}/{}", kind.dir(), file_name);
        tracing::info!(path = %relative, size = data.len(), "media stored");
        Ok(relative)
    }

    /// Delete a stored file; missing files are ignored
    pub async fn remove(&self, relative: &str) -> Result<(), MediaError> {
        if relative.split('/').any(|part| part == ".." || part.is_empty()) {
            return Ok(());
        }
        match fs::remove_file(self.config.path.join(relative)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// A random image from `<media>/avatars/`, or the default avatar when
    /// the directory is missing or holds no images
    pub async fn random_avatar(&self) -> String {
        let candidates = match self.avatar_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::debug!(error = %e, "no avatar directory, using default avatar");
                Vec::new()
            }
        };
        if candidates.is_empty() {
            return DEFAULT_AVATAR.to_string();
        }
        match random_index(candidates.len()) {
            Ok(index) => format!("{}/{}", MediaKind::Avatar.dir(), candidates[index]),
            Err(e) => {
                tracing::warn!(error = %e, "no OS randomness, using default avatar");
                DEFAULT_AVATAR.to_string()
            }
        }
    }

    async fn avatar_candidates(&self) -> std::io::Result<Vec<String>> {
        let dir: PathBuf = self.config.path.join(MediaKind::Avatar.dir());
        let mut entries = fs::read_dir(&dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_image_file_name(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

fn is_image_file_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !lower.starts_with('.')
        && [".jpg", ".jpeg", ".png", ".gif", ".webp"]
            .iter()
            .any(|ext| lower.ends_with(ext))
}

/// Random index in `0..len`; `len` must be non-zero
fn random_index(len: usize) -> Result<usize, getrandom::Error> {
    let mut bytes = [0u8; 8];
    getrandom::fill(&mut bytes)?;
    Ok((u64::from_le_bytes(bytes) % len as u64) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> MediaStore {
        MediaStore::new(UploadConfig {
            path: dir.path().to_path_buf(),
            max_file_size: 16,
            ..UploadConfig::default()
        })
    }

    #[tokio::test]
    async fn test_save_writes_under_kind_dir() {
        let dir = TempDir::new().unwrap();
        let media = store(&dir);

        let path = media
            .save(MediaKind::ArticleImage, "image/png", b"png-bytes")
            .await
            .unwrap();
        assert!(path.starts_with("articles/images/"));
        assert!(path.ends_with(".png"));
        assert_eq!(std::fs::read(dir.path().join(&path)).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_save_rejects_bad_type_and_size() {
        let dir = TempDir::new().unwrap();
        let media = store(&dir);

        assert!(matches!(
            media.save(MediaKind::Avatar, "text/html", b"<p>").await,
            Err(MediaError::UnsupportedType(_))
        ));
        assert!(matches!(
            media.save(MediaKind::Avatar, "image/png", &[0u8; 17]).await,
            Err(MediaError::TooLarge { size: 17, max: 16 })
        ));
        assert!(matches!(
            media.save(MediaKind::Avatar, "image/png", b"").await,
            Err(MediaError::Empty)
        ));
        assert!(!dir.path().join("avatars").exists());
    }

    #[tokio::test]
    async fn test_remove_deletes_stored_file() {
        let dir = TempDir::new().unwrap();
        let media = store(&dir);

        let path = media
            .save(MediaKind::ArticleImage, "image/gif", b"gif")
            .await
            .unwrap();
        media.remove(&path).await.unwrap();
        assert!(!dir.path().join(&path).exists());

        // Already gone and outside the root are both no-ops
        media.remove(&path).await.unwrap();
        media.remove("../outside.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_random_avatar_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let media = store(&dir);
        assert_eq!(media.random_avatar().await, DEFAULT_AVATAR);

        std::fs::create_dir_all(dir.path().join("avatars")).unwrap();
        std::fs::write(dir.path().join("avatars/notes.txt"), b"x").unwrap();
        assert_eq!(media.random_avatar().await, DEFAULT_AVATAR);
    }

    #[tokio::test]
    async fn test_random_avatar_picks_an_image() {
        let dir = TempDir::new().unwrap();
        let media = store(&dir);
        std::fs::create_dir_all(dir.path().join("avatars")).unwrap();
        for name in ["a.png", "b.JPG"] {
            std::fs::write(dir.path().join("avatars").join(name), b"x").unwrap();
        }

        for _ in 0..10 {
            let avatar = media.random_avatar().await;
            assert!(avatar == "avatars/a.png" || avatar == "avatars/b.JPG", "{}", avatar);
        }
    }

    #[test]
    fn test_random_index_stays_in_range() {
        for len in [1, 2, 7] {
            for _ in 0..50 {
                assert!(random_index(len).unwrap() < len);
            }
        }
    }

    #[test]
    fn test_is_image_file_name() {
        assert!(is_image_file_name("cat.webp"));
        assert!(!is_image_file_name(".hidden.png"));
        assert!(!is_image_file_name("readme.md"));
    }
}
