//! # Audio Cache
//!
//! Downloaded audio is kept on disk, one file per track, keyed by the
//! track's external id:
//!
//! ```text
//! <cache_dir>/<youtube_id>.mp3
//! ```
//!
//! A lookup that hits returns the existing file without touching the
//! network. A miss downloads into a staging directory inside the cache dir
//! and renames the result into place, so a half-written file is never
//! visible under its final name.
//!
//! ## Configuration
//!
//! ```env
//! CACHE_DIR=./songs
//! ```

use std::{path::PathBuf, sync::Arc};
use tokio::fs;
use tracing::{debug, info};

use crate::{
    audio::song::Song,
    error::{MusicError, MusicResult},
    sources::Downloader,
};

const AUDIO_EXTENSION: &str = "mp3";

/// Local cache of playable audio files.
#[derive(Clone)]
pub struct AudioCache {
    dir: PathBuf,
    downloader: Arc<dyn Downloader>,
}

impl AudioCache {
    pub fn new(dir: PathBuf, downloader: Arc<dyn Downloader>) -> Self {
        Self { dir, downloader }
    }

    pub fn path_for(&self, external_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", external_id, AUDIO_EXTENSION))
    }

    /// True when audio for `external_id` is on disk. An unreadable entry
    /// counts as missing and is downloaded again.
    pub async fn contains(&self, external_id: &str) -> bool {
        fs::try_exists(self.path_for(external_id))
            .await
            .unwrap_or(false)
    }

    /// Returns the local file for `song`, downloading it on a miss.
    pub async fn resolve(&self, song: &Song) -> MusicResult<PathBuf> {
        let id = song
            .external_id()
            .ok_or_else(|| MusicError::NotFound(song.display_title().to_string()))?;

        let path = self.path_for(id);
        if self.contains(id).await {
            debug!("💾 Cache hit for {}", id);
            return Ok(path);
        }

        info!("⬇️ Downloading {} ({})", song.display_title(), id);
        fs::create_dir_all(&self.dir).await?;

        let staging = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(&self.dir)?;

        let fetched = self.downloader.fetch(id, staging.path()).await?;
        if !fs::try_exists(&fetched).await? {
            return Err(MusicError::Download {
                id: id.to_string(),
                reason: format!("downloader reported {} but it does not exist", fetched.display()),
            });
        }

        fs::rename(&fetched, &path).await?;
        debug!("💾 Cached {} at {}", id, path.display());

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::song::resolved, sources::MockDownloader};
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn hit_skips_download() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("aaaaaaaaaaa.mp3"), b"audio").unwrap();

        let mut downloader = MockDownloader::new();
        downloader.expect_fetch().times(0);

        let cache = AudioCache::new(dir.path().to_path_buf(), Arc::new(downloader));
        let path = cache
            .resolve(&resolved("aaaaaaaaaaa", "A", 10))
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("aaaaaaaaaaa.mp3"));
    }

    #[tokio::test]
    async fn miss_downloads_and_moves_into_place() {
        let dir = tempdir().unwrap();

        let mut downloader = MockDownloader::new();
        downloader
            .expect_fetch()
            .with(eq("bbbbbbbbbbb"), mockall::predicate::always())
            .times(1)
            .returning(|id, dest| {
                let file = dest.join(format!("{}.mp3", id));
                std::fs::write(&file, b"audio").unwrap();
                Ok(file)
            });

        let cache = AudioCache::new(dir.path().to_path_buf(), Arc::new(downloader));
        let path = cache
            .resolve(&resolved("bbbbbbbbbbb", "B", 10))
            .await
            .unwrap();

        assert_eq!(path, cache.path_for("bbbbbbbbbbb"));
        assert!(cache.contains("bbbbbbbbbbb").await);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".download-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn download_failure_is_skippable() {
        let dir = tempdir().unwrap();

        let mut downloader = MockDownloader::new();
        downloader.expect_fetch().returning(|id, _| {
            Err(MusicError::Download {
                id: id.to_string(),
                reason: "video unavailable".into(),
            })
        });

        let cache = AudioCache::new(dir.path().to_path_buf(), Arc::new(downloader));
        let err = cache
            .resolve(&resolved("ccccccccccc", "C", 10))
            .await
            .unwrap_err();

        assert!(err.is_skippable());
        assert!(!cache.contains("ccccccccccc").await);
    }
}
