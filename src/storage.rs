use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{
    audio::song::Song,
    error::{MusicError, MusicResult},
};

/// Durable per-guild settings and per-song statistics used by the player.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn play_count(&self, external_id: &str) -> MusicResult<u32>;

    /// Bumps the play count for `song`, recording it first if it is new.
    async fn increment_play_count(&self, song: &Song) -> MusicResult<()>;

    async fn volume(&self, guild_id: GuildId) -> MusicResult<Option<u8>>;

    async fn set_volume(&self, guild_id: GuildId, volume: u8) -> MusicResult<()>;

    async fn find_song_by_external_id(&self, external_id: &str) -> MusicResult<Option<Song>>;

    async fn find_song_by_query(&self, query: &str) -> MusicResult<Option<Song>>;
}

/// Settings stored for each guild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: u64,
    pub volume: Option<u8>,
    pub music_channel_id: Option<u64>,
}

/// A song as stored on disk, with when it was last played.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SongRecord {
    #[serde(flatten)]
    song: Song,
    last_played: Option<DateTime<Utc>>,
}

/// Store backed by one JSON file per guild and per song.
///
/// ```text
/// <data_dir>/guilds/guild_<id>.json
/// <data_dir>/songs/<youtube_id>.json
/// ```
pub struct JsonStorage {
    data_dir: PathBuf,
    guilds: DashMap<GuildId, GuildSettings>,
    songs: DashMap<String, SongRecord>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> MusicResult<Self> {
        fs::create_dir_all(data_dir.join("guilds")).await?;
        fs::create_dir_all(data_dir.join("songs")).await?;

        let storage = Self {
            data_dir,
            guilds: DashMap::new(),
            songs: DashMap::new(),
        };

        let guilds = storage.load_all_guilds().await?;
        let songs = storage.load_all_songs().await?;

        info!(
            "📁 Storage ready at {} ({} guilds, {} songs)",
            storage.data_dir.display(),
            guilds,
            songs
        );

        Ok(storage)
    }

    pub fn guild_settings(&self, guild_id: GuildId) -> GuildSettings {
        self.guilds
            .get(&guild_id)
            .map(|settings| settings.clone())
            .unwrap_or_else(|| GuildSettings {
                guild_id: guild_id.get(),
                ..GuildSettings::default()
            })
    }

    pub fn music_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.guild_settings(guild_id)
            .music_channel_id
            .map(ChannelId::new)
    }

    pub async fn set_music_channel(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
    ) -> MusicResult<()> {
        let mut settings = self.guild_settings(guild_id);
        settings.music_channel_id = channel_id.map(|id| id.get());
        self.save_guild(guild_id, settings).await
    }

    pub fn song_count(&self) -> usize {
        self.songs.len()
    }

    async fn save_guild(&self, guild_id: GuildId, settings: GuildSettings) -> MusicResult<()> {
        write_json(&self.guild_path(guild_id), &settings).await?;
        self.guilds.insert(guild_id, settings);
        debug!("💾 Settings saved for guild {}", guild_id);
        Ok(())
    }

    async fn load_all_guilds(&self) -> MusicResult<usize> {
        let mut loaded = 0;
        for path in json_files(&self.data_dir.join("guilds")).await? {
            let Some(guild_id) = path
                .file_stem()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok())
                .filter(|id| *id != 0)
            else {
                continue;
            };

            match read_json::<GuildSettings>(&path).await {
                Ok(settings) => {
                    self.guilds.insert(GuildId::new(guild_id), settings);
                    loaded += 1;
                }
                Err(e) => warn!("Skipping settings for guild {}: {}", guild_id, e),
            }
        }
        Ok(loaded)
    }

    async fn load_all_songs(&self) -> MusicResult<usize> {
        let mut loaded = 0;
        for path in json_files(&self.data_dir.join("songs")).await? {
            match read_json::<SongRecord>(&path).await {
                Ok(record) => {
                    if let Some(id) = record.song.youtube_id.clone() {
                        self.songs.insert(id, record);
                        loaded += 1;
                    }
                }
                Err(e) => warn!("Skipping song record {}: {}", path.display(), e),
            }
        }
        Ok(loaded)
    }

    fn guild_path(&self, guild_id: GuildId) -> PathBuf {
        self.data_dir
            .join("guilds")
            .join(format!("guild_{}.json", guild_id))
    }

    fn song_path(&self, external_id: &str) -> PathBuf {
        self.data_dir.join("songs").join(format!("{}.json", external_id))
    }
}

#[async_trait]
impl PersistentStore for JsonStorage {
    async fn play_count(&self, external_id: &str) -> MusicResult<u32> {
        Ok(self
            .songs
            .get(external_id)
            .map(|record| record.song.plays)
            .unwrap_or(0))
    }

    async fn increment_play_count(&self, song: &Song) -> MusicResult<()> {
        let id = song
            .external_id()
            .ok_or_else(|| MusicError::Storage("song has no external id".to_string()))?;

        let record = {
            let mut entry = self.songs.entry(id.to_string()).or_insert_with(|| SongRecord {
                song: Song {
                    position: 0,
                    plays: 0,
                    ..song.clone()
                },
                last_played: None,
            });
            entry.song.plays += 1;
            entry.last_played = Some(Utc::now());
            if entry.song.query.is_none() {
                entry.song.query = song.query.clone();
            }
            entry.clone()
        };

        write_json(&self.song_path(id), &record).await?;
        debug!("📈 {} played {} times", song.display_title(), record.song.plays);
        Ok(())
    }

    async fn volume(&self, guild_id: GuildId) -> MusicResult<Option<u8>> {
        Ok(self.guilds.get(&guild_id).and_then(|settings| settings.volume))
    }

    async fn set_volume(&self, guild_id: GuildId, volume: u8) -> MusicResult<()> {
        let mut settings = self.guild_settings(guild_id);
        settings.volume = Some(volume);
        self.save_guild(guild_id, settings).await
    }

    async fn find_song_by_external_id(&self, external_id: &str) -> MusicResult<Option<Song>> {
        Ok(self.songs.get(external_id).map(|record| record.song.clone()))
    }

    async fn find_song_by_query(&self, query: &str) -> MusicResult<Option<Song>> {
        let query = query.trim().to_lowercase();
        Ok(self
            .songs
            .iter()
            .find(|record| {
                record
                    .song
                    .query
                    .as_deref()
                    .is_some_and(|stored| stored.trim().to_lowercase() == query)
            })
            .map(|record| record.song.clone()))
    }
}

async fn json_files(dir: &Path) -> MusicResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !fs::try_exists(dir).await? {
        return Ok(files);
    }

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(files)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> MusicResult<T> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> MusicResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::song::resolved;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn play_counts_survive_reload() {
        let dir = tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();

        let mut song = resolved("dQw4w9WgXcQ", "Never Gonna", 212);
        song.query = Some("Rick Astley".into());

        assert_eq!(storage.play_count("dQw4w9WgXcQ").await.unwrap(), 0);
        storage.increment_play_count(&song).await.unwrap();
        storage.increment_play_count(&song).await.unwrap();
        assert_eq!(storage.play_count("dQw4w9WgXcQ").await.unwrap(), 2);

        let reloaded = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(reloaded.play_count("dQw4w9WgXcQ").await.unwrap(), 2);

        let found = reloaded.find_song_by_query("rick astley").await.unwrap().unwrap();
        assert_eq!(found.display_title(), "Never Gonna");
        assert!(reloaded.find_song_by_external_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn guild_settings_persist() {
        let dir = tempdir().unwrap();
        let guild = GuildId::new(42);

        {
            let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
            assert_eq!(storage.volume(guild).await.unwrap(), None);
            storage.set_volume(guild, 35).await.unwrap();
            storage
                .set_music_channel(guild, Some(ChannelId::new(7)))
                .await
                .unwrap();
        }

        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(storage.volume(guild).await.unwrap(), Some(35));
        assert_eq!(storage.music_channel(guild), Some(ChannelId::new(7)));
        assert!(dir.path().join("guilds/guild_42.json").exists());
    }

    #[tokio::test]
    async fn increment_requires_an_id() {
        let dir = tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();

        let err = storage
            .increment_play_count(&Song::from_query("no id"))
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::Storage(_)));
    }
}
