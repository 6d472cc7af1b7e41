use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Dev guild for instant command registration

    // Audio
    pub default_volume: u8,
    pub queue_window: usize,
    pub max_playlist_size: usize,

    // Paths
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,

    // Catalog
    pub youtube_api_key: Option<String>,
    pub ytdlp_path: PathBuf,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Timers
    pub idle_timeout: Duration,
    pub idle_check_interval: Duration,
    pub player_eviction_after: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating {}", config.data_dir.display()))?;
        std::fs::create_dir_all(&config.cache_dir)
            .with_context(|| format!("creating {}", config.cache_dir.display()))?;

        Ok(config)
    }

    /// Builds a config from any key/value source, then validates it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            // Audio
            default_volume: parse_or(var("DEFAULT_VOLUME"), "DEFAULT_VOLUME", 20)?,
            queue_window: parse_or(var("QUEUE_WINDOW"), "QUEUE_WINDOW", 10)?,
            max_playlist_size: parse_or(var("MAX_PLAYLIST_SIZE"), "MAX_PLAYLIST_SIZE", 100)?,

            // Paths
            data_dir: var("DATA_DIR").unwrap_or_else(|| "./data".to_string()).into(),
            cache_dir: var("CACHE_DIR").unwrap_or_else(|| "./songs".to_string()).into(),

            // Catalog
            youtube_api_key: var("YOUTUBE_API_KEY"),
            ytdlp_path: var("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".to_string()).into(),
            spotify_client_id: var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: var("SPOTIFY_CLIENT_SECRET"),

            // Timers
            idle_timeout: duration_or(var("IDLE_TIMEOUT"), "IDLE_TIMEOUT", "3m")?,
            idle_check_interval: duration_or(var("IDLE_CHECK_INTERVAL"), "IDLE_CHECK_INTERVAL", "10s")?,
            player_eviction_after: duration_or(
                var("PLAYER_EVICTION_AFTER"),
                "PLAYER_EVICTION_AFTER",
                "30m",
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - The queue card and playlists must allow at least one song
    /// - The idle check interval must be shorter than the idle timeout
    /// - Spotify needs both a client id and a secret, or neither
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        if self.queue_window == 0 {
            anyhow::bail!("Queue window must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.idle_check_interval.is_zero() {
            anyhow::bail!("Idle check interval must be greater than 0");
        }

        if self.idle_check_interval > self.idle_timeout {
            anyhow::bail!(
                "Idle check interval ({}) cannot exceed the idle timeout ({})",
                humantime::format_duration(self.idle_check_interval),
                humantime::format_duration(self.idle_timeout)
            );
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    /// Spotify client credentials, when configured.
    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        self.spotify_client_id
            .clone()
            .zip(self.spotify_client_secret.clone())
    }

    /// Returns a summary of the current configuration for logging, without
    /// the token or API key.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% default vol, {} queue rows, {} max playlist\n  \
            Paths: data {}, cache {}\n  \
            Catalog: {}, Spotify {}\n  \
            Timers: idle {} (check {}), evict after {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.queue_window,
            self.max_playlist_size,
            self.data_dir.display(),
            self.cache_dir.display(),
            if self.youtube_api_key.is_some() {
                "YouTube API v3".to_string()
            } else {
                format!("yt-dlp ({})", self.ytdlp_path.display())
            },
            if self.spotify_client_id.is_some() {
                "enabled"
            } else {
                "disabled"
            },
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.idle_check_interval),
            humantime::format_duration(self.player_eviction_after),
        )
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

fn duration_or(value: Option<String>, key: &str, default: &str) -> Result<Duration> {
    let raw = value.unwrap_or_else(|| default.to_string());
    humantime::parse_duration(raw.trim())
        .with_context(|| format!("{} is not a duration: {}", key, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[("DISCORD_TOKEN", "token"), ("APPLICATION_ID", "1234")];

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();

        assert_eq!(config.default_volume, 20);
        assert_eq!(config.queue_window, 10);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.cache_dir, PathBuf::from("./songs"));
        assert_eq!(config.idle_timeout, Duration::from_secs(180));
        assert_eq!(config.idle_check_interval, Duration::from_secs(10));
        assert_eq!(config.player_eviction_after, Duration::from_secs(1800));
        assert_eq!(config.youtube_api_key, None);
        assert_eq!(config.spotify_credentials(), None);
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("DEFAULT_VOLUME", "45"),
            ("IDLE_TIMEOUT", "5m 30s"),
            ("YOUTUBE_API_KEY", "key"),
            ("GUILD_ID", "42"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.default_volume, 45);
        assert_eq!(config.idle_timeout, Duration::from_secs(330));
        assert_eq!(config.guild_id, Some(42));
        assert!(!config.summary().contains("token"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[("APPLICATION_ID", "1")])).is_err());

        let mut loud = REQUIRED.to_vec();
        loud.push(("DEFAULT_VOLUME", "150"));
        assert!(Config::from_lookup(lookup(&loud)).is_err());

        let mut slow = REQUIRED.to_vec();
        slow.extend([("IDLE_TIMEOUT", "5s"), ("IDLE_CHECK_INTERVAL", "10s")]);
        assert!(Config::from_lookup(lookup(&slow)).is_err());

        let mut half_spotify = REQUIRED.to_vec();
        half_spotify.push(("SPOTIFY_CLIENT_ID", "id"));
        assert!(Config::from_lookup(lookup(&half_spotify)).is_err());

        let mut garbage = REQUIRED.to_vec();
        garbage.push(("IDLE_TIMEOUT", "soon"));
        assert!(Config::from_lookup(lookup(&garbage)).is_err());
    }
}
