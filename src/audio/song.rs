use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;

/// User who asked for a song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl Requester {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            avatar_url: None,
        }
    }
}

/// One track plus its playback and request metadata.
///
/// A song starts life as a bare query or id and is filled in by a
/// [`MetadataResolver`](crate::sources::MetadataResolver) before it can be
/// played.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub title: Option<String>,
    /// Length in seconds.
    pub duration: Option<u64>,
    /// Offset in seconds to start playback from.
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub plays: u32,
    /// Search text that matched this song.
    pub query: Option<String>,
    pub thumbnail: Option<String>,
    pub url: Option<String>,
    pub youtube_id: Option<String>,
    pub spotify_id: Option<String>,
    #[serde(skip)]
    pub requested_by: Option<Requester>,
}

impl Song {
    pub fn from_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn from_youtube_id(id: impl Into<String>) -> Self {
        Self {
            youtube_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Id used to address the cached audio file.
    pub fn external_id(&self) -> Option<&str> {
        self.youtube_id.as_deref()
    }

    pub fn is_playable(&self) -> bool {
        self.duration.is_some() && self.external_id().is_some()
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("?")
    }

    pub fn youtube_url(&self) -> Option<String> {
        self.youtube_id
            .as_ref()
            .map(|id| format!("https://youtu.be/{}", id))
    }

    /// Link shown in status cards.
    pub fn link(&self) -> String {
        self.url
            .clone()
            .or_else(|| self.youtube_url())
            .unwrap_or_default()
    }

    /// Duration rendered as `42s`, `3m5s` or `1h2m3s`, `?` if unknown.
    pub fn pretty_duration(&self) -> String {
        self.duration
            .map(format_duration)
            .unwrap_or_else(|| "?".to_string())
    }
}

pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m{}s", secs / 3600, secs % 3600 / 60, secs % 60)
    }
}

#[cfg(test)]
pub(crate) fn resolved(id: &str, title: &str, duration: u64) -> Song {
    Song {
        title: Some(title.to_string()),
        duration: Some(duration),
        thumbnail: Some(format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", id)),
        url: Some(format!("https://youtu.be/{}", id)),
        youtube_id: Some(id.to_string()),
        ..Song::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_duration_formats() {
        let mut song = Song::default();
        assert_eq!(song.pretty_duration(), "?");

        song.duration = Some(42);
        assert_eq!(song.pretty_duration(), "42s");

        song.duration = Some(185);
        assert_eq!(song.pretty_duration(), "3m5s");

        song.duration = Some(3723);
        assert_eq!(song.pretty_duration(), "1h2m3s");
    }

    #[test]
    fn playable_needs_duration_and_id() {
        let mut song = Song::from_query("daft punk");
        assert!(!song.is_playable());

        song.youtube_id = Some("dQw4w9WgXcQ".into());
        assert!(!song.is_playable());

        song.duration = Some(212);
        assert!(song.is_playable());
    }

    #[test]
    fn link_falls_back_to_short_url() {
        let song = Song::from_youtube_id("dQw4w9WgXcQ");
        assert_eq!(song.link(), "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(song.display_title(), "?");
    }
}
