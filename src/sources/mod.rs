//! Catalog access: turning requests into [`Song`]s.
//!
//! A [`MetadataResolver`] maps a search query or YouTube id to track
//! metadata, and a [`Downloader`] fetches the audio for an id. Two
//! implementations back both seams: [`YouTubeAPIv3Client`] (Data API, needs a
//! key) and [`YtDlpClient`] (local `yt-dlp`). Spotify links are expanded by
//! [`SpotifyClient`] into songs that are searched on YouTube when played.

pub mod spotify;
pub mod youtube_api_v3;
pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    audio::song::Song,
    error::{MusicError, MusicResult},
    storage::PersistentStore,
};

pub use spotify::{SpotifyClient, SpotifyLink};
pub use youtube_api_v3::YouTubeAPIv3Client;
pub use ytdlp::YtDlpClient;

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid video id pattern"));

/// What to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Query(String),
    YouTubeId(String),
}

/// Metadata returned by a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub youtube_id: String,
    pub title: String,
    pub duration: Option<u64>,
    pub thumbnail: Option<String>,
    pub url: String,
}

impl ResolvedTrack {
    pub fn into_song(self) -> Song {
        let mut song = Song::default();
        self.apply_to(&mut song);
        song
    }

    /// Fills the fields `song` is missing. Existing titles win, as stored
    /// titles may have been edited.
    pub fn apply_to(self, song: &mut Song) {
        song.youtube_id = Some(self.youtube_id);
        if song.title.is_none() {
            song.title = Some(self.title);
        }
        if self.thumbnail.is_some() {
            song.thumbnail = self.thumbnail;
        }
        if self.duration.is_some() {
            song.duration = self.duration;
        }
        song.url = Some(self.url);
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, lookup: &Lookup) -> MusicResult<ResolvedTrack>;

    /// Tracks of a playlist, at most `limit` of them.
    async fn playlist(&self, playlist_id: &str, limit: usize) -> MusicResult<Vec<ResolvedTrack>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Downloads the audio for `external_id` into `dest_dir` and returns the
    /// file it wrote.
    async fn fetch(&self, external_id: &str, dest_dir: &Path) -> MusicResult<PathBuf>;
}

/// Completes a song's metadata so it can be played.
///
/// Songs without an id are searched by their query first. Songs with an id
/// but missing title, thumbnail or duration are looked up by id. A song the
/// catalog gives no duration for (live streams) is not playable.
pub async fn load_song(resolver: &dyn MetadataResolver, song: &mut Song) -> MusicResult<()> {
    if song.youtube_id.is_none() {
        let query = song
            .query
            .clone()
            .ok_or_else(|| MusicError::NotFound("song without query or id".to_string()))?;
        debug!("🔍 Searching catalog for '{}'", query);
        resolver.resolve(&Lookup::Query(query)).await?.apply_to(song);
    }

    if song.title.is_none() || song.thumbnail.is_none() || song.duration.is_none() {
        if let Some(id) = song.youtube_id.clone() {
            resolver.resolve(&Lookup::YouTubeId(id)).await?.apply_to(song);
        }
    }

    if let Some(url) = song.youtube_url() {
        song.url = Some(url);
    }

    if song.is_playable() {
        Ok(())
    } else {
        Err(MusicError::NotFound(
            song.query.clone().unwrap_or_else(|| song.display_title().to_string()),
        ))
    }
}

/// One piece of a request string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPart {
    Video(String),
    Playlist(String),
    Spotify(SpotifyLink),
    Query(String),
}

/// Splits a request into YouTube and Spotify links and one free-text query.
pub fn parse_request(input: &str) -> Vec<RequestPart> {
    let mut parts = Vec::new();
    let mut words = Vec::new();

    for arg in input.split_whitespace() {
        if let Some(part) = parse_youtube_link(arg) {
            parts.push(part);
        } else if let Some(link) = SpotifyLink::parse(arg) {
            parts.push(RequestPart::Spotify(link));
        } else {
            words.push(arg);
        }
    }

    if !words.is_empty() {
        parts.push(RequestPart::Query(words.join(" ")));
    }

    parts
}

fn parse_youtube_link(arg: &str) -> Option<RequestPart> {
    let url = Url::parse(arg).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("music.");

    let param = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    match host {
        "youtube.com" if url.path() == "/playlist" => param("list").map(RequestPart::Playlist),
        "youtube.com" => param("v").filter(|id| is_video_id(id)).map(RequestPart::Video),
        "youtu.be" => url
            .path_segments()?
            .next()
            .filter(|id| is_video_id(id))
            .map(|id| RequestPart::Video(id.to_string())),
        _ => None,
    }
}

pub fn is_video_id(candidate: &str) -> bool {
    VIDEO_ID.is_match(candidate)
}

/// Turns a request string into songs ready to queue.
///
/// Free text is checked against previously played queries before a catalog
/// search. Unknown queries that match nothing are dropped. Spotify links
/// need a [`SpotifyClient`].
pub async fn songs_from_request(
    input: &str,
    resolver: &dyn MetadataResolver,
    store: &dyn PersistentStore,
    spotify: Option<&SpotifyClient>,
    playlist_limit: usize,
) -> MusicResult<Vec<Song>> {
    let mut songs = Vec::new();

    for part in parse_request(input) {
        match part {
            RequestPart::Video(id) => {
                let song = match store.find_song_by_external_id(&id).await? {
                    Some(known) => known,
                    None => Song::from_youtube_id(id),
                };
                songs.push(song);
            }
            RequestPart::Playlist(id) => {
                let tracks = resolver.playlist(&id, playlist_limit).await?;
                info!("📋 Playlist {} expanded to {} songs", id, tracks.len());
                songs.extend(tracks.into_iter().map(ResolvedTrack::into_song));
            }
            RequestPart::Spotify(link) => {
                let spotify = spotify
                    .ok_or_else(|| MusicError::Resolution("Spotify is not configured".to_string()))?;
                let found = spotify.songs_from_link(&link, playlist_limit).await?;
                info!("🎧 Spotify {:?} {} expanded to {} songs", link.kind, link.id, found.len());
                songs.extend(found);
            }
            RequestPart::Query(query) => {
                if let Some(known) = store.find_song_by_query(&query).await? {
                    debug!("Query '{}' matched stored song {}", query, known.display_title());
                    songs.push(known);
                    continue;
                }

                let mut song = Song::from_query(query.clone());
                match load_song(resolver, &mut song).await {
                    Ok(()) => songs.push(song),
                    Err(MusicError::NotFound(_)) => warn!("No results for '{}'", query),
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Ok(songs)
}

/// Decodes the HTML entities the catalog leaves in titles and drops
/// brackets, which break markdown links.
pub fn clean_title(raw: &str) -> String {
    raw.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '(' | ')'))
        .collect()
}
