//! Spotify Web API catalog.
//!
//! Spotify has no audio plombot can play. Its albums, playlists, artists
//! and tracks are turned into songs carrying an `"Artist - Title"` query,
//! which the YouTube resolver searches for when the song comes up.
//!
//! ## Configuration
//!
//! ```env
//! SPOTIFY_CLIENT_ID=...
//! SPOTIFY_CLIENT_SECRET=...
//! ```

use serde::{de::DeserializeOwned, Deserialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use url::Url;

use super::clean_title;
use crate::{
    audio::song::Song,
    error::{MusicError, MusicResult},
};

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const OPEN_URL: &str = "https://open.spotify.com";
const PAGE_SIZE: usize = 50;
/// The top-tracks endpoint needs a market to rank in.
const TOP_TRACKS_MARKET: &str = "US";
pub const ARTIST_TOP_TRACKS: usize = 10;
/// Tokens are renewed this long before Spotify expires them.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotifyKind {
    Album,
    Artist,
    Playlist,
    Track,
}

/// A parsed `open.spotify.com` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyLink {
    pub kind: SpotifyKind,
    pub id: String,
}

impl SpotifyLink {
    /// Accepts `https://open.spotify.com/<kind>/<id>`, with or without a
    /// locale segment such as `intl-de`.
    pub fn parse(arg: &str) -> Option<Self> {
        let url = Url::parse(arg).ok()?;
        if url.host_str()? != "open.spotify.com" {
            return None;
        }

        let mut segments = url
            .path_segments()?
            .filter(|segment| !segment.is_empty() && !segment.starts_with("intl-"));
        let kind = match segments.next()? {
            "album" => SpotifyKind::Album,
            "artist" => SpotifyKind::Artist,
            "playlist" => SpotifyKind::Playlist,
            "track" => SpotifyKind::Track,
            _ => return None,
        };
        let id = segments.next()?.to_string();

        Some(Self { kind, id })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub id: String,
    pub name: String,
}

impl SpotifyArtist {
    pub fn url(&self) -> String {
        format!("{}/artist/{}", OPEN_URL, self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyAlbum {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
}

impl SpotifyAlbum {
    pub fn url(&self) -> String {
        format!("{}/album/{}", OPEN_URL, self.id)
    }
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    /// Missing for local files in playlists.
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    #[serde(default)]
    duration_ms: u64,
}

impl SpotifyTrack {
    fn into_song(self) -> Option<Song> {
        let id = self.id?;
        let title = match self.artists.first() {
            Some(artist) => format!("{} - {}", artist.name, self.name),
            None => self.name,
        };
        let title = clean_title(&title);

        Some(Song {
            query: Some(title.clone()),
            title: Some(title),
            duration: Some(self.duration_ms / 1000),
            url: Some(format!("{}/track/{}", OPEN_URL, id)),
            spotify_id: Some(id),
            ..Song::default()
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct AlbumSearch {
    albums: Page<SpotifyAlbum>,
}

#[derive(Debug, Deserialize)]
struct ArtistSearch {
    artists: Page<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct TopTracks {
    tracks: Vec<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Spotify catalog client using the client-credentials flow.
pub struct SpotifyClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> MusicResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MusicError::Resolution(e.to_string()))?;

        Ok(Self {
            client,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> MusicResult<String> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if current.expires_at > Instant::now() {
                return Ok(current.value.clone());
            }
        }

        debug!("🔑 Requesting Spotify access token");
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| MusicError::Resolution(e.to_string()))?;

        if !response.status().is_success() {
            error!("❌ Spotify token request failed: {}", response.status());
            return Err(MusicError::Resolution(format!(
                "Spotify rejected the client credentials ({})",
                response.status()
            )));
        }

        let fresh: TokenResponse = response
            .json()
            .await
            .map_err(|e| MusicError::Resolution(e.to_string()))?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(TOKEN_MARGIN);

        *token = Some(AccessToken {
            value: fresh.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(fresh.access_token)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> MusicResult<T> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/{}", API_BASE, endpoint))
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .map_err(|e| MusicError::Resolution(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MusicError::NotFound(endpoint.to_string()));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.token.lock().await.take();
        }
        if !status.is_success() {
            error!("❌ Spotify API error on {}: {}", endpoint, status);
            return Err(MusicError::Resolution(format!(
                "Spotify returned {} for {}",
                status, endpoint
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MusicError::Resolution(e.to_string()))
    }

    /// Pages through `endpoint` until `limit` songs are collected.
    async fn collect_pages<T, F>(&self, endpoint: &str, limit: usize, to_song: F) -> MusicResult<Vec<Song>>
    where
        T: DeserializeOwned,
        F: Fn(T) -> Option<Song>,
    {
        let mut songs = Vec::new();
        let mut offset = 0;
        let page_size = PAGE_SIZE.to_string();

        while songs.len() < limit {
            let offset_param = offset.to_string();
            let page: Page<T> = self
                .get(endpoint, &[("limit", page_size.as_str()), ("offset", offset_param.as_str())])
                .await?;

            let fetched = page.items.len();
            songs.extend(page.items.into_iter().filter_map(&to_song));
            if fetched == 0 || page.next.is_none() {
                break;
            }
            offset += fetched;
        }

        songs.truncate(limit);
        Ok(songs)
    }

    /// Best album match for `query`.
    pub async fn search_album(&self, query: &str) -> MusicResult<SpotifyAlbum> {
        debug!("🔍 Spotify album search: {}", query);
        let found: AlbumSearch = self
            .get("search", &[("q", query), ("type", "album"), ("limit", "1")])
            .await?;
        found
            .albums
            .items
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::NotFound(query.to_string()))
    }

    /// Best artist match for `query`.
    pub async fn search_artist(&self, query: &str) -> MusicResult<SpotifyArtist> {
        debug!("🔍 Spotify artist search: {}", query);
        let found: ArtistSearch = self
            .get("search", &[("q", query), ("type", "artist"), ("limit", "1")])
            .await?;
        found
            .artists
            .items
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::NotFound(query.to_string()))
    }

    pub async fn album_songs(&self, album_id: &str, limit: usize) -> MusicResult<Vec<Song>> {
        let songs = self
            .collect_pages(&format!("albums/{}/tracks", album_id), limit, SpotifyTrack::into_song)
            .await?;
        info!("💿 Spotify album {} has {} tracks", album_id, songs.len());
        Ok(songs)
    }

    pub async fn playlist_songs(&self, playlist_id: &str, limit: usize) -> MusicResult<Vec<Song>> {
        let songs = self
            .collect_pages(
                &format!("playlists/{}/tracks", playlist_id),
                limit,
                |entry: PlaylistEntry| entry.track.and_then(SpotifyTrack::into_song),
            )
            .await?;
        info!("📋 Spotify playlist {} has {} tracks", playlist_id, songs.len());
        Ok(songs)
    }

    /// The artist's most popular tracks, at most [`ARTIST_TOP_TRACKS`].
    pub async fn artist_top_songs(&self, artist_id: &str) -> MusicResult<Vec<Song>> {
        let top: TopTracks = self
            .get(
                &format!("artists/{}/top-tracks", artist_id),
                &[("market", TOP_TRACKS_MARKET)],
            )
            .await?;

        Ok(top
            .tracks
            .into_iter()
            .filter_map(SpotifyTrack::into_song)
            .take(ARTIST_TOP_TRACKS)
            .collect())
    }

    pub async fn track_song(&self, track_id: &str) -> MusicResult<Song> {
        let track: SpotifyTrack = self.get(&format!("tracks/{}", track_id), &[]).await?;
        track
            .into_song()
            .ok_or_else(|| MusicError::NotFound(track_id.to_string()))
    }

    /// Expands a link into songs, at most `limit` of them.
    pub async fn songs_from_link(&self, link: &SpotifyLink, limit: usize) -> MusicResult<Vec<Song>> {
        match link.kind {
            SpotifyKind::Album => self.album_songs(&link.id, limit).await,
            SpotifyKind::Playlist => self.playlist_songs(&link.id, limit).await,
            SpotifyKind::Artist => self.artist_top_songs(&link.id).await,
            SpotifyKind::Track => Ok(vec![self.track_song(&link.id).await?]),
        }
    }
}
