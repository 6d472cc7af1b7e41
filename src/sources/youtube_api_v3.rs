use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{clean_title, Lookup, MetadataResolver, ResolvedTrack};
use crate::error::{MusicError, MusicResult};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const FALLBACK_THUMBNAIL: &str = "https://i.imgur.com/MSg2a9d.png";
const PAGE_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

impl Thumbnails {
    fn best(self) -> String {
        self.high
            .or(self.medium)
            .map(|t| t.url)
            .unwrap_or_else(|| FALLBACK_THUMBNAIL.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Snippet,
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: PlaylistSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
    resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: String,
}

/// Resolver backed by the YouTube Data API v3.
pub struct YouTubeAPIv3Client {
    api_key: String,
    client: reqwest::Client,
}

impl YouTubeAPIv3Client {
    pub fn new(api_key: String) -> MusicResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MusicError::Resolution(e.to_string()))?;

        Ok(Self { api_key, client })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> MusicResult<T> {
        let response = self
            .client
            .get(format!("{}/{}", API_BASE, endpoint))
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| MusicError::Resolution(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("❌ YouTube API error on {}: {} - {}", endpoint, status, body);
            return Err(MusicError::Resolution(format!(
                "YouTube API returned {} for {}",
                status, endpoint
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MusicError::Resolution(e.to_string()))
    }

    async fn search(&self, query: &str) -> MusicResult<ResolvedTrack> {
        debug!("🔍 YouTube API v3 search: {}", query);

        let response: SearchResponse = self
            .get(
                "search",
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("maxResults", "1"),
                    ("q", query),
                ],
            )
            .await?;

        let item = response
            .items
            .into_iter()
            .find(|item| item.id.video_id.is_some())
            .ok_or_else(|| MusicError::NotFound(query.to_string()))?;
        let youtube_id = item.id.video_id.unwrap_or_default();

        Ok(ResolvedTrack {
            url: watch_url(&youtube_id),
            youtube_id,
            title: clean_title(&item.snippet.title),
            duration: None,
            thumbnail: Some(item.snippet.thumbnails.best()),
        })
    }

    async fn video(&self, id: &str) -> MusicResult<ResolvedTrack> {
        let response: VideosResponse = self
            .get("videos", &[("part", "contentDetails,snippet"), ("id", id)])
            .await?;

        let item = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::NotFound(id.to_string()))?;

        let duration = item
            .content_details
            .and_then(|details| details.duration)
            .and_then(|raw| parse_iso8601_duration(&raw));

        Ok(ResolvedTrack {
            url: watch_url(&item.id),
            youtube_id: item.id,
            title: clean_title(&item.snippet.title),
            duration,
            thumbnail: Some(item.snippet.thumbnails.best()),
        })
    }
}

#[async_trait]
impl MetadataResolver for YouTubeAPIv3Client {
    async fn resolve(&self, lookup: &Lookup) -> MusicResult<ResolvedTrack> {
        match lookup {
            Lookup::Query(query) => self.search(query).await,
            Lookup::YouTubeId(id) => self.video(id).await,
        }
    }

    async fn playlist(&self, playlist_id: &str, limit: usize) -> MusicResult<Vec<ResolvedTrack>> {
        let mut tracks = Vec::new();
        let mut page_token: Option<String> = None;
        let page_size = PAGE_SIZE.to_string();

        while tracks.len() < limit {
            let mut params = vec![
                ("part", "snippet"),
                ("maxResults", page_size.as_str()),
                ("playlistId", playlist_id),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let page: PlaylistResponse = self.get("playlistItems", &params).await?;

            for item in page.items {
                let youtube_id = item.snippet.resource_id.video_id;
                tracks.push(ResolvedTrack {
                    url: watch_url(&youtube_id),
                    youtube_id,
                    title: clean_title(&item.snippet.title),
                    // Playlist items carry no duration; filled in on first play.
                    duration: None,
                    thumbnail: Some(item.snippet.thumbnails.best()),
                });
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracks.truncate(limit);
        info!("✅ YouTube API v3: playlist {} has {} tracks", playlist_id, tracks.len());
        Ok(tracks)
    }
}

fn watch_url(id: &str) -> String {
    format!("http://youtube.com/watch?v={}", id)
}

/// Parses `PT#H#M#S` style durations into seconds.
pub fn parse_iso8601_duration(raw: &str) -> Option<u64> {
    let rest = raw.strip_prefix('P')?;
    let (days, time) = match rest.split_once('T') {
        Some((days, time)) => (days, time),
        None => (rest, ""),
    };

    let mut total = 0u64;
    let mut number = String::new();

    for (part, is_time) in [(days, false), (time, true)] {
        for ch in part.chars() {
            if ch.is_ascii_digit() {
                number.push(ch);
                continue;
            }

            let value: u64 = number.parse().ok()?;
            number.clear();
            total += match (ch, is_time) {
                ('D', false) => value * 86_400,
                ('W', false) => value * 604_800,
                ('H', true) => value * 3600,
                ('M', true) => value * 60,
                ('S', true) => value,
                _ => return None,
            };
        }
    }

    if number.is_empty() {
        Some(total)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_iso_durations() {
        assert_eq!(parse_iso8601_duration("PT3M5S"), Some(185));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("PT42S"), Some(42));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("P0D"), Some(0));
        assert_eq!(parse_iso8601_duration("3M"), None);
        assert_eq!(parse_iso8601_duration("PT3X"), None);
    }

    #[test]
    fn decodes_video_response() {
        let body = r#"{
            "items": [{
                "id": "dQw4w9WgXcQ",
                "snippet": {
                    "title": "Rick Astley - Never Gonna Give You Up (Official Music Video)",
                    "thumbnails": { "high": { "url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg" } }
                },
                "contentDetails": { "duration": "PT3M33S" }
            }]
        }"#;

        let response: VideosResponse = serde_json::from_str(body).unwrap();
        let item = &response.items[0];
        assert_eq!(item.id, "dQw4w9WgXcQ");
        assert_eq!(
            clean_title(&item.snippet.title),
            "Rick Astley - Never Gonna Give You Up Official Music Video"
        );
        assert_eq!(
            item.content_details
                .as_ref()
                .and_then(|d| d.duration.as_deref())
                .and_then(parse_iso8601_duration),
            Some(213)
        );
    }

    #[test]
    fn missing_thumbnails_fall_back() {
        assert_eq!(Thumbnails::default().best(), FALLBACK_THUMBNAIL);
    }
}
