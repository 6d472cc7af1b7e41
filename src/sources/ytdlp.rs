use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{clean_title, Downloader, Lookup, MetadataResolver, ResolvedTrack};
use crate::error::{MusicError, MusicResult};

/// Fields of `yt-dlp --dump-json` the bot cares about.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
}

/// Local `yt-dlp` binary, used for downloads and as a resolver when no API
/// key is configured.
#[derive(Debug, Clone)]
pub struct YtDlpClient {
    binary: PathBuf,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Checks that `yt-dlp` and `ffmpeg` can be executed.
    pub async fn verify_dependencies(&self) -> MusicResult<()> {
        let version = run_version(Command::new(&self.binary).arg("--version"))
            .await
            .ok_or_else(|| {
                error!("❌ yt-dlp not found at {}", self.binary.display());
                MusicError::Resolution("yt-dlp is not available".to_string())
            })?;
        info!("✅ yt-dlp version: {}", version);

        run_version(Command::new("ffmpeg").arg("-version"))
            .await
            .ok_or_else(|| {
                error!("❌ ffmpeg not found");
                MusicError::Resolution("ffmpeg is not available".to_string())
            })?;
        info!("✅ ffmpeg available");

        Ok(())
    }

    async fn dump_json(&self, target: &str) -> MusicResult<Vec<VideoInfo>> {
        let output = Command::new(&self.binary)
            .args(["--dump-json", "--no-playlist", "--no-warnings", "--socket-timeout", "30"])
            .arg(target)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MusicError::Resolution(format!(
                "yt-dlp failed for {}: {}",
                target,
                stderr.trim()
            )));
        }

        parse_dump(&String::from_utf8_lossy(&output.stdout))
    }
}

/// `--dump-json` prints one object per line.
fn parse_dump(stdout: &str) -> MusicResult<Vec<VideoInfo>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| MusicError::Resolution(e.to_string())))
        .collect()
}

impl From<VideoInfo> for ResolvedTrack {
    fn from(info: VideoInfo) -> Self {
        Self {
            url: format!("http://youtube.com/watch?v={}", info.id),
            title: clean_title(&info.title),
            duration: Some(info.duration.map(|secs| secs.round() as u64).unwrap_or(0)),
            thumbnail: info.thumbnail,
            youtube_id: info.id,
        }
    }
}

#[async_trait]
impl MetadataResolver for YtDlpClient {
    async fn resolve(&self, lookup: &Lookup) -> MusicResult<ResolvedTrack> {
        let (target, label) = match lookup {
            Lookup::Query(query) => (format!("ytsearch1:{}", query), query.as_str()),
            Lookup::YouTubeId(id) => (format!("https://www.youtube.com/watch?v={}", id), id.as_str()),
        };

        debug!("🔍 yt-dlp lookup: {}", target);
        self.dump_json(&target)
            .await?
            .into_iter()
            .next()
            .map(ResolvedTrack::from)
            .ok_or_else(|| MusicError::NotFound(label.to_string()))
    }

    async fn playlist(&self, playlist_id: &str, limit: usize) -> MusicResult<Vec<ResolvedTrack>> {
        let output = Command::new(&self.binary)
            .args(["--flat-playlist", "--dump-json", "--no-warnings"])
            .args(["--playlist-end", &limit.to_string()])
            .arg(format!("https://www.youtube.com/playlist?list={}", playlist_id))
            .output()
            .await?;

        if !output.status.success() {
            return Err(MusicError::Resolution(format!(
                "yt-dlp could not read playlist {}",
                playlist_id
            )));
        }

        let tracks: Vec<ResolvedTrack> = parse_dump(&String::from_utf8_lossy(&output.stdout))?
            .into_iter()
            .take(limit)
            .map(ResolvedTrack::from)
            .collect();

        info!("✅ yt-dlp: playlist {} has {} tracks", playlist_id, tracks.len());
        Ok(tracks)
    }
}

#[async_trait]
impl Downloader for YtDlpClient {
    async fn fetch(&self, external_id: &str, dest_dir: &Path) -> MusicResult<PathBuf> {
        let template = dest_dir.join("%(id)s.%(ext)s");

        let output = Command::new(&self.binary)
            .args([
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--no-playlist",
                "--no-warnings",
                "--no-check-certificates",
                "--output",
            ])
            .arg(&template)
            .arg(format!("https://www.youtube.com/watch?v={}", external_id))
            .output()
            .await
            .map_err(|e| MusicError::Download {
                id: external_id.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MusicError::Download {
                id: external_id.to_string(),
                reason: stderr.trim().to_string(),
            });
        }

        let path = dest_dir.join(format!("{}.mp3", external_id));
        debug!("yt-dlp wrote {}", path.display());
        Ok(path)
    }
}

async fn run_version(command: &mut Command) -> Option<String> {
    match command.output().await {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout);
            Some(text.lines().next().unwrap_or_default().trim().to_string())
        }
        _ => None,
    }
}
