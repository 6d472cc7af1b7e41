use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::File,
    tracks::{Track, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{fmt, future::Future, path::Path, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::transport::{AudioTransport, TrackStatus, TransportHandle};
use crate::error::{MusicError, MusicResult};

/// [`AudioTransport`] over songbird's voice driver.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl AudioTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn TransportHandle>> {
        let call = match self.manager.get(guild_id) {
            Some(call) => {
                let current = call.lock().await.current_channel();
                if current.map(|c| c.0.get()) != Some(channel_id.get()) {
                    self.manager
                        .join(guild_id, channel_id)
                        .await
                        .map_err(|e| MusicError::Transport(e.to_string()))?
                } else {
                    call
                }
            }
            None => self
                .manager
                .join(guild_id, channel_id)
                .await
                .map_err(|e| MusicError::Transport(e.to_string()))?,
        };

        info!("🔊 Connected to voice channel {} in guild {}", channel_id, guild_id);

        Ok(Arc::new(SongbirdHandle {
            guild_id,
            manager: self.manager.clone(),
            call,
            active: Mutex::new(None),
        }))
    }
}

struct ActiveTrack {
    handle: TrackHandle,
    status: Arc<watch::Sender<TrackStatus>>,
}

pub struct SongbirdHandle {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    active: Mutex<Option<ActiveTrack>>,
}

impl SongbirdHandle {
    fn current_status(&self) -> Option<TrackStatus> {
        self.active
            .lock()
            .as_ref()
            .map(|track| *track.status.borrow())
    }

    fn with_track<F>(&self, f: F) -> MusicResult<()>
    where
        F: FnOnce(&ActiveTrack) -> MusicResult<()>,
    {
        match self.active.lock().as_ref() {
            Some(track) => f(track),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TransportHandle for SongbirdHandle {
    async fn channel_id(&self) -> Option<ChannelId> {
        self.call
            .lock()
            .await
            .current_channel()
            .map(|channel| ChannelId::new(channel.0.get()))
    }

    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }

    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()> {
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(|e| MusicError::Transport(e.to_string()))?;
        debug!("Moved to voice channel {} in guild {}", channel_id, self.guild_id);
        Ok(())
    }

    async fn play(
        &self,
        path: &Path,
        volume: u8,
        start: Duration,
    ) -> MusicResult<watch::Receiver<TrackStatus>> {
        self.stop().await?;

        let (sender, receiver) = watch::channel(TrackStatus::Playing);
        let sender = Arc::new(sender);

        let track = Track::new(File::new(path.to_path_buf()).into()).volume(volume_ratio(volume));
        let handle = self.call.lock().await.play(track);

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackEndNotifier {
                        status: sender.clone(),
                    },
                )
                .map_err(|e| MusicError::Transport(e.to_string()))?;
        }

        if !start.is_zero() {
            // Seeking waits on the decoder; the track starts meanwhile.
            let seek = handle.clone();
            tokio::spawn(async move {
                finish_seek(start, seek.seek_async(start)).await;
            });
        }

        *self.active.lock() = Some(ActiveTrack {
            handle,
            status: sender,
        });

        Ok(receiver)
    }

    async fn pause(&self) -> MusicResult<()> {
        self.with_track(|track| {
            track
                .handle
                .pause()
                .map_err(|e| MusicError::Transport(e.to_string()))?;
            track.status.send_if_modified(|status| {
                let changed = *status == TrackStatus::Playing;
                if changed {
                    *status = TrackStatus::Paused;
                }
                changed
            });
            Ok(())
        })
    }

    async fn resume(&self) -> MusicResult<()> {
        self.with_track(|track| {
            track
                .handle
                .play()
                .map_err(|e| MusicError::Transport(e.to_string()))?;
            track.status.send_if_modified(|status| {
                let changed = *status == TrackStatus::Paused;
                if changed {
                    *status = TrackStatus::Playing;
                }
                changed
            });
            Ok(())
        })
    }

    async fn stop(&self) -> MusicResult<()> {
        let finished = self.active.lock().take();
        if let Some(track) = finished {
            // Already finished tracks refuse commands.
            let _ = track.handle.stop();
            track.status.send_replace(TrackStatus::Ended);
        }
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.current_status() == Some(TrackStatus::Playing)
    }

    fn is_paused(&self) -> bool {
        self.current_status() == Some(TrackStatus::Paused)
    }

    fn set_volume(&self, volume: u8) {
        if let Some(track) = self.active.lock().as_ref() {
            if let Err(e) = track.handle.set_volume(volume_ratio(volume)) {
                debug!("Volume change ignored: {}", e);
            }
        }
    }

    async fn disconnect(&self) -> MusicResult<()> {
        self.stop().await?;
        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("Voice disconnect in guild {} failed: {:?}", self.guild_id, e);
        }
        info!("👋 Disconnected from voice in guild {}", self.guild_id);
        Ok(())
    }
}

/// Awaits a resume seek. A failed seek is logged and the track keeps
/// playing from the start.
async fn finish_seek<T, E: fmt::Debug>(
    start: Duration,
    seek: impl Future<Output = Result<T, E>>,
) -> bool {
    match seek.await {
        Ok(_) => true,
        Err(e) => {
            warn!("⚠️ Could not resume from {:?}: {:?}", start, e);
            false
        }
    }
}

fn volume_ratio(volume: u8) -> f32 {
    f32::from(volume.min(100)) / 100.0
}

/// Marks a track's status as ended when songbird finishes or drops it.
struct TrackEndNotifier {
    status: Arc<watch::Sender<TrackStatus>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.status.send_replace(TrackStatus::Ended);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_is_a_ratio() {
        assert_eq!(volume_ratio(0), 0.0);
        assert_eq!(volume_ratio(50), 0.5);
        assert_eq!(volume_ratio(100), 1.0);
        assert_eq!(volume_ratio(200), 1.0);
    }

    #[tokio::test]
    async fn failed_seek_is_reported() {
        let start = Duration::from_secs(42);
        assert!(finish_seek(start, async { Ok::<_, &str>(start) }).await);
        assert!(!finish_seek(start, async { Err::<Duration, _>("decoder gone") }).await);
    }
}
