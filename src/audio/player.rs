use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::{LoopMode, QueueView, SongQueue, DEFAULT_WINDOW},
        song::{Requester, Song},
        transport::{AudioTransport, TrackStatus, TransportHandle, VoicePresence},
    },
    cache::AudioCache,
    error::{MusicError, MusicResult},
    sources::{load_song, MetadataResolver},
    storage::PersistentStore,
    ui::{Card, StatusHandle, StatusRenderer},
};

/// Collaborators shared by every guild's player.
pub struct PlayerServices {
    pub transport: Arc<dyn AudioTransport>,
    pub cache: AudioCache,
    pub resolver: Arc<dyn MetadataResolver>,
    pub store: Arc<dyn PersistentStore>,
    pub renderer: Arc<dyn StatusRenderer>,
    pub presence: Arc<dyn VoicePresence>,
    /// Rows shown in the queue card.
    pub queue_window: usize,
}

impl PlayerServices {
    pub fn new(
        transport: Arc<dyn AudioTransport>,
        cache: AudioCache,
        resolver: Arc<dyn MetadataResolver>,
        store: Arc<dyn PersistentStore>,
        renderer: Arc<dyn StatusRenderer>,
        presence: Arc<dyn VoicePresence>,
    ) -> Self {
        Self {
            transport,
            cache,
            resolver,
            store,
            renderer,
            presence,
            queue_window: DEFAULT_WINDOW,
        }
    }

    pub fn with_queue_window(mut self, rows: usize) -> Self {
        self.queue_window = rows.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Disconnected,
    Idle,
    Playing,
    Paused,
}

/// How a call to [`MusicPlayer::play`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Another call holds the playback loop.
    AlreadyRunning,
    AlreadyPlaying,
    /// A paused track was resumed but its session was already gone.
    Resumed,
    /// Nothing left to play.
    QueueFinished,
    /// The track was paused while the loop waited on it.
    Paused,
    /// `stop()` ran while the loop was waiting.
    Stopped,
    /// Every remaining song failed to resolve.
    Skipped,
}

struct Inner {
    queue: SongQueue,
    volume: u8,
    loop_mode: LoopMode,
    transport: Option<Arc<dyn TransportHandle>>,
    /// Completion signal of the track that is playing or paused.
    session: Option<watch::Receiver<TrackStatus>>,
    current: Option<Song>,
    /// Bumped by `stop()`; a loop that sees a new epoch gives up silently.
    epoch: u64,
    text_channel: Option<ChannelId>,
    now_playing_message: Option<StatusHandle>,
    volume_message: Option<StatusHandle>,
    disconnected_since: Option<DateTime<Utc>>,
}

/// A track the loop started and is waiting on.
struct Session {
    song: Song,
    status: watch::Receiver<TrackStatus>,
    epoch: u64,
}

enum Step {
    Done(PlayOutcome),
    Wait(Session),
    /// Go around the loop again.
    Retry,
}

/// Per-guild playback engine.
///
/// Commands mutate the queue and then call [`play`](Self::play), which walks
/// the queue until it runs out, the track is paused, or the player is
/// stopped. Only one `play` loop runs at a time per guild.
pub struct MusicPlayer {
    guild_id: GuildId,
    services: Arc<PlayerServices>,
    play_guard: Mutex<()>,
    inner: Mutex<Inner>,
}

impl MusicPlayer {
    pub fn new(guild_id: GuildId, services: Arc<PlayerServices>, volume: u8) -> Self {
        Self {
            guild_id,
            services,
            play_guard: Mutex::new(()),
            inner: Mutex::new(Inner {
                queue: SongQueue::new(),
                volume: volume.min(100),
                loop_mode: LoopMode::Off,
                transport: None,
                session: None,
                current: None,
                epoch: 0,
                text_channel: None,
                now_playing_message: None,
                volume_message: None,
                disconnected_since: Some(Utc::now()),
            }),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Joins `channel_id`, reusing the live connection if there is one.
    ///
    /// A connection sitting in a channel with no listeners follows the user
    /// into `channel_id`.
    pub async fn connect(&self, channel_id: ChannelId) -> MusicResult<()> {
        let mut inner = self.inner.lock().await;

        let mut existing = inner.transport.clone();
        if let Some(transport) = &existing {
            if !transport.is_connected().await {
                existing = None;
            }
        }

        match existing {
            Some(transport) => {
                if let Some(current) = transport.channel_id().await {
                    if current != channel_id
                        && self.services.presence.listeners(self.guild_id, current) == 0
                    {
                        info!("🚚 Moving to voice channel {} in guild {}", channel_id, self.guild_id);
                        transport.move_to(channel_id).await?;
                    }
                }
            }
            None => {
                let transport = self
                    .services
                    .transport
                    .connect(self.guild_id, channel_id)
                    .await?;
                inner.transport = Some(transport);
                inner.session = None;
            }
        }

        inner.disconnected_since = None;
        Ok(())
    }

    /// Plays through the queue.
    ///
    /// Returns immediately with [`PlayOutcome::AlreadyRunning`] if another
    /// call is driving playback. Songs that fail to resolve or download are
    /// announced and skipped; transport failures abort the loop and are
    /// returned without moving the cursor.
    pub async fn play(&self) -> MusicResult<PlayOutcome> {
        let Ok(_guard) = self.play_guard.try_lock() else {
            debug!("Playback loop already running in guild {}", self.guild_id);
            return Ok(PlayOutcome::AlreadyRunning);
        };

        let mut failures = 0;
        loop {
            let session = match self.start_next(&mut failures).await? {
                Step::Done(outcome) => return Ok(outcome),
                Step::Retry => continue,
                Step::Wait(session) => session,
            };

            if let Some(outcome) = self.await_completion(session).await {
                return Ok(outcome);
            }
            failures = 0;
        }
    }

    /// Resumes a paused track, or starts the queue.
    pub async fn resume(&self) -> MusicResult<PlayOutcome> {
        self.play().await
    }

    async fn start_next(&self, failures: &mut usize) -> MusicResult<Step> {
        let mut inner = self.inner.lock().await;
        let transport = inner.transport.clone().ok_or(MusicError::NotConnected)?;

        if transport.is_playing() {
            return Ok(Step::Done(PlayOutcome::AlreadyPlaying));
        }

        if transport.is_paused() {
            transport.resume().await?;
            info!("▶️ Resumed playback in guild {}", self.guild_id);
            let card = inner
                .current
                .as_ref()
                .map(|song| Card::now_playing(song, inner.queue.up_next(), false));
            let handle = inner.now_playing_message;
            let session = match (inner.session.clone(), inner.current.clone()) {
                (Some(status), Some(song)) => Step::Wait(Session {
                    song,
                    status,
                    epoch: inner.epoch,
                }),
                _ => Step::Done(PlayOutcome::Resumed),
            };
            drop(inner);

            if let (Some(handle), Some(card)) = (handle, card) {
                self.log_render(self.services.renderer.update(&handle, &card).await);
            }
            return Ok(session);
        }

        let Some(song) = inner.queue.next_song().cloned() else {
            info!("🏁 Queue finished in guild {}", self.guild_id);
            inner.session = None;
            inner.current = None;
            let now_playing = inner.now_playing_message.take();
            drop(inner);

            self.refresh_queue_message().await;
            if let Some(handle) = now_playing {
                self.log_render(self.services.renderer.delete(&handle).await);
            }
            return Ok(Step::Done(PlayOutcome::QueueFinished));
        };

        let index = inner.queue.cursor();
        let epoch = inner.epoch;
        drop(inner);

        let prepared = self.prepare(song.clone()).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return Ok(Step::Done(PlayOutcome::Stopped));
        }

        let (song, path) = match prepared {
            Ok(prepared) => prepared,
            Err(e) if e.is_skippable() => {
                warn!("⚠️ Skipping {} in guild {}: {}", song.display_title(), self.guild_id, e);
                *failures += 1;
                if inner.queue.cursor() == index {
                    let mode = inner.loop_mode;
                    inner.queue.advance(mode);
                }
                let give_up = *failures >= inner.queue.len();
                let channel = inner.text_channel;
                drop(inner);

                if let Some(channel) = channel {
                    let text = format!("Error downloading {}: {}", song.display_title(), e);
                    self.log_render(self.services.renderer.notify(channel, &text).await);
                }
                self.refresh_queue_message().await;

                return Ok(if give_up {
                    Step::Done(PlayOutcome::Skipped)
                } else {
                    Step::Retry
                });
            }
            Err(e) => return Err(e),
        };

        if inner.queue.cursor() != index {
            debug!("Queue moved while resolving in guild {}, reselecting", self.guild_id);
            return Ok(Step::Retry);
        }
        inner.queue.replace(index, song.clone());

        let status = transport
            .play(&path, inner.volume, Duration::from_secs(song.position))
            .await
            .inspect_err(|e| error!("❌ Could not start {}: {}", song.display_title(), e))?;

        info!(
            "🎵 Playing {} in guild {} ({} plays)",
            song.display_title(),
            self.guild_id,
            song.plays
        );
        inner.session = Some(status.clone());
        inner.current = Some(song.clone());
        drop(inner);

        self.announce_now_playing().await;
        self.refresh_queue_message().await;

        Ok(Step::Wait(Session {
            song,
            status,
            epoch,
        }))
    }

    /// Fills in metadata and makes sure the audio is on disk.
    async fn prepare(&self, mut song: Song) -> MusicResult<(Song, PathBuf)> {
        if !song.is_playable() || song.thumbnail.is_none() || song.title.is_none() {
            load_song(self.services.resolver.as_ref(), &mut song).await?;
        }
        let path = self.services.cache.resolve(&song).await?;
        Ok((song, path))
    }

    /// Waits for the session to end. `None` means the track finished and
    /// the loop should continue.
    async fn await_completion(&self, session: Session) -> Option<PlayOutcome> {
        let mut status = session.status;
        let observed = status
            .wait_for(|status| *status != TrackStatus::Playing)
            .await
            .map(|status| *status)
            .unwrap_or(TrackStatus::Ended);

        if observed == TrackStatus::Paused {
            debug!("Loop released while paused in guild {}", self.guild_id);
            return Some(PlayOutcome::Paused);
        }

        let mut inner = self.inner.lock().await;
        if inner.epoch != session.epoch || inner.transport.is_none() {
            return Some(PlayOutcome::Stopped);
        }

        inner.session = None;
        inner.current = None;
        let mode = inner.loop_mode;
        inner.queue.advance(mode);
        drop(inner);

        if let Err(e) = self.services.store.increment_play_count(&session.song).await {
            warn!("Could not record play of {}: {}", session.song.display_title(), e);
        }
        self.refresh_queue_message().await;

        None
    }

    /// Pauses the current track and retitles the now-playing card.
    pub async fn pause(&self) -> MusicResult<()> {
        let inner = self.inner.lock().await;
        let Some(transport) = inner.transport.clone() else {
            return Ok(());
        };
        if !transport.is_playing() {
            return Ok(());
        }

        transport.pause().await?;
        info!("⏸️ Paused playback in guild {}", self.guild_id);

        let card = inner
            .current
            .as_ref()
            .map(|song| Card::now_playing(song, inner.queue.up_next(), true));
        let handle = inner.now_playing_message;
        drop(inner);

        if let (Some(handle), Some(card)) = (handle, card) {
            self.log_render(self.services.renderer.update(&handle, &card).await);
        }
        Ok(())
    }

    /// Skips `n` songs forward. Returns the new cursor.
    pub async fn skip(&self, n: usize) -> MusicResult<usize> {
        let mut inner = self.inner.lock().await;
        let index = inner.queue.cursor() + n;
        self.jump(&mut inner, index).await
    }

    /// Skips to the song at `index`. Returns the new cursor.
    pub async fn skip_to(&self, index: usize) -> MusicResult<usize> {
        let mut inner = self.inner.lock().await;
        let len = inner.queue.len();
        if index >= len {
            return Err(MusicError::OutOfRange { index, len });
        }
        self.jump(&mut inner, index).await
    }

    async fn jump(&self, inner: &mut Inner, index: usize) -> MusicResult<usize> {
        let transport = inner.transport.clone();

        match transport {
            // Stopping the playing track makes the loop advance once more.
            Some(transport) if transport.is_playing() => {
                inner.queue.set_cursor(index.saturating_sub(1));
                transport.stop().await?;
            }
            Some(transport) if transport.is_paused() => {
                inner.queue.set_cursor(index);
                inner.session = None;
                inner.current = None;
                transport.stop().await?;
            }
            _ => inner.queue.set_cursor(index),
        }

        debug!("⏭️ Skipped to {} in guild {}", inner.queue.cursor(), self.guild_id);
        Ok(inner.queue.cursor())
    }

    /// Clamps `volume` to 0..=100, applies it live and stores it for the
    /// guild. Returns the value applied.
    pub async fn set_volume(&self, volume: i32) -> u8 {
        let volume = volume.clamp(0, 100) as u8;

        let mut inner = self.inner.lock().await;
        inner.volume = volume;
        if let Some(transport) = &inner.transport {
            transport.set_volume(volume);
        }
        drop(inner);

        info!("🔊 Volume set to {}% in guild {}", volume, self.guild_id);
        if let Err(e) = self.services.store.set_volume(self.guild_id, volume).await {
            warn!("Could not store volume for guild {}: {}", self.guild_id, e);
        }

        volume
    }

    /// Applies `volume` and edits the volume card in place, crediting
    /// `changed_by`. Returns the value applied.
    pub async fn adjust_volume(&self, volume: i32, changed_by: &str) -> MusicResult<u8> {
        let applied = self.set_volume(volume).await;
        if !self.update_volume_message(Some(changed_by)).await? {
            debug!("No volume card to update in guild {}", self.guild_id);
        }
        Ok(applied)
    }

    /// Clears the queue, leaves the voice channel and deletes all status
    /// messages.
    pub async fn stop(&self) -> MusicResult<()> {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        inner.queue.clear();
        inner.session = None;
        inner.current = None;
        inner.disconnected_since = Some(Utc::now());
        let transport = inner.transport.take();
        let messages = [
            inner.now_playing_message.take(),
            inner.volume_message.take(),
            inner.queue.set_message(None),
        ];
        drop(inner);

        if let Some(transport) = transport {
            transport.disconnect().await?;
        }

        for handle in messages.into_iter().flatten() {
            self.log_render(self.services.renderer.delete(&handle).await);
        }

        info!("⏹️ Stopped player in guild {}", self.guild_id);
        Ok(())
    }

    /// Adds songs to the queue. Returns the new queue length.
    ///
    /// Counts as activity: a disconnected player's idle time restarts.
    pub async fn enqueue(&self, songs: Vec<Song>, requester: &Requester, insert_next: bool) -> usize {
        let mut inner = self.inner.lock().await;
        if inner.transport.is_none() {
            inner.disconnected_since = Some(Utc::now());
        }
        inner.queue.append(songs, requester, insert_next);
        let len = inner.queue.len();
        drop(inner);

        self.refresh_queue_message().await;
        len
    }

    pub async fn clear_queue(&self) {
        self.inner.lock().await.queue.clear();
        self.refresh_queue_message().await;
    }

    pub async fn shuffle(&self) {
        self.inner.lock().await.queue.shuffle();
        self.refresh_queue_message().await;
    }

    /// Removes the song at `index`. Removing a song before the cursor keeps
    /// the cursor on the same song.
    pub async fn remove(&self, index: usize) -> MusicResult<Song> {
        let mut inner = self.inner.lock().await;
        let cursor = inner.queue.cursor();
        let song = inner.queue.remove_at(index)?;
        if index < cursor {
            inner.queue.set_cursor(cursor - 1);
        }
        drop(inner);

        self.refresh_queue_message().await;
        Ok(song)
    }

    /// Toggles whole-queue repeat. Returns whether it is now on.
    pub async fn toggle_repeat_queue(&self) -> bool {
        self.toggle_loop(LoopMode::Queue).await
    }

    /// Toggles single-song repeat. Returns whether it is now on.
    pub async fn toggle_repeat_one(&self) -> bool {
        self.toggle_loop(LoopMode::Track).await
    }

    async fn toggle_loop(&self, mode: LoopMode) -> bool {
        let mut inner = self.inner.lock().await;
        inner.loop_mode = if inner.loop_mode == mode {
            LoopMode::Off
        } else {
            mode
        };
        info!("🔁 Loop mode {:?} in guild {}", inner.loop_mode, self.guild_id);
        inner.loop_mode == mode
    }

    pub async fn loop_mode(&self) -> LoopMode {
        self.inner.lock().await.loop_mode
    }

    pub async fn volume(&self) -> u8 {
        self.inner.lock().await.volume
    }

    pub async fn cursor(&self) -> usize {
        self.inner.lock().await.queue.cursor()
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn queue_view(&self) -> QueueView {
        self.inner
            .lock()
            .await
            .queue
            .windowed_view(self.services.queue_window)
    }

    pub async fn now_playing(&self) -> Option<Song> {
        self.inner.lock().await.current.clone()
    }

    pub async fn state(&self) -> PlayerState {
        match &self.inner.lock().await.transport {
            None => PlayerState::Disconnected,
            Some(transport) if transport.is_paused() => PlayerState::Paused,
            Some(transport) if transport.is_playing() => PlayerState::Playing,
            Some(_) => PlayerState::Idle,
        }
    }

    pub async fn voice_channel(&self) -> Option<ChannelId> {
        let transport = self.inner.lock().await.transport.clone()?;
        transport.channel_id().await
    }

    pub async fn is_connected(&self) -> bool {
        let transport = self.inner.lock().await.transport.clone();
        match transport {
            Some(transport) => transport.is_connected().await,
            None => false,
        }
    }

    /// Channel that receives status cards and notices.
    pub async fn set_text_channel(&self, channel_id: ChannelId) {
        self.inner.lock().await.text_channel = Some(channel_id);
    }

    pub async fn text_channel(&self) -> Option<ChannelId> {
        self.inner.lock().await.text_channel
    }

    /// True when the player has been disconnected for at least `after` and
    /// no loop is running.
    pub async fn is_evictable(&self, after: Duration) -> bool {
        if self.play_guard.try_lock().is_err() {
            return false;
        }
        let Ok(inner) = self.inner.try_lock() else {
            return false;
        };
        if inner.transport.is_some() {
            return false;
        }
        inner.disconnected_since.is_some_and(|since| {
            (Utc::now() - since)
                .to_std()
                .is_ok_and(|idle| idle >= after)
        })
    }

    /// Sends a fresh queue card to `channel_id`, replacing the previous one.
    pub async fn send_queue_message(&self, channel_id: ChannelId) -> MusicResult<()> {
        let (card, old) = {
            let mut inner = self.inner.lock().await;
            let card = Card::queue(&inner.queue.windowed_view(self.services.queue_window));
            (card, inner.queue.set_message(None))
        };

        if let Some(old) = old {
            self.log_render(self.services.renderer.delete(&old).await);
        }
        let handle = self.services.renderer.send(channel_id, &card).await?;
        self.inner.lock().await.queue.set_message(Some(handle));
        Ok(())
    }

    /// Sends a fresh now-playing card to `channel_id`. Returns false if
    /// nothing is playing.
    pub async fn send_now_playing(&self, channel_id: ChannelId) -> MusicResult<bool> {
        let (card, old) = {
            let mut inner = self.inner.lock().await;
            let paused = inner
                .transport
                .as_ref()
                .is_some_and(|transport| transport.is_paused());
            let Some(card) = inner
                .current
                .as_ref()
                .map(|song| Card::now_playing(song, inner.queue.up_next(), paused))
            else {
                return Ok(false);
            };
            (card, inner.now_playing_message.take())
        };

        if let Some(old) = old {
            self.log_render(self.services.renderer.delete(&old).await);
        }
        let handle = self.services.renderer.send(channel_id, &card).await?;
        self.inner.lock().await.now_playing_message = Some(handle);
        Ok(true)
    }

    /// Sends a fresh volume card to `channel_id`, replacing the previous one.
    pub async fn send_volume_message(
        &self,
        channel_id: ChannelId,
        changed_by: Option<&str>,
    ) -> MusicResult<()> {
        let (card, old) = {
            let mut inner = self.inner.lock().await;
            (Card::volume(inner.volume, changed_by), inner.volume_message.take())
        };

        if let Some(old) = old {
            self.log_render(self.services.renderer.delete(&old).await);
        }
        let handle = self.services.renderer.send(channel_id, &card).await?;
        self.inner.lock().await.volume_message = Some(handle);
        Ok(())
    }

    /// Edits the existing volume card in place. Returns false if there is
    /// none.
    pub async fn update_volume_message(&self, changed_by: Option<&str>) -> MusicResult<bool> {
        let (handle, card) = {
            let inner = self.inner.lock().await;
            (inner.volume_message, Card::volume(inner.volume, changed_by))
        };

        match handle {
            Some(handle) => {
                self.services.renderer.update(&handle, &card).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn announce_now_playing(&self) {
        if let Some(channel) = self.text_channel().await {
            if let Err(e) = self.send_now_playing(channel).await {
                warn!("Could not send now playing card in guild {}: {}", self.guild_id, e);
            }
        }
    }

    async fn refresh_queue_message(&self) {
        let (handle, card) = {
            let inner = self.inner.lock().await;
            let Some(handle) = inner.queue.message().copied() else {
                return;
            };
            (
                handle,
                Card::queue(&inner.queue.windowed_view(self.services.queue_window)),
            )
        };
        self.log_render(self.services.renderer.update(&handle, &card).await);
    }

    fn log_render(&self, result: MusicResult<()>) {
        if let Err(e) = result {
            warn!("Status card error in guild {}: {}", self.guild_id, e);
        }
    }
}
