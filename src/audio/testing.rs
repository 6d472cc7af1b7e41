//! In-memory stand-ins for the voice, presence and rendering seams.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tempfile::TempDir;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use super::{
    player::{MusicPlayer, PlayOutcome, PlayerServices},
    song::Requester,
    transport::{AudioTransport, TrackStatus, TransportHandle, VoicePresence},
};
use crate::{
    cache::AudioCache,
    error::{MusicError, MusicResult},
    sources::{MockDownloader, MockMetadataResolver},
    storage::MockPersistentStore,
    ui::{Card, StatusHandle, StatusRenderer},
};

pub const GUILD: GuildId = GuildId::new(1);

pub fn user() -> Requester {
    Requester::new(UserId::new(99), "plom")
}

pub struct FakeTransport {
    handle: Arc<FakeHandle>,
    connects: AtomicUsize,
}

impl FakeTransport {
    pub fn new(handle: Arc<FakeHandle>) -> Self {
        Self {
            handle,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioTransport for FakeTransport {
    async fn connect(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn TransportHandle>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.handle.channel.lock() = Some(channel_id);
        self.handle.connected.store(true, Ordering::SeqCst);
        Ok(self.handle.clone())
    }
}

/// Records every track it is asked to play. Tracks only end when a test
/// calls [`FakeHandle::finish`] or the player stops them.
pub struct FakeHandle {
    channel: Mutex<Option<ChannelId>>,
    connected: AtomicBool,
    current: Mutex<Option<watch::Sender<TrackStatus>>>,
    started_tx: mpsc::UnboundedSender<PathBuf>,
    started_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PathBuf>>,
    starts: AtomicUsize,
    disconnects: AtomicUsize,
    fail_next_play: AtomicBool,
    volume: AtomicU8,
}

impl FakeHandle {
    pub fn new() -> Self {
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        Self {
            channel: Mutex::new(None),
            connected: AtomicBool::new(false),
            current: Mutex::new(None),
            started_tx,
            started_rx: tokio::sync::Mutex::new(started_rx),
            starts: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            fail_next_play: AtomicBool::new(false),
            volume: AtomicU8::new(0),
        }
    }

    /// Path of the next track started.
    pub async fn next_started(&self) -> PathBuf {
        self.started_rx
            .lock()
            .await
            .recv()
            .await
            .expect("fake handle dropped")
    }

    /// Ends the current track as if it played to the end.
    pub fn finish(&self) {
        if let Some(status) = self.current.lock().as_ref() {
            status.send_replace(TrackStatus::Ended);
        }
    }

    pub async fn wait_until_playing(&self) {
        while !self.is_playing() {
            tokio::task::yield_now().await;
        }
    }

    pub fn fail_next_play(&self) {
        self.fail_next_play.store(true, Ordering::SeqCst);
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::SeqCst)
    }

    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn status(&self) -> Option<TrackStatus> {
        self.current.lock().as_ref().map(|status| *status.borrow())
    }

    fn transition(&self, from: TrackStatus, to: TrackStatus) {
        if let Some(status) = self.current.lock().as_ref() {
            status.send_if_modified(|current| {
                let changed = *current == from;
                if changed {
                    *current = to;
                }
                changed
            });
        }
    }
}

#[async_trait]
impl TransportHandle for FakeHandle {
    async fn channel_id(&self) -> Option<ChannelId> {
        *self.channel.lock()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()> {
        *self.channel.lock() = Some(channel_id);
        Ok(())
    }

    async fn play(
        &self,
        path: &Path,
        volume: u8,
        _start: Duration,
    ) -> MusicResult<watch::Receiver<TrackStatus>> {
        if self.fail_next_play.swap(false, Ordering::SeqCst) {
            return Err(MusicError::Transport("output failed to start".into()));
        }

        let (sender, receiver) = watch::channel(TrackStatus::Playing);
        if let Some(previous) = self.current.lock().replace(sender) {
            previous.send_replace(TrackStatus::Ended);
        }
        self.volume.store(volume, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
        let _ = self.started_tx.send(path.to_path_buf());
        Ok(receiver)
    }

    async fn pause(&self) -> MusicResult<()> {
        self.transition(TrackStatus::Playing, TrackStatus::Paused);
        Ok(())
    }

    async fn resume(&self) -> MusicResult<()> {
        self.transition(TrackStatus::Paused, TrackStatus::Playing);
        Ok(())
    }

    async fn stop(&self) -> MusicResult<()> {
        if let Some(status) = self.current.lock().take() {
            status.send_replace(TrackStatus::Ended);
        }
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.status() == Some(TrackStatus::Playing)
    }

    fn is_paused(&self) -> bool {
        self.status() == Some(TrackStatus::Paused)
    }

    fn set_volume(&self, volume: u8) {
        self.volume.store(volume, Ordering::SeqCst);
    }

    async fn disconnect(&self) -> MusicResult<()> {
        self.stop().await?;
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    next_id: AtomicU64,
    sent: Mutex<Vec<Card>>,
    updated: Mutex<Vec<Card>>,
    deleted: Mutex<Vec<StatusHandle>>,
    notices: Mutex<Vec<String>>,
}

impl FakeRenderer {
    pub fn sent(&self) -> Vec<Card> {
        self.sent.lock().clone()
    }

    pub fn last_update(&self) -> Option<Card> {
        self.updated.lock().last().cloned()
    }

    pub fn deleted(&self) -> usize {
        self.deleted.lock().len()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().clone()
    }
}

#[async_trait]
impl StatusRenderer for FakeRenderer {
    async fn send(&self, channel_id: ChannelId, card: &Card) -> MusicResult<StatusHandle> {
        self.sent.lock().push(card.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StatusHandle {
            channel_id,
            message_id: MessageId::new(id),
        })
    }

    async fn update(&self, _handle: &StatusHandle, card: &Card) -> MusicResult<()> {
        self.updated.lock().push(card.clone());
        Ok(())
    }

    async fn delete(&self, handle: &StatusHandle) -> MusicResult<()> {
        self.deleted.lock().push(*handle);
        Ok(())
    }

    async fn notify(&self, _channel_id: ChannelId, text: &str) -> MusicResult<()> {
        self.notices.lock().push(text.to_string());
        Ok(())
    }
}

/// Listener counts per channel; unknown channels are empty.
#[derive(Default)]
pub struct FakePresence {
    listeners: DashMap<ChannelId, usize>,
}

impl FakePresence {
    pub fn set_listeners(&self, channel_id: ChannelId, count: usize) {
        self.listeners.insert(channel_id, count);
    }
}

impl VoicePresence for FakePresence {
    fn listeners(&self, _guild_id: GuildId, channel_id: ChannelId) -> usize {
        self.listeners.get(&channel_id).map(|count| *count).unwrap_or(0)
    }

    fn user_channel(&self, _guild_id: GuildId, _user_id: UserId) -> Option<ChannelId> {
        None
    }
}

pub struct Harness {
    pub player: Arc<MusicPlayer>,
    pub services: Arc<PlayerServices>,
    pub handle: Arc<FakeHandle>,
    pub transport: Arc<FakeTransport>,
    pub renderer: Arc<FakeRenderer>,
    pub presence: Arc<FakePresence>,
    cache_dir: TempDir,
}

impl Harness {
    pub const VOICE: ChannelId = ChannelId::new(10);

    pub async fn connect(&self) {
        self.player.connect(Self::VOICE).await.unwrap();
    }

    pub fn spawn_play(&self) -> JoinHandle<MusicResult<PlayOutcome>> {
        let player = self.player.clone();
        tokio::spawn(async move { player.play().await })
    }

    pub fn path(&self, id: &str) -> PathBuf {
        self.cache_dir.path().join(format!("{}.mp3", id))
    }
}

/// Store that accepts any write.
pub fn permissive_store() -> MockPersistentStore {
    let mut store = MockPersistentStore::new();
    store.expect_increment_play_count().returning(|_| Ok(()));
    store.expect_set_volume().returning(|_, _| Ok(()));
    store.expect_volume().returning(|_| Ok(None));
    store
}

pub fn harness(cached: &[&str]) -> Harness {
    harness_with_store(permissive_store(), cached)
}

/// Player wired to fakes. Songs whose id is in `cached` have audio on disk;
/// every other download fails.
pub fn harness_with_store(store: MockPersistentStore, cached: &[&str]) -> Harness {
    let cache_dir = tempfile::tempdir().unwrap();
    for id in cached {
        std::fs::write(cache_dir.path().join(format!("{}.mp3", id)), b"audio").unwrap();
    }

    let mut downloader = MockDownloader::new();
    downloader.expect_fetch().returning(|id, _| {
        Err(MusicError::Download {
            id: id.to_string(),
            reason: "video unavailable".into(),
        })
    });

    let handle = Arc::new(FakeHandle::new());
    let transport = Arc::new(FakeTransport::new(handle.clone()));
    let renderer = Arc::new(FakeRenderer::default());
    let presence = Arc::new(FakePresence::default());

    let services = Arc::new(PlayerServices::new(
        transport.clone(),
        AudioCache::new(cache_dir.path().to_path_buf(), Arc::new(downloader)),
        Arc::new(MockMetadataResolver::new()),
        Arc::new(store),
        renderer.clone(),
        presence.clone(),
    ));

    Harness {
        player: Arc::new(MusicPlayer::new(GUILD, services.clone(), 20)),
        services,
        handle,
        transport,
        renderer,
        presence,
        cache_dir,
    }
}
