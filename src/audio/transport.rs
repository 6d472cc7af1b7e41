//! Voice connection seam between the player and the audio backend.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{path::Path, sync::Arc, time::Duration};
use tokio::sync::watch;

use crate::error::MusicResult;

/// Lifecycle of one started track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    Playing,
    Paused,
    /// Finished, stopped or failed. Terminal.
    Ended,
}

/// Opens voice connections.
#[async_trait]
pub trait AudioTransport: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn TransportHandle>>;
}

/// One live voice connection.
///
/// At most one track plays at a time; starting a new one replaces the old.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    async fn channel_id(&self) -> Option<ChannelId>;

    async fn is_connected(&self) -> bool;

    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()>;

    /// Starts `path` at `volume` percent, `start` into the track.
    ///
    /// The returned receiver reports [`TrackStatus::Ended`] exactly once the
    /// track is over, however it ended.
    async fn play(
        &self,
        path: &Path,
        volume: u8,
        start: Duration,
    ) -> MusicResult<watch::Receiver<TrackStatus>>;

    async fn pause(&self) -> MusicResult<()>;

    async fn resume(&self) -> MusicResult<()>;

    /// Stops the current track. Its receiver observes `Ended`.
    async fn stop(&self) -> MusicResult<()>;

    fn is_playing(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Changes the volume of the current track, if any.
    fn set_volume(&self, volume: u8);

    async fn disconnect(&self) -> MusicResult<()>;
}

/// Who is listening in a voice channel.
pub trait VoicePresence: Send + Sync {
    /// Non-bot members in `channel_id`.
    fn listeners(&self, guild_id: GuildId, channel_id: ChannelId) -> usize;

    /// Voice channel a user is currently in.
    fn user_channel(&self, guild_id: GuildId, user_id: serenity::model::id::UserId) -> Option<ChannelId>;
}
