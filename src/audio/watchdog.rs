use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{player::MusicPlayer, transport::VoicePresence};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

struct Countdown {
    id: u64,
    token: CancellationToken,
}

/// Leaves voice channels nobody is listening in.
///
/// Fed by voice-state changes. When the bot's channel has no human left, a
/// countdown starts; it is dropped as soon as someone returns, the bot is
/// disconnected or moved. If it runs out the guild's player is stopped. One
/// countdown per guild at most.
pub struct IdleWatchdog {
    timeout: Duration,
    tick: Duration,
    presence: Arc<dyn VoicePresence>,
    pending: Arc<DashMap<GuildId, Countdown>>,
    next_id: AtomicU64,
}

impl IdleWatchdog {
    pub fn new(presence: Arc<dyn VoicePresence>, timeout: Duration, tick: Duration) -> Self {
        Self {
            timeout,
            tick: tick.max(Duration::from_millis(1)),
            presence,
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn cancel(&self, guild_id: GuildId) {
        if let Some((_, countdown)) = self.pending.remove(&guild_id) {
            debug!("Idle countdown cancelled in guild {}", guild_id);
            countdown.token.cancel();
        }
    }

    /// Re-evaluates `player`'s channel after a voice-state change.
    ///
    /// Returns the countdown task if this call started one. The task yields
    /// `true` if it stopped the player.
    pub async fn observe(&self, player: Arc<MusicPlayer>) -> Option<JoinHandle<bool>> {
        let guild_id = player.guild_id();

        let Some(channel_id) = player.voice_channel().await else {
            self.cancel(guild_id);
            return None;
        };

        if self.presence.listeners(guild_id, channel_id) > 0 {
            self.cancel(guild_id);
            return None;
        }

        let token = CancellationToken::new();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.pending.entry(guild_id) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => {
                slot.insert(Countdown {
                    id,
                    token: token.clone(),
                });
            }
        }

        info!(
            "⏳ Nobody listening in guild {}, leaving in {:?}",
            guild_id, self.timeout
        );

        let countdown = CountdownTask {
            guild_id,
            channel_id,
            id,
            timeout: self.timeout,
            tick: self.tick,
            presence: self.presence.clone(),
            pending: self.pending.clone(),
        };
        Some(tokio::spawn(countdown.run(player, token)))
    }
}

struct CountdownTask {
    guild_id: GuildId,
    channel_id: ChannelId,
    id: u64,
    timeout: Duration,
    tick: Duration,
    presence: Arc<dyn VoicePresence>,
    pending: Arc<DashMap<GuildId, Countdown>>,
}

impl CountdownTask {
    async fn run(self, player: Arc<MusicPlayer>, token: CancellationToken) -> bool {
        let mut elapsed = Duration::ZERO;

        let expired = loop {
            tokio::select! {
                _ = token.cancelled() => break false,
                _ = tokio::time::sleep(self.tick) => {}
            }
            elapsed += self.tick;

            if self.presence.listeners(self.guild_id, self.channel_id) > 0
                || !player.is_connected().await
                || player.voice_channel().await != Some(self.channel_id)
            {
                debug!("Idle countdown aborted in guild {}", self.guild_id);
                break false;
            }

            if elapsed >= self.timeout {
                break true;
            }
        };

        self.pending
            .remove_if(&self.guild_id, |_, countdown| countdown.id == self.id);

        if !expired {
            return false;
        }

        info!("💤 Idle timeout in guild {}, stopping", self.guild_id);
        if let Err(e) = player.stop().await {
            warn!("Idle stop failed in guild {}: {}", self.guild_id, e);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{harness, Harness};
    use tokio::time::Instant;

    const CACHED: &[&str] = &[];

    fn watchdog(h: &Harness) -> IdleWatchdog {
        IdleWatchdog::new(h.presence.clone(), DEFAULT_IDLE_TIMEOUT, DEFAULT_CHECK_INTERVAL)
    }

    #[tokio::test(start_paused = true)]
    async fn stops_once_after_full_timeout() {
        let h = harness(CACHED);
        h.connect().await;
        let dog = watchdog(&h);

        let started = Instant::now();
        let task = dog.observe(h.player.clone()).await.unwrap();
        assert!(dog.observe(h.player.clone()).await.is_none());
        assert_eq!(dog.pending(), 1);

        assert!(task.await.unwrap());
        assert!(started.elapsed() >= DEFAULT_IDLE_TIMEOUT);
        assert_eq!(h.handle.disconnects(), 1);
        assert_eq!(dog.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn returning_listener_cancels() {
        let h = harness(CACHED);
        h.connect().await;
        let dog = watchdog(&h);

        let task = dog.observe(h.player.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        h.presence.set_listeners(Harness::VOICE, 1);
        assert!(dog.observe(h.player.clone()).await.is_none());

        assert!(!task.await.unwrap());
        tokio::time::sleep(DEFAULT_IDLE_TIMEOUT).await;
        assert_eq!(h.handle.disconnects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn listener_noticed_on_tick() {
        let h = harness(CACHED);
        h.connect().await;
        let dog = watchdog(&h);

        let task = dog.observe(h.player.clone()).await.unwrap();
        h.presence.set_listeners(Harness::VOICE, 2);

        assert!(!task.await.unwrap());
        assert_eq!(h.handle.disconnects(), 0);
        assert_eq!(dog.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_aborts() {
        let h = harness(CACHED);
        h.connect().await;
        let dog = watchdog(&h);

        let task = dog.observe(h.player.clone()).await.unwrap();
        h.handle.drop_connection();

        assert!(!task.await.unwrap());
        assert_eq!(h.handle.disconnects(), 0);
    }

    #[tokio::test]
    async fn disconnected_player_is_ignored() {
        let h = harness(CACHED);
        let dog = watchdog(&h);
        assert!(dog.observe(h.player.clone()).await.is_none());
        assert_eq!(dog.pending(), 0);
    }
}
