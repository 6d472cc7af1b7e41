use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use super::player::{MusicPlayer, PlayerServices, PlayerState};

/// Owns one [`MusicPlayer`] per guild.
///
/// Players are created on first use with the guild's stored volume and
/// dropped by [`evict_idle`](Self::evict_idle) once they have sat
/// disconnected long enough.
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<MusicPlayer>>,
    services: Arc<PlayerServices>,
    default_volume: u8,
}

impl PlayerRegistry {
    pub fn new(services: Arc<PlayerServices>, default_volume: u8) -> Self {
        Self {
            players: DashMap::new(),
            services,
            default_volume: default_volume.min(100),
        }
    }

    pub fn services(&self) -> &Arc<PlayerServices> {
        &self.services
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<MusicPlayer>> {
        self.players.get(&guild_id).map(|player| player.clone())
    }

    pub async fn get_or_create(&self, guild_id: GuildId) -> Arc<MusicPlayer> {
        if let Some(player) = self.get(guild_id) {
            return player;
        }

        let volume = match self.services.store.volume(guild_id).await {
            Ok(stored) => stored.unwrap_or(self.default_volume),
            Err(e) => {
                warn!("Could not load volume for guild {}: {}", guild_id, e);
                self.default_volume
            }
        };

        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🎛️ New player for guild {} at {}%", guild_id, volume);
                Arc::new(MusicPlayer::new(guild_id, self.services.clone(), volume))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<MusicPlayer>> {
        self.players.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Drops players that have been disconnected for at least `after`.
    /// Returns how many were removed.
    ///
    /// A player someone else still holds (a command handler mid-request, a
    /// spawned playback task) is never dropped, or the holder would drive a
    /// player the registry no longer knows about.
    pub async fn evict_idle(&self, after: Duration) -> usize {
        let mut evicted = 0;
        for player in self.snapshot() {
            if !player.is_evictable(after).await {
                continue;
            }
            // Only the map entry and `player` itself may point at it.
            let removed = self.players.remove_if(&player.guild_id(), |_, current| {
                Arc::ptr_eq(current, &player) && Arc::strong_count(current) <= 2
            });
            if removed.is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            info!("🧹 Evicted {} idle players", evicted);
        }
        evicted
    }

    /// Stops every connected player. Used on shutdown.
    pub async fn stop_all(&self) {
        for player in self.snapshot() {
            if !player.is_connected().await {
                continue;
            }
            if let Err(e) = player.stop().await {
                warn!("Could not stop player in guild {}: {}", player.guild_id(), e);
            }
        }
    }

    pub async fn stats(&self) -> RegistryStats {
        let players = self.snapshot();

        let mut stats = RegistryStats {
            total: players.len(),
            ..RegistryStats::default()
        };
        for player in players {
            match player.state().await {
                PlayerState::Playing => stats.playing += 1,
                PlayerState::Paused => stats.paused += 1,
                PlayerState::Idle => stats.idle += 1,
                PlayerState::Disconnected => stats.disconnected += 1,
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: usize,
    pub playing: usize,
    pub paused: usize,
    pub idle: usize,
    pub disconnected: usize,
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} players: {} playing, {} paused, {} idle, {} disconnected",
            self.total, self.playing, self.paused, self.idle, self.disconnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{harness, harness_with_store, Harness, GUILD};
    use crate::storage::MockPersistentStore;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn new_players_use_stored_volume() {
        let mut store = MockPersistentStore::new();
        store
            .expect_volume()
            .times(1)
            .returning(|_| Ok(Some(55)));
        let h = harness_with_store(store, &[]);
        let registry = PlayerRegistry::new(h.services.clone(), 20);

        let first = registry.get_or_create(GUILD).await;
        let second = registry.get_or_create(GUILD).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.volume().await, 55);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn missing_volume_falls_back_to_default() {
        let h = harness(&[]);
        let registry = PlayerRegistry::new(h.services.clone(), 30);

        let player = registry.get_or_create(GuildId::new(2)).await;
        assert_eq!(player.volume().await, 30);
    }

    #[tokio::test]
    async fn evicts_only_disconnected_players() {
        let h = harness(&[]);
        let registry = PlayerRegistry::new(h.services.clone(), 20);

        let connected = registry.get_or_create(GuildId::new(2)).await;
        connected.connect(Harness::VOICE).await.unwrap();
        registry.get_or_create(GuildId::new(3)).await;

        assert_eq!(
            registry.stats().await,
            RegistryStats {
                total: 2,
                idle: 1,
                disconnected: 1,
                ..RegistryStats::default()
            }
        );

        assert_eq!(registry.evict_idle(Duration::ZERO).await, 1);
        assert!(registry.get(GuildId::new(2)).is_some());
        assert!(registry.get(GuildId::new(3)).is_none());
    }

    #[tokio::test]
    async fn held_player_survives_eviction() {
        let h = harness(&[]);
        let registry = PlayerRegistry::new(h.services.clone(), 20);

        let held = registry.get_or_create(GUILD).await;
        assert_eq!(registry.evict_idle(Duration::ZERO).await, 0);

        held.connect(Harness::VOICE).await.unwrap();
        let current = registry.get(GUILD).unwrap();
        assert!(Arc::ptr_eq(&held, &current));
        assert!(Arc::ptr_eq(&held, &registry.get_or_create(GUILD).await));

        drop(current);
        held.stop().await.unwrap();
        drop(held);
        assert_eq!(registry.evict_idle(Duration::ZERO).await, 1);
        assert!(registry.get(GUILD).is_none());
    }

    #[tokio::test]
    async fn stop_all_disconnects_connected_players() {
        let h = harness(&[]);
        let registry = PlayerRegistry::new(h.services.clone(), 20);
        registry
            .get_or_create(GuildId::new(2))
            .await
            .connect(Harness::VOICE)
            .await
            .unwrap();
        registry.get_or_create(GuildId::new(3)).await;

        registry.stop_all().await;

        assert_eq!(h.handle.disconnects(), 1);
        assert_eq!(registry.stats().await.disconnected, 2);
    }
}
