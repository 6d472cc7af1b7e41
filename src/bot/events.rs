use serenity::{
    cache::Cache,
    model::{
        id::{ChannelId, GuildId, UserId},
        voice::VoiceState,
    },
};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::audio::{registry::PlayerRegistry, transport::VoicePresence, watchdog::IdleWatchdog};

/// Voice presence read from serenity's cache.
///
/// The cache only exists once the client is running, so it is attached from
/// the `ready` event. Until then every channel looks empty.
#[derive(Default)]
pub struct CachePresence {
    cache: OnceLock<Arc<Cache>>,
}

impl CachePresence {
    pub fn attach(&self, cache: Arc<Cache>) {
        if self.cache.set(cache).is_err() {
            debug!("Presence cache already attached");
        }
    }
}

impl VoicePresence for CachePresence {
    fn listeners(&self, guild_id: GuildId, channel_id: ChannelId) -> usize {
        let Some(cache) = self.cache.get() else {
            return 0;
        };
        let me = cache.current_user().id;
        let Some(guild) = cache.guild(guild_id) else {
            return 0;
        };

        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id) && state.user_id != me)
            .filter(|state| {
                let is_bot = state
                    .member
                    .as_ref()
                    .or_else(|| guild.members.get(&state.user_id))
                    .is_some_and(|member| member.user.bot);
                !is_bot
            })
            .count()
    }

    fn user_channel(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let cache = self.cache.get()?;
        let guild = cache.guild(guild_id)?;
        guild
            .voice_states
            .get(&user_id)
            .and_then(|state| state.channel_id)
    }
}

/// Routes a voice-state change to the guild's player.
///
/// The bot being kicked from voice stops its player; any other change lets
/// the watchdog re-check whether anyone is still listening.
pub async fn on_voice_state_update(
    registry: &PlayerRegistry,
    watchdog: &IdleWatchdog,
    bot_id: UserId,
    old: Option<&VoiceState>,
    new: &VoiceState,
) {
    let Some(guild_id) = new.guild_id else {
        return;
    };
    let Some(player) = registry.get(guild_id) else {
        return;
    };

    if new.user_id == bot_id && old.is_some() && new.channel_id.is_none() {
        info!("🔌 Disconnected from voice in guild {}", guild_id);
        watchdog.cancel(guild_id);
        if player.is_connected().await {
            return;
        }
        if let Err(e) = player.stop().await {
            warn!("Could not stop player in guild {}: {}", guild_id, e);
        }
        return;
    }

    // The countdown task runs on its own; nothing here waits for it.
    let _ = watchdog.observe(player).await;
}
