//! # Bot Module
//!
//! Discord glue for plombot.
//!
//! - Slash command registration ([`commands`]) and dispatch ([`handlers`])
//! - Status card buttons, routed through the same handlers
//! - Voice-state routing into the [`IdleWatchdog`] ([`events`])
//! - Periodic eviction of idle players
//!
//! The [`Plombot`] handler owns nothing playback-related itself; every guild's
//! state lives in the shared [`PlayerRegistry`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{registry::PlayerRegistry, watchdog::IdleWatchdog},
    config::Config,
    sources::SpotifyClient,
    storage::JsonStorage,
};
use events::CachePresence;

/// How often idle players are looked at.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

/// Serenity event handler for plombot.
pub struct Plombot {
    config: Arc<Config>,
    /// Guild settings (music channel) and song statistics
    pub storage: Arc<JsonStorage>,
    pub registry: Arc<PlayerRegistry>,
    pub watchdog: Arc<IdleWatchdog>,
    /// Filled from serenity's cache once the client is ready
    pub presence: Arc<CachePresence>,
    /// Album, artist and link lookups; absent without credentials
    pub spotify: Option<Arc<SpotifyClient>>,
    maintenance_started: AtomicBool,
}

impl Plombot {
    pub fn new(
        config: Config,
        storage: Arc<JsonStorage>,
        registry: Arc<PlayerRegistry>,
        watchdog: Arc<IdleWatchdog>,
        presence: Arc<CachePresence>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            registry,
            watchdog,
            presence,
            spotify: None,
            maintenance_started: AtomicBool::new(false),
        }
    }

    pub fn with_spotify(mut self, spotify: Option<Arc<SpotifyClient>>) -> Self {
        self.spotify = spotify;
        self
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands show up almost immediately, global ones can take up
    /// to an hour. `GUILD_ID` picks the guild for development.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Not a member of configured guild {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Guild command registration failed: {:?}", e);
                        anyhow::anyhow!(
                            "Could not register guild commands. Check the bot has 'applications.commands' in the guild."
                        )
                    })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Global command registration failed: {:?}", e);
                    anyhow::anyhow!(
                        "Could not register global commands. Check the bot has 'applications.commands'."
                    )
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for Plombot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());

        self.presence.attach(ctx.cache.clone());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Command registration failed: {:?}", e);
        }

        // Ready fires again after reconnects
        if !self.maintenance_started.swap(true, Ordering::SeqCst) {
            let registry = self.registry.clone();
            let evict_after = self.config.player_eviction_after;
            tokio::spawn(async move {
                maintenance_tasks(registry, evict_after).await;
            });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, &command, self).await {
                    error!("Command /{} failed: {:?}", command.data.name, e);
                    handlers::report_error(&ctx, &command, &e).await;
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = handlers::handle_component(&ctx, &component, self).await {
                    error!("Control {} failed: {:?}", component.data.custom_id, e);
                    handlers::report_component_error(&ctx, &component, &e).await;
                }
            }
            _ => {}
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let bot_id = ctx.cache.current_user().id;
        events::on_voice_state_update(&self.registry, &self.watchdog, bot_id, old.as_ref(), &new)
            .await;
    }
}

/// Evicts players that sat disconnected past `evict_after`, forever.
async fn maintenance_tasks(registry: Arc<PlayerRegistry>, evict_after: Duration) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);

    loop {
        interval.tick().await;

        registry.evict_idle(evict_after).await;
        debug!("🧹 {}", registry.stats().await);
    }
}
