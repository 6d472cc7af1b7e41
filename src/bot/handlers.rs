use anyhow::{Context as _, Result};
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        channel::ChannelType,
        id::{ChannelId, GuildId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        player::{MusicPlayer, PlayOutcome, PlayerState},
        song::{Requester, Song},
        transport::VoicePresence,
    },
    bot::Plombot,
    error::{MusicError, MusicResult},
    sources::{
        songs_from_request,
        spotify::{SpotifyAlbum, SpotifyArtist},
        SpotifyClient,
    },
    ui::{buttons::PlayerControl, embeds},
};

/// Handles slash commands
pub async fn handle_command(ctx: &Context, command: &CommandInteraction, bot: &Plombot) -> Result<()> {
    let guild_id = command
        .guild_id
        .context("Command used outside of a server")?;

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot, guild_id, false).await,
        "playnext" => handle_play(ctx, command, bot, guild_id, true).await,
        "playalbum" => handle_spotify_play(ctx, command, bot, guild_id, CatalogSearch::Album).await,
        "playartist" => handle_spotify_play(ctx, command, bot, guild_id, CatalogSearch::Artist).await,
        "pause" => handle_pause(ctx, command, bot, guild_id).await,
        "resume" => handle_resume(ctx, command, bot, guild_id).await,
        "skip" => handle_skip(ctx, command, bot, guild_id).await,
        "skipto" => handle_skipto(ctx, command, bot, guild_id).await,
        "remove" => handle_remove(ctx, command, bot, guild_id).await,
        "stop" => handle_stop(ctx, command, bot, guild_id).await,
        "queue" => handle_queue(ctx, command, bot, guild_id).await,
        "nowplaying" => handle_nowplaying(ctx, command, bot, guild_id).await,
        "shuffle" => handle_shuffle(ctx, command, bot, guild_id).await,
        "repeat" => handle_repeat(ctx, command, bot, guild_id, false).await,
        "repeatone" => handle_repeat(ctx, command, bot, guild_id, true).await,
        "clear" => handle_clear(ctx, command, bot, guild_id).await,
        "volume" => handle_volume(ctx, command, bot, guild_id).await,
        "players" => handle_players(ctx, command, bot).await,
        "musicchannel" => handle_musicchannel(ctx, command, bot, guild_id).await,
        _ => {
            respond(
                ctx,
                command,
                embeds::create_error_embed("Unknown command", "That command does not exist."),
            )
            .await
        }
    }
}

/// Tells the user a command failed. Works whether or not the interaction
/// was already acknowledged.
pub async fn report_error(ctx: &Context, command: &CommandInteraction, err: &anyhow::Error) {
    let description = match err.downcast_ref::<MusicError>() {
        Some(music) => music.to_string(),
        None => format!("{:#}", err),
    };
    let embed = embeds::create_error_embed("Something went wrong", &description);

    if respond(ctx, command, embed.clone()).await.is_err() {
        if let Err(e) = command
            .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
            .await
        {
            warn!("Could not report error for /{}: {}", command.data.name, e);
        }
    }
}

/// Handles the buttons under the status cards.
///
/// The press is acknowledged without a message; results show up in the
/// cards themselves.
pub async fn handle_component(
    ctx: &Context,
    component: &ComponentInteraction,
    bot: &Plombot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .context("Button used outside of a server")?;

    let Some(control) = PlayerControl::from_custom_id(&component.data.custom_id) else {
        debug!("Ignoring unknown component {}", component.data.custom_id);
        return component_reply(ctx, component, "That control is no longer available.").await;
    };

    let name = component
        .user
        .global_name
        .as_deref()
        .unwrap_or(&component.user.name);
    info!("🔘 {:?} pressed by {} in guild {}", control, name, guild_id);

    let Some(voice_channel) = bot.presence.user_channel(guild_id, component.user.id) else {
        let text = format!("{}, you must be in a voice channel to use the player controls.", name);
        return component_reply(ctx, component, &text).await;
    };

    component
        .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
        .await?;

    let player = bot.registry.get_or_create(guild_id).await;
    let text_channel = find_music_channel(ctx, bot, guild_id, component.channel_id);

    match control {
        PlayerControl::Pause => player.pause().await?,
        PlayerControl::Resume => {
            if has_something_to_play(&player).await {
                start_playback(ctx, bot, &player, guild_id, voice_channel, component.channel_id)
                    .await?;
            }
        }
        PlayerControl::Skip => {
            player.skip(1).await?;
        }
        PlayerControl::Stop => {
            bot.watchdog.cancel(guild_id);
            player.stop().await?;
        }
        PlayerControl::Queue => player.send_queue_message(text_channel).await?,
        PlayerControl::ShowVolume => player.send_volume_message(text_channel, Some(name)).await?,
        PlayerControl::Shuffle => player.shuffle().await,
        PlayerControl::Volume(step) => {
            let target = step.target(player.volume().await, bot.config.default_volume);
            player.adjust_volume(target, name).await?;
        }
    }

    Ok(())
}

/// Tells the user a button press failed, privately.
pub async fn report_component_error(ctx: &Context, component: &ComponentInteraction, err: &anyhow::Error) {
    let text = match err.downcast_ref::<MusicError>() {
        Some(music) => music.to_string(),
        None => format!("{:#}", err),
    };

    let followup = CreateInteractionResponseFollowup::new()
        .content(format!("Something went wrong: {}", text))
        .ephemeral(true);
    if let Err(e) = component.create_followup(&ctx.http, followup).await {
        warn!("Could not report error for {}: {}", component.data.custom_id, e);
    }
}

// Playback

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
    insert_next: bool,
) -> Result<()> {
    let query = string_option(command, "query").context("Missing query")?;

    let Some(voice_channel) = require_voice(ctx, command, bot, guild_id, "play music").await? else {
        return Ok(());
    };

    // Resolving playlists and searches can take a while
    command.defer(&ctx.http).await?;

    let player = bot.registry.get_or_create(guild_id).await;
    let services = bot.registry.services();
    let songs = songs_from_request(
        query,
        services.resolver.as_ref(),
        services.store.as_ref(),
        bot.spotify.as_deref(),
        bot.config.max_playlist_size,
    )
    .await?;

    if songs.is_empty() {
        let text = format!("Could not find song from query: '{}'", query);
        return edit_embed(ctx, command, embeds::create_error_embed("No results", &text)).await;
    }

    let response = queued_response(&songs, insert_next);
    player.enqueue(songs, &requester(command), insert_next).await;
    edit_embed(ctx, command, embeds::create_success_embed("Queued", &response)).await?;

    start_playback(ctx, bot, &player, guild_id, voice_channel, command.channel_id).await
}

/// What `/playalbum` and `/playartist` search Spotify for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatalogSearch {
    Album,
    Artist,
}

/// Queues a Spotify album, or an artist's top tracks, found by name.
async fn handle_spotify_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
    search: CatalogSearch,
) -> Result<()> {
    let query = string_option(command, "query").context("Missing query")?;

    let Some(voice_channel) = require_voice(ctx, command, bot, guild_id, "play music").await? else {
        return Ok(());
    };

    let Some(spotify) = bot.spotify.as_deref() else {
        let embed = embeds::create_error_embed("Spotify unavailable", "Spotify is not configured for this bot.");
        return respond(ctx, command, embed).await;
    };

    command.defer(&ctx.http).await?;

    let found = match search {
        CatalogSearch::Album => spotify_album(spotify, query, bot.config.max_playlist_size).await,
        CatalogSearch::Artist => spotify_artist(spotify, query).await,
    };
    let (songs, source) = match found {
        Ok(found) => found,
        Err(MusicError::NotFound(_)) => {
            let what = match search {
                CatalogSearch::Album => "album",
                CatalogSearch::Artist => "artist",
            };
            let text = format!("Failed to find {} from query \"{}\".", what, query);
            return edit_embed(ctx, command, embeds::create_error_embed("No results", &text)).await;
        }
        Err(e) => return Err(e.into()),
    };

    if songs.is_empty() {
        let text = format!("Failed to find songs from {}", source);
        return edit_embed(ctx, command, embeds::create_error_embed("No results", &text)).await;
    }

    let response = format!("Queued {} songs from {}", songs.len(), source);
    let player = bot.registry.get_or_create(guild_id).await;
    player.enqueue(songs, &requester(command), false).await;
    edit_embed(ctx, command, embeds::create_success_embed("Queued", &response)).await?;

    start_playback(ctx, bot, &player, guild_id, voice_channel, command.channel_id).await
}

async fn spotify_album(
    spotify: &SpotifyClient,
    query: &str,
    limit: usize,
) -> MusicResult<(Vec<Song>, String)> {
    let album = spotify.search_album(query).await?;
    let songs = spotify.album_songs(&album.id, limit).await?;
    Ok((songs, album_link(&album)))
}

async fn spotify_artist(spotify: &SpotifyClient, query: &str) -> MusicResult<(Vec<Song>, String)> {
    let artist = spotify.search_artist(query).await?;
    let songs = spotify.artist_top_songs(&artist.id).await?;
    Ok((songs, format!("{}'s top tracks", artist_link(&artist))))
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    if require_voice(ctx, command, bot, guild_id, "pause the music").await?.is_none() {
        return Ok(());
    }

    let player = bot.registry.get_or_create(guild_id).await;
    player.pause().await?;
    reply(ctx, command, &format!("⏸️ {} paused the music.", user_name(command))).await
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(voice_channel) = require_voice(ctx, command, bot, guild_id, "resume the music").await?
    else {
        return Ok(());
    };

    let player = bot.registry.get_or_create(guild_id).await;
    if !has_something_to_play(&player).await {
        return reply(ctx, command, "Nothing left in the queue.").await;
    }

    reply(ctx, command, &format!("▶️ {} resumed the music.", user_name(command))).await?;
    start_playback(ctx, bot, &player, guild_id, voice_channel, command.channel_id).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    if require_voice(ctx, command, bot, guild_id, "skip the song").await?.is_none() {
        return Ok(());
    }

    let count = int_option(command, "count").unwrap_or(1).max(1) as usize;
    let player = bot.registry.get_or_create(guild_id).await;
    let cursor = player.skip(count).await?;
    debug!("Skip by {} left the cursor at {}", count, cursor);

    reply(ctx, command, &format!("⏭️ Skipped {} song(s).", count)).await
}

async fn handle_skipto(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    if require_voice(ctx, command, bot, guild_id, "skip multiple songs").await?.is_none() {
        return Ok(());
    }

    let index = int_option(command, "index").context("Missing index")?.max(0) as usize;
    let player = bot.registry.get_or_create(guild_id).await;
    player.skip_to(index).await?;

    reply(ctx, command, &format!("⏭️ Skipping to song {}.", index)).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    if require_voice(ctx, command, bot, guild_id, "stop the music").await?.is_none() {
        return Ok(());
    }

    bot.watchdog.cancel(guild_id);
    if let Some(player) = bot.registry.get(guild_id) {
        player.stop().await?;
    }

    reply(ctx, command, "⏹️ Stopped and cleared the queue.").await
}

// Queue

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    let channel = find_music_channel(ctx, bot, guild_id, command.channel_id);
    let player = bot.registry.get_or_create(guild_id).await;
    player.send_queue_message(channel).await?;

    reply_ephemeral(ctx, command, &format!("📜 Queue posted in <#{}>.", channel)).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    let channel = find_music_channel(ctx, bot, guild_id, command.channel_id);
    let player = bot.registry.get_or_create(guild_id).await;

    if player.send_now_playing(channel).await? {
        reply_ephemeral(ctx, command, &format!("🎵 Now playing posted in <#{}>.", channel)).await
    } else {
        reply_ephemeral(ctx, command, "Nothing is playing right now.").await
    }
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    if require_voice(ctx, command, bot, guild_id, "remove songs from the queue").await?.is_none() {
        return Ok(());
    }

    let index = int_option(command, "index").context("Missing index")?.max(0) as usize;
    let player = bot.registry.get_or_create(guild_id).await;

    match player.remove(index).await {
        Ok(song) => {
            let text = format!("Removed: **{}** [{}]({})", index, song.display_title(), song.link());
            respond(ctx, command, embeds::create_success_embed("Removed", &text)).await
        }
        Err(MusicError::OutOfRange { .. }) => {
            reply(ctx, command, &format!("Failed to remove song at index {}", index)).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    if require_voice(ctx, command, bot, guild_id, "shuffle the queue").await?.is_none() {
        return Ok(());
    }

    bot.registry.get_or_create(guild_id).await.shuffle().await;
    reply(ctx, command, &format!("🔀 {} shuffled the queue.", user_name(command))).await
}

async fn handle_repeat(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
    one: bool,
) -> Result<()> {
    let action = if one { "loop the song" } else { "loop the queue" };
    if require_voice(ctx, command, bot, guild_id, action).await?.is_none() {
        return Ok(());
    }

    let player = bot.registry.get_or_create(guild_id).await;
    let enabled = if one {
        player.toggle_repeat_one().await
    } else {
        player.toggle_repeat_queue().await
    };

    reply(ctx, command, &repeat_response(user_name(command), one, enabled)).await
}

async fn handle_clear(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    if require_voice(ctx, command, bot, guild_id, "clear the queue").await?.is_none() {
        return Ok(());
    }

    bot.registry.get_or_create(guild_id).await.clear_queue().await;
    reply(ctx, command, &format!("{} cleared the queue", user_name(command))).await
}

// Settings

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    if require_voice(ctx, command, bot, guild_id, "change the volume").await?.is_none() {
        return Ok(());
    }

    let channel = find_music_channel(ctx, bot, guild_id, command.channel_id);
    let player = bot.registry.get_or_create(guild_id).await;

    let text = match int_option(command, "level") {
        Some(level) => {
            let applied = player.set_volume(level.clamp(0, 100) as i32).await;
            format!("🔊 Volume set to {}%", applied)
        }
        None => format!("🔊 Volume is {}%", player.volume().await),
    };

    player
        .send_volume_message(channel, Some(user_name(command)))
        .await?;
    reply_ephemeral(ctx, command, &text).await
}

async fn handle_players(ctx: &Context, command: &CommandInteraction, bot: &Plombot) -> Result<()> {
    let stats = bot.registry.stats().await;
    let text = format!(
        "Playing: {}\nPaused: {}\nStopped: {}",
        stats.playing,
        stats.paused,
        stats.idle + stats.disconnected
    );

    respond(ctx, command, embeds::create_info_embed("Music Player Stats", &text)).await
}

async fn handle_musicchannel(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
) -> Result<()> {
    let channel = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "channel")
        .and_then(|opt| opt.value.as_channel_id());

    bot.storage.set_music_channel(guild_id, channel).await?;

    let text = match channel {
        Some(channel) => format!("🎶 Music messages will go to <#{}>.", channel),
        None => "🎶 Music channel reset.".to_string(),
    };
    reply(ctx, command, &text).await
}

// Helpers

/// Connects to the user's channel and runs the playback loop in the
/// background so the interaction can finish.
async fn start_playback(
    ctx: &Context,
    bot: &Plombot,
    player: &Arc<MusicPlayer>,
    guild_id: GuildId,
    voice_channel: ChannelId,
    invoked_in: ChannelId,
) -> Result<()> {
    let text_channel = find_music_channel(ctx, bot, guild_id, invoked_in);
    player.set_text_channel(text_channel).await;
    player.connect(voice_channel).await?;

    let player = player.clone();
    let renderer = bot.registry.services().renderer.clone();
    tokio::spawn(async move {
        match player.play().await {
            Ok(PlayOutcome::AlreadyRunning) => {}
            Ok(outcome) => debug!("Playback in guild {} ended: {:?}", guild_id, outcome),
            Err(e) => {
                error!("❌ Playback failed in guild {}: {}", guild_id, e);
                let text = format!("Failed to play music in <#{}>. Error: {}", voice_channel, e);
                if let Err(e) = renderer.notify(text_channel, &text).await {
                    warn!("Could not report playback failure: {}", e);
                }
            }
        }
    });

    Ok(())
}

/// A paused track or an unplayed song in the queue.
async fn has_something_to_play(player: &MusicPlayer) -> bool {
    player.state().await == PlayerState::Paused || player.cursor().await < player.queue_len().await
}

/// Returns the user's voice channel, or tells them to join one.
async fn require_voice(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Plombot,
    guild_id: GuildId,
    action: &str,
) -> Result<Option<ChannelId>> {
    match bot.presence.user_channel(guild_id, command.user.id) {
        Some(channel) => Ok(Some(channel)),
        None => {
            let text = format!("{}, you must be in a voice channel to {}.", user_name(command), action);
            respond(ctx, command, embeds::create_error_embed("Not in voice", &text)).await?;
            Ok(None)
        }
    }
}

/// The guild's configured music channel, else a text channel named
/// `music`, else the channel the command came from.
fn find_music_channel(ctx: &Context, bot: &Plombot, guild_id: GuildId, fallback: ChannelId) -> ChannelId {
    if let Some(channel) = bot.storage.music_channel(guild_id) {
        return channel;
    }

    guild_id
        .to_guild_cached(&ctx.cache)
        .and_then(|guild| {
            guild
                .channels
                .values()
                .find(|channel| channel.kind == ChannelType::Text && channel.name == "music")
                .map(|channel| channel.id)
        })
        .unwrap_or(fallback)
}

fn queued_response(songs: &[Song], insert_next: bool) -> String {
    let mut response = match songs {
        [song] => format!("Queued [{}]({})", song.display_title(), song.link()),
        _ => format!("Queued {} songs", songs.len()),
    };
    if insert_next {
        response.push_str(" up next");
    }
    response
}

fn album_link(album: &SpotifyAlbum) -> String {
    match album.artists.first() {
        Some(artist) => format!("[{}]({}) by {}", album.name, album.url(), artist_link(artist)),
        None => format!("[{}]({})", album.name, album.url()),
    }
}

fn artist_link(artist: &SpotifyArtist) -> String {
    format!("[{}]({})", artist.name, artist.url())
}

fn repeat_response(user: &str, one: bool, enabled: bool) -> String {
    let status = if enabled { "on" } else { "off" };
    if one {
        format!("🔂 {} turned **{}** repeat for this song.", user, status)
    } else {
        format!("🔁 {} turned **{}** repeat for the whole queue.", user, status)
    }
}

fn requester(command: &CommandInteraction) -> Requester {
    Requester::new(command.user.id, user_name(command))
}

fn user_name(command: &CommandInteraction) -> &str {
    command
        .user
        .global_name
        .as_deref()
        .unwrap_or(&command.user.name)
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

/// Replaces a deferred response with `embed`.
async fn edit_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn reply(ctx: &Context, command: &CommandInteraction, text: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(text)),
        )
        .await?;
    Ok(())
}

async fn reply_ephemeral(ctx: &Context, command: &CommandInteraction, text: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn component_reply(ctx: &Context, component: &ComponentInteraction, text: &str) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::song::resolved;
    use pretty_assertions::assert_eq;

    #[test]
    fn queued_response_links_single_song() {
        let songs = vec![resolved("aaaaaaaaaaa", "A", 180)];
        assert_eq!(
            queued_response(&songs, false),
            format!("Queued [A]({})", songs[0].link())
        );
    }

    #[test]
    fn queued_response_counts_many_songs() {
        let songs = vec![
            resolved("aaaaaaaaaaa", "A", 180),
            resolved("bbbbbbbbbbb", "B", 200),
        ];
        assert_eq!(queued_response(&songs, true), "Queued 2 songs up next");
    }

    #[test]
    fn album_link_credits_the_artist() {
        let album: SpotifyAlbum = serde_json::from_value(serde_json::json!({
            "id": "alb",
            "name": "Discovery",
            "artists": [{ "id": "art", "name": "Daft Punk" }],
        }))
        .unwrap();

        assert_eq!(
            album_link(&album),
            "[Discovery](https://open.spotify.com/album/alb) by \
             [Daft Punk](https://open.spotify.com/artist/art)"
        );
    }

    #[test]
    fn repeat_response_names_the_mode() {
        assert_eq!(
            repeat_response("plom", true, true),
            "🔂 plom turned **on** repeat for this song."
        );
        assert_eq!(
            repeat_response("plom", false, false),
            "🔁 plom turned **off** repeat for the whole queue."
        );
    }
}
