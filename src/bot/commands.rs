use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId, permissions::Permissions},
    prelude::Context,
};

/// Registers commands globally
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers commands for one guild (development)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        playnext_command(),
        playalbum_command(),
        playartist_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        skipto_command(),
        remove_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        shuffle_command(),
        repeat_command(),
        repeatone_command(),
        clear_command(),
        volume_command(),
        players_command(),
        musicchannel_command(),
    ]
}

// Playback

fn query_option() -> CreateCommandOption {
    CreateCommandOption::new(
        CommandOptionType::String,
        "query",
        "YouTube or Spotify links, a playlist or a search query",
    )
    .required(true)
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Queues music and starts playing")
        .add_option(query_option())
}

fn playnext_command() -> CreateCommand {
    CreateCommand::new("playnext")
        .description("Queues music right after the current song")
        .add_option(query_option())
}

fn playalbum_command() -> CreateCommand {
    CreateCommand::new("playalbum")
        .description("Queues an album from Spotify")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Album name").required(true),
        )
}

fn playartist_command() -> CreateCommand {
    CreateCommand::new("playartist")
        .description("Queues an artist's top tracks from Spotify")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Artist name").required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pauses the current song")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resumes playback")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip")
        .description("Skips the current song")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "count", "Number of songs to skip")
                .min_int_value(1),
        )
}

fn skipto_command() -> CreateCommand {
    CreateCommand::new("skipto")
        .description("Skips to a song in the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "index", "Queue index of the song")
                .min_int_value(0)
                .required(true),
        )
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stops playback, clears the queue and leaves")
}

// Queue

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Shows the song queue")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Shows the current song")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Removes a song from the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "index", "Queue index of the song")
                .min_int_value(0)
                .required(true),
        )
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Shuffles the upcoming songs")
}

fn repeat_command() -> CreateCommand {
    CreateCommand::new("repeat").description("Toggles repeating the whole queue")
}

fn repeatone_command() -> CreateCommand {
    CreateCommand::new("repeatone").description("Toggles repeating the current song")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Clears the queue")
}

// Settings

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Shows or changes the volume")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Volume (0-100)")
                .min_int_value(0)
                .max_int_value(100),
        )
}

fn players_command() -> CreateCommand {
    CreateCommand::new("players").description("Shows music player stats")
}

fn musicchannel_command() -> CreateCommand {
    CreateCommand::new("musicchannel")
        .description("Sets the channel that receives music messages")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Channel,
                "channel",
                "Text channel (leave empty to reset)",
            ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registers_every_music_command() {
        let names: Vec<String> = all_commands()
            .iter()
            .map(|command| serde_json::to_value(command).unwrap()["name"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                "play", "playnext", "playalbum", "playartist", "pause", "resume", "skip", "skipto", "remove", "stop", "queue",
                "nowplaying", "shuffle", "repeat", "repeatone", "clear", "volume", "players",
                "musicchannel",
            ]
        );
    }

    #[test]
    fn volume_option_is_bounded() {
        let json = serde_json::to_value(volume_command()).unwrap();
        let level = &json["options"][0];
        assert_eq!(level["name"], "level");
        assert_eq!(level["min_value"], 0);
        assert_eq!(level["max_value"], 100);
    }
}
