use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use plombot::{
    audio::{
        player::PlayerServices, registry::PlayerRegistry, songbird_transport::SongbirdTransport,
        watchdog::IdleWatchdog,
    },
    bot::{events::CachePresence, Plombot},
    cache::AudioCache,
    config::Config,
    sources::{
        youtube_api_v3::YouTubeAPIv3Client, ytdlp::YtDlpClient, MetadataResolver, SpotifyClient,
    },
    storage::JsonStorage,
    ui::embeds::DiscordRenderer,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("plombot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting plombot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);

    // yt-dlp always downloads; it also resolves metadata without an API key
    let ytdlp = Arc::new(YtDlpClient::new(config.ytdlp_path.clone()));
    let resolver: Arc<dyn MetadataResolver> = match &config.youtube_api_key {
        Some(key) => Arc::new(YouTubeAPIv3Client::new(key.clone())?),
        None => ytdlp.clone(),
    };
    let cache = AudioCache::new(config.cache_dir.clone(), ytdlp);

    let spotify = match config.spotify_credentials() {
        Some((id, secret)) => Some(Arc::new(SpotifyClient::new(id, secret)?)),
        None => None,
    };

    let songbird = Songbird::serenity();
    let presence = Arc::new(CachePresence::default());
    let renderer = Arc::new(DiscordRenderer::new(Arc::new(Http::new(&config.discord_token))));

    let services = Arc::new(
        PlayerServices::new(
            Arc::new(SongbirdTransport::new(songbird.clone())),
            cache,
            resolver,
            storage.clone(),
            renderer,
            presence.clone(),
        )
        .with_queue_window(config.queue_window),
    );
    let registry = Arc::new(PlayerRegistry::new(services, config.default_volume));
    let watchdog = Arc::new(IdleWatchdog::new(
        presence.clone(),
        config.idle_timeout,
        config.idle_check_interval,
    ));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = Plombot::new(config.clone(), storage, registry.clone(), watchdog, presence)
        .with_spotify(spotify);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Graceful shutdown: leave voice channels before the shards go down
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        registry.stop_all().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    YtDlpClient::new(config.ytdlp_path.clone())
        .verify_dependencies()
        .await?;
    println!("OK");
    Ok(())
}
