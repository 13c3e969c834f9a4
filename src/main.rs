use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
#[cfg(test)]
mod testing;
mod ui;

use crate::{
    audio::{
        player::{PlaybackScheduler, PlaybackSettings},
        session::SessionRegistry,
        songbird_backend::SongbirdBackend,
    },
    bot::{handlers::CommandRunner, voice::VoiceAttachment, JukeboxBot},
    config::Config,
    sources::YtDlpResolver,
    ui::paginator::QueuePaginator,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let resolver = Arc::new(YtDlpResolver::new(&config));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&resolver).await;
    }

    info!("{}", config.summary());

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT;

    let songbird = Songbird::serenity();
    let voice = Arc::new(SongbirdBackend::new(songbird.clone()));

    let scheduler = PlaybackScheduler::new(
        Arc::new(SessionRegistry::new()),
        voice.clone(),
        resolver,
        PlaybackSettings::from_config(&config),
    );
    let runner = CommandRunner::new(
        config.command_prefix.clone(),
        scheduler,
        VoiceAttachment::new(voice),
        QueuePaginator::new(config.queue_page_size, config.reaction_timeout()),
    );
    let handler = JukeboxBot::new(config.clone(), runner);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check(resolver: &YtDlpResolver) -> Result<()> {
    let version = resolver.verify().await?;
    info!("yt-dlp {}", version);
    println!("OK");
    Ok(())
}
