use anyhow::Result;
use serenity::{
    model::{
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    commands::{self, Command, ParseError},
    voice::VoiceAttachment,
};
use crate::{
    audio::player::PlaybackScheduler,
    error::MusicError,
    sources::TrackDescriptor,
    ui::{
        channel::{ChatChannel, DiscordChannel},
        paginator::QueuePaginator,
    },
};

/// Who asked for a command and where to answer.
pub struct Request {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Voice channel the caller sits in, if any.
    pub user_channel: Option<ChannelId>,
    pub channel: Arc<dyn ChatChannel>,
}

/// Executes parsed commands against the playback core.
#[derive(Clone)]
pub struct CommandRunner {
    prefix: String,
    scheduler: PlaybackScheduler,
    attachment: VoiceAttachment,
    paginator: QueuePaginator,
}

impl CommandRunner {
    pub fn new(
        prefix: impl Into<String>,
        scheduler: PlaybackScheduler,
        attachment: VoiceAttachment,
        paginator: QueuePaginator,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            scheduler,
            attachment,
            paginator,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    /// Runs `command`, reporting any [`MusicError`] to the invoking channel.
    /// Other failures are returned to the caller.
    pub async fn run(&self, request: Request, command: Command) -> Result<()> {
        let channel = request.channel.clone();
        match self.execute(request, command).await {
            Ok(()) => Ok(()),
            Err(e) => match e.downcast_ref::<MusicError>() {
                Some(music_error) => {
                    debug!("Command failed: {}", music_error);
                    channel.say(&music_error.to_string()).await
                }
                None => Err(e),
            },
        }
    }

    async fn execute(&self, request: Request, command: Command) -> Result<()> {
        let Request {
            guild_id,
            user_id,
            user_channel,
            channel,
        } = request;

        match command {
            Command::Play(query) => {
                self.attachment.connect_to_user(guild_id, user_channel).await?;
                let session = self.scheduler.session(guild_id);

                if let Some(query) = query {
                    let added = self.scheduler.enqueue_query(&session, user_id, &query).await?;
                    channel.say(&added_message(&added)).await?;
                }
                if self.scheduler.resume(&session).await? {
                    channel.say("▶️ Resumed").await?;
                }

                self.scheduler.spawn_advance(session, channel);
            }
            Command::Add(query) => {
                self.attachment.connect_to_user(guild_id, user_channel).await?;
                let session = self.scheduler.session(guild_id);

                let added = self.scheduler.enqueue_query(&session, user_id, &query).await?;
                channel.say(&added_message(&added)).await?;
            }
            Command::Pause => {
                let session = self
                    .scheduler
                    .find_session(guild_id)
                    .ok_or(MusicError::NotPlaying)?;
                self.scheduler.pause(&session).await?;
                channel.say("⏸️ Paused").await?;
            }
            Command::Resume => {
                let session = self
                    .scheduler
                    .find_session(guild_id)
                    .ok_or(MusicError::EmptyQueue)?;
                if self.scheduler.resume(&session).await? {
                    channel.say("▶️ Resumed").await?;
                } else if session.lock().await.queue.is_empty() {
                    return Err(MusicError::EmptyQueue.into());
                } else {
                    self.scheduler.spawn_advance(session, channel);
                }
            }
            Command::Skip => {
                let session = self
                    .scheduler
                    .find_session(guild_id)
                    .ok_or(MusicError::NotPlaying)?;
                self.scheduler.skip(&session).await?;
                channel.say("⏭️ Skipped").await?;
            }
            Command::Loop => {
                let session = self
                    .scheduler
                    .find_session(guild_id)
                    .ok_or(MusicError::NothingPlaying)?;
                let (enabled, track) = self.scheduler.toggle_loop(&session).await?;
                let text = if enabled {
                    format!("🔁 Looping: {}", track.title())
                } else {
                    format!("Stopped looping: {}", track.title())
                };
                channel.say(&text).await?;
            }
            Command::Shuffle => {
                let session = self
                    .scheduler
                    .find_session(guild_id)
                    .ok_or(MusicError::EmptyQueue)?;
                let count = self.scheduler.shuffle(&session).await?;
                channel.say(&format!("🔀 Shuffled {} songs", count)).await?;
            }
            Command::Queue => {
                let session = self
                    .scheduler
                    .find_session(guild_id)
                    .ok_or(MusicError::EmptyQueue)?;
                self.paginator.present(&session, channel.as_ref()).await?;
            }
            Command::Connect => {
                let joined = self.attachment.connect_to_user(guild_id, user_channel).await?;
                channel.say(&format!("🔊 Connected to <#{}>", joined)).await?;
            }
            Command::Disconnect => {
                self.scheduler.disconnect(guild_id).await?;
                channel.say("👋 Disconnected").await?;
            }
            Command::Help => {
                channel.say(&commands::help_text(&self.prefix)).await?;
            }
        }

        Ok(())
    }
}

fn added_message(added: &[TrackDescriptor]) -> String {
    match added {
        [track] => format!("Added to queue: {}", track.title()),
        tracks => format!("Added {} songs to queue", tracks.len()),
    }
}

/// Entry point for every gateway message.
pub async fn handle_message(ctx: &Context, msg: &Message, runner: &CommandRunner) -> Result<()> {
    if msg.author.bot {
        return Ok(());
    }
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    let Some(parsed) = Command::parse(runner.prefix(), &msg.content) else {
        return Ok(());
    };

    let channel: Arc<dyn ChatChannel> = Arc::new(DiscordChannel::new(ctx, msg.channel_id));
    let command = match parsed {
        Ok(command) => command,
        Err(ParseError::Unknown(name)) => {
            let text = format!("Unknown command `{}`. Try `{}help`.", name, runner.prefix());
            return channel.say(&text).await;
        }
        Err(ParseError::MissingQuery(name)) => {
            let text = format!("Usage: `{}{} <query>`", runner.prefix(), name);
            return channel.say(&text).await;
        }
    };

    info!(
        "📝 Command {}{} by {} in guild {}",
        runner.prefix(),
        command.name(),
        msg.author.name,
        guild_id
    );

    let user_channel = if command.needs_voice() {
        user_voice_channel(ctx, guild_id, msg.author.id)
    } else {
        None
    };

    let request = Request {
        guild_id,
        user_id: msg.author.id,
        user_channel,
        channel,
    };
    runner.run(request, command).await
}

/// Voice channel `user_id` is connected to, from the gateway cache.
pub fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Non-bot users currently in `channel_id`.
pub fn humans_in_channel(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let bot_id = ctx.cache.current_user().id;
    let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
        return 0;
    };

    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id))
        .filter(|state| state.user_id != bot_id)
        .filter(|state| !state.member.as_ref().is_some_and(|member| member.user.bot))
        .count()
}

/// Channel a user left, if a voice state change took them out of one.
pub fn departed_channel(old: Option<ChannelId>, new: Option<ChannelId>) -> Option<ChannelId> {
    old.filter(|previous| Some(*previous) != new)
}
