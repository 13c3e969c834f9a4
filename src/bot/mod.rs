//! # Bot Module
//!
//! Gateway glue for the jukebox.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`] trait and turns
//! gateway events into calls on the playback core:
//!
//! - `message`: prefix commands, parsed by [`commands`] and executed by
//!   [`handlers::CommandRunner`]
//! - `voice_state_update`: leaves when the last listener goes, and cleans up
//!   when the bot is disconnected from voice by someone else
//!
//! ## Example
//!
//! ```rust,no_run
//! let runner = CommandRunner::new(config.command_prefix.clone(), scheduler, attachment, paginator);
//! let bot = JukeboxBot::new(config, runner);
//! ```

use serenity::{
    all::{Context, EventHandler, Message, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod voice;

use crate::config::Config;
use handlers::CommandRunner;

pub struct JukeboxBot {
    config: Arc<Config>,
    runner: CommandRunner,
}

impl JukeboxBot {
    pub fn new(config: Config, runner: CommandRunner) -> Self {
        Self {
            config: Arc::new(config),
            runner,
        }
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());
        info!("⌨️ Listening for commands with prefix {:?}", self.config.command_prefix);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if let Err(e) = handlers::handle_message(&ctx, &msg, &self.runner).await {
            error!("Error handling message: {:?}", e);
        }
    }

    /// Leaves voice once no human listener remains in the bot's channel, and
    /// drops the session when the bot itself was disconnected.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let scheduler = self.runner.scheduler();
        let bot_id = ctx.cache.current_user().id;
        let old_channel = old.as_ref().and_then(|state| state.channel_id);

        if new.user_id == bot_id {
            if old_channel.is_some() && new.channel_id.is_none() {
                info!("🔌 Bot was disconnected from voice in guild {}", guild_id);
                if let Err(e) = scheduler.disconnect(guild_id).await {
                    debug!("Nothing to clean up in guild {}: {}", guild_id, e);
                }
            }
            return;
        }

        let Some(left) = handlers::departed_channel(old_channel, new.channel_id) else {
            return;
        };
        let Some(bot_channel) = scheduler.voice_channel(guild_id).await else {
            return;
        };
        if left != bot_channel || handlers::humans_in_channel(&ctx, guild_id, bot_channel) > 0 {
            return;
        }

        info!("🚪 Everyone left the voice channel in guild {}, leaving", guild_id);
        if let Err(e) = scheduler.disconnect(guild_id).await {
            warn!("Error leaving empty channel in guild {}: {}", guild_id, e);
        }
    }
}
