use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::debug;

use crate::{audio::backend::VoiceBackend, error::MusicError};

/// Puts the bot in the caller's voice channel before playback commands run.
#[derive(Clone)]
pub struct VoiceAttachment {
    voice: Arc<dyn VoiceBackend>,
}

impl VoiceAttachment {
    pub fn new(voice: Arc<dyn VoiceBackend>) -> Self {
        Self { voice }
    }

    /// Joins `user_channel`, or moves there if the bot sits in another
    /// channel of the guild. Fails when the caller is not in voice.
    pub async fn connect_to_user(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
    ) -> Result<ChannelId, MusicError> {
        let target = user_channel.ok_or(MusicError::VoiceChannelRequired)?;

        match self.voice.current_channel(guild_id).await {
            Some(current) if current == target => {
                debug!("Already in voice channel {} in guild {}", target, guild_id);
            }
            Some(_) => self.voice.move_to(guild_id, target).await?,
            None => self.voice.join(guild_id, target).await?,
        }

        Ok(target)
    }
}
