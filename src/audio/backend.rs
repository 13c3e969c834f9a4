use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Notify;

use crate::error::MusicError;

/// Voice connection and audio output for every guild the bot is in.
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    /// Channel the bot is currently connected to in `guild_id`.
    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError>;

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError>;

    async fn leave(&self, guild_id: GuildId) -> Result<(), MusicError>;

    /// Starts streaming `stream_url` at `volume` (0.0 - 1.0). `on_finished` fires
    /// once when the track ends, is stopped, or errors.
    ///
    /// Fails with [`MusicError::StartAudioRace`] if a track is already live on
    /// the connection.
    async fn start_audio(
        &self,
        guild_id: GuildId,
        stream_url: &str,
        volume: f32,
        on_finished: FinishSignal,
    ) -> Result<(), MusicError>;

    async fn pause(&self, guild_id: GuildId) -> Result<(), MusicError>;

    async fn resume(&self, guild_id: GuildId) -> Result<(), MusicError>;

    /// Stops the live track, which fires its finish signal.
    async fn stop(&self, guild_id: GuildId) -> Result<(), MusicError>;
}

/// Completion callback for a single started track.
///
/// Clones share the same fired flag, so handlers registered for several track
/// events still release the waiting scheduler exactly once.
#[derive(Debug, Clone)]
pub struct FinishSignal {
    notify: Arc<Notify>,
    fired: Arc<AtomicBool>,
}

impl FinishSignal {
    pub fn new(notify: Arc<Notify>) -> Self {
        Self {
            notify,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fire(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }

    #[cfg(test)]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
