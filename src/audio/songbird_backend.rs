use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::HttpRequest,
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::backend::{FinishSignal, VoiceBackend};
use crate::error::MusicError;

/// [`VoiceBackend`] over songbird calls, streaming tracks over HTTP.
pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    current_tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            current_tracks: DashMap::new(),
        }
    }

    fn handle(&self, guild_id: GuildId) -> Option<TrackHandle> {
        self.current_tracks.get(&guild_id).map(|handle| handle.clone())
    }

    async fn play_mode(&self, guild_id: GuildId) -> Option<PlayMode> {
        let handle = self.handle(guild_id)?;
        handle.get_info().await.ok().map(|state| state.playing)
    }

    /// A playing or paused track still owns the connection.
    async fn has_live_track(&self, guild_id: GuildId) -> bool {
        matches!(
            self.play_mode(guild_id).await,
            Some(PlayMode::Play | PlayMode::Pause)
        )
    }

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError> {
        self.manager
            .join(guild_id, channel_id)
            .await
            .map_err(MusicError::voice)?;
        Ok(())
    }
}

#[async_trait]
impl VoiceBackend for SongbirdBackend {
    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.manager.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::new(channel.0.get()))
    }

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError> {
        self.connect(guild_id, channel_id).await?;
        info!("🔊 Joined voice channel {} in guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError> {
        self.connect(guild_id, channel_id).await?;
        info!("🔀 Moved to voice channel {} in guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), MusicError> {
        if let Some((_, handle)) = self.current_tracks.remove(&guild_id) {
            let _ = handle.stop();
        }

        if self.manager.get(guild_id).is_none() {
            return Err(MusicError::NotConnected);
        }
        self.manager.remove(guild_id).await.map_err(MusicError::voice)?;

        info!("👋 Left voice in guild {}", guild_id);
        Ok(())
    }

    async fn start_audio(
        &self,
        guild_id: GuildId,
        stream_url: &str,
        volume: f32,
        on_finished: FinishSignal,
    ) -> Result<(), MusicError> {
        let call = self.manager.get(guild_id).ok_or(MusicError::NotConnected)?;
        let mut call = call.lock().await;

        // checked while holding the call so two starts cannot interleave
        if self.has_live_track(guild_id).await {
            return Err(MusicError::StartAudioRace);
        }

        let input = HttpRequest::new(self.http.clone(), stream_url.to_string());
        let handle = call.play_input(input.into());
        drop(call);

        handle.set_volume(volume).map_err(MusicError::voice)?;
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackFinishedNotifier {
                        guild_id,
                        signal: on_finished.clone(),
                    },
                )
                .map_err(MusicError::voice)?;
        }

        self.current_tracks.insert(guild_id, handle);
        debug!("🎵 Started stream in guild {} at volume {:.2}", guild_id, volume);
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let handle = self.handle(guild_id).ok_or(MusicError::NotPlaying)?;
        handle.pause().map_err(MusicError::voice)?;
        info!("⏸️ Paused playback in guild {}", guild_id);
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let handle = self.handle(guild_id).ok_or(MusicError::NotPlaying)?;
        handle.play().map_err(MusicError::voice)?;
        info!("▶️ Resumed playback in guild {}", guild_id);
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let (_, handle) = self
            .current_tracks
            .remove(&guild_id)
            .ok_or(MusicError::NotPlaying)?;
        handle.stop().map_err(MusicError::voice)?;
        debug!("⏹️ Stopped track in guild {}", guild_id);
        Ok(())
    }
}

/// Releases the scheduler waiting on a track, whichever way the track ended.
struct TrackFinishedNotifier {
    guild_id: GuildId,
    signal: FinishSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishedNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _) in tracks.iter() {
                if let PlayMode::Errored(e) = &state.playing {
                    warn!("⚠️ Track errored in guild {}: {:?}", self.guild_id, e);
                }
            }
        }

        self.signal.fire();
        None
    }
}
