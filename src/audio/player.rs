use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    backend::VoiceBackend,
    session::{GuildSession, PlayerState, SessionRegistry, SessionState},
};
use crate::{
    config::Config,
    error::MusicError,
    sources::{TrackDescriptor, TrackResolver},
    ui::channel::ChatChannel,
};

/// Pause before retrying a start that lost a race for the connection.
pub const START_RETRY_DELAY: Duration = Duration::from_millis(250);

pub const LEAVING_MESSAGE: &str = "Queue is empty, so I'm leaving. See you next time!";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSettings {
    /// Gain applied to every started track, 0.0 - 1.0.
    pub volume: f32,
    /// Grace period between the queue running dry and leaving voice.
    pub idle_disconnect: Duration,
}

impl PlaybackSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            volume: config.volume_fraction,
            idle_disconnect: Duration::from_secs(config.idle_disconnect_secs),
        }
    }
}

/// What happened to one dequeued track.
enum Step {
    Next,
    Exit,
}

/// Drives playback for every guild: queueing, the per-guild playback loop,
/// transport controls and teardown.
#[derive(Clone)]
pub struct PlaybackScheduler {
    registry: Arc<SessionRegistry>,
    voice: Arc<dyn VoiceBackend>,
    resolver: Arc<dyn TrackResolver>,
    settings: PlaybackSettings,
}

impl PlaybackScheduler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        voice: Arc<dyn VoiceBackend>,
        resolver: Arc<dyn TrackResolver>,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            registry,
            voice,
            resolver,
            settings,
        }
    }

    pub fn session(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.registry.get(guild_id)
    }

    pub fn find_session(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.registry.find(guild_id)
    }

    /// Voice channel the bot is connected to in `guild_id`.
    pub async fn voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.voice.current_channel(guild_id).await
    }

    /// Resolves `query` and queues every track it produced.
    pub async fn enqueue_query(
        &self,
        session: &GuildSession,
        requester: UserId,
        query: &str,
    ) -> Result<Vec<TrackDescriptor>, MusicError> {
        let resolution = self.resolver.resolve(query).await?;
        debug!(
            "🔍 '{}' resolved to {} track(s) (link: {})",
            query,
            resolution.tracks.len(),
            resolution.is_link
        );
        self.enqueue(session, requester, resolution.tracks).await
    }

    /// Appends `tracks` in order and cancels any pending idle disconnect.
    /// Nothing is queued if `tracks` is empty.
    pub async fn enqueue(
        &self,
        session: &GuildSession,
        requester: UserId,
        tracks: Vec<TrackDescriptor>,
    ) -> Result<Vec<TrackDescriptor>, MusicError> {
        if tracks.is_empty() {
            return Err(MusicError::resolution("no results"));
        }

        let tracks: Vec<_> = tracks
            .into_iter()
            .map(|track| track.with_requested_by(requester))
            .collect();

        let mut state = session.lock().await;
        if state.is_terminated() {
            return Err(MusicError::NotConnected);
        }
        state.idle_armed = false;
        for track in &tracks {
            state.queue.push_back(track.clone());
        }

        info!(
            "➕ Queued {} track(s) in guild {} ({} pending)",
            tracks.len(),
            session.guild_id(),
            state.queue.len()
        );
        Ok(tracks)
    }

    /// Runs [`advance`](Self::advance) on its own task.
    pub fn spawn_advance(&self, session: Arc<GuildSession>, channel: Arc<dyn ChatChannel>) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.advance(session, channel).await })
    }

    /// Plays the queue until it runs dry or the session is torn down.
    ///
    /// At most one loop runs per session; a call made while another loop is
    /// active returns immediately.
    pub async fn advance(&self, session: Arc<GuildSession>, channel: Arc<dyn ChatChannel>) {
        let guild_id = session.guild_id();
        {
            let mut state = session.lock().await;
            if state.loop_active || state.is_terminated() {
                debug!("Playback loop already running in guild {}", guild_id);
                return;
            }
            state.loop_active = true;
        }
        info!("▶️ Playback loop started in guild {}", guild_id);

        loop {
            let track = {
                let mut state = session.lock().await;
                if leave_if_terminated(&mut state) {
                    debug!("Playback loop in guild {} saw teardown", guild_id);
                    return;
                }
                match state.next_track() {
                    Some(track) => track,
                    None => {
                        state.player = PlayerState::Draining;
                        state.loop_active = false;
                        break;
                    }
                }
            };

            if let Step::Exit = self.play_track(&session, channel.as_ref(), track).await {
                return;
            }
        }

        info!("📭 Queue drained in guild {}", guild_id);
        self.disconnect_if_idle(session, channel, self.settings.idle_disconnect)
            .await;
    }

    /// One loop iteration: stream, start, wait for the end.
    async fn play_track(
        &self,
        session: &GuildSession,
        channel: &dyn ChatChannel,
        track: TrackDescriptor,
    ) -> Step {
        let guild_id = session.guild_id();

        let stream_url = match self.resolver.stream_url(&track).await {
            Ok(url) => url,
            Err(e) => {
                warn!("⚠️ Could not stream '{}' in guild {}: {}", track.title(), guild_id, e);
                {
                    let mut state = session.lock().await;
                    if leave_if_terminated(&mut state) {
                        return Step::Exit;
                    }
                    state.current_track = None;
                }
                report(channel, &e.to_string()).await;
                return Step::Next;
            }
        };

        let started = self
            .voice
            .start_audio(guild_id, &stream_url, self.settings.volume, session.finish_signal())
            .await;

        if let Err(e) = started {
            let mut state = session.lock().await;
            if leave_if_terminated(&mut state) {
                debug!("Dropping start failure in guild {} after teardown: {}", guild_id, e);
                return Step::Exit;
            }

            match e {
                MusicError::StartAudioRace => {
                    debug!("Connection in guild {} busy, retrying '{}'", guild_id, track.title());
                    if !state.loop_enabled {
                        state.current_track = None;
                        state.queue.push_front(track);
                    }
                    drop(state);
                    tokio::time::sleep(START_RETRY_DELAY).await;
                    return Step::Next;
                }
                MusicError::NotConnected => {
                    warn!("🔌 Not connected in guild {}, stopping playback loop", guild_id);
                    if !state.loop_enabled {
                        state.current_track = None;
                        state.queue.push_front(track);
                    }
                    state.player = PlayerState::Idle;
                    state.loop_active = false;
                    drop(state);
                    report(channel, &MusicError::NotConnected.to_string()).await;
                    return Step::Exit;
                }
                e => {
                    error!("❌ Failed to start '{}' in guild {}: {}", track.title(), guild_id, e);
                    state.current_track = None;
                    drop(state);
                    report(channel, &e.to_string()).await;
                    return Step::Next;
                }
            }
        }

        {
            let mut state = session.lock().await;
            if leave_if_terminated(&mut state) {
                drop(state);
                // teardown raced the start; nothing may keep playing
                if let Err(e) = self.voice.stop(guild_id).await {
                    debug!("Nothing to stop in guild {}: {}", guild_id, e);
                }
                return Step::Exit;
            }
            state.player = PlayerState::Playing;
        }
        info!(
            "🎵 Now playing in guild {} [{}]: {}",
            guild_id,
            track.platform(),
            track.title()
        );
        report(channel, &format!("Now playing: {}", track.title())).await;

        session.track_finished().await;

        let mut state = session.lock().await;
        if leave_if_terminated(&mut state) {
            return Step::Exit;
        }
        state.player = PlayerState::Idle;
        if !state.loop_enabled {
            state.current_track = None;
        }
        Step::Next
    }

    pub async fn pause(&self, session: &GuildSession) -> Result<(), MusicError> {
        if session.lock().await.player != PlayerState::Playing {
            return Err(MusicError::NotPlaying);
        }

        self.voice.pause(session.guild_id()).await?;

        let mut state = session.lock().await;
        if state.player == PlayerState::Playing {
            state.player = PlayerState::Paused;
        }
        Ok(())
    }

    /// Resumes a paused track. Returns `false` when nothing was paused, in
    /// which case callers fall back to starting the queue.
    pub async fn resume(&self, session: &GuildSession) -> Result<bool, MusicError> {
        if session.lock().await.player != PlayerState::Paused {
            return Ok(false);
        }

        self.voice.resume(session.guild_id()).await?;

        let mut state = session.lock().await;
        if state.player == PlayerState::Paused {
            state.player = PlayerState::Playing;
        }
        Ok(true)
    }

    /// Stops the current track; the playback loop moves on by itself.
    pub async fn skip(&self, session: &GuildSession) -> Result<(), MusicError> {
        let player = session.lock().await.player;
        if !matches!(player, PlayerState::Playing | PlayerState::Paused) {
            return Err(MusicError::NotPlaying);
        }

        self.voice.stop(session.guild_id()).await?;
        info!("⏭️ Skipped track in guild {}", session.guild_id());
        Ok(())
    }

    /// Flips looping of the current track. Returns the new setting and the
    /// track it applies to.
    pub async fn toggle_loop(&self, session: &GuildSession) -> Result<(bool, TrackDescriptor), MusicError> {
        let mut state = session.lock().await;
        let current = state
            .current_track
            .clone()
            .ok_or(MusicError::NothingPlaying)?;

        state.loop_enabled = !state.loop_enabled;
        if state.loop_enabled && state.queue.is_empty() {
            state.queue.push_front(current.clone());
        }

        info!(
            "🔁 Loop {} in guild {}",
            if state.loop_enabled { "enabled" } else { "disabled" },
            session.guild_id()
        );
        Ok((state.loop_enabled, current))
    }

    /// Shuffles the pending queue; the current track keeps playing.
    pub async fn shuffle(&self, session: &GuildSession) -> Result<usize, MusicError> {
        let mut state = session.lock().await;
        if state.queue.is_empty() {
            return Err(MusicError::EmptyQueue);
        }
        state.queue.shuffle_remaining();
        Ok(state.queue.len())
    }

    /// Arms the idle timer unless it already is. After `grace`, the session is
    /// torn down if nothing was queued or played in the meantime and no later
    /// timer has replaced this one.
    pub async fn disconnect_if_idle(
        &self,
        session: Arc<GuildSession>,
        channel: Arc<dyn ChatChannel>,
        grace: Duration,
    ) {
        let generation = {
            let mut state = session.lock().await;
            if state.idle_armed || state.is_terminated() {
                return;
            }
            state.idle_armed = true;
            state.idle_generation += 1;
            state.idle_generation
        };

        let guild_id = session.guild_id();
        debug!("⏳ Idle disconnect armed in guild {} ({:?})", guild_id, grace);

        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;

            {
                let mut state = session.lock().await;
                let stale = state.idle_generation != generation;
                if stale || !state.idle_armed || !state.is_idle() || state.is_terminated() {
                    debug!("Idle disconnect in guild {} superseded", guild_id);
                    return;
                }
                state.terminate();
                scheduler.registry.remove_session(&session);
            }

            if let Err(e) = scheduler.voice.leave(guild_id).await {
                warn!("⚠️ Could not leave voice in guild {}: {}", guild_id, e);
            }
            info!("💤 Left guild {} after idling", guild_id);
            report(channel.as_ref(), LEAVING_MESSAGE).await;
        });
    }

    /// Hard stop: clears the session, stops audio and leaves voice.
    pub async fn disconnect(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let session = self.registry.find(guild_id);
        let connected = self.voice.current_channel(guild_id).await.is_some();
        if session.is_none() && !connected {
            return Err(MusicError::NotConnected);
        }

        if let Some(session) = &session {
            session.lock().await.terminate();
        }
        if let Err(e) = self.voice.stop(guild_id).await {
            debug!("Nothing to stop in guild {}: {}", guild_id, e);
        }
        if let Some(session) = &session {
            self.registry.remove_session(session);
        }
        if connected {
            self.voice.leave(guild_id).await?;
        }

        info!("👋 Disconnected from guild {}", guild_id);
        Ok(())
    }
}

/// Once a session is torn down the loop must exit without touching its
/// queue or player state again.
fn leave_if_terminated(state: &mut SessionState) -> bool {
    if state.is_terminated() {
        state.loop_active = false;
        return true;
    }
    false
}

async fn report(channel: &dyn ChatChannel, text: &str) {
    if let Err(e) = channel.say(text).await {
        warn!("⚠️ Could not send message: {:?}", e);
    }
}
