use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::{debug, info};

use super::{backend::FinishSignal, queue::TrackQueue};
use crate::sources::TrackDescriptor;

/// Where a guild's playback loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    /// No track playing; the queue may still hold entries.
    #[default]
    Idle,
    Playing,
    Paused,
    /// Queue ran dry and the idle-disconnect timer is pending.
    Draining,
    /// Session was torn down and removed from the registry.
    Terminated,
}

/// Fields guarded by the session lock.
#[derive(Debug, Default)]
pub struct SessionState {
    pub queue: TrackQueue,
    pub current_track: Option<TrackDescriptor>,
    pub loop_enabled: bool,
    /// A disconnect timer is pending. Cleared by any enqueue.
    pub idle_armed: bool,
    /// Bumped every time a timer is armed; a timer only acts on its own value.
    pub idle_generation: u64,
    /// A playback loop is progressing this session.
    pub loop_active: bool,
    pub player: PlayerState,
}

impl SessionState {
    /// Picks what the playback loop should play next: the current track again
    /// while looping, otherwise the head of the queue.
    pub fn next_track(&mut self) -> Option<TrackDescriptor> {
        if self.loop_enabled {
            if let Some(current) = &self.current_track {
                return Some(current.clone());
            }
        }

        let next = self.queue.pop_front().ok()?;
        self.current_track = Some(next.clone());
        Some(next)
    }

    pub fn is_terminated(&self) -> bool {
        self.player == PlayerState::Terminated
    }

    /// Nothing queued, nothing current and no loop running.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.current_track.is_none() && !self.loop_active
    }

    pub(crate) fn terminate(&mut self) {
        self.queue.clear();
        self.current_track = None;
        self.loop_enabled = false;
        self.idle_armed = false;
        self.player = PlayerState::Terminated;
    }
}

/// Playback state of one guild.
#[derive(Debug)]
pub struct GuildSession {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    track_finished: Arc<Notify>,
}

impl GuildSession {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            state: Mutex::new(SessionState::default()),
            track_finished: Arc::new(Notify::new()),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Keep the guard scoped to a read-modify-write; never hold it across a
    /// network call.
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Fresh completion callback for the next started track.
    pub fn finish_signal(&self) -> FinishSignal {
        FinishSignal::new(self.track_finished.clone())
    }

    /// Suspends until the current track's finish signal fires.
    pub async fn track_finished(&self) {
        self.track_finished.notified().await;
    }
}

/// Process-wide map of guild sessions, populated on first use.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the guild's session, creating an empty one atomically on first
    /// access.
    pub fn get(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🆕 Creating session for guild {}", guild_id);
                Arc::new(GuildSession::new(guild_id))
            })
            .clone()
    }

    /// Returns the session only if one already exists.
    pub fn find(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|entry| entry.clone())
    }

    #[cfg(test)]
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        let removed = self.sessions.remove(&guild_id).map(|(_, session)| session);
        if removed.is_some() {
            info!("🗑️ Removed session for guild {}", guild_id);
        }
        removed
    }

    /// Removes `session` only if it is still the registered one, so a stale
    /// timer cannot evict a newer session of the same guild.
    pub fn remove_session(&self, session: &Arc<GuildSession>) -> bool {
        let guild_id = session.guild_id();
        let removed = self
            .sessions
            .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, session))
            .is_some();
        if removed {
            info!("🗑️ Removed session for guild {}", guild_id);
        }
        removed
    }

    #[cfg(test)]
    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
