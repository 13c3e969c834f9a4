//! In-process stand-ins for the voice gateway, the chat channel and the
//! resolver, shared by the unit tests.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::{
    audio::backend::{FinishSignal, VoiceBackend},
    error::MusicError,
    sources::{self, Platform, Resolution, TrackDescriptor, TrackResolver},
    ui::{
        channel::{ChatChannel, ReactionEvent, ReactionStream},
        paginator::QueuePage,
    },
};

pub const REACTING_USER: UserId = UserId::new(7);

pub fn track(name: &str) -> TrackDescriptor {
    TrackDescriptor::new(Platform::YouTube, name, name)
}

pub fn tracks(count: usize) -> Vec<TrackDescriptor> {
    (1..=count).map(|i| track(&format!("track-{i}"))).collect()
}

/// Lets spawned tasks run until they block on something other than time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

struct LiveTrack {
    paused: bool,
    signal: FinishSignal,
}

#[derive(Default)]
struct VoiceInner {
    channels: HashMap<GuildId, ChannelId>,
    live: HashMap<GuildId, LiveTrack>,
    occupied: HashMap<GuildId, usize>,
    started: Vec<String>,
    calls: Vec<String>,
}

/// Voice backend that records calls and finishes tracks on demand.
#[derive(Default)]
pub struct FakeVoice {
    inner: Mutex<VoiceInner>,
}

impl FakeVoice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connected(guild_id: GuildId, channel_id: ChannelId) -> Arc<Self> {
        let voice = Self::default();
        voice.inner.lock().channels.insert(guild_id, channel_id);
        Arc::new(voice)
    }

    /// Ends the live track the way a natural end of stream would.
    pub fn finish_current(&self, guild_id: GuildId) {
        let live = self.inner.lock().live.remove(&guild_id);
        if let Some(live) = live {
            live.signal.fire();
        }
    }

    /// Makes the next `times` starts fail as if another track were live.
    pub fn occupy(&self, guild_id: GuildId, times: usize) {
        self.inner.lock().occupied.insert(guild_id, times);
    }

    /// Stream URLs of every successful start, in order.
    pub fn started(&self) -> Vec<String> {
        self.inner.lock().started.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().live.len()
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.inner.lock().channels.contains_key(&guild_id)
    }

    /// A track is live and not paused.
    pub fn is_playing(&self, guild_id: GuildId) -> bool {
        self.inner
            .lock()
            .live
            .get(&guild_id)
            .is_some_and(|live| !live.paused)
    }
}

#[async_trait]
impl VoiceBackend for FakeVoice {
    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.inner.lock().channels.get(&guild_id).copied()
    }

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError> {
        let mut inner = self.inner.lock();
        inner.calls.push(format!("join {channel_id}"));
        inner.channels.insert(guild_id, channel_id);
        Ok(())
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError> {
        let mut inner = self.inner.lock();
        inner.calls.push(format!("move {channel_id}"));
        inner.channels.insert(guild_id, channel_id);
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let mut inner = self.inner.lock();
        inner.calls.push("leave".to_string());
        inner.live.remove(&guild_id);
        inner
            .channels
            .remove(&guild_id)
            .map(|_| ())
            .ok_or(MusicError::NotConnected)
    }

    async fn start_audio(
        &self,
        guild_id: GuildId,
        stream_url: &str,
        _volume: f32,
        on_finished: FinishSignal,
    ) -> Result<(), MusicError> {
        let mut inner = self.inner.lock();
        inner.calls.push("start".to_string());
        if !inner.channels.contains_key(&guild_id) {
            return Err(MusicError::NotConnected);
        }
        if let Some(times) = inner.occupied.get_mut(&guild_id).filter(|times| **times > 0) {
            *times -= 1;
            return Err(MusicError::StartAudioRace);
        }
        if inner.live.contains_key(&guild_id) {
            return Err(MusicError::StartAudioRace);
        }

        inner.started.push(stream_url.to_string());
        inner.live.insert(
            guild_id,
            LiveTrack {
                paused: false,
                signal: on_finished,
            },
        );
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let mut inner = self.inner.lock();
        inner.calls.push("pause".to_string());
        let live = inner.live.get_mut(&guild_id).ok_or(MusicError::NotPlaying)?;
        live.paused = true;
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let mut inner = self.inner.lock();
        inner.calls.push("resume".to_string());
        let live = inner.live.get_mut(&guild_id).ok_or(MusicError::NotPlaying)?;
        live.paused = false;
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let live = {
            let mut inner = self.inner.lock();
            inner.calls.push("stop".to_string());
            inner.live.remove(&guild_id)
        };
        let live = live.ok_or(MusicError::NotPlaying)?;
        live.signal.fire();
        Ok(())
    }
}

#[derive(Default)]
struct ChannelLog {
    said: Vec<String>,
    sent: Vec<usize>,
    edits: Vec<usize>,
    added: Vec<String>,
    removed: usize,
}

/// Chat channel that records output. Like the gateway, [`FakeChannel::react`]
/// only reaches subscriptions that are open at that moment.
#[derive(Clone)]
pub struct FakeChannel {
    log: Arc<Mutex<ChannelLog>>,
    watchers: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>>,
    next_message: Arc<AtomicU64>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self {
            log: Arc::default(),
            watchers: Arc::default(),
            next_message: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn react(&self, emoji: &str) {
        self.watchers
            .lock()
            .retain(|watcher| watcher.send(emoji.to_string()).is_ok());
    }

    pub fn said(&self) -> Vec<String> {
        self.log.lock().said.clone()
    }

    pub fn sent_pages(&self) -> Vec<usize> {
        self.log.lock().sent.clone()
    }

    pub fn edited_pages(&self) -> Vec<usize> {
        self.log.lock().edits.clone()
    }

    pub fn reactions_added(&self) -> Vec<String> {
        self.log.lock().added.clone()
    }

    pub fn removed_reactions(&self) -> usize {
        self.log.lock().removed
    }
}

#[async_trait]
impl ChatChannel for FakeChannel {
    async fn say(&self, text: &str) -> Result<()> {
        self.log.lock().said.push(text.to_string());
        Ok(())
    }

    async fn send_page(&self, page: &QueuePage) -> Result<MessageId> {
        self.log.lock().sent.push(page.number);
        Ok(MessageId::new(self.next_message.fetch_add(1, Ordering::Relaxed)))
    }

    async fn edit_page(&self, _message: MessageId, page: &QueuePage) -> Result<()> {
        self.log.lock().edits.push(page.number);
        Ok(())
    }

    async fn add_reaction(&self, _message: MessageId, emoji: &str) -> Result<()> {
        self.log.lock().added.push(emoji.to_string());
        Ok(())
    }

    async fn watch_reactions(&self, _message: MessageId, accepted: &[&str]) -> Result<ReactionStream> {
        let (watcher, inbox) = mpsc::unbounded_channel();
        self.watchers.lock().push(watcher);
        let accepted: Vec<String> = accepted.iter().map(|emoji| emoji.to_string()).collect();

        let reactions = stream::unfold(inbox, |mut inbox| async move {
            inbox.recv().await.map(|emoji| (emoji, inbox))
        })
        .filter(move |emoji| futures::future::ready(accepted.contains(emoji)))
        .map(|emoji| ReactionEvent {
            emoji,
            user_id: Some(REACTING_USER),
        });
        Ok(reactions.boxed())
    }

    async fn remove_reaction(&self, _message: MessageId, _reaction: &ReactionEvent) -> Result<()> {
        self.log.lock().removed += 1;
        Ok(())
    }
}

/// Resolver keyed by query text: queries starting with `missing` find nothing,
/// tracks titled `broken…` cannot be streamed.
#[derive(Default)]
pub struct FakeResolver;

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, query: &str) -> Result<Resolution, MusicError> {
        if query.starts_with("missing") {
            return Err(MusicError::resolution("no results"));
        }
        Ok(Resolution {
            is_link: sources::is_link(query),
            tracks: vec![track(query)],
        })
    }

    async fn stream_url(&self, track: &TrackDescriptor) -> Result<String, MusicError> {
        if track.title().starts_with("broken") {
            return Err(MusicError::resolution("stream unavailable"));
        }
        Ok(format!("stream://{}", track.source()))
    }
}
