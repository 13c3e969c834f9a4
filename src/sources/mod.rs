//! # Sources Module
//!
//! Turns what a user typed into playable track descriptors.
//!
//! A query is either a link (playlist parameter or a known platform domain) that
//! is handed to the resolver verbatim, or free text that is searched on the
//! default provider. Resolution only produces metadata: the streamable URL of a
//! track expires, so it is resolved again right before the track starts.

pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use serenity::model::id::UserId;
use std::{fmt, sync::LazyLock, time::Duration};

use crate::error::MusicError;

pub use ytdlp::YtDlpResolver;

static PLATFORM_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|[\s/.])(youtube\.com|youtu\.be|soundcloud\.com)(/|$)")
        .expect("platform link pattern is valid")
});

/// Resolver interface consumed by the playback core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolves a free-text query or link into one or more tracks.
    async fn resolve(&self, query: &str) -> Result<Resolution, MusicError>;

    /// Produces a fresh streamable audio URL for an already resolved track.
    async fn stream_url(&self, track: &TrackDescriptor) -> Result<String, MusicError>;
}

/// Result of resolving a single query.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub is_link: bool,
    pub tracks: Vec<TrackDescriptor>,
}

/// Platform a track was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    YouTube,
    SoundCloud,
    Other,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::YouTube => "YouTube",
            Platform::SoundCloud => "SoundCloud",
            Platform::Other => "Web",
        };
        f.write_str(name)
    }
}

/// Resolved, immutable metadata for one playable item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    platform: Platform,
    source: String,
    title: String,
    duration: Option<Duration>,
    requested_by: Option<UserId>,
}

impl TrackDescriptor {
    /// `source` is the platform's stable id (YouTube) or the track URL.
    pub fn new(platform: Platform, source: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            platform,
            source: source.into(),
            title: title.into(),
            duration: None,
            requested_by: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = Some(user_id);
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    #[cfg(test)]
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    /// Page URL the stream is extracted from.
    pub fn page_url(&self) -> String {
        match self.platform {
            Platform::YouTube if !self.source.contains("://") => {
                format!("https://www.youtube.com/watch?v={}", self.source)
            }
            _ => self.source.clone(),
        }
    }
}

/// Whether a query should be handed to the resolver as a link rather than
/// searched as free text.
pub fn is_link(query: &str) -> bool {
    query.contains("list=") || PLATFORM_LINK.is_match(query)
}
