use anyhow::Result;
use futures::StreamExt;
use serenity::model::id::UserId;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use super::{channel::ChatChannel, embeds::format_duration};
use crate::{audio::session::GuildSession, error::MusicError, sources::TrackDescriptor};

pub const PREVIOUS_PAGE: &str = "\u{25c0}";
pub const NEXT_PAGE: &str = "\u{25b6}";

/// Shown instead of a length for tracks the platform reports none for.
pub const UNKNOWN_LENGTH: &str = "Unknown length";

/// One rendered line of the queue view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// 1-based position in the queue.
    pub position: usize,
    pub title: String,
    pub length: String,
    pub requested_by: Option<UserId>,
}

/// A single page of the queue view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePage {
    pub number: usize,
    pub total_pages: usize,
    pub entries: Vec<QueueEntry>,
}

/// Fixed-size pages over a queue snapshot.
#[derive(Debug, Clone)]
pub struct QueuePages {
    tracks: Vec<TrackDescriptor>,
    page_size: usize,
}

impl QueuePages {
    pub fn new(tracks: Vec<TrackDescriptor>, page_size: usize) -> Self {
        Self {
            tracks,
            page_size: page_size.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn total_pages(&self) -> usize {
        self.tracks.len().div_ceil(self.page_size)
    }

    /// Renders page `number` (1-based, clamped to the valid range).
    pub fn page(&self, number: usize) -> QueuePage {
        let number = number.clamp(1, self.total_pages().max(1));
        let start = (number - 1) * self.page_size;
        let end = (start + self.page_size).min(self.tracks.len());

        let entries = self.tracks[start.min(end)..end]
            .iter()
            .enumerate()
            .map(|(offset, track)| QueueEntry {
                position: start + offset + 1,
                title: track.title().to_string(),
                length: track
                    .duration()
                    .map(format_duration)
                    .unwrap_or_else(|| UNKNOWN_LENGTH.to_string()),
                requested_by: track.requested_by(),
            })
            .collect();

        QueuePage {
            number,
            total_pages: self.total_pages(),
            entries,
        }
    }
}

/// Interactive, timeout-bounded view of a guild's queue.
#[derive(Debug, Clone)]
pub struct QueuePaginator {
    page_size: usize,
    timeout: Duration,
}

impl QueuePaginator {
    pub fn new(page_size: usize, timeout: Duration) -> Self {
        Self { page_size, timeout }
    }

    /// Shows page 1 of a queue snapshot and follows previous/next reactions
    /// until nobody reacts for the configured timeout. Returns the page that
    /// was showing when the view closed.
    ///
    /// Tracks queued after the snapshot are not shown until the view is
    /// opened again.
    pub async fn present(&self, session: &GuildSession, channel: &dyn ChatChannel) -> Result<usize> {
        let snapshot = session.lock().await.queue.snapshot();
        let pages = QueuePages::new(snapshot, self.page_size);
        if pages.is_empty() {
            return Err(MusicError::EmptyQueue.into());
        }

        let mut current = 1;
        let message = channel.send_page(&pages.page(current)).await?;
        // subscribe before anything else can react, and keep the one
        // subscription for the life of the view
        let mut reactions = channel
            .watch_reactions(message, &[PREVIOUS_PAGE, NEXT_PAGE])
            .await?;
        channel.add_reaction(message, PREVIOUS_PAGE).await?;
        channel.add_reaction(message, NEXT_PAGE).await?;

        while let Ok(Some(reaction)) = timeout(self.timeout, reactions.next()).await {
            let target = match reaction.emoji.as_str() {
                PREVIOUS_PAGE if current > 1 => Some(current - 1),
                NEXT_PAGE if current < pages.total_pages() => Some(current + 1),
                _ => None,
            };

            if let Some(page) = target {
                current = page;
                channel.edit_page(message, &pages.page(current)).await?;
            }

            if let Err(e) = channel.remove_reaction(message, &reaction).await {
                debug!("Could not remove queue reaction: {:?}", e);
            }
        }

        debug!(
            "📋 Queue view for guild {} closed on page {}",
            session.guild_id(),
            current
        );
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sources::Platform,
        testing::{settle, tracks, FakeChannel},
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::GuildId;
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_secs(30);

    async fn session_with(count: usize) -> GuildSession {
        let session = GuildSession::new(GuildId::new(1));
        {
            let mut state = session.lock().await;
            for track in tracks(count) {
                state.queue.push_back(track);
            }
        }
        session
    }

    #[test]
    fn twenty_five_entries_make_three_pages() {
        let pages = QueuePages::new(tracks(25), 10);
        assert_eq!(pages.total_pages(), 3);

        let last = pages.page(3);
        assert_eq!(last.entries.len(), 5);
        assert_eq!(last.entries[0].position, 21);
        assert_eq!(last.entries[4].position, 25);
    }

    #[test]
    fn renders_lengths_and_placeholder() {
        let tracks = vec![
            TrackDescriptor::new(Platform::YouTube, "a", "Short")
                .with_duration(Duration::from_secs(65))
                .with_requested_by(UserId::new(9)),
            TrackDescriptor::new(Platform::YouTube, "b", "Long").with_duration(Duration::from_secs(3725)),
            TrackDescriptor::new(Platform::SoundCloud, "https://soundcloud.com/x/y", "y"),
        ];
        let page = QueuePages::new(tracks, 10).page(1);

        let lengths: Vec<_> = page.entries.iter().map(|e| e.length.as_str()).collect();
        assert_eq!(lengths, vec!["1:05", "1:02:05", UNKNOWN_LENGTH]);
        assert_eq!(page.entries[0].requested_by, Some(UserId::new(9)));
        assert_eq!(page.entries[2].requested_by, None);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_is_reported_without_a_view() {
        let session = session_with(0).await;
        let channel = FakeChannel::new();
        let paginator = QueuePaginator::new(10, TIMEOUT);

        let err = paginator.present(&session, &channel).await.unwrap_err();

        assert_eq!(err.downcast_ref::<MusicError>(), Some(&MusicError::EmptyQueue));
        assert!(channel.sent_pages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_stays_within_bounds() {
        let session = session_with(25).await;
        let channel = FakeChannel::new();
        let paginator = QueuePaginator::new(10, TIMEOUT);

        let view = tokio::spawn({
            let channel = channel.clone();
            async move { paginator.present(&session, &channel).await }
        });
        settle().await;

        // one burst: later reactions land while earlier ones are being handled
        for emoji in [PREVIOUS_PAGE, NEXT_PAGE, NEXT_PAGE, NEXT_PAGE, PREVIOUS_PAGE] {
            channel.react(emoji);
        }

        let closed_on = view.await.unwrap().unwrap();

        assert_eq!(channel.sent_pages(), vec![1]);
        assert_eq!(channel.reactions_added(), vec![PREVIOUS_PAGE, NEXT_PAGE]);
        // previous on page 1 and next on page 3 are no-ops
        assert_eq!(channel.edited_pages(), vec![2, 3, 2]);
        assert_eq!(closed_on, 2);
        assert_eq!(channel.removed_reactions(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn ignores_other_emoji() {
        let session = session_with(25).await;
        let channel = FakeChannel::new();
        let paginator = QueuePaginator::new(10, TIMEOUT);

        let view = tokio::spawn({
            let channel = channel.clone();
            async move { paginator.present(&session, &channel).await }
        });
        settle().await;
        channel.react("\u{1f44d}");
        channel.react(NEXT_PAGE);

        assert_eq!(view.await.unwrap().unwrap(), 2);
        assert_eq!(channel.edited_pages(), vec![2]);
        assert_eq!(channel.removed_reactions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closes_after_timeout_without_further_edits() {
        let session = session_with(12).await;
        let channel = FakeChannel::new();
        let paginator = QueuePaginator::new(10, TIMEOUT);

        let view = tokio::spawn({
            let channel = channel.clone();
            async move { paginator.present(&session, &channel).await }
        });

        assert_eq!(view.await.unwrap().unwrap(), 1);
        channel.react(NEXT_PAGE);
        settle().await;

        assert_eq!(channel.sent_pages(), vec![1]);
        assert!(channel.edited_pages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tracks_added_after_opening_are_not_shown() {
        let session = Arc::new(session_with(10).await);
        let channel = FakeChannel::new();
        let paginator = QueuePaginator::new(10, TIMEOUT);

        let view = tokio::spawn({
            let channel = channel.clone();
            let session = session.clone();
            async move { paginator.present(&session, &channel).await }
        });
        settle().await;

        {
            let mut state = session.lock().await;
            for track in tracks(15) {
                state.queue.push_back(track);
            }
        }
        channel.react(NEXT_PAGE);

        assert_eq!(view.await.unwrap().unwrap(), 1);
        assert!(channel.edited_pages().is_empty());
        assert_eq!(session.lock().await.queue.len(), 25);
    }
}
