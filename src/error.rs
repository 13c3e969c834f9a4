use thiserror::Error;

/// Failures a music command can report back to the invoking channel.
///
/// The `Display` text of every variant is what the user sees, so the playback
/// core never formats chat messages for errors itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MusicError {
    #[error("Error in finding song: {0}")]
    ResolutionFailed(String),

    #[error("Queue is empty! Add some songs first.")]
    EmptyQueue,

    #[error("No music is playing right now!")]
    NotPlaying,

    #[error("Nothing is playing")]
    NothingPlaying,

    /// The voice connection already carries a live track. Recovered inside the
    /// playback loop and never shown to users.
    #[error("Voice connection is already playing")]
    StartAudioRace,

    #[error("User must join a voice channel first!")]
    VoiceChannelRequired,

    #[error("Bot is not connected to a channel")]
    NotConnected,

    #[error("Voice connection error: {0}")]
    Voice(String),
}

impl MusicError {
    /// Wraps any displayable resolver failure.
    pub fn resolution(cause: impl std::fmt::Display) -> Self {
        Self::ResolutionFailed(cause.to_string())
    }

    pub fn voice(cause: impl std::fmt::Display) -> Self {
        Self::Voice(cause.to_string())
    }
}
