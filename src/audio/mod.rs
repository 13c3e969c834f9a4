//! # Audio Module
//!
//! Per-guild playback core.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild State
//! - One [`session::GuildSession`] per guild, created lazily by the
//!   [`session::SessionRegistry`]
//! - Queue, current track and loop/idle flags behind a single async lock
//!
//! ### [`player`] - Playback Scheduler
//! - Enqueue, the single-flight playback loop, transport controls
//! - Idle disconnect after the queue runs dry, hard teardown on `dc`
//!
//! ### [`backend`] - Voice Seam
//! - [`backend::VoiceBackend`] hides the voice gateway from the scheduler
//! - [`songbird_backend::SongbirdBackend`] is the production implementation
//!
//! The session lock is only ever held around a read-modify-write of session
//! fields, never across resolver or gateway calls.

pub mod backend;
pub mod player;
pub mod queue;
pub mod session;
pub mod songbird_backend;
