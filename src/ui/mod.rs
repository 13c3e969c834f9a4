//! # UI Module
//!
//! Everything the bot shows in a text channel: the [`channel::ChatChannel`]
//! seam, embed rendering and the reaction-driven queue view.

pub mod channel;
pub mod embeds;
pub mod paginator;
