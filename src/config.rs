use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Playback
    pub volume_fraction: f32,
    pub idle_disconnect_secs: u64,

    // Queue view
    pub queue_page_size: usize,
    pub reaction_timeout_secs: u64,

    // Resolver
    pub ytdlp_path: String,
    pub max_playlist_size: usize,
    pub resolver_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Builds a config from `lookup`, falling back to the defaults for every
    /// variable except the token.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            command_prefix: lookup("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            volume_fraction: parse_or(&lookup, "VOLUME_FRACTION", defaults.volume_fraction)?,
            idle_disconnect_secs: parse_or(&lookup, "IDLE_DISCONNECT_SECONDS", defaults.idle_disconnect_secs)?,

            queue_page_size: parse_or(&lookup, "QUEUE_PAGE_SIZE", defaults.queue_page_size)?,
            reaction_timeout_secs: parse_or(&lookup, "REACTION_TIMEOUT_SECONDS", defaults.reaction_timeout_secs)?,

            ytdlp_path: lookup("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            max_playlist_size: parse_or(&lookup, "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,
            resolver_timeout_secs: parse_or(&lookup, "RESOLVER_TIMEOUT_SECONDS", defaults.resolver_timeout_secs)?,
        })
    }

    /// Rejects values the bot cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.command_prefix.is_empty() || self.command_prefix.chars().any(char::is_whitespace) {
            anyhow::bail!("Command prefix must be non-empty and contain no whitespace, got: {:?}", self.command_prefix);
        }

        if !(0.0..=1.0).contains(&self.volume_fraction) {
            anyhow::bail!("Volume fraction must be between 0.0 and 1.0, got: {}", self.volume_fraction);
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.reaction_timeout_secs == 0 {
            anyhow::bail!("Reaction timeout must be greater than 0");
        }

        if self.idle_disconnect_secs == 0 {
            anyhow::bail!("Idle disconnect delay must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.resolver_timeout_secs == 0 {
            anyhow::bail!("Resolver timeout must be greater than 0");
        }

        Ok(())
    }

    pub fn reaction_timeout(&self) -> Duration {
        Duration::from_secs(self.reaction_timeout_secs)
    }

    /// Token-free summary for the startup log.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix {:?}\n  \
            Playback: {}% vol, leave after {}s idle\n  \
            Queue view: {} per page, closes after {}s\n  \
            Resolver: {} ({} per playlist, {}s timeout)",
            self.command_prefix,
            (self.volume_fraction * 100.0).round() as u32,
            self.idle_disconnect_secs,
            self.queue_page_size,
            self.reaction_timeout_secs,
            self.ytdlp_path,
            self.max_playlist_size,
            self.resolver_timeout_secs,
        )
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {value:?}")),
        _ => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (token has no default)
            discord_token: String::new(),
            command_prefix: ".".to_string(),

            // Playback
            volume_fraction: 0.1,
            idle_disconnect_secs: 5,

            // Queue view
            queue_page_size: 10,
            reaction_timeout_secs: 30,

            // Resolver
            ytdlp_path: "yt-dlp".to_string(),
            max_playlist_size: 100,
            resolver_timeout_secs: 30,
        }
    }
}
