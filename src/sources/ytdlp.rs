use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::{sync::Semaphore, time::timeout};
use tracing::{debug, info, warn};
use url::Url;

use super::{is_link, Platform, Resolution, TrackDescriptor, TrackResolver};
use crate::{config::Config, error::MusicError};

const MAX_CONCURRENT_PROCESSES: usize = 3;

/// Resolver backed by the `yt-dlp` executable.
pub struct YtDlpResolver {
    binary: String,
    max_playlist_size: usize,
    timeout: Duration,
    rate_limiter: Semaphore,
}

/// One line of `--dump-json` output. Flat playlist entries only carry a
/// subset of these fields.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    url: Option<String>,
    webpage_url: Option<String>,
    ie_key: Option<String>,
    extractor_key: Option<String>,
}

impl YtDlpEntry {
    fn into_descriptor(self) -> Option<TrackDescriptor> {
        let extractor = self.ie_key.or(self.extractor_key).unwrap_or_default();
        let link = self.webpage_url.or(self.url);

        let (platform, source) = match extractor.as_str() {
            "Youtube" => (Platform::YouTube, self.id.or(link)?),
            "Soundcloud" => (Platform::SoundCloud, link?),
            _ => (Platform::Other, link?),
        };

        let title = match self.title {
            Some(title) if !title.trim().is_empty() => title,
            _ => title_from_url(&source).unwrap_or_else(|| source.clone()),
        };

        let mut track = TrackDescriptor::new(platform, source, title);
        if let Some(seconds) = self.duration.filter(|d| d.is_finite() && *d >= 0.0) {
            track = track.with_duration(Duration::from_secs(seconds.floor() as u64));
        }
        Some(track)
    }
}

/// Readable title from the last path segment of a track URL.
fn title_from_url(link: &str) -> Option<String> {
    let parsed = Url::parse(link).ok()?;
    let slug = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(slug.replace('-', " "))
}

impl YtDlpResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.ytdlp_path.clone(),
            max_playlist_size: config.max_playlist_size,
            timeout: Duration::from_secs(config.resolver_timeout_secs),
            rate_limiter: Semaphore::new(MAX_CONCURRENT_PROCESSES),
        }
    }

    /// Checks that the executable is installed and runs.
    pub async fn verify(&self) -> Result<String> {
        let version = self.run(&["--version"]).await?;
        Ok(version.trim().to_string())
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        let mut command = Command::new(&self.binary);
        command.args(args).kill_on_drop(true);

        let output = timeout(self.timeout, command.output())
            .await
            .with_context(|| format!("yt-dlp timed out after {}s", self.timeout.as_secs()))?
            .context("failed to run yt-dlp")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_entries(stdout: &str) -> Vec<TrackDescriptor> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => entry.into_descriptor(),
            Err(e) => {
                debug!("Skipping unparsable yt-dlp line: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Resolution, MusicError> {
        let query = query.trim();
        let is_link = is_link(query);
        let target = if is_link {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        };
        let playlist_end = self.max_playlist_size.to_string();

        info!("🔍 Resolving {}: {}", if is_link { "link" } else { "search" }, query);

        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--no-warnings",
                "--playlist-end",
                &playlist_end,
                &target,
            ])
            .await
            .map_err(|e| {
                warn!("❌ Resolution failed for {}: {:#}", query, e);
                MusicError::resolution(format!("{e:#}"))
            })?;

        let tracks = parse_entries(&stdout);
        if tracks.is_empty() {
            return Err(MusicError::resolution(format!("no results for `{}`", query)));
        }

        debug!("Resolved {} track(s) for {}", tracks.len(), query);
        Ok(Resolution { is_link, tracks })
    }

    async fn stream_url(&self, track: &TrackDescriptor) -> Result<String, MusicError> {
        let page = track.page_url();
        debug!("🎵 Fetching stream URL for {}", page);

        let stdout = self
            .run(&[
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--get-url",
                "--no-warnings",
                &page,
            ])
            .await
            .map_err(|e| MusicError::resolution(format!("{e:#}")))?;

        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| MusicError::resolution(format!("no stream available for {}", track.title())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_flat_youtube_search_entry() {
        let line = r#"{"_type":"url","ie_key":"Youtube","id":"dQw4w9WgXcQ","url":"https://www.youtube.com/watch?v=dQw4w9WgXcQ","title":"Never Gonna Give You Up","duration":212.0}"#;
        let tracks = parse_entries(line);

        assert_eq!(tracks.len(), 1);
        let track = &tracks[0];
        assert_eq!(track.platform(), Platform::YouTube);
        assert_eq!(track.source(), "dQw4w9WgXcQ");
        assert_eq!(track.title(), "Never Gonna Give You Up");
        assert_eq!(track.duration(), Some(Duration::from_secs(212)));
    }

    #[test]
    fn soundcloud_entries_without_title_use_url_slug() {
        let line = r#"{"_type":"url","ie_key":"Soundcloud","url":"https://soundcloud.com/some-artist/late-night-drive"}"#;
        let tracks = parse_entries(line);

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].platform(), Platform::SoundCloud);
        assert_eq!(tracks[0].title(), "late night drive");
        assert_eq!(tracks[0].duration(), None);
    }

    #[test]
    fn full_info_for_single_video_uses_extractor_key() {
        let line = r#"{"id":"abc123","title":"Live Set","extractor_key":"Youtube","webpage_url":"https://www.youtube.com/watch?v=abc123","duration":3725.6}"#;
        let tracks = parse_entries(line);

        assert_eq!(tracks[0].source(), "abc123");
        assert_eq!(tracks[0].duration(), Some(Duration::from_secs(3725)));
    }

    #[test]
    fn skips_garbage_and_unusable_lines() {
        let stdout = "not json\n\n{\"ie_key\":\"Soundcloud\"}\n{\"ie_key\":\"Youtube\",\"id\":\"x1\",\"title\":\"One\"}\n";
        let tracks = parse_entries(stdout);

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title(), "One");
    }
}
