use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{QueryKind, Resolver};
use crate::{audio::track::Track, config::Config, error::ResolveError};

/// Resolver that shells out to `yt-dlp --dump-json`.
pub struct YtDlpResolver {
    binary: String,
    max_playlist_size: usize,
    timeout: Duration,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// One JSON line of `yt-dlp --dump-json` output.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
}

impl YtDlpResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.ytdlp_path.clone(),
            max_playlist_size: config.max_playlist_size,
            timeout: config.resolve_timeout(),
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Runs `yt-dlp --version`, returning the reported version.
    pub async fn verify(&self) -> Result<String, ResolveError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| ResolveError::Extractor(format!("cannot run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(ResolveError::Extractor(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn args(&self, kind: &QueryKind) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--dump-json".into(),
            "--skip-download".into(),
            "--no-warnings".into(),
            "-f".into(),
            "bestaudio/best".into(),
        ];

        match kind {
            QueryKind::Search(term) => {
                args.push("--no-playlist".into());
                args.push(format!("ytsearch1:{}", term));
            }
            QueryKind::Url(url) => {
                args.push("--no-playlist".into());
                args.push(url.to_string());
            }
            QueryKind::Playlist(url) => {
                args.push("--playlist-end".into());
                args.push(self.max_playlist_size.to_string());
                args.push(url.to_string());
            }
        }

        args
    }

    async fn run(&self, args: &[String]) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Extractor(e.to_string()))?;

        let child = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| ResolveError::Timeout(self.timeout))?
            .map_err(|e| ResolveError::Extractor(format!("cannot run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Extractor(error.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Vec<Track>, ResolveError> {
        let kind = QueryKind::classify(query);
        info!("🔍 Resolving {:?}", kind);

        let stdout = self.run(&self.args(&kind)).await?;
        let mut tracks = parse_entries(&stdout);

        if let QueryKind::Playlist(_) = kind {
            tracks.truncate(self.max_playlist_size);
        }

        if tracks.is_empty() {
            warn!("⚠️ No results for: {}", query);
            return Err(ResolveError::NoResults(query.to_string()));
        }

        debug!("✅ Resolved {} track(s) for: {}", tracks.len(), query);
        Ok(tracks)
    }
}

/// Parses newline-delimited yt-dlp JSON, skipping malformed lines and
/// entries with no locator at all.
fn parse_entries(stdout: &str) -> Vec<Track> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unparseable yt-dlp line: {}", e);
                None
            }
        })
        .filter_map(entry_to_track)
        .collect()
}

fn entry_to_track(entry: YtDlpEntry) -> Option<Track> {
    let source = entry.url.or_else(|| entry.webpage_url.clone())?;
    let title = entry.title.unwrap_or_else(|| "Unknown".to_string());

    let mut track = Track::new(title, source);

    if let Some(url) = entry.webpage_url {
        track = track.with_url(url);
    }

    if let Some(seconds) = entry.duration.filter(|d| d.is_finite() && *d > 0.0) {
        track = track.with_duration(Duration::from_secs_f64(seconds));
    }

    if let Some(thumbnail) = entry.thumbnail {
        track = track.with_thumbnail(thumbnail);
    }

    Some(track)
}
