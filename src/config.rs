use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Scheduler
    pub idle_timeout_secs: u64,

    // Resolución
    pub ytdlp_path: String,
    pub max_playlist_size: usize,
    pub resolve_timeout_secs: u64,

    // Presentación
    pub queue_display_limit: usize,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, falling back to the
    /// defaults for missing optional keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            idle_timeout_secs: parse_or(&lookup, "IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,

            ytdlp_path: lookup("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            max_playlist_size: parse_or(&lookup, "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,
            resolve_timeout_secs: parse_or(
                &lookup,
                "RESOLVE_TIMEOUT_SECS",
                defaults.resolve_timeout_secs,
            )?,

            queue_display_limit: parse_or(
                &lookup,
                "QUEUE_DISPLAY_LIMIT",
                defaults.queue_display_limit,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The idle window must be at least one second
    /// - Playlist size, resolve timeout and display limit must be > 0
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_secs == 0 {
            anyhow::bail!("IDLE_TIMEOUT_SECS must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("MAX_PLAYLIST_SIZE must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("RESOLVE_TIMEOUT_SECS must be greater than 0");
        }

        if self.queue_display_limit == 0 {
            anyhow::bail!("QUEUE_DISPLAY_LIMIT must be greater than 0");
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: {}\n  \
            Idle window: {}s\n  \
            Resolver: {} (playlist max {}, timeout {}s)\n  \
            Queue page: {} tracks",
            self.guild_id
                .map_or("global".to_string(), |id| format!("guild {}", id)),
            self.idle_timeout_secs,
            self.ytdlp_path,
            self.max_playlist_size,
            self.resolve_timeout_secs,
            self.queue_display_limit,
        )
    }
}

fn parse_or<V>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: V) -> Result<V>
where
    V: std::str::FromStr,
    V::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        _ => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            idle_timeout_secs: 180, // 3 minutos

            ytdlp_path: "yt-dlp".to_string(),
            max_playlist_size: 100,
            resolve_timeout_secs: 60,

            queue_display_limit: 15,
        }
    }
}
