//! Media resolution: turns a user query into playable [`Track`]s.
//!
//! Resolution never downloads media; it only returns stream locators and
//! metadata. The production resolver shells out to `yt-dlp`.

pub mod ytdlp;

use async_trait::async_trait;
use url::Url;

use crate::{audio::track::Track, error::ResolveError};

pub use ytdlp::YtDlpResolver;

/// Common interface for anything that can turn a query into tracks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// Resolves `query` into at least one track, in playback order.
    async fn resolve(&self, query: &str) -> Result<Vec<Track>, ResolveError>;
}

/// Shape of a user query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Free-text search; the first hit is used.
    Search(String),
    /// A single content URL.
    Url(Url),
    /// A playlist URL, expanded into several tracks.
    Playlist(Url),
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        let query = query.trim();

        match Url::parse(query) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                if is_playlist(&url) {
                    QueryKind::Playlist(url)
                } else {
                    QueryKind::Url(url)
                }
            }
            _ => QueryKind::Search(query.to_string()),
        }
    }
}

fn is_playlist(url: &Url) -> bool {
    url.path().starts_with("/playlist") || url.query_pairs().any(|(key, _)| key == "list")
}
