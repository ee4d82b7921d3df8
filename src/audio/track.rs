use std::time::Duration;

/// One playable item, as produced by the resolver.
///
/// Tracks are never mutated once they reach a queue; the `with_*` builders
/// consume the value and are only used while the track is still owned by the
/// code that resolved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    title: String,
    source: String,
    url: String,
    duration: Option<Duration>,
    thumbnail: Option<String>,
    requester: Option<String>,
}

impl Track {
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
            url: String::new(),
            duration: None,
            thumbnail: None,
            requester: None,
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Locator handed to the transport when the track starts.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Page shown to users, may be empty.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    pub fn requester(&self) -> Option<&str> {
        self.requester.as_deref()
    }

    /// Live streams and anything without a known length.
    pub fn is_live(&self) -> bool {
        self.duration.map_or(true, |d| d.is_zero())
    }

    // Builders
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }
}
