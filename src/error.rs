//! Error types shared by the scheduler, the resolver and the transport.
//!
//! Everything here is `Clone + PartialEq` because errors travel back to the
//! front-end inside structured command results.

use std::time::Duration;
use thiserror::Error;

/// Failure of the media resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no results for `{0}`")]
    NoResults(String),
    #[error("extractor failed: {0}")]
    Extractor(String),
    #[error("extractor timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of the audio transport (voice connection or pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("could not connect to voice: {0}")]
    Connect(String),
    #[error("audio pipeline error: {0}")]
    Playback(String),
}

/// Result of a rejected command, returned to the front-end for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("caller is not in a voice channel")]
    NotInVoiceChannel,
    #[error(transparent)]
    Resolution(#[from] ResolveError),
    #[error("voice connection failed: {0}")]
    Connect(String),
    #[error("nothing is playing")]
    NothingPlaying,
    #[error("nothing is paused")]
    NothingPaused,
    #[error("playback is already paused")]
    AlreadyPaused,
    #[error("playback is not paused")]
    NotPaused,
    #[error("queue position {position} is out of range (queue has {len} tracks)")]
    QueuePositionOutOfRange { position: i64, len: usize },
    #[error("transport error: {0}")]
    Transport(String),
    /// The session tore down before it could handle the command.
    #[error("session closed")]
    SessionClosed,
}

impl From<TransportError> for CommandError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect(reason) => CommandError::Connect(reason),
            TransportError::Playback(reason) => CommandError::Transport(reason),
        }
    }
}
