//! Boundary between the scheduler and the voice/audio pipeline.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::{session::SessionMessage, track::Track};
use crate::error::TransportError;

/// Voice connection and audio pipeline used by a session.
///
/// Only the owning session calls these methods, always from its own task.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Live voice connection for one guild.
    type Handle: Send + Sync + 'static;

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId)
        -> Result<Self::Handle, TransportError>;

    async fn move_to(&self, handle: &Self::Handle, channel_id: ChannelId)
        -> Result<(), TransportError>;

    /// Starts `track`, replacing whatever was playing. `on_finished` must be
    /// fired when the track ends, fails, or is stopped.
    async fn start(
        &self,
        handle: &Self::Handle,
        track: &Track,
        on_finished: FinishNotifier,
    ) -> Result<(), TransportError>;

    async fn pause(&self, handle: &Self::Handle) -> Result<(), TransportError>;

    async fn resume(&self, handle: &Self::Handle) -> Result<(), TransportError>;

    /// Stops the current track, which fires its `on_finished`.
    async fn stop_current(&self, handle: &Self::Handle) -> Result<(), TransportError>;

    /// Leaves voice. Consumes the handle.
    async fn disconnect(&self, handle: Self::Handle) -> Result<(), TransportError>;

    async fn is_connected(&self, handle: &Self::Handle) -> bool;

    async fn is_playing(&self, handle: &Self::Handle) -> bool;

    async fn is_paused(&self, handle: &Self::Handle) -> bool;
}

/// Completion callback for one started track.
///
/// Firing it only posts a message into the owning session's mailbox, so it is
/// safe to call from the transport's own tasks and may be fired more than
/// once; the session ignores anything that does not match the track it is
/// currently playing.
#[derive(Debug, Clone)]
pub struct FinishNotifier {
    mailbox: UnboundedSender<SessionMessage>,
    play_id: u64,
}

impl FinishNotifier {
    pub(crate) fn new(mailbox: UnboundedSender<SessionMessage>, play_id: u64) -> Self {
        Self { mailbox, play_id }
    }

    /// Reports the end of the track. `error` is set when playback failed.
    pub fn finished(&self, error: Option<String>) {
        let message = SessionMessage::TrackFinished {
            play_id: self.play_id,
            error,
        };
        if self.mailbox.send(message).is_err() {
            debug!("Finish event for play {} after session closed", self.play_id);
        }
    }
}
