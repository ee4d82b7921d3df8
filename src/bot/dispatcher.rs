//! Routes front-end commands to the session of the guild they target.
//!
//! The dispatcher holds no playback state of its own. It validates what the
//! session cannot know (the caller's voice channel), resolves queries before
//! anything reaches the session, and returns structured results that the
//! handlers render.

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        registry::SessionRegistry,
        session::{Enqueued, SessionHandle, SessionSnapshot, Skipped, Stopped},
        track::Track,
        transport::Transport,
    },
    error::{CommandError, ResolveError},
    sources::Resolver,
};

/// A session that closes between lookup and delivery is replaced this many
/// times before giving up.
const PLAY_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    /// Display name attached to every resolved track.
    pub requester: String,
    /// The caller's current voice channel, if any.
    pub voice_channel: Option<ChannelId>,
    pub query: String,
}

pub struct Dispatcher<T: Transport, R: Resolver> {
    registry: Arc<SessionRegistry<T>>,
    resolver: R,
}

impl<T: Transport, R: Resolver> Dispatcher<T, R> {
    pub fn new(registry: Arc<SessionRegistry<T>>, resolver: R) -> Self {
        Self { registry, resolver }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<T>> {
        &self.registry
    }

    pub async fn play(&self, request: PlayRequest) -> Result<Enqueued, CommandError> {
        let channel_id = request
            .voice_channel
            .ok_or(CommandError::NotInVoiceChannel)?;

        // Resolve before touching the session so a failure enqueues nothing.
        let tracks: Vec<Track> = self
            .resolver
            .resolve(&request.query)
            .await?
            .into_iter()
            .map(|track| track.with_requester(request.requester.clone()))
            .collect();

        if tracks.is_empty() {
            return Err(ResolveError::NoResults(request.query).into());
        }

        info!(
            "🎵 [{}] {} requested {} track(s)",
            request.guild_id,
            request.requester,
            tracks.len()
        );

        for attempt in 1..=PLAY_ATTEMPTS {
            let session = self.registry.get_or_create(request.guild_id);
            match session.play(channel_id, tracks.clone()).await {
                Err(CommandError::SessionClosed) => {
                    debug!(
                        "Session {} for guild {} closed mid-command (attempt {})",
                        session.id(),
                        request.guild_id,
                        attempt
                    );
                }
                result => return result,
            }
        }

        warn!("⚠️ [{}] Gave up delivering play command", request.guild_id);
        Err(CommandError::SessionClosed)
    }

    pub async fn stop(&self, guild_id: GuildId) -> Result<Stopped, CommandError> {
        match self.session(guild_id) {
            Some(session) => or_when_closed(session.stop().await, Ok(Stopped::default())),
            None => Ok(Stopped::default()),
        }
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<Skipped, CommandError> {
        let session = self.session(guild_id).ok_or(CommandError::NothingPlaying)?;
        or_when_closed(session.skip().await, Err(CommandError::NothingPlaying))
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<Track, CommandError> {
        let session = self.session(guild_id).ok_or(CommandError::NothingPlaying)?;
        or_when_closed(session.pause().await, Err(CommandError::NothingPlaying))
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<Track, CommandError> {
        let session = self.session(guild_id).ok_or(CommandError::NothingPaused)?;
        or_when_closed(session.resume().await, Err(CommandError::NothingPaused))
    }

    /// Removes the track at a 1-indexed queue position.
    pub async fn remove(&self, guild_id: GuildId, position: i64) -> Result<Track, CommandError> {
        let out_of_range = CommandError::QueuePositionOutOfRange { position, len: 0 };
        let session = self.session(guild_id).ok_or_else(|| out_of_range.clone())?;
        or_when_closed(session.remove(position).await, Err(out_of_range))
    }

    pub async fn queue(&self, guild_id: GuildId) -> SessionSnapshot {
        match self.session(guild_id) {
            Some(session) => session.snapshot().await,
            None => SessionSnapshot::disconnected(),
        }
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        self.queue(guild_id).await.current
    }

    pub async fn clear_queue(&self, guild_id: GuildId) -> usize {
        match self.session(guild_id) {
            Some(session) => session.clear_queue().await,
            None => 0,
        }
    }

    /// Forwards a "bot left voice" gateway event. Returns whether a session
    /// was torn down because of it.
    pub async fn voice_lost(&self, guild_id: GuildId) -> bool {
        match self.session(guild_id) {
            Some(session) => session.voice_lost().await,
            None => false,
        }
    }

    // Only `play` creates sessions.
    fn session(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.registry.get(guild_id)
    }
}

/// A session that closed under a command answers as a disconnected one would.
fn or_when_closed<V>(
    result: Result<V, CommandError>,
    disconnected: Result<V, CommandError>,
) -> Result<V, CommandError> {
    match result {
        Err(CommandError::SessionClosed) => disconnected,
        other => other,
    }
}
