//! Per-guild playback state machine.
//!
//! Every session runs as its own task and owns its queue, its voice handle
//! and its playback state. User commands, track-finished events from the
//! transport and idle-timer expiries all arrive through the same mailbox, so
//! they are handled strictly one after another. Different guilds never share
//! a task.

use serenity::model::id::{ChannelId, GuildId};
use std::{
    mem,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    queue::{QueueSnapshot, TrackQueue},
    registry::SessionRegistry,
    track::Track,
    transport::{FinishNotifier, Transport},
};
use crate::error::CommandError;

type Reply<T> = oneshot::Sender<Result<T, CommandError>>;

/// Everything a session task can receive.
pub(crate) enum SessionMessage {
    Play {
        channel_id: ChannelId,
        tracks: Vec<Track>,
        reply: Reply<Enqueued>,
    },
    Skip {
        reply: Reply<Skipped>,
    },
    Pause {
        reply: Reply<Track>,
    },
    Resume {
        reply: Reply<Track>,
    },
    Stop {
        reply: Reply<Stopped>,
    },
    Remove {
        position: i64,
        reply: Reply<Track>,
    },
    ClearQueue {
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    TrackFinished {
        play_id: u64,
        error: Option<String>,
    },
    IdleTimeout {
        token: u64,
    },
    VoiceLost {
        reply: oneshot::Sender<bool>,
    },
}

impl SessionMessage {
    /// Answers a message that reached a session after it closed.
    fn reject(self) {
        match self {
            SessionMessage::Play { reply, .. } => {
                let _ = reply.send(Err(CommandError::SessionClosed));
            }
            SessionMessage::Skip { reply } => {
                let _ = reply.send(Err(CommandError::SessionClosed));
            }
            SessionMessage::Pause { reply } | SessionMessage::Resume { reply } => {
                let _ = reply.send(Err(CommandError::SessionClosed));
            }
            SessionMessage::Remove { reply, .. } => {
                let _ = reply.send(Err(CommandError::SessionClosed));
            }
            SessionMessage::Stop { reply } => {
                let _ = reply.send(Err(CommandError::SessionClosed));
            }
            SessionMessage::ClearQueue { reply } => {
                let _ = reply.send(0);
            }
            SessionMessage::Snapshot { reply } => {
                let _ = reply.send(SessionSnapshot::disconnected());
            }
            SessionMessage::VoiceLost { reply } => {
                let _ = reply.send(false);
            }
            SessionMessage::TrackFinished { .. } | SessionMessage::IdleTimeout { .. } => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Disconnected,
    Idle,
    Playing,
    Paused,
}

/// Point-in-time view of a session for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: PlaybackStatus,
    pub current: Option<Track>,
    pub queue: QueueSnapshot,
}

impl SessionSnapshot {
    pub fn disconnected() -> Self {
        Self {
            status: PlaybackStatus::Disconnected,
            current: None,
            queue: QueueSnapshot::default(),
        }
    }
}

/// Outcome of a successful `play`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    pub added: Vec<Track>,
    /// Queue position of the first added track, `None` when it started
    /// playing straight away.
    pub first_position: Option<usize>,
    pub queue_len: usize,
    pub now_playing: Option<Track>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub skipped: Track,
    pub next: Option<Track>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stopped {
    pub cleared: usize,
    pub was_connected: bool,
}

/// Cloneable address of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    guild_id: GuildId,
    mailbox: mpsc::UnboundedSender<SessionMessage>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    pub async fn play(
        &self,
        channel_id: ChannelId,
        tracks: Vec<Track>,
    ) -> Result<Enqueued, CommandError> {
        self.request(move |reply| SessionMessage::Play {
            channel_id,
            tracks,
            reply,
        })
        .await
    }

    pub async fn skip(&self) -> Result<Skipped, CommandError> {
        self.request(|reply| SessionMessage::Skip { reply }).await
    }

    pub async fn pause(&self) -> Result<Track, CommandError> {
        self.request(|reply| SessionMessage::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<Track, CommandError> {
        self.request(|reply| SessionMessage::Resume { reply }).await
    }

    pub async fn stop(&self) -> Result<Stopped, CommandError> {
        self.request(|reply| SessionMessage::Stop { reply }).await
    }

    /// Removes the track at a 1-indexed queue position.
    pub async fn remove(&self, position: i64) -> Result<Track, CommandError> {
        self.request(move |reply| SessionMessage::Remove { position, reply })
            .await
    }

    pub async fn clear_queue(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self
            .mailbox
            .send(SessionMessage::ClearQueue { reply })
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.mailbox.send(SessionMessage::Snapshot { reply }).is_err() {
            return SessionSnapshot::disconnected();
        }
        rx.await.unwrap_or_else(|_| SessionSnapshot::disconnected())
    }

    /// Reports that the gateway saw the bot leave voice. The session stops
    /// only if its own connection is gone; returns whether it did.
    pub async fn voice_lost(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.mailbox.send(SessionMessage::VoiceLost { reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(Reply<R>) -> SessionMessage,
    ) -> Result<R, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(build(reply))
            .map_err(|_| CommandError::SessionClosed)?;
        rx.await.unwrap_or(Err(CommandError::SessionClosed))
    }
}

/// Starts the task for a new session in the `Disconnected` state.
pub(crate) fn spawn<T: Transport>(
    guild_id: GuildId,
    id: u64,
    transport: Arc<T>,
    registry: Weak<SessionRegistry<T>>,
    idle_timeout: Duration,
) -> SessionHandle {
    let (mailbox, inbox) = mpsc::unbounded_channel();
    let session = Session {
        guild_id,
        id,
        transport,
        registry,
        idle_timeout,
        mailbox: mailbox.clone(),
        queue: TrackQueue::new(),
        state: PlaybackState::Disconnected,
        next_play_id: 0,
        next_idle_token: 0,
    };
    tokio::spawn(session.run(inbox));

    SessionHandle {
        id,
        guild_id,
        mailbox,
    }
}

struct Voice<H> {
    handle: H,
    channel_id: ChannelId,
}

struct NowPlaying {
    track: Track,
    play_id: u64,
}

/// Pending idle disconnect. Dropping it cancels the sleeper task.
struct IdleTimer {
    token: u64,
    cancel: CancellationToken,
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Each state carries exactly the data that is valid in it.
enum PlaybackState<H> {
    Disconnected,
    Idle { voice: Voice<H>, timer: IdleTimer },
    Playing { voice: Voice<H>, now: NowPlaying },
    Paused { voice: Voice<H>, now: NowPlaying },
}

impl<H> PlaybackState<H> {
    fn status(&self) -> PlaybackStatus {
        match self {
            PlaybackState::Disconnected => PlaybackStatus::Disconnected,
            PlaybackState::Idle { .. } => PlaybackStatus::Idle,
            PlaybackState::Playing { .. } => PlaybackStatus::Playing,
            PlaybackState::Paused { .. } => PlaybackStatus::Paused,
        }
    }

    fn voice(&self) -> Option<&Voice<H>> {
        match self {
            PlaybackState::Disconnected => None,
            PlaybackState::Idle { voice, .. }
            | PlaybackState::Playing { voice, .. }
            | PlaybackState::Paused { voice, .. } => Some(voice),
        }
    }

    fn into_voice(self) -> Option<Voice<H>> {
        match self {
            PlaybackState::Disconnected => None,
            PlaybackState::Idle { voice, .. }
            | PlaybackState::Playing { voice, .. }
            | PlaybackState::Paused { voice, .. } => Some(voice),
        }
    }

    fn now_playing(&self) -> Option<&NowPlaying> {
        match self {
            PlaybackState::Playing { now, .. } | PlaybackState::Paused { now, .. } => Some(now),
            _ => None,
        }
    }

    fn current(&self) -> Option<&Track> {
        self.now_playing().map(|now| &now.track)
    }
}

enum Flow {
    Continue,
    Close,
}

struct Session<T: Transport> {
    guild_id: GuildId,
    id: u64,
    transport: Arc<T>,
    registry: Weak<SessionRegistry<T>>,
    idle_timeout: Duration,
    mailbox: mpsc::UnboundedSender<SessionMessage>,
    queue: TrackQueue,
    state: PlaybackState<T::Handle>,
    next_play_id: u64,
    next_idle_token: u64,
}

impl<T: Transport> Session<T> {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionMessage>) {
        debug!("🎛️ Session {} opened for guild {}", self.id, self.guild_id);

        while let Some(message) = inbox.recv().await {
            if let Flow::Close = self.handle(message).await {
                break;
            }
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.guild_id, self.id);
        }
        inbox.close();
        while let Some(message) = inbox.recv().await {
            message.reject();
        }

        info!("👋 Session {} closed for guild {}", self.id, self.guild_id);
    }

    async fn handle(&mut self, message: SessionMessage) -> Flow {
        match message {
            SessionMessage::Play {
                channel_id,
                tracks,
                reply,
            } => {
                let result = self.play(channel_id, tracks).await;
                let _ = reply.send(result);
                if let PlaybackState::Disconnected = self.state {
                    return Flow::Close;
                }
            }
            SessionMessage::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            SessionMessage::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            SessionMessage::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            SessionMessage::Stop { reply } => {
                let _ = reply.send(Ok(self.stop().await));
                return Flow::Close;
            }
            SessionMessage::Remove { position, reply } => {
                let _ = reply.send(self.remove(position));
            }
            SessionMessage::ClearQueue { reply } => {
                let cleared = self.queue.clear();
                info!("🗑️ [{}] Queue cleared: {} tracks", self.guild_id, cleared);
                let _ = reply.send(cleared);
            }
            SessionMessage::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionMessage::TrackFinished { play_id, error } => {
                self.on_track_finished(play_id, error).await;
            }
            SessionMessage::IdleTimeout { token } => {
                return self.on_idle_timeout(token).await;
            }
            SessionMessage::VoiceLost { reply } => {
                let lost = self.on_voice_lost().await;
                let _ = reply.send(lost);
                if lost {
                    return Flow::Close;
                }
            }
        }

        Flow::Continue
    }

    async fn play(
        &mut self,
        channel_id: ChannelId,
        tracks: Vec<Track>,
    ) -> Result<Enqueued, CommandError> {
        self.ensure_voice(channel_id).await?;

        let queue_before = self.queue.len();
        let added = tracks.clone();
        self.queue.enqueue_many(tracks);
        info!(
            "➕ [{}] {} track(s) queued, {} waiting",
            self.guild_id,
            added.len(),
            self.queue.len()
        );

        if let PlaybackState::Idle { .. } = self.state {
            self.advance().await;
        }

        let queue_len = self.queue.len();
        let consumed = (queue_before + added.len()).saturating_sub(queue_len);
        let first_position = (consumed <= queue_before).then(|| queue_before - consumed + 1);

        Ok(Enqueued {
            added,
            first_position,
            queue_len,
            now_playing: self.state.current().cloned(),
        })
    }

    /// Connects, reconnects or moves so that the session is in `channel_id`.
    async fn ensure_voice(&mut self, channel_id: ChannelId) -> Result<(), CommandError> {
        if let Some(voice) = self.state.voice() {
            if !self.transport.is_connected(&voice.handle).await {
                warn!(
                    "🔌 [{}] Voice connection lost, reconnecting",
                    self.guild_id
                );
                if let Some(voice) = mem::replace(&mut self.state, PlaybackState::Disconnected)
                    .into_voice()
                {
                    self.release(voice).await;
                }
            }
        }

        if let PlaybackState::Disconnected = self.state {
            let handle = self.transport.connect(self.guild_id, channel_id).await?;
            info!("🔊 [{}] Connected to voice channel {}", self.guild_id, channel_id);
            let timer = self.arm_idle_timer();
            self.state = PlaybackState::Idle {
                voice: Voice { handle, channel_id },
                timer,
            };
            return Ok(());
        }

        let voice = match &mut self.state {
            PlaybackState::Idle { voice, .. }
            | PlaybackState::Playing { voice, .. }
            | PlaybackState::Paused { voice, .. } => voice,
            PlaybackState::Disconnected => return Ok(()),
        };
        if voice.channel_id != channel_id {
            self.transport.move_to(&voice.handle, channel_id).await?;
            info!(
                "🔀 [{}] Moved from voice channel {} to {}",
                self.guild_id, voice.channel_id, channel_id
            );
            voice.channel_id = channel_id;
        }

        Ok(())
    }

    /// Plays the next startable track, or goes idle when the queue runs dry.
    async fn advance(&mut self) {
        match mem::replace(&mut self.state, PlaybackState::Disconnected).into_voice() {
            Some(voice) => self.advance_with(voice).await,
            None => debug!("[{}] Nothing to advance while disconnected", self.guild_id),
        }
    }

    async fn advance_with(&mut self, voice: Voice<T::Handle>) {
        while let Ok(track) = self.queue.dequeue_front() {
            self.next_play_id += 1;
            let play_id = self.next_play_id;
            let notifier = FinishNotifier::new(self.mailbox.clone(), play_id);

            match self.transport.start(&voice.handle, &track, notifier).await {
                Ok(()) => {
                    info!("🎵 [{}] Now playing: {}", self.guild_id, track.title());
                    self.state = PlaybackState::Playing {
                        voice,
                        now: NowPlaying { track, play_id },
                    };
                    return;
                }
                Err(e) => {
                    warn!(
                        "⚠️ [{}] Could not start {}, skipping: {}",
                        self.guild_id,
                        track.title(),
                        e
                    );
                }
            }
        }

        info!(
            "📭 [{}] Queue empty, idle for {:?}",
            self.guild_id, self.idle_timeout
        );
        let timer = self.arm_idle_timer();
        self.state = PlaybackState::Idle { voice, timer };
    }

    async fn skip(&mut self) -> Result<Skipped, CommandError> {
        let (voice, now) = match mem::replace(&mut self.state, PlaybackState::Disconnected) {
            PlaybackState::Playing { voice, now } | PlaybackState::Paused { voice, now } => {
                (voice, now)
            }
            other => {
                self.state = other;
                return Err(CommandError::NothingPlaying);
            }
        };

        // The finish event this stop produces still carries `now.play_id`,
        // which is stale once the next track starts.
        if let Err(e) = self.transport.stop_current(&voice.handle).await {
            warn!("⚠️ [{}] Stopping {} failed: {}", self.guild_id, now.track.title(), e);
        }
        info!("⏭️ [{}] Skipped: {}", self.guild_id, now.track.title());

        self.advance_with(voice).await;

        Ok(Skipped {
            skipped: now.track,
            next: self.state.current().cloned(),
        })
    }

    async fn pause(&mut self) -> Result<Track, CommandError> {
        let (voice, now) = match &self.state {
            PlaybackState::Playing { voice, now } => (voice, now),
            PlaybackState::Paused { .. } => return Err(CommandError::AlreadyPaused),
            _ => return Err(CommandError::NothingPlaying),
        };
        // A finished track may still have its event waiting in the mailbox.
        if !self.transport.is_playing(&voice.handle).await {
            return Err(CommandError::NothingPlaying);
        }
        self.transport.pause(&voice.handle).await?;
        let track = now.track.clone();

        self.state = match mem::replace(&mut self.state, PlaybackState::Disconnected) {
            PlaybackState::Playing { voice, now } => PlaybackState::Paused { voice, now },
            other => other,
        };
        info!("⏸️ [{}] Paused: {}", self.guild_id, track.title());
        Ok(track)
    }

    async fn resume(&mut self) -> Result<Track, CommandError> {
        let (voice, now) = match &self.state {
            PlaybackState::Paused { voice, now } => (voice, now),
            PlaybackState::Playing { .. } => return Err(CommandError::NotPaused),
            _ => return Err(CommandError::NothingPaused),
        };
        if !self.transport.is_paused(&voice.handle).await {
            return Err(CommandError::NothingPaused);
        }
        self.transport.resume(&voice.handle).await?;
        let track = now.track.clone();

        self.state = match mem::replace(&mut self.state, PlaybackState::Disconnected) {
            PlaybackState::Paused { voice, now } => PlaybackState::Playing { voice, now },
            other => other,
        };
        info!("▶️ [{}] Resumed: {}", self.guild_id, track.title());
        Ok(track)
    }

    async fn stop(&mut self) -> Stopped {
        let cleared = self.queue.clear();
        let was_connected = match mem::replace(&mut self.state, PlaybackState::Disconnected) {
            PlaybackState::Disconnected => false,
            PlaybackState::Idle { voice, .. } => {
                self.release(voice).await;
                true
            }
            PlaybackState::Playing { voice, .. } | PlaybackState::Paused { voice, .. } => {
                if let Err(e) = self.transport.stop_current(&voice.handle).await {
                    warn!("⚠️ [{}] Stopping playback failed: {}", self.guild_id, e);
                }
                self.release(voice).await;
                true
            }
        };

        info!(
            "⏹️ [{}] Stopped, {} queued tracks dropped",
            self.guild_id, cleared
        );
        Stopped {
            cleared,
            was_connected,
        }
    }

    fn remove(&mut self, position: i64) -> Result<Track, CommandError> {
        let out_of_range = CommandError::QueuePositionOutOfRange {
            position,
            len: self.queue.len(),
        };
        let position = usize::try_from(position).map_err(|_| out_of_range.clone())?;
        let removed = self.queue.remove_at(position).map_err(|_| out_of_range)?;

        info!(
            "🗑️ [{}] Removed {} from position {}",
            self.guild_id,
            removed.title(),
            position
        );
        Ok(removed)
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.state.status(),
            current: self.state.current().cloned(),
            queue: self.queue.peek_all(),
        }
    }

    async fn on_track_finished(&mut self, play_id: u64, error: Option<String>) {
        let is_current = self
            .state
            .now_playing()
            .is_some_and(|now| now.play_id == play_id);
        if !is_current {
            debug!(
                "[{}] Ignoring finish event of play {}",
                self.guild_id, play_id
            );
            return;
        }

        match error {
            Some(error) => warn!(
                "❌ [{}] Track failed, moving on: {}",
                self.guild_id, error
            ),
            None => debug!("[{}] Track finished", self.guild_id),
        }
        self.advance().await;
    }

    async fn on_idle_timeout(&mut self, token: u64) -> Flow {
        let armed = matches!(
            &self.state,
            PlaybackState::Idle { timer, .. } if timer.token == token
        );
        if !armed {
            debug!("[{}] Ignoring stale idle timer {}", self.guild_id, token);
            return Flow::Continue;
        }

        info!(
            "💤 [{}] Idle for {:?}, leaving voice",
            self.guild_id, self.idle_timeout
        );
        if let Some(voice) = mem::replace(&mut self.state, PlaybackState::Disconnected).into_voice()
        {
            self.release(voice).await;
        }
        Flow::Close
    }

    /// Disconnect events are not tied to a connection, so one produced by an
    /// earlier teardown can arrive after this session connected.
    async fn on_voice_lost(&mut self) -> bool {
        let connected = match self.state.voice() {
            Some(voice) => self.transport.is_connected(&voice.handle).await,
            None => false,
        };
        if connected {
            debug!(
                "[{}] Still connected, ignoring stale voice-state event",
                self.guild_id
            );
            return false;
        }

        warn!("🔌 [{}] Removed from voice, stopping", self.guild_id);
        self.stop().await;
        true
    }

    /// Arms a fresh idle timer. The previous one, if any, is cancelled when
    /// its `IdleTimer` is dropped with the state it belonged to.
    fn arm_idle_timer(&mut self) -> IdleTimer {
        self.next_idle_token += 1;
        let token = self.next_idle_token;
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let mailbox = self.mailbox.clone();
        let window = self.idle_timeout;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(window) => {
                    let _ = mailbox.send(SessionMessage::IdleTimeout { token });
                }
            }
        });

        IdleTimer { token, cancel }
    }

    async fn release(&self, voice: Voice<T::Handle>) {
        if let Err(e) = self.transport.disconnect(voice.handle).await {
            warn!("⚠️ [{}] Disconnect failed: {}", self.guild_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::testing::{FakeTransport, TransportCall},
        error::TransportError,
    };
    use pretty_assertions::assert_eq;

    const IDLE: Duration = Duration::from_secs(180);

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn channel(id: u64) -> ChannelId {
        ChannelId::new(id)
    }

    fn track(title: &str, secs: u64) -> Track {
        Track::new(title, format!("https://cdn/{title}")).with_duration(Duration::from_secs(secs))
    }

    fn setup() -> (Arc<FakeTransport>, Arc<SessionRegistry<FakeTransport>>) {
        let transport = Arc::new(FakeTransport::default());
        let registry = SessionRegistry::new(transport.clone(), IDLE);
        (transport, registry)
    }

    fn titles(snapshot: &SessionSnapshot) -> Vec<String> {
        snapshot
            .queue
            .tracks()
            .iter()
            .map(|t| t.title().to_string())
            .collect()
    }

    fn assert_invariant(snapshot: &SessionSnapshot) {
        let active = matches!(
            snapshot.status,
            PlaybackStatus::Playing | PlaybackStatus::Paused
        );
        assert_eq!(active, snapshot.current.is_some(), "{snapshot:?}");
    }

    /// Waits until the session task has processed everything sent so far.
    async fn settle(session: &SessionHandle) -> SessionSnapshot {
        let snapshot = session.snapshot().await;
        assert_invariant(&snapshot);
        snapshot
    }

    #[tokio::test]
    async fn play_from_disconnected_connects_and_starts_first_track() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());

        let enqueued = session
            .play(channel(10), vec![track("a", 180), track("b", 240)])
            .await
            .unwrap();

        assert_eq!(enqueued.now_playing.as_ref().map(Track::title), Some("a"));
        assert_eq!(enqueued.first_position, None);
        assert_eq!(enqueued.queue_len, 1);

        let snapshot = settle(&session).await;
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
        assert_eq!(titles(&snapshot), vec!["b"]);
        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::Connect(channel(10)),
                TransportCall::Start("a".into()),
            ]
        );
    }

    #[tokio::test]
    async fn play_while_playing_only_enqueues() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session.play(channel(10), vec![track("a", 180)]).await.unwrap();

        let enqueued = session
            .play(channel(10), vec![track("b", 60), track("c", 60)])
            .await
            .unwrap();

        assert_eq!(enqueued.first_position, Some(1));
        assert_eq!(enqueued.queue_len, 2);
        assert_eq!(enqueued.now_playing.as_ref().map(Track::title), Some("a"));
        assert_eq!(transport.starts(), vec!["a"]);
    }

    #[tokio::test]
    async fn skip_stop_scenario() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session
            .play(channel(10), vec![track("a", 180), track("b", 240)])
            .await
            .unwrap();

        let skipped = session.skip().await.unwrap();
        assert_eq!(skipped.skipped.title(), "a");
        assert_eq!(skipped.next.as_ref().map(Track::title), Some("b"));

        let snapshot = settle(&session).await;
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
        assert_eq!(snapshot.current.as_ref().map(Track::title), Some("b"));
        assert!(snapshot.queue.is_empty());

        let stopped = session.stop().await.unwrap();
        assert_eq!(stopped, Stopped { cleared: 0, was_connected: true });
        assert_eq!(session.snapshot().await, SessionSnapshot::disconnected());
        assert_eq!(transport.disconnects(), 1);
        assert!(registry.get(guild()).is_none());
    }

    #[tokio::test]
    async fn skip_advances_exactly_once() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session
            .play(
                channel(10),
                vec![track("a", 180), track("b", 240), track("c", 60)],
            )
            .await
            .unwrap();

        session.skip().await.unwrap();
        // The stop above already queued a finish event for "a"; replaying it
        // must not move past "b".
        transport.refire_last_stopped();

        let snapshot = settle(&session).await;
        assert_eq!(snapshot.current.as_ref().map(Track::title), Some("b"));
        assert_eq!(titles(&snapshot), vec!["c"]);
        assert_eq!(transport.starts(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn natural_end_advances_and_errors_do_not_stall() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session
            .play(
                channel(10),
                vec![track("a", 180), track("b", 240), track("c", 60)],
            )
            .await
            .unwrap();

        transport.finish_current(None);
        let snapshot = settle(&session).await;
        assert_eq!(snapshot.current.as_ref().map(Track::title), Some("b"));

        transport.finish_current(Some("decoder exploded".into()));
        let snapshot = settle(&session).await;
        assert_eq!(snapshot.current.as_ref().map(Track::title), Some("c"));
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn start_failure_moves_to_the_next_track() {
        let (transport, registry) = setup();
        transport.fail_start_of("https://cdn/broken");
        let session = registry.get_or_create(guild());

        let enqueued = session
            .play(channel(10), vec![track("broken", 10), track("ok", 10)])
            .await
            .unwrap();

        assert_eq!(enqueued.now_playing.as_ref().map(Track::title), Some("ok"));
        assert_eq!(enqueued.queue_len, 0);
    }

    #[tokio::test]
    async fn pause_and_resume_keep_the_current_track() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session.play(channel(10), vec![track("a", 180)]).await.unwrap();

        assert_eq!(session.resume().await, Err(CommandError::NotPaused));

        let paused = session.pause().await.unwrap();
        assert_eq!(paused.title(), "a");
        let snapshot = settle(&session).await;
        assert_eq!(snapshot.status, PlaybackStatus::Paused);
        assert_eq!(snapshot.current.as_ref().map(Track::title), Some("a"));

        assert_eq!(session.pause().await, Err(CommandError::AlreadyPaused));

        let resumed = session.resume().await.unwrap();
        assert_eq!(resumed.title(), "a");
        let snapshot = settle(&session).await;
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
        assert_eq!(transport.starts(), vec!["a"]);
    }

    #[tokio::test]
    async fn pause_and_resume_while_idle_fail() {
        let (_transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session.play(channel(10), vec![track("a", 180)]).await.unwrap();
        session.skip().await.unwrap();
        assert_eq!(settle(&session).await.status, PlaybackStatus::Idle);

        assert_eq!(session.pause().await, Err(CommandError::NothingPlaying));
        assert_eq!(session.resume().await, Err(CommandError::NothingPaused));
        assert_eq!(session.skip().await, Err(CommandError::NothingPlaying));
    }

    #[tokio::test]
    async fn skip_while_paused_starts_the_next_track() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session
            .play(channel(10), vec![track("a", 180), track("b", 240)])
            .await
            .unwrap();
        session.pause().await.unwrap();

        let skipped = session.skip().await.unwrap();

        assert_eq!(skipped.skipped.title(), "a");
        let snapshot = settle(&session).await;
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
        assert_eq!(snapshot.current.as_ref().map(Track::title), Some("b"));
        assert_eq!(transport.starts(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn pause_fails_when_the_track_already_ended() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session.play(channel(10), vec![track("a", 180)]).await.unwrap();

        transport.silence();

        assert_eq!(session.pause().await, Err(CommandError::NothingPlaying));
    }

    #[tokio::test]
    async fn remove_and_clear_touch_only_the_queue() {
        let (_transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session
            .play(
                channel(10),
                vec![track("now", 60), track("a", 60), track("b", 60), track("c", 60)],
            )
            .await
            .unwrap();

        assert_eq!(session.remove(2).await.unwrap().title(), "b");
        assert_eq!(titles(&settle(&session).await), vec!["a", "c"]);

        assert_eq!(
            session.remove(0).await,
            Err(CommandError::QueuePositionOutOfRange { position: 0, len: 2 })
        );
        assert_eq!(
            session.remove(-3).await,
            Err(CommandError::QueuePositionOutOfRange { position: -3, len: 2 })
        );
        assert_eq!(
            session.remove(3).await,
            Err(CommandError::QueuePositionOutOfRange { position: 3, len: 2 })
        );

        assert_eq!(session.clear_queue().await, 2);
        let snapshot = settle(&session).await;
        assert!(snapshot.queue.is_empty());
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_leaves_after_the_window() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session.play(channel(10), vec![track("a", 180)]).await.unwrap();
        transport.finish_current(None);
        assert_eq!(settle(&session).await.status, PlaybackStatus::Idle);

        tokio::time::sleep(IDLE - Duration::from_secs(1)).await;
        assert_eq!(settle(&session).await.status, PlaybackStatus::Idle);
        assert_eq!(transport.disconnects(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        // Let the session task run its teardown.
        while !session.is_closed() {
            tokio::task::yield_now().await;
        }

        assert_eq!(transport.disconnects(), 1);
        assert!(registry.get(guild()).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn play_during_idle_window_cancels_the_disconnect() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session.play(channel(10), vec![track("a", 180)]).await.unwrap();
        transport.finish_current(None);
        assert_eq!(settle(&session).await.status, PlaybackStatus::Idle);

        tokio::time::sleep(Duration::from_secs(100)).await;
        session.play(channel(10), vec![track("b", 600)]).await.unwrap();

        tokio::time::sleep(Duration::from_secs(500)).await;
        let snapshot = settle(&session).await;
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
        assert_eq!(snapshot.current.as_ref().map(Track::title), Some("b"));
        assert_eq!(transport.disconnects(), 0);
        assert!(registry.get(guild()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_idle_token_is_ignored() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session.play(channel(10), vec![track("a", 180)]).await.unwrap();
        transport.finish_current(None);
        assert_eq!(settle(&session).await.status, PlaybackStatus::Idle);

        // Token 1 was armed on connect and replaced when "a" started.
        session
            .mailbox
            .send(SessionMessage::IdleTimeout { token: 1 })
            .unwrap();

        assert_eq!(settle(&session).await.status, PlaybackStatus::Idle);
        assert_eq!(transport.disconnects(), 0);
    }

    #[tokio::test]
    async fn failed_connect_enqueues_nothing_and_closes() {
        let (transport, registry) = setup();
        transport.fail_connects();
        let session = registry.get_or_create(guild());

        let result = session.play(channel(10), vec![track("a", 180)]).await;

        assert_eq!(
            result,
            Err(CommandError::from(TransportError::Connect("refused".into())))
        );
        while !session.is_closed() {
            tokio::task::yield_now().await;
        }
        assert!(registry.get(guild()).is_none());
        assert_eq!(transport.starts(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn play_from_another_channel_moves_the_connection() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session.play(channel(10), vec![track("a", 180)]).await.unwrap();

        session.play(channel(20), vec![track("b", 180)]).await.unwrap();

        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::Connect(channel(10)),
                TransportCall::Start("a".into()),
                TransportCall::Move(channel(20)),
            ]
        );
    }

    #[tokio::test]
    async fn lost_connection_is_replaced_on_play() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session
            .play(channel(10), vec![track("a", 180), track("b", 180)])
            .await
            .unwrap();

        transport.drop_connections();
        let enqueued = session.play(channel(10), vec![track("c", 180)]).await.unwrap();

        // The old handle is released, a new one plays the rest of the queue.
        assert_eq!(transport.disconnects(), 1);
        assert_eq!(enqueued.now_playing.as_ref().map(Track::title), Some("b"));
        assert_eq!(enqueued.queue_len, 1);
        assert_eq!(transport.connects(), 2);
    }

    #[tokio::test]
    async fn messages_after_stop_are_rejected() {
        let (_transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session.play(channel(10), vec![track("a", 180)]).await.unwrap();

        let (reply, stopped) = oneshot::channel();
        session
            .mailbox
            .send(SessionMessage::Stop { reply })
            .unwrap();
        let late = session.play(channel(10), vec![track("b", 180)]).await;
        let stopped = stopped.await.unwrap();

        assert!(stopped.unwrap().was_connected);
        assert_eq!(late, Err(CommandError::SessionClosed));
        assert_eq!(session.pause().await, Err(CommandError::SessionClosed));
        assert_eq!(session.clear_queue().await, 0);
    }

    #[tokio::test]
    async fn voice_lost_while_still_connected_keeps_playing() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session
            .play(channel(10), vec![track("a", 180), track("b", 180)])
            .await
            .unwrap();

        assert!(!session.voice_lost().await);

        let snapshot = settle(&session).await;
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
        assert_eq!(titles(&snapshot), vec!["b"]);
        assert_eq!(transport.disconnects(), 0);
        assert!(registry.get(guild()).is_some());
    }

    #[tokio::test]
    async fn voice_lost_after_being_kicked_stops_the_session() {
        let (transport, registry) = setup();
        let session = registry.get_or_create(guild());
        session
            .play(channel(10), vec![track("a", 180), track("b", 180)])
            .await
            .unwrap();

        transport.drop_connections();
        assert!(session.voice_lost().await);

        while !session.is_closed() {
            tokio::task::yield_now().await;
        }
        assert!(registry.get(guild()).is_none());
        assert_eq!(session.snapshot().await, SessionSnapshot::disconnected());
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test]
    async fn voice_lost_queued_behind_a_connecting_play_is_ignored() {
        let (transport, registry) = setup();
        let gate = transport.hold_connects_to(channel(10));
        let session = registry.get_or_create(guild());

        let play = tokio::spawn({
            let session = session.clone();
            async move { session.play(channel(10), vec![track("a", 180)]).await }
        });
        while transport.connects() == 0 {
            tokio::task::yield_now().await;
        }
        let lost = tokio::spawn({
            let session = session.clone();
            async move { session.voice_lost().await }
        });
        tokio::task::yield_now().await;
        gate.notify_one();

        assert!(play.await.unwrap().is_ok());
        assert!(!lost.await.unwrap());
        assert_eq!(settle(&session).await.status, PlaybackStatus::Playing);
        assert_eq!(transport.starts(), vec!["a"]);
        assert_eq!(transport.disconnects(), 0);
    }
}
