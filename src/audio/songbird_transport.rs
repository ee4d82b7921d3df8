use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    track::Track,
    transport::{FinishNotifier, Transport},
};
use crate::error::TransportError;

/// [`Transport`] backed by songbird voice connections.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
        }
    }
}

/// Voice connection of one guild plus the track it is currently playing.
pub struct VoiceHandle {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    track: parking_lot::Mutex<Option<TrackHandle>>,
}

impl VoiceHandle {
    fn current_track(&self) -> Option<TrackHandle> {
        self.track.lock().clone()
    }
}

#[async_trait]
impl Transport for SongbirdTransport {
    type Handle = VoiceHandle;

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<VoiceHandle, TransportError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        {
            let mut call = call.lock().await;
            if let Err(e) = call.deafen(true).await {
                warn!("⚠️ Could not self-deafen in guild {}: {}", guild_id, e);
            }
        }

        info!("🔊 Voice connected in guild {} (channel {})", guild_id, channel_id);
        Ok(VoiceHandle {
            guild_id,
            call,
            track: parking_lot::Mutex::new(None),
        })
    }

    async fn move_to(
        &self,
        handle: &VoiceHandle,
        channel_id: ChannelId,
    ) -> Result<(), TransportError> {
        // Joining again with an existing call moves it.
        self.manager
            .join(handle.guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Connect(e.to_string()))
    }

    async fn start(
        &self,
        handle: &VoiceHandle,
        track: &Track,
        on_finished: FinishNotifier,
    ) -> Result<(), TransportError> {
        let input: Input = HttpRequest::new(self.http.clone(), track.source().to_string()).into();

        let track_handle = {
            let mut call = handle.call.lock().await;
            call.play_only_input(input)
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            track_handle
                .add_event(
                    Event::Track(event),
                    TrackFinishHandler {
                        notifier: on_finished.clone(),
                    },
                )
                .map_err(|e| TransportError::Playback(e.to_string()))?;
        }

        debug!("🎵 Stream started in guild {}: {}", handle.guild_id, track.source());
        *handle.track.lock() = Some(track_handle);
        Ok(())
    }

    async fn pause(&self, handle: &VoiceHandle) -> Result<(), TransportError> {
        let track = handle.current_track().ok_or_else(no_active_track)?;
        track
            .pause()
            .map_err(|e| TransportError::Playback(e.to_string()))
    }

    async fn resume(&self, handle: &VoiceHandle) -> Result<(), TransportError> {
        let track = handle.current_track().ok_or_else(no_active_track)?;
        track
            .play()
            .map_err(|e| TransportError::Playback(e.to_string()))
    }

    async fn stop_current(&self, handle: &VoiceHandle) -> Result<(), TransportError> {
        let track = handle.track.lock().take().ok_or_else(no_active_track)?;
        track
            .stop()
            .map_err(|e| TransportError::Playback(e.to_string()))
    }

    async fn disconnect(&self, handle: VoiceHandle) -> Result<(), TransportError> {
        if let Some(track) = handle.track.lock().take() {
            let _ = track.stop();
        }
        self.manager
            .remove(handle.guild_id)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!("👋 Voice disconnected in guild {}", handle.guild_id);
        Ok(())
    }

    async fn is_connected(&self, handle: &VoiceHandle) -> bool {
        handle.call.lock().await.current_connection().is_some()
    }

    async fn is_playing(&self, handle: &VoiceHandle) -> bool {
        match handle.current_track() {
            Some(track) => matches!(
                track.get_info().await.map(|info| info.playing),
                Ok(PlayMode::Play)
            ),
            None => false,
        }
    }

    async fn is_paused(&self, handle: &VoiceHandle) -> bool {
        match handle.current_track() {
            Some(track) => matches!(
                track.get_info().await.map(|info| info.playing),
                Ok(PlayMode::Pause)
            ),
            None => false,
        }
    }
}

fn no_active_track() -> TransportError {
    TransportError::Playback("no active track".into())
}

/// Forwards songbird's end and error events to the owning session.
struct TrackFinishHandler {
    notifier: FinishNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{e:?}")),
                _ => None,
            }),
            _ => None,
        };

        self.notifier.finished(error);
        None
    }
}
