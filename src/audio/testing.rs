//! In-memory transport for scheduler tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::Notify;

use super::{
    track::Track,
    transport::{FinishNotifier, Transport},
};
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(ChannelId),
    Move(ChannelId),
    Start(String),
    Pause,
    Resume,
    StopCurrent,
    Disconnect(u64),
}

#[derive(Debug)]
pub struct FakeHandle(u64);

/// Records every call and lets tests fire track-finished callbacks.
#[derive(Default)]
pub struct FakeTransport {
    calls: Mutex<Vec<TransportCall>>,
    current: Mutex<Option<FinishNotifier>>,
    last_stopped: Mutex<Option<FinishNotifier>>,
    paused: AtomicBool,
    live_handles: Mutex<HashSet<u64>>,
    next_handle: AtomicU64,
    fail_connect: AtomicBool,
    failing_sources: Mutex<HashSet<String>>,
    connect_gates: Mutex<HashMap<ChannelId, Arc<Notify>>>,
}

impl FakeTransport {
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    /// Titles of every started track, in order.
    pub fn starts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Start(title) => Some(title.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Connect(_)))
    }

    pub fn disconnects(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Disconnect(_)))
    }

    pub fn fail_connects(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// Makes every connect to `channel_id` wait until the returned gate is
    /// notified.
    pub fn hold_connects_to(&self, channel_id: ChannelId) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.connect_gates.lock().insert(channel_id, gate.clone());
        gate
    }

    pub fn fail_start_of(&self, source: &str) {
        self.failing_sources.lock().insert(source.to_string());
    }

    /// Ends the current track as the audio pipeline would.
    pub fn finish_current(&self, error: Option<String>) {
        if let Some(notifier) = self.current.lock().take() {
            notifier.finished(error);
        }
    }

    /// Fires the finish callback of the last stopped track a second time.
    pub fn refire_last_stopped(&self) {
        if let Some(notifier) = self.last_stopped.lock().as_ref() {
            notifier.finished(None);
        }
    }

    /// Forgets the current track without firing its callback, as if the end
    /// event were still in flight.
    pub fn silence(&self) {
        self.current.lock().take();
    }

    /// Simulates the bot being kicked from voice.
    pub fn drop_connections(&self) {
        self.live_handles.lock().clear();
    }

    fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Handle = FakeHandle;

    async fn connect(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<FakeHandle, TransportError> {
        self.record(TransportCall::Connect(channel_id));
        let gate = self.connect_gates.lock().get(&channel_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("refused".into()));
        }
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.live_handles.lock().insert(id);
        Ok(FakeHandle(id))
    }

    async fn move_to(&self, _handle: &FakeHandle, channel_id: ChannelId) -> Result<(), TransportError> {
        self.record(TransportCall::Move(channel_id));
        Ok(())
    }

    async fn start(
        &self,
        _handle: &FakeHandle,
        track: &Track,
        on_finished: FinishNotifier,
    ) -> Result<(), TransportError> {
        if self.failing_sources.lock().contains(track.source()) {
            return Err(TransportError::Playback("unsupported codec".into()));
        }
        self.record(TransportCall::Start(track.title().to_string()));
        self.paused.store(false, Ordering::SeqCst);
        *self.current.lock() = Some(on_finished);
        Ok(())
    }

    async fn pause(&self, _handle: &FakeHandle) -> Result<(), TransportError> {
        self.record(TransportCall::Pause);
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self, _handle: &FakeHandle) -> Result<(), TransportError> {
        self.record(TransportCall::Resume);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_current(&self, _handle: &FakeHandle) -> Result<(), TransportError> {
        self.record(TransportCall::StopCurrent);
        let stopped = self.current.lock().take();
        if let Some(notifier) = stopped {
            notifier.finished(None);
            *self.last_stopped.lock() = Some(notifier);
        }
        Ok(())
    }

    async fn disconnect(&self, handle: FakeHandle) -> Result<(), TransportError> {
        self.record(TransportCall::Disconnect(handle.0));
        self.live_handles.lock().remove(&handle.0);
        Ok(())
    }

    async fn is_connected(&self, handle: &FakeHandle) -> bool {
        self.live_handles.lock().contains(&handle.0)
    }

    async fn is_playing(&self, _handle: &FakeHandle) -> bool {
        self.current.lock().is_some() && !self.paused.load(Ordering::SeqCst)
    }

    async fn is_paused(&self, _handle: &FakeHandle) -> bool {
        self.current.lock().is_some() && self.paused.load(Ordering::SeqCst)
    }
}
