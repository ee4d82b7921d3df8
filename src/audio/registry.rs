use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::debug;

use super::{
    session::{self, SessionHandle},
    transport::Transport,
};

/// Process-wide map from guild to its running session.
///
/// Sessions are only reachable through [`get_or_create`](Self::get_or_create),
/// [`get`](Self::get) and [`remove`](Self::remove); the map itself is never
/// exposed.
pub struct SessionRegistry<T: Transport> {
    sessions: DashMap<GuildId, SessionHandle>,
    transport: Arc<T>,
    idle_timeout: Duration,
    next_session_id: AtomicU64,
}

impl<T: Transport> SessionRegistry<T> {
    pub fn new(transport: Arc<T>, idle_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            transport,
            idle_timeout,
            next_session_id: AtomicU64::new(0),
        })
    }

    /// Returns the live session for `guild_id`, starting a new one in the
    /// `Disconnected` state if there is none.
    pub fn get_or_create(self: &Arc<Self>, guild_id: GuildId) -> SessionHandle {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) if !entry.get().is_closed() => entry.get().clone(),
            Entry::Occupied(mut entry) => {
                let handle = self.spawn(guild_id);
                entry.insert(handle.clone());
                handle
            }
            Entry::Vacant(entry) => {
                let handle = self.spawn(guild_id);
                entry.insert(handle.clone());
                handle
            }
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }

    /// Removes the entry for `guild_id` only if it still belongs to session
    /// `session_id`; a newer session for the same guild is left alone.
    pub fn remove(&self, guild_id: GuildId, session_id: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(&guild_id, |_, handle| handle.id() == session_id)
            .is_some();
        if removed {
            debug!("Session {} removed for guild {}", session_id, guild_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn spawn(self: &Arc<Self>, guild_id: GuildId) -> SessionHandle {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed) + 1;
        session::spawn(
            guild_id,
            id,
            self.transport.clone(),
            Arc::downgrade(self),
            self.idle_timeout,
        )
    }
}
