//! # Audio Module
//!
//! Playback scheduling for every guild the bot is in.
//!
//! ## Architecture
//!
//! ### [`session`] - Session
//! - One task per guild owning its queue, voice handle and playback state
//! - Commands, track-finished events and idle timeouts share one mailbox,
//!   so a guild's state is only ever touched by its own task
//! - Idle sessions leave voice after the configured window
//!
//! ### [`registry`] - Session Registry
//! - Concurrent guild → session map with atomic get-or-create
//! - Identity-checked removal so a torn-down session never evicts its
//!   replacement
//!
//! ### [`queue`] - Queue Management
//! - FIFO queue with 1-indexed positional removal
//! - Detached snapshots and pages for display
//!
//! ### [`transport`] - Transport
//! - The seam to the voice/audio pipeline; [`songbird_transport`] is the
//!   production implementation
//!
//! ## Example
//!
//! ```rust,no_run
//! use guild_jukebox::audio::{
//!     registry::SessionRegistry, songbird_transport::SongbirdTransport, track::Track,
//! };
//! use serenity::all::{ChannelId, GuildId};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example(manager: Arc<songbird::Songbird>) -> anyhow::Result<()> {
//! let transport = Arc::new(SongbirdTransport::new(manager));
//! let registry = SessionRegistry::new(transport, Duration::from_secs(180));
//!
//! let session = registry.get_or_create(GuildId::new(123456789));
//! let track = Track::new("Song", "https://example.com/song.mp3");
//! session.play(ChannelId::new(987654321), vec![track]).await?;
//!
//! session.pause().await?;
//! session.resume().await?;
//! session.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod registry;
pub mod session;
pub mod songbird_transport;
pub mod track;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
