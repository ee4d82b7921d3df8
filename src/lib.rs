//! Guild Jukebox: a Discord music bot with one playback session per guild.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
