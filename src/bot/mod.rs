//! # Bot Module
//!
//! Discord front-end for Guild Jukebox.
//!
//! This module contains:
//! - Command registration ([`commands`]) and handling ([`handlers`])
//! - The [`dispatcher`] that routes commands to per-guild sessions
//! - Event handling (ready, interactions, voice state updates)
//!
//! ## Architecture
//!
//! The bot is built around the [`JukeboxBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It owns no playback state: every
//! command goes through the [`MusicDispatcher`], which hands it to the
//! guild's session.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use guild_jukebox::{
//! #     audio::{registry::SessionRegistry, songbird_transport::SongbirdTransport},
//! #     bot::{dispatcher::Dispatcher, JukeboxBot},
//! #     config::Config,
//! #     sources::YtDlpResolver,
//! # };
//! # fn example(manager: Arc<songbird::Songbird>) -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let transport = Arc::new(SongbirdTransport::new(manager));
//! let registry = SessionRegistry::new(transport, config.idle_timeout());
//! let dispatcher = Arc::new(Dispatcher::new(registry, YtDlpResolver::new(&config)));
//!
//! let bot = JukeboxBot::new(config, dispatcher);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod dispatcher;
pub mod handlers;

use crate::{audio::songbird_transport::SongbirdTransport, config::Config, sources::YtDlpResolver};
use dispatcher::Dispatcher;

/// The dispatcher wired to the production voice transport and resolver.
pub type MusicDispatcher = Dispatcher<SongbirdTransport, YtDlpResolver>;

/// Main Discord event handler.
pub struct JukeboxBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    dispatcher: Arc<MusicDispatcher>,
}

impl JukeboxBot {
    pub fn new(config: Config, dispatcher: Arc<MusicDispatcher>) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<MusicDispatcher> {
        &self.dispatcher
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) propagate in about a second,
    /// global ones can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not in the configured guild: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registering guild commands: {:?}", e);
                    anyhow::anyhow!("Could not register guild commands. Check the bot has the 'applications.commands' scope in that guild.")
                })?;
                info!("✅ Guild commands registered for: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registering global commands: {:?}", e);
                    anyhow::anyhow!("Could not register global commands. Check the bot has the 'applications.commands' scope.")
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Tells the guild's session that the bot left voice. The session itself
    /// decides whether its connection is actually gone, since this event also
    /// follows the bot's own disconnects.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            if self.dispatcher.voice_lost(guild_id).await {
                info!("🔌 Bot disconnected from voice in guild {}", guild_id);
            }
        }
    }
}
