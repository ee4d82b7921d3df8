use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info};

use super::{dispatcher::PlayRequest, JukeboxBot};
use crate::{error::CommandError, ui::embeds};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside a guild"))?;

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Puede tardar, responde por su cuenta
    if command.data.name == "play" {
        return handle_play(ctx, command, guild_id, bot).await;
    }

    let dispatcher = bot.dispatcher();
    let embed = match command.data.name.as_str() {
        "stop" => render(dispatcher.stop(guild_id).await, embeds::create_stopped_embed),
        "skip" => render(dispatcher.skip(guild_id).await, embeds::create_skipped_embed),
        "pause" => render(dispatcher.pause(guild_id).await, embeds::create_paused_embed),
        "resume" => render(dispatcher.resume(guild_id).await, embeds::create_resumed_embed),
        "queue" => {
            let page = integer_option(&command, "page")
                .map(|page| usize::try_from(page.max(1)).unwrap_or(usize::MAX))
                .unwrap_or(1);
            let snapshot = dispatcher.queue(guild_id).await;
            embeds::create_queue_embed(&snapshot, page, bot.config().queue_display_limit)
        }
        "remove" => {
            let position = integer_option(&command, "position")
                .ok_or_else(|| anyhow::anyhow!("Missing position"))?;
            render(dispatcher.remove(guild_id, position).await, |track| {
                embeds::create_removed_embed(track, position)
            })
        }
        "nowplaying" => match dispatcher.now_playing(guild_id).await {
            Some(track) => embeds::create_now_playing_embed(&track),
            None => embeds::create_nothing_playing_embed(),
        },
        "clearqueue" => embeds::create_cleared_embed(dispatcher.clear_queue(guild_id).await),
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Unknown command")
                            .ephemeral(true),
                    ),
                )
                .await?;
            return Ok(());
        }
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing query"))?
        .to_string();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let requester = command
        .member
        .as_deref()
        .map(|member| member.display_name().to_string())
        .unwrap_or_else(|| command.user.display_name().to_string());

    let request = PlayRequest {
        guild_id,
        requester,
        voice_channel: get_user_voice_channel(ctx, guild_id, command.user.id),
        query,
    };

    let embed = render(
        bot.dispatcher().play(request).await,
        embeds::create_enqueued_embed,
    );

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

fn render<V>(result: Result<V, CommandError>, ok: impl FnOnce(&V) -> CreateEmbed) -> CreateEmbed {
    match result {
        Ok(value) => ok(&value),
        Err(e) => {
            debug!("Command rejected: {}", e);
            embeds::create_error_embed(&e)
        }
    }
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

// Funciones auxiliares

/// The caller's current voice channel, read from the gateway cache.
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
