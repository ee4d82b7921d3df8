use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        stop_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        queue_command(),
        remove_command(),
        nowplaying_command(),
        clearqueue_command(),
    ]
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song or playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL or search term",
            )
            .required(true),
        )
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback, clear the queue and leave voice")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current track")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the current track")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume the paused track")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show the current track")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Show the playback queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Page number")
                .required(false)
                .min_int_value(1),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Remove a track from the queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "position",
                "Position in the queue (1 = next up)",
            )
            .required(true),
        )
}

fn clearqueue_command() -> CreateCommand {
    CreateCommand::new("clearqueue").description("Remove every queued track")
}
