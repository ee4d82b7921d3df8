use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        queue::QueuePage,
        session::{Enqueued, PlaybackStatus, SessionSnapshot, Skipped, Stopped},
        track::Track,
    },
    error::{CommandError, ResolveError},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

/// Discord rejects embed field values longer than this.
const FIELD_VALUE_LIMIT: usize = 1024;

/// Longest title shown inside a list or field before it is cut with `…`.
const TITLE_LIMIT: usize = 80;

fn base_embed() -> CreateEmbed {
    CreateEmbed::default()
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed for the track that just started or is currently playing.
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    let mut embed = base_embed()
        .title("🎵 Now Playing")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duration", format_duration(track.duration()), true)
        .field(
            "👤 Requested by",
            track.requester().unwrap_or("Unknown"),
            true,
        );

    if !track.url().is_empty() {
        embed = embed.url(track.url());
    }

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

/// Embed for a successful `/play`.
pub fn create_enqueued_embed(enqueued: &Enqueued) -> CreateEmbed {
    match enqueued.added.as_slice() {
        [track] if enqueued.first_position.is_none() => create_now_playing_embed(track),
        [track] => {
            let mut embed = base_embed()
                .title("✅ Added to Queue")
                .description(format!("**{}**", track.title()))
                .color(colors::SUCCESS_GREEN)
                .field("⏱️ Duration", format_duration(track.duration()), true);

            if let Some(position) = enqueued.first_position {
                embed = embed.field("📍 Position", position.to_string(), true);
            }

            if !track.url().is_empty() {
                embed = embed.url(track.url());
            }

            if let Some(thumbnail) = track.thumbnail() {
                embed = embed.thumbnail(thumbnail);
            }

            embed
        }
        tracks => {
            let mut embed = base_embed()
                .title("📋 Playlist Added")
                .description(format!("Added **{} tracks** to the queue", tracks.len()))
                .color(colors::MUSIC_PURPLE)
                .field("📋 In queue", enqueued.queue_len.to_string(), true);

            if let Some(current) = &enqueued.now_playing {
                embed = embed.field("🎵 Now playing", truncate_title(current.title()), true);
            }

            embed
        }
    }
}

/// Embed for `/queue`: now playing plus one page of upcoming tracks.
pub fn create_queue_embed(snapshot: &SessionSnapshot, page: usize, per_page: usize) -> CreateEmbed {
    let mut embed = base_embed()
        .title("📋 Queue")
        .color(colors::INFO_BLUE);

    if snapshot.current.is_none() && snapshot.queue.is_empty() {
        return embed
            .description("😴 **The queue is empty**\n\n💡 Use `/play <song>` to add music")
            .color(colors::NEUTRAL_GRAY);
    }

    // Canción actual
    if let Some(current) = &snapshot.current {
        let status = match snapshot.status {
            PlaybackStatus::Paused => "⏸️",
            _ => "▶️",
        };

        embed = embed.field(
            format!("{} Now Playing", status),
            format!(
                "**{}** `[{}]`",
                truncate_title(current.title()),
                format_duration(current.duration())
            ),
            false,
        );
    }

    let queue_page = snapshot.queue.page(page, per_page);
    if !queue_page.tracks.is_empty() {
        embed = embed.field("Up next", format_queue_page(&queue_page), false);
    }

    let mut info = format!("**Total:** {} tracks", snapshot.queue.len());
    let total = snapshot.queue.total_duration();
    if total > Duration::ZERO {
        info.push_str(&format!(" • **Duration:** {}", format_duration(Some(total))));
    }
    embed = embed.field("Info", info, false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Page {} of {} • Guild Jukebox",
            queue_page.current_page, queue_page.total_pages
        )));
    }

    embed
}

pub fn create_nothing_playing_embed() -> CreateEmbed {
    base_embed()
        .title("🔇 Nothing Playing")
        .description("💡 Use `/play <song>` to start the music")
        .color(colors::NEUTRAL_GRAY)
}

pub fn create_skipped_embed(skipped: &Skipped) -> CreateEmbed {
    let next = match &skipped.next {
        Some(track) => format!("Up next: **{}**", track.title()),
        None => "The queue is empty".to_string(),
    };

    base_embed()
        .title("⏭️ Skipped")
        .description(format!("**{}**\n\n{}", skipped.skipped.title(), next))
        .color(colors::INFO_BLUE)
}

pub fn create_paused_embed(track: &Track) -> CreateEmbed {
    base_embed()
        .title("⏸️ Paused")
        .description(format!("**{}**", track.title()))
        .color(colors::WARNING_ORANGE)
}

pub fn create_resumed_embed(track: &Track) -> CreateEmbed {
    base_embed()
        .title("▶️ Resumed")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
}

pub fn create_stopped_embed(stopped: &Stopped) -> CreateEmbed {
    let description = if stopped.was_connected {
        format!(
            "Playback stopped and {} queued track(s) cleared. 👋",
            stopped.cleared
        )
    } else {
        "Nothing was playing.".to_string()
    };

    base_embed()
        .title("⏹️ Stopped")
        .description(description)
        .color(colors::NEUTRAL_GRAY)
}

pub fn create_removed_embed(track: &Track, position: i64) -> CreateEmbed {
    base_embed()
        .title("🗑️ Removed")
        .description(format!("**{}** (position {})", track.title(), position))
        .color(colors::INFO_BLUE)
}

pub fn create_cleared_embed(cleared: usize) -> CreateEmbed {
    base_embed()
        .title("🧹 Queue Cleared")
        .description(format!("Removed {} track(s) from the queue", cleared))
        .color(colors::INFO_BLUE)
}

/// Embed for a rejected command.
pub fn create_error_embed(error: &CommandError) -> CreateEmbed {
    let (title, description) = error_message(error);
    base_embed()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
}

/// User-facing title and description for each command error.
pub fn error_message(error: &CommandError) -> (&'static str, String) {
    match error {
        CommandError::NotInVoiceChannel => (
            "Not in a Voice Channel",
            "Join a voice channel first, then try again.".to_string(),
        ),
        CommandError::Resolution(ResolveError::NoResults(query)) => {
            ("No Results", format!("Nothing found for `{}`.", query))
        }
        CommandError::Resolution(ResolveError::Timeout(after)) => (
            "Search Timed Out",
            format!("The search took longer than {}s.", after.as_secs()),
        ),
        CommandError::Resolution(ResolveError::Extractor(reason)) => (
            "Search Failed",
            format!("Could not load that track: {}", reason),
        ),
        CommandError::Connect(reason) => (
            "Connection Failed",
            format!("Could not join the voice channel: {}", reason),
        ),
        CommandError::NothingPlaying => ("Nothing Playing", "No track is playing.".to_string()),
        CommandError::NothingPaused => ("Nothing Paused", "No track is paused.".to_string()),
        CommandError::AlreadyPaused => ("Already Paused", "Use `/resume` to continue.".to_string()),
        CommandError::NotPaused => ("Not Paused", "The music is already playing.".to_string()),
        CommandError::QueuePositionOutOfRange { position, len } => (
            "Invalid Position",
            if *len == 0 {
                format!("Position {} is out of range: the queue is empty.", position)
            } else {
                format!("Position {} is out of range (1-{}).", position, len)
            },
        ),
        CommandError::Transport(reason) => ("Playback Error", reason.clone()),
        CommandError::SessionClosed => (
            "Session Ended",
            "The player shut down while handling that command. Please try again.".to_string(),
        ),
    }
}

/// Numbered lines for one queue page, with a trailer for what does not fit.
///
/// The result stays within Discord's field value limit: lines that would
/// overflow it are folded into the trailer count.
pub fn format_queue_page(page: &QueuePage) -> String {
    let total = page.tracks.len() + page.remaining;
    let trailer_room = format!("\n… and {} more", total).chars().count();

    let mut text = String::new();
    let mut used = 0;
    let mut shown = 0;

    for (i, track) in page.tracks.iter().enumerate() {
        let line = format!(
            "**{}**. {} `[{}]`",
            page.first_position + i,
            truncate_title(track.title()),
            format_duration(track.duration())
        );
        let separator = usize::from(!text.is_empty());
        let more_follows = i + 1 < page.tracks.len() || page.remaining > 0;
        let reserve = if more_follows { trailer_room } else { 0 };

        let line_len = line.chars().count();
        if used + separator + line_len + reserve > FIELD_VALUE_LIMIT {
            break;
        }

        if separator == 1 {
            text.push('\n');
        }
        text.push_str(&line);
        used += separator + line_len;
        shown += 1;
    }

    let remaining = page.remaining + (page.tracks.len() - shown);
    if remaining > 0 {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&format!("… and {} more", remaining));
    }

    text
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= TITLE_LIMIT {
        return title.to_string();
    }

    let mut short: String = title.chars().take(TITLE_LIMIT - 1).collect();
    short.push('…');
    short
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Option<Duration>) -> String {
    let total_seconds = match duration {
        Some(d) if !d.is_zero() => d.as_secs(),
        _ => return "Live".to_string(),
    };

    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
