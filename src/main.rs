use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use guild_jukebox::{
    audio::{registry::SessionRegistry, songbird_transport::SongbirdTransport},
    bot::{dispatcher::Dispatcher, JukeboxBot},
    config::Config,
    sources::YtDlpResolver,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let resolver = YtDlpResolver::new(&config);

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        let version = resolver.verify().await?;
        println!("OK (yt-dlp {})", version);
        return Ok(());
    }

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(songbird.clone()));
    let registry = SessionRegistry::new(transport, config.idle_timeout());
    let dispatcher = Arc::new(Dispatcher::new(registry, resolver));

    let handler = JukeboxBot::new(config.clone(), dispatcher);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Shutdown signal received, closing...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Could not listen for Ctrl+C: {:?}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
