use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod storage;

use crate::audio::{
    catalog::{CatalogDefinition, SoundCatalog},
    player::Soundboard,
    selector::WeightedSelector,
    transport::SongbirdTransport,
};
use crate::bot::HornBot;
use crate::config::Config;
use crate::storage::{JsonStatsStore, NoopStats, PlayStats};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hornboard=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎺 Iniciando Hornboard v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Precargar sonidos
    info!("📀 Precargando sonidos...");
    let definition = match &config.sounds_file {
        Some(path) => CatalogDefinition::from_file(path)?,
        None => CatalogDefinition::builtin(),
    };
    let catalog = Arc::new(SoundCatalog::load(&definition, &config.audio_dir));

    // Estadísticas
    let stats: Arc<dyn PlayStats> = if config.enable_stats {
        match JsonStatsStore::new(config.data_dir.clone()).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!("⚠️ No se pudo abrir el almacén de estadísticas: {:?}", e);
                Arc::new(NoopStats)
            }
        }
    } else {
        info!("📊 Estadísticas desactivadas");
        Arc::new(NoopStats)
    };

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let songbird = Songbird::serenity();
    let board = Arc::new(Soundboard::new(
        catalog,
        WeightedSelector::new(),
        config.max_queue_size,
        Arc::new(SongbirdTransport::new(songbird.clone())),
        stats,
        config.timings(),
    ));

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(HornBot::new(board))
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot listo para sonar");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
