use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

/// Una reproducción a contabilizar
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRecord {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub sound: String,
    pub forced: bool,
}

/// Receives one record per play.
///
/// Callers never wait on it: the worker spawns the call and only logs a
/// failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlayStats: Send + Sync {
    async fn record_play(&self, record: PlayRecord) -> Result<()>;
}

/// Estadísticas desactivadas
pub struct NoopStats;

#[async_trait]
impl PlayStats for NoopStats {
    async fn record_play(&self, _record: PlayRecord) -> Result<()> {
        Ok(())
    }
}

/// Contadores persistidos en disco
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub users: BTreeSet<u64>,
    pub guilds: BTreeSet<u64>,
    pub channels: BTreeSet<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    pub fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    fn apply(&mut self, record: &PlayRecord) {
        // "a" = aleatorio, "f" = forzado
        let mode = if record.forced { "f" } else { "a" };
        let sound = &record.sound;
        let keys = [
            "total".to_string(),
            format!("{mode}:total"),
            format!("{mode}:sound:{sound}"),
            format!("{mode}:user:{}:sound:{sound}", record.user_id),
            format!("{mode}:guild:{}:sound:{sound}", record.guild_id),
            format!("{mode}:guild:{}:chan:{}:sound:{sound}", record.guild_id, record.channel_id),
        ];
        for key in keys {
            *self.counters.entry(key).or_insert(0) += 1;
        }

        self.users.insert(record.user_id.get());
        self.guilds.insert(record.guild_id.get());
        self.channels.insert(record.channel_id.get());
        self.updated_at = Some(Utc::now());
    }
}

/// Almacén de estadísticas basado en un archivo JSON
pub struct JsonStatsStore {
    path: PathBuf,
    snapshot: Mutex<StatsSnapshot>,
}

impl JsonStatsStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir).await?;
        let path = data_dir.join("stats.json");

        let snapshot = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    // Un archivo dañado no impide arrancar, se empieza de cero
                    warn!("⚠️ Estadísticas ilegibles en {}: {}, se reinician", path.display(), e);
                    StatsSnapshot::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatsSnapshot::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "📁 Estadísticas en {} ({} reproducciones previas)",
            path.display(),
            snapshot.counter("total")
        );

        Ok(Self {
            path,
            snapshot: Mutex::new(snapshot),
        })
    }
}

#[async_trait]
impl PlayStats for JsonStatsStore {
    async fn record_play(&self, record: PlayRecord) -> Result<()> {
        let mut snapshot = self.snapshot.lock().await;
        snapshot.apply(&record);

        let content = serde_json::to_string_pretty(&*snapshot)?;
        // Escritura atómica: archivo temporal y luego rename
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!("💾 Reproducción registrada: {}", record.sound);
        Ok(())
    }
}
