use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::audio::worker::PlaybackTimings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // Sonidos
    pub audio_dir: PathBuf,
    pub sounds_file: Option<PathBuf>,

    // Reproducción
    pub max_queue_size: usize,
    pub move_settle_ms: u64,
    pub preroll_ms: u64,

    // Estadísticas
    pub data_dir: PathBuf,
    pub enable_stats: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,

            // Sonidos
            audio_dir: std::env::var("AUDIO_DIR")
                .unwrap_or_else(|_| "audio".to_string())
                .into(),
            sounds_file: std::env::var("SOUNDS_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),

            // Reproducción (valores del bot original)
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "6".to_string())
                .parse()?,
            move_settle_ms: std::env::var("MOVE_SETTLE_MS")
                .unwrap_or_else(|_| "125".to_string())
                .parse()?,
            preroll_ms: std::env::var("PREROLL_MS")
                .unwrap_or_else(|_| "32".to_string())
                .parse()?,

            // Estadísticas
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),
            enable_stats: std::env::var("ENABLE_STATS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Queue size must be greater than 0
    /// - Fixed delays must stay under one second
    /// - The audio directory must exist
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN está vacío");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.move_settle_ms > 1000 || self.preroll_ms > 1000 {
            anyhow::bail!(
                "Delays too long (settle {}ms, preroll {}ms), maximum is 1000ms",
                self.move_settle_ms,
                self.preroll_ms
            );
        }

        if !self.audio_dir.is_dir() {
            anyhow::bail!("Audio directory not found: {}", self.audio_dir.display());
        }

        Ok(())
    }

    pub fn timings(&self) -> PlaybackTimings {
        PlaybackTimings {
            move_settle: Duration::from_millis(self.move_settle_ms),
            preroll: Duration::from_millis(self.preroll_ms),
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        let timings = self.timings();
        format!(
            "Config Summary:\n  \
            Sounds: {} (catalog: {})\n  \
            Playback: queue {}, settle {}, preroll {}\n  \
            Stats: {} in {}",
            self.audio_dir.display(),
            self.sounds_file
                .as_ref()
                .map_or("built-in".to_string(), |p| p.display().to_string()),
            self.max_queue_size,
            humantime::format_duration(timings.move_settle),
            humantime::format_duration(timings.preroll),
            if self.enable_stats { "enabled" } else { "disabled" },
            self.data_dir.display()
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            audio_dir: "audio".into(),
            sounds_file: None,
            max_queue_size: 6,
            move_settle_ms: 125,
            preroll_ms: 32,
            data_dir: "data".into(),
            enable_stats: true,
        }
    }
}
