use std::path::PathBuf;
use thiserror::Error;

/// Errores del motor de reproducción.
///
/// Ninguno de ellos llega al usuario que disparó el sonido: el camino de
/// reproducción es silencioso y solo los logs reflejan el fallo.
#[derive(Debug, Error)]
pub enum SoundboardError {
    /// The clip file could not be opened or read.
    #[error("no se pudo cargar {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The transport could not establish or move the voice connection.
    #[error("conexión de voz fallida: {0}")]
    Connect(String),

    /// The open connection rejected a frame or a speaking update.
    #[error("error de transporte de voz: {0}")]
    Transport(String),

    #[error("el sonido '{name}' no existe en el grupo '{group}'")]
    UnknownClip { group: String, name: String },

    #[error("grupo desconocido: {0}")]
    UnknownGroup(String),

    #[error("el grupo '{0}' no tiene sonidos seleccionables")]
    EmptyGroup(String),
}

pub type SoundboardResult<T> = std::result::Result<T, SoundboardError>;
