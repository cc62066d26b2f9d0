use bytes::Bytes;
use std::{fs::File, io::BufReader, path::Path, sync::Arc, time::Duration};
use tracing::debug;

use super::dca;
use crate::error::{SoundboardError, SoundboardResult};

/// Un clip de audio ya decodificado en frames.
///
/// Se carga una sola vez al arrancar y se comparte en modo lectura entre
/// todos los guilds.
#[derive(Debug)]
pub struct Sound {
    pub name: String,
    /// Higher weight makes the clip more likely to be picked at random.
    pub weight: u32,
    /// How long to linger in the channel after this clip before leaving.
    pub part_delay: Duration,
    frames: Vec<Bytes>,
}

impl Sound {
    pub fn new(name: impl Into<String>, weight: u32, part_delay: Duration, frames: Vec<Bytes>) -> Self {
        Self {
            name: name.into(),
            weight,
            part_delay,
            frames,
        }
    }

    /// Carga un clip desde un archivo del contenedor DCA
    pub fn load(
        path: &Path,
        name: impl Into<String>,
        weight: u32,
        part_delay: Duration,
    ) -> SoundboardResult<Self> {
        let load_err = |source: std::io::Error| SoundboardError::Load {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(load_err)?;
        let frames = dca::decode_frames(BufReader::new(file)).map_err(load_err)?;

        let sound = Self::new(name, weight, part_delay, frames);
        debug!("🔈 {} cargado ({} frames)", path.display(), sound.frames.len());
        Ok(sound)
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }
}

/// Index of a group inside the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub usize);

/// Grupo de sonidos seleccionado por uno o más comandos
#[derive(Debug)]
pub struct SoundGroup {
    pub prefix: String,
    pub commands: Vec<String>,
    pub sounds: Vec<Arc<Sound>>,
    /// Group whose clip is played right after a clip of this one.
    pub chain_with: Option<GroupId>,
}

impl SoundGroup {
    pub fn total_weight(&self) -> u64 {
        self.sounds.iter().map(|s| u64::from(s.weight)).sum()
    }

    pub fn find(&self, name: &str) -> Option<&Arc<Sound>> {
        self.sounds.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn has_command(&self, command: &str) -> bool {
        self.commands.iter().any(|c| c.eq_ignore_ascii_case(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_reads_frames_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut data = Vec::new();
        dca::encode_frames(&mut data, [vec![1u8, 2], vec![3u8]]).unwrap();
        file.write_all(&data).unwrap();

        let sound = Sound::load(file.path(), "default", 1000, Duration::from_millis(250)).unwrap();
        assert_eq!(sound.name, "default");
        assert_eq!(sound.frames().len(), 2);
    }

    #[test]
    fn test_missing_file_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = Sound::load(&dir.path().join("nope.dca"), "x", 1, Duration::ZERO).unwrap_err();
        assert!(matches!(err, SoundboardError::Load { .. }));
    }

    #[test]
    fn test_group_lookup_ignores_case() {
        let group = SoundGroup {
            prefix: "airhorn".into(),
            commands: vec!["!airhorn".into()],
            sounds: vec![
                Arc::new(Sound::new("default", 10, Duration::ZERO, Vec::new())),
                Arc::new(Sound::new("reverb", 5, Duration::ZERO, Vec::new())),
            ],
            chain_with: None,
        };

        assert_eq!(group.total_weight(), 15);
        assert!(group.find("REVERB").is_some());
        assert!(group.find("echo").is_none());
        assert!(group.has_command("!AirHorn"));
    }
}
