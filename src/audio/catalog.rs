//! # Sound Catalog
//!
//! Static table of sound groups loaded once at startup.
//!
//! Groups are described either by the built-in definition (the classic
//! airhorn set) or by a JSON file pointed to by `SOUNDS_FILE`:
//!
//! ```json
//! {
//!   "groups": [
//!     {
//!       "prefix": "airhorn",
//!       "commands": ["!airhorn"],
//!       "sounds": [{ "name": "default", "weight": 1000, "part_delay_ms": 250 }]
//!     },
//!     {
//!       "prefix": "another",
//!       "commands": ["!anotha", "!anothaone"],
//!       "chain_with": "!airhorn",
//!       "sounds": [{ "name": "one", "weight": 1 }]
//!     }
//!   ]
//! }
//! ```
//!
//! Each clip is read from `<audio_dir>/<prefix>_<name>.dca`. A clip that fails
//! to load is skipped; the rest of its group stays playable.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{path::Path, sync::Arc, time::Duration};
use tracing::{info, warn};

use super::{
    queue::PlayRequest,
    selector::WeightedSelector,
    sound::{GroupId, Sound, SoundGroup},
};
use crate::error::{SoundboardError, SoundboardResult};

fn default_part_delay_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoundDefinition {
    pub name: String,
    pub weight: u32,
    #[serde(default = "default_part_delay_ms")]
    pub part_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupDefinition {
    pub prefix: String,
    pub commands: Vec<String>,
    /// Command alias of the group to chain after this one.
    #[serde(default)]
    pub chain_with: Option<String>,
    pub sounds: Vec<SoundDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogDefinition {
    pub groups: Vec<GroupDefinition>,
}

fn sound(name: &str, weight: u32, part_delay_ms: u64) -> SoundDefinition {
    SoundDefinition {
        name: name.to_string(),
        weight,
        part_delay_ms,
    }
}

fn group(prefix: &str, commands: &[&str], chain_with: Option<&str>, sounds: Vec<SoundDefinition>) -> GroupDefinition {
    GroupDefinition {
        prefix: prefix.to_string(),
        commands: commands.iter().map(|c| c.to_string()).collect(),
        chain_with: chain_with.map(str::to_string),
        sounds,
    }
}

impl CatalogDefinition {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let definition = serde_json::from_str(&content)?;
        Ok(definition)
    }

    /// Catálogo por defecto cuando no se configura `SOUNDS_FILE`
    pub fn builtin() -> Self {
        Self {
            groups: vec![
                group(
                    "airhorn",
                    &["!airhorn"],
                    None,
                    vec![
                        sound("default", 1000, 250),
                        sound("reverb", 800, 250),
                        sound("spam", 800, 0),
                        sound("tripletap", 800, 250),
                        sound("fourtap", 800, 250),
                        sound("distant", 500, 250),
                        sound("echo", 500, 250),
                        sound("clownfull", 250, 250),
                        sound("clownshort", 250, 250),
                        sound("clownspam", 250, 0),
                        sound("highfartlong", 200, 250),
                        sound("highfartshort", 200, 250),
                        sound("midshort", 100, 250),
                        sound("truck", 10, 250),
                    ],
                ),
                group(
                    "another",
                    &["!anotha", "!anothaone"],
                    Some("!airhorn"),
                    vec![sound("one", 1, 250), sound("one_classic", 1, 250), sound("one_echo", 1, 250)],
                ),
                group(
                    "jc",
                    &["!johncena", "!cena"],
                    None,
                    vec![
                        sound("airhorn", 1, 250),
                        sound("echo", 1, 250),
                        sound("full", 1, 250),
                        sound("jc", 1, 250),
                        sound("nameis", 1, 250),
                        sound("spam", 1, 250),
                    ],
                ),
                group(
                    "ethan",
                    &["!ethan", "!eb", "!ethanbradberry", "!h3h3"],
                    None,
                    vec![
                        sound("areyou_classic", 100, 250),
                        sound("areyou_condensed", 100, 250),
                        sound("areyou_crazy", 100, 250),
                        sound("areyou_ethan", 100, 250),
                        sound("classic", 100, 250),
                        sound("echo", 100, 250),
                        sound("high", 100, 250),
                        sound("slowandlow", 100, 250),
                        sound("cuts", 30, 250),
                        sound("beat", 30, 250),
                        sound("sodiepop", 1, 250),
                    ],
                ),
                group(
                    "cow",
                    &["!stan", "!stanislav"],
                    None,
                    vec![sound("herd", 10, 250), sound("moo", 10, 250), sound("x3", 1, 250)],
                ),
            ],
        }
    }
}

/// Explicit play trigger coming from the command router.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub group: GroupId,
    pub clip_name: Option<String>,
}

/// Todos los grupos cargados, inmutables tras el arranque
#[derive(Debug, Default)]
pub struct SoundCatalog {
    groups: Vec<SoundGroup>,
}

impl SoundCatalog {
    pub fn from_groups(groups: Vec<SoundGroup>) -> Self {
        Self { groups }
    }

    /// Loads every clip of the definition from `audio_dir`.
    ///
    /// Clips that fail to load are skipped with a warning. Groups left without
    /// a selectable clip are dropped, and so are chain links pointing at them.
    pub fn load(definition: &CatalogDefinition, audio_dir: &Path) -> Self {
        let mut groups = Vec::new();
        let mut chains = Vec::new();

        for def in &definition.groups {
            let mut sounds = Vec::new();
            for sound_def in &def.sounds {
                let path = audio_dir.join(format!("{}_{}.dca", def.prefix, sound_def.name));
                match Sound::load(
                    &path,
                    sound_def.name.clone(),
                    sound_def.weight,
                    Duration::from_millis(sound_def.part_delay_ms),
                ) {
                    Ok(sound) => sounds.push(Arc::new(sound)),
                    Err(e) => warn!("⚠️ Sonido omitido: {}", e),
                }
            }

            let group = SoundGroup {
                prefix: def.prefix.clone(),
                commands: def.commands.iter().map(|c| c.to_lowercase()).collect(),
                sounds,
                chain_with: None,
            };

            if group.total_weight() == 0 {
                warn!("⚠️ Grupo {:?} sin sonidos seleccionables, omitido", def.commands);
                continue;
            }

            chains.push(def.chain_with.clone());
            groups.push(group);
        }

        let mut catalog = Self { groups };
        for (index, chain) in chains.into_iter().enumerate() {
            let Some(command) = chain else { continue };
            match catalog.find_by_command(&command) {
                Some(target) => catalog.groups[index].chain_with = Some(target),
                None => warn!(
                    "⚠️ Encadenado a {} descartado para el grupo '{}': grupo no disponible",
                    command, catalog.groups[index].prefix
                ),
            }
        }

        let clips: usize = catalog.groups.iter().map(|g| g.sounds.len()).sum();
        info!("📀 Catálogo listo: {} grupos, {} sonidos", catalog.groups.len(), clips);
        catalog
    }

    pub fn group(&self, id: GroupId) -> Option<&SoundGroup> {
        self.groups.get(id.0)
    }

    pub fn find_by_command(&self, command: &str) -> Option<GroupId> {
        self.groups.iter().position(|g| g.has_command(command)).map(GroupId)
    }

    /// Every command alias, in catalog order.
    pub fn commands(&self) -> Vec<&str> {
        self.groups
            .iter()
            .flat_map(|g| g.commands.iter().map(String::as_str))
            .collect()
    }

    /// Turns a trigger into a play request.
    ///
    /// A named clip forces that clip; an unknown name rejects the trigger.
    /// Without a name the clip is drawn at random. A chained group gets its
    /// own clip drawn in the same mode and attached as the follow-up play.
    pub fn resolve(&self, trigger: &Trigger, selector: &WeightedSelector) -> SoundboardResult<PlayRequest> {
        let group = self
            .group(trigger.group)
            .ok_or_else(|| SoundboardError::UnknownGroup(format!("#{}", trigger.group.0)))?;

        let (sound, forced) = match &trigger.clip_name {
            Some(name) => {
                let sound = group.find(name).ok_or_else(|| SoundboardError::UnknownClip {
                    group: group.prefix.clone(),
                    name: name.clone(),
                })?;
                (sound.clone(), true)
            }
            None => {
                let sound = selector
                    .select(group)
                    .ok_or_else(|| SoundboardError::EmptyGroup(group.prefix.clone()))?;
                (sound.clone(), false)
            }
        };

        let mut request = PlayRequest::new(trigger.guild_id, trigger.channel_id, trigger.user_id, sound, forced);

        if let Some(partner) = group.chain_with.and_then(|id| self.group(id)) {
            // El clip encadenado siempre se elige al azar en su propio grupo
            let chained = selector
                .select(partner)
                .ok_or_else(|| SoundboardError::EmptyGroup(partner.prefix.clone()))?;
            request.next = Some(Box::new(PlayRequest::new(
                trigger.guild_id,
                trigger.channel_id,
                trigger.user_id,
                chained.clone(),
                forced,
            )));
        }

        Ok(request)
    }
}
