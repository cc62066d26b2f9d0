use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

use super::sound::{Sound, SoundGroup};

/// Selector aleatorio ponderado.
///
/// Owns one generator for the lifetime of the process. Rapid consecutive
/// triggers draw from the same stream instead of reseeding.
#[derive(Debug)]
pub struct WeightedSelector {
    rng: Mutex<StdRng>,
}

impl WeightedSelector {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic selector for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Picks a clip with probability proportional to its weight.
    ///
    /// Returns `None` when the group has no selectable clip (total weight 0).
    pub fn select<'a>(&self, group: &'a SoundGroup) -> Option<&'a Arc<Sound>> {
        let total = group.total_weight();
        if total == 0 {
            return None;
        }

        let draw = self.rng.lock().gen_range(0..total);
        let mut cumulative = 0u64;
        group.sounds.iter().find(|sound| {
            cumulative += u64::from(sound.weight);
            draw < cumulative
        })
    }
}

impl Default for WeightedSelector {
    fn default() -> Self {
        Self::new()
    }
}
