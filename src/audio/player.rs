use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{
    catalog::{SoundCatalog, Trigger},
    queue::{Admission, GuildQueues, PlayRequest},
    selector::WeightedSelector,
    transport::VoiceTransport,
    worker::{PlaybackTimings, PlaybackWorker},
};
use crate::storage::PlayStats;

/// Qué pasó con un disparo
#[derive(Debug)]
pub enum TriggerOutcome {
    /// The guild was idle; a worker now owns it.
    Started(JoinHandle<()>),
    Queued,
    /// The guild's queue was full.
    Dropped,
    /// The trigger named a clip that does not exist.
    Rejected,
}

/// Entry point of the playback engine.
///
/// Resolves triggers against the catalog and routes the resulting plays to
/// each guild's queue, spawning a worker when a guild goes from idle to
/// active. Never blocks and never reports failures to the caller.
pub struct Soundboard {
    catalog: Arc<SoundCatalog>,
    selector: WeightedSelector,
    queues: Arc<GuildQueues>,
    transport: Arc<dyn VoiceTransport>,
    stats: Arc<dyn PlayStats>,
    timings: PlaybackTimings,
}

impl Soundboard {
    pub fn new(
        catalog: Arc<SoundCatalog>,
        selector: WeightedSelector,
        max_queue_size: usize,
        transport: Arc<dyn VoiceTransport>,
        stats: Arc<dyn PlayStats>,
        timings: PlaybackTimings,
    ) -> Self {
        Self {
            catalog,
            selector,
            queues: Arc::new(GuildQueues::new(max_queue_size)),
            transport,
            stats,
            timings,
        }
    }

    pub fn catalog(&self) -> &SoundCatalog {
        &self.catalog
    }

    pub fn on_trigger(&self, trigger: Trigger) -> TriggerOutcome {
        match self.catalog.resolve(&trigger, &self.selector) {
            Ok(request) => self.enqueue(request),
            Err(e) => {
                debug!("🙅 Disparo rechazado en guild {}: {}", trigger.guild_id, e);
                TriggerOutcome::Rejected
            }
        }
    }

    pub fn enqueue(&self, request: PlayRequest) -> TriggerOutcome {
        let guild_id = request.guild_id;
        match self.queues.enqueue(request) {
            Admission::Start(request, queue) => {
                debug!(
                    "▶️ Nuevo worker para guild {} ({} guilds activos)",
                    guild_id,
                    self.queues.active_guilds()
                );
                let worker = PlaybackWorker::new(
                    guild_id,
                    queue,
                    self.queues.clone(),
                    self.transport.clone(),
                    self.stats.clone(),
                    self.timings,
                );
                TriggerOutcome::Started(tokio::spawn(worker.run(request)))
            }
            Admission::Queued => TriggerOutcome::Queued,
            Admission::Dropped => TriggerOutcome::Dropped,
        }
    }

    #[cfg(test)]
    pub fn is_playing(&self, guild_id: GuildId) -> bool {
        self.queues.is_active(guild_id)
    }
}
