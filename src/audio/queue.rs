use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, info};

use super::sound::Sound;

/// Una reproducción pendiente para un guild
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub sound: Arc<Sound>,
    /// Play streamed right after this one on the same connection.
    pub next: Option<Box<PlayRequest>>,
    /// The clip was named explicitly instead of drawn at random.
    pub forced: bool,
    pub requested_at: DateTime<Utc>,
}

impl PlayRequest {
    pub fn new(guild_id: GuildId, channel_id: ChannelId, user_id: UserId, sound: Arc<Sound>, forced: bool) -> Self {
        Self {
            guild_id,
            channel_id,
            user_id,
            sound,
            next: None,
            forced,
            requested_at: Utc::now(),
        }
    }
}

/// Cola FIFO acotada de un guild.
///
/// Only the registry pushes and only the guild's worker pops.
#[derive(Debug)]
pub struct GuildQueue {
    items: Mutex<VecDeque<PlayRequest>>,
    max_size: usize,
}

impl GuildQueue {
    fn new(max_size: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size,
        }
    }

    /// Appends unless full. A full queue hands the request back.
    fn try_push(&self, request: PlayRequest) -> Result<(), PlayRequest> {
        let mut items = self.items.lock();
        if items.len() >= self.max_size {
            return Err(request);
        }
        items.push_back(request);
        Ok(())
    }

    pub fn pop(&self) -> Option<PlayRequest> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Resultado de encolar una reproducción
#[derive(Debug)]
pub enum Admission {
    /// The guild was idle: the caller must start a worker with this request
    /// and queue.
    Start(PlayRequest, Arc<GuildQueue>),
    /// Appended behind the running worker.
    Queued,
    /// Queue full; the request was discarded.
    Dropped,
}

/// Registro de colas por guild.
///
/// A guild is either absent or active. An active entry always has exactly one
/// worker draining it, and the entry is removed only by that worker.
#[derive(Debug)]
pub struct GuildQueues {
    entries: DashMap<GuildId, Arc<GuildQueue>>,
    max_size: usize,
}

impl GuildQueues {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_size,
        }
    }

    /// Admits a request for its guild without ever blocking.
    pub fn enqueue(&self, request: PlayRequest) -> Admission {
        let guild_id = request.guild_id;

        match self.entries.entry(guild_id) {
            Entry::Occupied(entry) => match entry.get().try_push(request) {
                Ok(()) => {
                    debug!("➕ Reproducción encolada en guild {}", guild_id);
                    Admission::Queued
                }
                Err(dropped) => {
                    debug!(
                        "🚫 Cola llena en guild {} (máximo {}), descartado: {}",
                        guild_id, self.max_size, dropped.sound.name
                    );
                    Admission::Dropped
                }
            },
            Entry::Vacant(entry) => {
                let queue = Arc::new(GuildQueue::new(self.max_size));
                entry.insert(queue.clone());
                Admission::Start(request, queue)
            }
        }
    }

    /// Ends a worker's tenure over its guild.
    ///
    /// Removes the entry if the queue is empty. If requests slipped in while
    /// the worker was disconnecting, the entry stays and the next one is
    /// returned so the same worker keeps serving the guild.
    pub fn retire(&self, guild_id: GuildId) -> Option<PlayRequest> {
        if self.entries.remove_if(&guild_id, |_, queue| queue.is_empty()).is_some() {
            info!("📭 Cola vacía, guild {} liberado", guild_id);
            return None;
        }

        let queue = self.entries.get(&guild_id).map(|entry| entry.value().clone())?;
        queue.pop()
    }

    /// Drops the guild entry together with anything still queued.
    pub fn abandon(&self, guild_id: GuildId) {
        if let Some((_, queue)) = self.entries.remove(&guild_id) {
            let discarded = queue.len();
            if discarded > 0 {
                debug!("🗑️ {} reproducciones descartadas en guild {}", discarded, guild_id);
            }
        }
    }

    #[cfg(test)]
    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.entries.contains_key(&guild_id)
    }

    pub fn active_guilds(&self) -> usize {
        self.entries.len()
    }
}
