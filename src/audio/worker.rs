use chrono::Utc;
use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use super::{
    queue::{GuildQueue, GuildQueues, PlayRequest},
    transport::{VoiceConnection, VoiceTransport},
};
use crate::{
    error::SoundboardResult,
    storage::{PlayRecord, PlayStats},
};

/// Retardos fijos del ciclo de reproducción
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackTimings {
    /// Wait after a channel move before streaming.
    pub move_settle: Duration,
    /// Wait before the first frame of every play.
    pub preroll: Duration,
}

impl Default for PlaybackTimings {
    fn default() -> Self {
        Self {
            move_settle: Duration::from_millis(125),
            preroll: Duration::from_millis(32),
        }
    }
}

/// Drains one guild's queue over a single voice connection.
///
/// Lifecycle: connect, stream the request (and its chained play), keep
/// popping queued requests on the same connection, linger for the last
/// clip's part delay, disconnect and retire the registry entry.
pub struct PlaybackWorker {
    guild_id: GuildId,
    queue: Arc<GuildQueue>,
    registry: Arc<GuildQueues>,
    transport: Arc<dyn VoiceTransport>,
    stats: Arc<dyn PlayStats>,
    timings: PlaybackTimings,
}

impl PlaybackWorker {
    pub fn new(
        guild_id: GuildId,
        queue: Arc<GuildQueue>,
        registry: Arc<GuildQueues>,
        transport: Arc<dyn VoiceTransport>,
        stats: Arc<dyn PlayStats>,
        timings: PlaybackTimings,
    ) -> Self {
        Self {
            guild_id,
            queue,
            registry,
            transport,
            stats,
            timings,
        }
    }

    pub async fn run(self, first: PlayRequest) {
        let mut request = first;

        loop {
            let mut connection = match self.transport.connect(self.guild_id, request.channel_id).await {
                Ok(connection) => connection,
                Err(e) => {
                    error!("❌ No se pudo conectar en guild {}: {}", self.guild_id, e);
                    self.registry.abandon(self.guild_id);
                    return;
                }
            };

            loop {
                let part_delay = match self.play(connection.as_mut(), &request).await {
                    Ok(delay) => delay,
                    Err(e) => {
                        error!("❌ Conexión perdida en guild {}: {}", self.guild_id, e);
                        connection.disconnect().await;
                        self.registry.abandon(self.guild_id);
                        return;
                    }
                };

                if let Some(next) = self.queue.pop() {
                    request = next;
                    continue;
                }

                // Evita el parpadeo de entrar y salir del canal
                tokio::time::sleep(part_delay).await;

                match self.queue.pop() {
                    Some(next) => request = next,
                    None => break,
                }
            }

            connection.disconnect().await;

            match self.registry.retire(self.guild_id) {
                Some(next) => {
                    debug!("🔁 Llegaron reproducciones al desconectar en guild {}", self.guild_id);
                    request = next;
                }
                None => return,
            }
        }
    }

    /// Streams a request and its chained follow-up. Returns the part delay of
    /// the last clip streamed.
    async fn play(&self, connection: &mut dyn VoiceConnection, request: &PlayRequest) -> SoundboardResult<Duration> {
        let mut current = request;
        loop {
            self.stream(connection, current).await?;
            match current.next.as_deref() {
                Some(next) => current = next,
                None => return Ok(current.sound.part_delay),
            }
        }
    }

    async fn stream(&self, connection: &mut dyn VoiceConnection, play: &PlayRequest) -> SoundboardResult<()> {
        if connection.channel_id() != play.channel_id {
            connection.move_to(play.channel_id).await?;
            tokio::time::sleep(self.timings.move_settle).await;
        }

        self.track_stats(play);

        tokio::time::sleep(self.timings.preroll).await;

        info!(
            guild_id = %play.guild_id,
            channel_id = %play.channel_id,
            clip = %play.sound.name,
            forced = play.forced,
            waited_ms = (Utc::now() - play.requested_at).num_milliseconds(),
            "🎺 Reproduciendo sonido"
        );

        if let Err(e) = self.send_frames(connection, play).await {
            warn!("⚠️ Reproducción de {} interrumpida: {}", play.sound.name, e);
        }
        Ok(())
    }

    async fn send_frames(&self, connection: &mut dyn VoiceConnection, play: &PlayRequest) -> SoundboardResult<()> {
        connection.set_sending(true).await?;
        let mut result = Ok(());
        for frame in play.sound.frames() {
            result = connection.send_frame(frame.clone()).await;
            if result.is_err() {
                break;
            }
        }
        // Siempre se intenta cerrar el envío, incluso tras un error
        let stopped = connection.set_sending(false).await;
        result.and(stopped)
    }

    fn track_stats(&self, play: &PlayRequest) {
        let stats = self.stats.clone();
        let record = PlayRecord {
            guild_id: play.guild_id,
            channel_id: play.channel_id,
            user_id: play.user_id,
            sound: play.sound.name.clone(),
            forced: play.forced,
        };

        tokio::spawn(async move {
            if let Err(e) = stats.record_play(record).await {
                warn!("⚠️ No se pudieron registrar estadísticas: {:?}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        queue::Admission,
        sound::Sound,
        transport::testing::{Event, RecordingTransport},
    };
    use crate::storage::NoopStats;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, UserId};

    fn request(channel: u64, name: &str) -> PlayRequest {
        lingering(channel, name, 0)
    }

    fn lingering(channel: u64, name: &str, part_delay_ms: u64) -> PlayRequest {
        let frames = vec![Bytes::from(name.to_string())];
        PlayRequest::new(
            GuildId::new(1),
            ChannelId::new(channel),
            UserId::new(7),
            Arc::new(Sound::new(name, 1, Duration::from_millis(part_delay_ms), frames)),
            false,
        )
    }

    /// Milliseconds of each event since the first one.
    fn offsets(transport: &RecordingTransport) -> Vec<(Event, u128)> {
        let timeline = transport.timeline();
        let Some((start, _)) = timeline.first().cloned() else {
            return Vec::new();
        };
        timeline
            .into_iter()
            .map(|(at, event)| (event, (at - start).as_millis()))
            .collect()
    }

    fn assert_offsets(actual: &[(Event, u128)], expected: &[(Event, u128)]) {
        assert_eq!(actual.len(), expected.len(), "eventos: {:?}", actual);
        for ((event, at), (want_event, want_at)) in actual.iter().zip(expected) {
            assert_eq!(event, want_event);
            assert!(
                at.abs_diff(*want_at) <= 3,
                "{:?} a los {}ms, se esperaba ~{}ms",
                event,
                at,
                want_at
            );
        }
    }

    fn worker(
        registry: &Arc<GuildQueues>,
        queue: Arc<GuildQueue>,
        transport: &Arc<RecordingTransport>,
    ) -> PlaybackWorker {
        PlaybackWorker::new(
            GuildId::new(1),
            queue,
            registry.clone(),
            transport.clone(),
            Arc::new(NoopStats),
            PlaybackTimings {
                move_settle: Duration::ZERO,
                preroll: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn test_move_between_channels_reuses_connection() {
        let registry = Arc::new(GuildQueues::new(6));
        let transport = Arc::new(RecordingTransport::default());

        let Admission::Start(first, queue) = registry.enqueue(request(10, "a")) else {
            panic!("se esperaba Start");
        };
        assert!(matches!(registry.enqueue(request(20, "b")), Admission::Queued));

        worker(&registry, queue, &transport).run(first).await;

        assert_eq!(
            transport.events(),
            vec![
                Event::Connect(ChannelId::new(10)),
                Event::Sending(true),
                Event::Frame(Bytes::from("a")),
                Event::Sending(false),
                Event::Move(ChannelId::new(20)),
                Event::Sending(true),
                Event::Frame(Bytes::from("b")),
                Event::Sending(false),
                Event::Disconnect,
            ]
        );
        assert!(!registry.is_active(GuildId::new(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_preroll_and_part_delay_are_waited() {
        let registry = Arc::new(GuildQueues::new(6));
        let transport = Arc::new(RecordingTransport::default());

        let Admission::Start(first, queue) = registry.enqueue(lingering(10, "a", 0)) else {
            panic!("se esperaba Start");
        };
        let _ = registry.enqueue(lingering(20, "b", 250));

        let worker = PlaybackWorker::new(
            GuildId::new(1),
            queue,
            registry.clone(),
            transport.clone(),
            Arc::new(NoopStats),
            PlaybackTimings::default(),
        );
        worker.run(first).await;

        // conexión, pre-roll 32ms, movimiento + 125ms, pre-roll, 250ms de espera final
        assert_offsets(
            &offsets(&transport),
            &[
                (Event::Connect(ChannelId::new(10)), 0),
                (Event::Sending(true), 32),
                (Event::Frame(Bytes::from("a")), 32),
                (Event::Sending(false), 32),
                (Event::Move(ChannelId::new(20)), 32),
                (Event::Sending(true), 189),
                (Event::Frame(Bytes::from("b")), 189),
                (Event::Sending(false), 189),
                (Event::Disconnect, 439),
            ],
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_during_part_delay_reuses_connection() {
        let registry = Arc::new(GuildQueues::new(6));
        let transport = Arc::new(RecordingTransport::default());

        let Admission::Start(first, queue) = registry.enqueue(lingering(10, "a", 1000)) else {
            panic!("se esperaba Start");
        };

        let late = {
            let registry = registry.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                registry.enqueue(request(10, "b"))
            })
        };

        worker(&registry, queue, &transport).run(first).await;
        assert!(matches!(late.await.unwrap(), Admission::Queued));

        assert_eq!(transport.connects(), 1);
        assert_offsets(
            &offsets(&transport),
            &[
                (Event::Connect(ChannelId::new(10)), 0),
                (Event::Sending(true), 0),
                (Event::Frame(Bytes::from("a")), 0),
                (Event::Sending(false), 0),
                (Event::Sending(true), 1000),
                (Event::Frame(Bytes::from("b")), 1000),
                (Event::Sending(false), 1000),
                (Event::Disconnect, 1000),
            ],
        );
        assert!(!registry.is_active(GuildId::new(1)));
    }

    #[tokio::test]
    async fn test_request_during_disconnect_reconnects_same_worker() {
        let registry = Arc::new(GuildQueues::new(6));
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let transport = Arc::new({
            let registry = registry.clone();
            let fired = fired.clone();
            RecordingTransport::on_disconnect(move || {
                if !fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
                    assert!(matches!(registry.enqueue(request(20, "late")), Admission::Queued));
                }
            })
        });

        let Admission::Start(first, queue) = registry.enqueue(request(10, "a")) else {
            panic!("se esperaba Start");
        };

        worker(&registry, queue, &transport).run(first).await;

        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(
            transport.events(),
            vec![
                Event::Connect(ChannelId::new(10)),
                Event::Sending(true),
                Event::Frame(Bytes::from("a")),
                Event::Sending(false),
                Event::Disconnect,
                Event::Connect(ChannelId::new(20)),
                Event::Sending(true),
                Event::Frame(Bytes::from("late")),
                Event::Sending(false),
                Event::Disconnect,
            ]
        );
        assert_eq!(transport.connects(), 2);
        assert_eq!(transport.max_open_connections(), 1);
        assert!(!registry.is_active(GuildId::new(1)));
    }

    #[tokio::test]
    async fn test_connect_failure_discards_queue() {
        let registry = Arc::new(GuildQueues::new(6));
        let transport = Arc::new(RecordingTransport::failing_connect());

        let Admission::Start(first, queue) = registry.enqueue(request(10, "a")) else {
            panic!("se esperaba Start");
        };
        let _ = registry.enqueue(request(10, "b"));

        worker(&registry, queue, &transport).run(first).await;

        assert_eq!(transport.events(), vec![Event::ConnectFailed(ChannelId::new(10))]);
        assert!(!registry.is_active(GuildId::new(1)));
    }

    #[tokio::test]
    async fn test_move_failure_abandons_guild() {
        let registry = Arc::new(GuildQueues::new(6));
        let transport = Arc::new(RecordingTransport::failing_move());

        let Admission::Start(first, queue) = registry.enqueue(request(10, "a")) else {
            panic!("se esperaba Start");
        };
        let _ = registry.enqueue(request(20, "b"));
        let _ = registry.enqueue(request(20, "c"));

        worker(&registry, queue, &transport).run(first).await;

        let frames = transport.frames();
        assert_eq!(frames, vec![Bytes::from("a")]);
        assert_eq!(transport.events().last(), Some(&Event::Disconnect));
        assert!(!registry.is_active(GuildId::new(1)));
    }

    #[tokio::test]
    async fn test_frame_error_skips_to_next_play() {
        let registry = Arc::new(GuildQueues::new(6));
        let transport = Arc::new(RecordingTransport::rejecting_frame("a"));

        let Admission::Start(first, queue) = registry.enqueue(request(10, "a")) else {
            panic!("se esperaba Start");
        };
        let _ = registry.enqueue(request(10, "b"));

        worker(&registry, queue, &transport).run(first).await;

        assert_eq!(transport.frames(), vec![Bytes::from("b")]);
        assert_eq!(transport.connects(), 1);
    }
}
