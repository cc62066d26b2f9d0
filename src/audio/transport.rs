//! Voice transport seam.
//!
//! The worker only talks to [`VoiceTransport`] and [`VoiceConnection`]; the
//! songbird-backed implementation lives here as well.

use async_trait::async_trait;
use bytes::Bytes;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{AudioStream, Input, LiveInput},
    tracks::{ControlError, Track, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{io::Cursor, sync::Arc, time::Duration};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use super::dca;
use crate::error::{SoundboardError, SoundboardResult};

/// Duración de un frame opus en el contenedor
const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Margen extra antes de dar por perdido el evento de fin de pista
const TRACK_END_SLACK: Duration = Duration::from_secs(5);

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> SoundboardResult<Box<dyn VoiceConnection>>;
}

/// An open voice connection for one guild.
#[async_trait]
pub trait VoiceConnection: Send {
    fn channel_id(&self) -> ChannelId;

    async fn move_to(&mut self, channel_id: ChannelId) -> SoundboardResult<()>;

    async fn set_sending(&mut self, sending: bool) -> SoundboardResult<()>;

    async fn send_frame(&mut self, frame: Bytes) -> SoundboardResult<()>;

    async fn disconnect(&mut self);
}

/// Transporte basado en songbird
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> SoundboardResult<Box<dyn VoiceConnection>> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| SoundboardError::Connect(e.to_string()))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(Box::new(SongbirdConnection {
            manager: self.manager.clone(),
            call,
            guild_id,
            channel_id,
            pending: Vec::new(),
        }))
    }
}

/// Songbird connection.
///
/// Songbird consumes whole inputs rather than single packets, so the frames of
/// one sending burst are collected and, when sending stops, wrapped into a
/// DCA1 stream that songbird plays natively. The call returns once the track
/// has finished, keeping back-to-back plays strictly sequential.
pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    guild_id: GuildId,
    channel_id: ChannelId,
    pending: Vec<Bytes>,
}

impl SongbirdConnection {
    async fn play_pending(&mut self) -> SoundboardResult<()> {
        let frames = std::mem::take(&mut self.pending);
        if frames.is_empty() {
            return Ok(());
        }

        let stream = dca1_stream(&frames)?;
        let input = Input::Live(
            LiveInput::Raw(AudioStream {
                input: Box::new(Cursor::new(stream)),
                hint: None,
            }),
            None,
        );
        let finished = Arc::new(Notify::new());

        // La pista arranca pausada para registrar los manejadores antes de sonar
        let track: TrackHandle = {
            let mut call = self.call.lock().await;
            call.play(Track::new(input).pause())
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            let added = track.add_event(Event::Track(event), TrackFinished(finished.clone()));
            if already_finished(added)? {
                return Ok(());
            }
        }
        if already_finished(track.play())? {
            return Ok(());
        }

        let budget = FRAME_DURATION * frames.len() as u32 + TRACK_END_SLACK;
        if tokio::time::timeout(budget, finished.notified()).await.is_err() {
            warn!("⏱️ La pista no terminó a tiempo en guild {}, deteniendo", self.guild_id);
            let _ = track.stop();
        }

        Ok(())
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn move_to(&mut self, channel_id: ChannelId) -> SoundboardResult<()> {
        let join = {
            let mut call = self.call.lock().await;
            call.join(channel_id)
                .await
                .map_err(|e| SoundboardError::Connect(e.to_string()))?
        };
        // El lock se libera antes de esperar la confirmación
        join.await.map_err(|e| SoundboardError::Connect(e.to_string()))?;

        debug!("↪️ Movido al canal {} en guild {}", channel_id, self.guild_id);
        self.channel_id = channel_id;
        Ok(())
    }

    async fn set_sending(&mut self, sending: bool) -> SoundboardResult<()> {
        if sending {
            self.pending.clear();
            Ok(())
        } else {
            self.play_pending().await
        }
    }

    async fn send_frame(&mut self, frame: Bytes) -> SoundboardResult<()> {
        self.pending.push(frame);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("Error al desconectar de guild {}: {:?}", self.guild_id, e);
        } else {
            info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        }
    }
}

/// Despierta al que espera el fin de la pista
struct TrackFinished(Arc<Notify>);

#[async_trait]
impl VoiceEventHandler for TrackFinished {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.0.notify_one();
        None
    }
}

/// A control call on a track that has already ended means the clip is done,
/// not that the transport failed.
fn already_finished(result: Result<(), ControlError>) -> SoundboardResult<bool> {
    match result {
        Ok(()) => Ok(false),
        Err(ControlError::Finished) => Ok(true),
        Err(e) => Err(SoundboardError::Transport(e.to_string())),
    }
}

/// Wraps raw frames into a DCA1 stream: magic, JSON metadata, then the same
/// length-prefixed records the clip files use.
fn dca1_stream(frames: &[Bytes]) -> SoundboardResult<Vec<u8>> {
    let metadata = serde_json::json!({
        "dca": {
            "version": 1,
            "tool": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") }
        },
        "opus": {
            "mode": "voip",
            "sample_rate": 48000,
            "frame_size": 960,
            "abr": null,
            "vbr": true,
            "channels": 2
        }
    })
    .to_string();

    let mut out = Vec::with_capacity(8 + metadata.len() + frames.iter().map(|f| f.len() + 2).sum::<usize>());
    out.extend_from_slice(b"DCA1");
    out.extend_from_slice(&(metadata.len() as i32).to_le_bytes());
    out.extend_from_slice(metadata.as_bytes());
    dca::encode_frames(&mut out, frames).map_err(|e| SoundboardError::Transport(e.to_string()))?;
    Ok(out)
}


#[cfg(test)]
pub(crate) mod testing {
    //! Fake transport that records every call for ordering assertions.

    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    type Log = Arc<SyncMutex<Vec<(Instant, Event)>>>;
    type DisconnectHook = Arc<dyn Fn() + Send + Sync>;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Event {
        Connect(ChannelId),
        ConnectFailed(ChannelId),
        Move(ChannelId),
        Sending(bool),
        Frame(Bytes),
        Disconnect,
    }

    #[derive(Default)]
    pub struct RecordingTransport {
        log: Log,
        open: Arc<AtomicUsize>,
        max_open: Arc<AtomicUsize>,
        fail_connect: bool,
        fail_move: bool,
        reject_frame: Option<Bytes>,
        on_disconnect: Option<DisconnectHook>,
    }

    fn push(log: &Log, event: Event) {
        log.lock().push((Instant::now(), event));
    }

    impl RecordingTransport {
        pub fn failing_connect() -> Self {
            Self {
                fail_connect: true,
                ..Self::default()
            }
        }

        pub fn failing_move() -> Self {
            Self {
                fail_move: true,
                ..Self::default()
            }
        }

        pub fn rejecting_frame(payload: &str) -> Self {
            Self {
                reject_frame: Some(Bytes::from(payload.to_string())),
                ..Self::default()
            }
        }

        /// Runs `hook` every time a connection is closed, after it is closed.
        pub fn on_disconnect(hook: impl Fn() + Send + Sync + 'static) -> Self {
            Self {
                on_disconnect: Some(Arc::new(hook)),
                ..Self::default()
            }
        }

        pub fn events(&self) -> Vec<Event> {
            self.log.lock().iter().map(|(_, event)| event.clone()).collect()
        }

        pub fn timeline(&self) -> Vec<(Instant, Event)> {
            self.log.lock().clone()
        }

        pub fn frames(&self) -> Vec<Bytes> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Frame(frame) => Some(frame),
                    _ => None,
                })
                .collect()
        }

        pub fn connects(&self) -> usize {
            self.events().iter().filter(|e| matches!(e, Event::Connect(_))).count()
        }

        pub fn max_open_connections(&self) -> usize {
            self.max_open.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VoiceTransport for RecordingTransport {
        async fn connect(&self, _guild_id: GuildId, channel_id: ChannelId) -> SoundboardResult<Box<dyn VoiceConnection>> {
            if self.fail_connect {
                push(&self.log, Event::ConnectFailed(channel_id));
                return Err(SoundboardError::Connect("sin permisos".into()));
            }

            push(&self.log, Event::Connect(channel_id));
            let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_open.fetch_max(open, Ordering::SeqCst);

            Ok(Box::new(RecordingConnection {
                log: self.log.clone(),
                open: self.open.clone(),
                channel_id,
                fail_move: self.fail_move,
                reject_frame: self.reject_frame.clone(),
                on_disconnect: self.on_disconnect.clone(),
            }))
        }
    }

    struct RecordingConnection {
        log: Log,
        open: Arc<AtomicUsize>,
        channel_id: ChannelId,
        fail_move: bool,
        reject_frame: Option<Bytes>,
        on_disconnect: Option<DisconnectHook>,
    }

    #[async_trait]
    impl VoiceConnection for RecordingConnection {
        fn channel_id(&self) -> ChannelId {
            self.channel_id
        }

        async fn move_to(&mut self, channel_id: ChannelId) -> SoundboardResult<()> {
            if self.fail_move {
                return Err(SoundboardError::Connect("canal lleno".into()));
            }
            push(&self.log, Event::Move(channel_id));
            self.channel_id = channel_id;
            Ok(())
        }

        async fn set_sending(&mut self, sending: bool) -> SoundboardResult<()> {
            push(&self.log, Event::Sending(sending));
            Ok(())
        }

        async fn send_frame(&mut self, frame: Bytes) -> SoundboardResult<()> {
            if self.reject_frame.as_ref() == Some(&frame) {
                return Err(SoundboardError::Transport("frame rechazado".into()));
            }
            push(&self.log, Event::Frame(frame));
            Ok(())
        }

        async fn disconnect(&mut self) {
            push(&self.log, Event::Disconnect);
            self.open.fetch_sub(1, Ordering::SeqCst);
            if let Some(hook) = &self.on_disconnect {
                hook();
            }
        }
    }
}
