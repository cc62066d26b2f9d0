//! # Audio Module
//!
//! Playback engine of the soundboard: loads pre-encoded clips, picks which
//! clip to play, and streams it into each guild's voice channel.
//!
//! ## Architecture
//!
//! ### [`dca`] - Frame Codec
//! - Reads the length-prefixed opus container clips are stored in
//! - Frames are forwarded verbatim, never re-encoded
//!
//! ### [`sound`] / [`catalog`] - Sound Catalog
//! - Clips and the command groups that select them
//! - Chained groups (e.g. `!anotha` followed by an airhorn)
//!
//! ### [`selector`] - Weighted Selection
//! - One process-wide RNG, draws proportional to clip weight
//!
//! ### [`queue`] - Guild Queue Registry
//! - Bounded FIFO per guild, drop-on-full backpressure
//! - Exactly one worker per active guild
//!
//! ### [`worker`] / [`player`] - Playback
//! - One task per active guild, reusing the voice connection for
//!   back-to-back plays and leaving once the queue drains
//!
//! ### [`transport`] - Voice Transport
//! - Seam over songbird so the worker can be driven by a fake in tests
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use hornboard::audio::{catalog::*, player::*, selector::*, worker::*};
//! # fn example(transport: Arc<dyn hornboard::audio::transport::VoiceTransport>) {
//! let definition = CatalogDefinition::builtin();
//! let catalog = Arc::new(SoundCatalog::load(&definition, "audio".as_ref()));
//! let board = Soundboard::new(
//!     catalog,
//!     WeightedSelector::new(),
//!     6,
//!     transport,
//!     Arc::new(hornboard::storage::NoopStats),
//!     PlaybackTimings::default(),
//! );
//! # }
//! ```

pub mod catalog;
pub mod dca;
pub mod player;
pub mod queue;
pub mod selector;
pub mod sound;
pub mod transport;
pub mod worker;
