//! Timeline engine - tracks, mixdown, and the main-to-DSP command queue
//!
//! - [`Track`]: clip references, volume/pan, automation, effect chain
//! - [`Mixdown`]: the per-chunk DSP cycle over all tracks
//! - [`command`]: rtrb queue for structural changes
//! - [`gc`]: basedrop collector for memory dropped on the DSP thread

pub mod command;
pub mod error;
pub mod gc;
mod mixdown;
mod track;

pub use command::{command_channel, EngineCommand, COMMAND_QUEUE_CAPACITY};
pub use error::{EngineError, EngineResult};
pub use gc::gc_handle;
pub use mixdown::{Mixdown, MAX_TRACKS, TIMELINE_ROUTE};
pub use track::{ClipAudio, ClipRef, Track, MAX_CLIPS_PER_TRACK, TRACK_MAX_VOL};
