//! Lock-free command queue from the main thread to the mixdown
//!
//! Parameter changes travel through endpoints; structural changes (tracks,
//! clips, effects, transport) travel through this queue. The main thread
//! pushes onto an `rtrb` ring buffer and [`Mixdown`](super::Mixdown) drains it
//! at the start of every chunk, so neither side ever waits on the other.
//!
//! Anything that owns heap memory crosses the queue inside a
//! [`basedrop::Owned`] or [`basedrop::Shared`] so that the DSP thread can drop
//! it without freeing.
//!
//! ```ignore
//! let (mut tx, rx) = command_channel();
//! let mixdown = Mixdown::new(ctx, session.clone(), rx);
//!
//! tx.push(EngineCommand::AddTrack(Owned::new(&gc_handle(), track)))?;
//! ```

use basedrop::Owned;

use super::track::{ClipRef, Track};
use crate::effect::ChainEffect;

/// Structural change applied by the mixdown between chunks
pub enum EngineCommand {
    /// Append a track to the timeline
    AddTrack(Owned<Track>),
    /// Remove a track; its memory is reclaimed by the collector
    RemoveTrack { track: usize },
    SetMute { track: usize, muted: bool },

    AddClip { track: usize, clip: ClipRef },
    RemoveClip { track: usize, index: usize },

    /// Append a prebuilt effect to a track's chain
    AddEffect { track: usize, effect: Owned<ChainEffect> },
    RemoveEffect { track: usize, index: usize },
    SwapEffects { track: usize, a: usize, b: usize },
    /// Drop filter memory, echoes and envelopes on every track
    SilenceEffects,

    /// Start or stop the transport
    SetPlaying(bool),
    /// Move the playhead to an absolute frame
    Seek { position: i64 },
}

/// Capacity of the command queue
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a new command channel (producer/consumer pair)
///
/// The producer belongs to the main thread, the consumer to the mixdown.
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_creation() {
        let (mut tx, mut rx) = command_channel();
        assert!(tx.push(EngineCommand::SetMute { track: 0, muted: true }).is_ok());
        let cmd = rx.pop().unwrap();
        assert!(matches!(cmd, EngineCommand::SetMute { track: 0, muted: true }));
    }

    #[test]
    fn test_command_channel_empty() {
        let (_tx, mut rx) = command_channel();
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_command_size() {
        // Large payloads are boxed behind basedrop pointers
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 40, "EngineCommand is {} bytes, expected <= 40", size);
    }
}
