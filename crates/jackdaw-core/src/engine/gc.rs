//! Collector thread for timeline data released by the mixdown
//!
//! Three things leave the DSP thread while a project plays:
//! - a [`Track`] removed with `EngineCommand::RemoveTrack`, travelling as
//!   `Owned<Track>` together with its clips, curves and effect chain
//! - a [`ChainEffect`] removed from a chain, as `Owned<ChainEffect>`
//! - the last [`ClipRef`] to a recording, releasing its `Shared<ClipAudio>`
//!
//! None of them is freed by [`Mixdown`]. Their drop only enqueues the pointer
//! and the `jackdaw-gc` thread releases the memory on its next pass. The same
//! clip audio may back any number of clip refs on any number of tracks; it is
//! freed once, after the last of them is gone.
//!
//! ```ignore
//! let audio = Shared::new(&gc_handle(), ClipAudio::new("take 1", buffer));
//! track.add_clip(ClipRef::new(audio.clone(), 0))?;
//! tx.push(EngineCommand::AddTrack(Owned::new(&gc_handle(), track)))?;
//! ```
//!
//! [`Track`]: super::Track
//! [`ClipRef`]: super::ClipRef
//! [`Mixdown`]: super::Mixdown
//! [`ChainEffect`]: crate::effect::ChainEffect

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Pause between collection passes
pub const GC_INTERVAL: Duration = Duration::from_millis(100);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn spawn_collector() -> Handle {
    let (handle_tx, handle_rx) = mpsc::channel();

    thread::Builder::new()
        .name("jackdaw-gc".to_string())
        .spawn(move || {
            // Collector is !Sync; it never leaves this thread
            let mut collector = Collector::new();
            handle_tx
                .send(collector.handle())
                .expect("timeline collector handle not delivered");
            log::info!("Timeline collector running every {:?}", GC_INTERVAL);
            loop {
                collector.collect();
                thread::sleep(GC_INTERVAL);
            }
        })
        .expect("could not start the timeline collector thread");

    handle_rx
        .recv()
        .expect("timeline collector exited before sending its handle")
}

/// Handle used to wrap tracks, effects and clip audio
///
/// Starts the collector on first use.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(spawn_collector).clone()
}
