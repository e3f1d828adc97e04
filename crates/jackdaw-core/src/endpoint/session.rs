//! Per-thread queues for deferred endpoint writes and callbacks
//!
//! One `Session` is shared by every thread of a project. Each logical thread
//! has a value-change queue (coalescing: one pending value per endpoint) and
//! a callback queue (deduplicated by endpoint and slot). Both are bounded by
//! [`MAX_QUEUED_OPS`] and allocated up front.
//!
//! The DSP thread never waits on these locks: it uses `try_lock` and leaves
//! the work for the next chunk if another thread holds the queue.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use super::error::{EndpointError, EndpointResult};
use super::{CallbackSlot, Endpoint, ThreadId, Value, NUM_THREADS};

/// Capacity of every per-thread queue
pub const MAX_QUEUED_OPS: usize = 256;

/// Receives undo entries for endpoint writes
pub trait UndoSink: Send + Sync {
    fn push_endpoint_write(&self, ep: &Endpoint, old: Value, new: Value);
}

struct QueuedValChange {
    ep: Endpoint,
    value: Value,
    run_gui_cb: bool,
}

struct QueuedCallback {
    ep: Endpoint,
    slot: CallbackSlot,
}

/// Shared queue state for a project
pub struct Session {
    val_changes: [Mutex<Vec<QueuedValChange>>; NUM_THREADS],
    callbacks: [Mutex<Vec<QueuedCallback>>; NUM_THREADS],
    /// Callbacks a thread could not queue because the target queue was
    /// locked; indexed by the *calling* thread, retried on its next flush
    deferred: [Mutex<Vec<(QueuedCallback, ThreadId)>>; NUM_THREADS],
    ongoing: [Mutex<Vec<Endpoint>>; NUM_THREADS],
    undo: Mutex<Option<Arc<dyn UndoSink>>>,
    playing: AtomicBool,
    playhead: AtomicI64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn queue<T>() -> Mutex<Vec<T>> {
    Mutex::new(Vec::with_capacity(MAX_QUEUED_OPS))
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `try_lock` for the DSP thread, blocking `lock` everywhere else
fn lock_for<T>(m: &Mutex<T>, thread: ThreadId) -> Option<MutexGuard<'_, T>> {
    if thread != ThreadId::Dsp {
        return Some(lock(m));
    }
    match m.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            val_changes: std::array::from_fn(|_| queue()),
            callbacks: std::array::from_fn(|_| queue()),
            deferred: std::array::from_fn(|_| queue()),
            ongoing: std::array::from_fn(|_| queue()),
            undo: Mutex::new(None),
            playing: AtomicBool::new(false),
            playhead: AtomicI64::new(0),
        }
    }

    /// Whether the DSP thread is running chunks
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    /// Timeline position in sample frames
    #[inline]
    pub fn playhead(&self) -> i32 {
        self.playhead
            .load(Ordering::Relaxed)
            .clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    pub fn set_playhead(&self, pos: i64) {
        self.playhead.store(pos, Ordering::Relaxed);
    }

    pub fn set_undo_sink(&self, sink: Arc<dyn UndoSink>) {
        *lock(&self.undo) = Some(sink);
    }

    pub fn clear_undo_sink(&self) {
        *lock(&self.undo) = None;
    }

    pub(crate) fn push_undo(&self, ep: &Endpoint, old: Value, new: Value) {
        let sink = lock(&self.undo).clone();
        if let Some(sink) = sink {
            sink.push_endpoint_write(ep, old, new);
        }
    }

    /// Queue `value` for `ep`'s owner, replacing a pending value for `ep`
    pub(crate) fn queue_val_change(&self, ep: &Endpoint, value: Value, run_gui_cb: bool) -> EndpointResult<()> {
        let thread = ep.owner();
        let mut queue = lock(&self.val_changes[thread.index()]);
        if let Some(pending) = queue.iter_mut().find(|q| q.ep.ptr_eq(ep)) {
            pending.value = value;
            pending.run_gui_cb = run_gui_cb;
            return Ok(());
        }
        if queue.len() >= MAX_QUEUED_OPS {
            log::warn!("Value change queue for {:?} full; dropping {}", thread, ep.local_id());
            return Err(EndpointError::QueueFull {
                thread,
                capacity: MAX_QUEUED_OPS,
            });
        }
        queue.push(QueuedValChange {
            ep: ep.clone(),
            value,
            run_gui_cb,
        });
        Ok(())
    }

    /// Queue `slot`'s callback on `ep` to run on `target`
    ///
    /// Duplicate (endpoint, slot) pairs collapse. If `from` is the DSP
    /// thread and the target queue is busy, the callback is parked and
    /// retried on the DSP thread's next value flush.
    pub(crate) fn queue_callback(&self, from: ThreadId, ep: &Endpoint, slot: CallbackSlot, target: ThreadId) {
        let Some(mut queue) = lock_for(&self.callbacks[target.index()], from) else {
            let mut parked = lock(&self.deferred[from.index()]);
            if parked.len() < MAX_QUEUED_OPS {
                parked.push((QueuedCallback { ep: ep.clone(), slot }, target));
            } else {
                log::warn!("Deferred callback list full; dropping {}", ep.local_id());
            }
            return;
        };
        Self::push_callback(&mut queue, target, QueuedCallback { ep: ep.clone(), slot });
    }

    fn push_callback(queue: &mut Vec<QueuedCallback>, target: ThreadId, cb: QueuedCallback) {
        if queue.iter().any(|q| q.slot == cb.slot && q.ep.ptr_eq(&cb.ep)) {
            return;
        }
        if queue.len() >= MAX_QUEUED_OPS {
            log::warn!("Callback queue for {:?} full; dropping {}", target, cb.ep.local_id());
            return;
        }
        queue.push(cb);
    }

    /// Number of pending value changes for `thread`
    pub fn pending_val_changes(&self, thread: ThreadId) -> usize {
        lock(&self.val_changes[thread.index()]).len()
    }

    /// Number of pending callbacks for `thread`
    pub fn pending_callbacks(&self, thread: ThreadId) -> usize {
        lock(&self.callbacks[thread.index()]).len()
    }

    /// Apply every value queued for `thread`, in queue order
    ///
    /// Returns the number applied, or `None` when the DSP thread found the
    /// queue locked and left it for the next chunk.
    pub fn flush_val_changes(&self, thread: ThreadId) -> Option<usize> {
        let applied = {
            let mut queue = lock_for(&self.val_changes[thread.index()], thread)?;
            let applied = queue.len();
            for change in queue.drain(..) {
                change.ep.apply(self, change.value);
                if thread != ThreadId::Main && change.run_gui_cb && change.ep.callback(CallbackSlot::Gui).is_some() {
                    self.queue_callback(thread, &change.ep, CallbackSlot::Gui, ThreadId::Main);
                }
            }
            applied
        };

        let parked: Vec<_> = lock(&self.deferred[thread.index()]).drain(..).collect();
        for (cb, target) in parked {
            self.queue_callback(thread, &cb.ep, cb.slot, target);
        }
        Some(applied)
    }

    /// Run every callback queued for `thread`
    ///
    /// The queue is swapped out before running so callbacks may queue more
    /// work without deadlocking; that work runs on the next flush.
    pub fn flush_callbacks(&self, thread: ThreadId) -> Option<usize> {
        let pending: Vec<QueuedCallback> = {
            let mut queue = lock_for(&self.callbacks[thread.index()], thread)?;
            queue.drain(..).collect()
        };
        for cb in &pending {
            if let Some(f) = cb.ep.callback(cb.slot) {
                f(&cb.ep);
            }
        }
        Some(pending.len())
    }

    pub(crate) fn add_ongoing_change(&self, ep: &Endpoint, thread: ThreadId) -> EndpointResult<()> {
        let mut ongoing = lock(&self.ongoing[thread.index()]);
        if ongoing.len() >= MAX_QUEUED_OPS {
            return Err(EndpointError::QueueFull {
                thread,
                capacity: MAX_QUEUED_OPS,
            });
        }
        ongoing.push(ep.clone());
        Ok(())
    }

    /// Step every auto-incrementing gesture owned by `thread`
    pub fn do_ongoing_changes(&self, thread: ThreadId) {
        let eps: Vec<Endpoint> = lock(&self.ongoing[thread.index()]).clone();
        for ep in eps.iter().filter(|ep| ep.has_auto_incr()) {
            if let Err(e) = ep.continuous_incr(self, thread) {
                log::warn!("Continuous change on {} failed: {}", ep.local_id(), e);
            }
        }
    }

    /// End every gesture started on `thread`
    pub fn flush_ongoing_changes(&self, thread: ThreadId) {
        let eps: Vec<Endpoint> = lock(&self.ongoing[thread.index()]).drain(..).collect();
        for ep in eps {
            if let Err(e) = ep.stop_continuous_change(self, thread) {
                log::warn!("Stopping change on {} failed: {}", ep.local_id(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{WriteFlags, WriteOutcome};

    fn dsp_int(id: &str) -> Endpoint {
        Endpoint::builder(id, id, 0i32, ThreadId::Dsp).build()
    }

    #[test]
    fn test_queue_coalesces_per_endpoint() {
        let session = Session::new();
        session.set_playing(true);
        let ep = dsp_int("a");
        for v in 1..=10 {
            ep.write(&session, ThreadId::Main, Value::Int(v), WriteFlags::NONE)
                .unwrap();
        }
        assert_eq!(session.pending_val_changes(ThreadId::Dsp), 1);
        assert_eq!(session.flush_val_changes(ThreadId::Dsp), Some(1));
        assert_eq!(ep.read(ThreadId::Dsp), Value::Int(10));
        assert_eq!(ep.generation(), 1);
    }

    #[test]
    fn test_queue_capacity() {
        let session = Session::new();
        session.set_playing(true);
        let eps: Vec<Endpoint> = (0..=MAX_QUEUED_OPS).map(|i| dsp_int(&format!("p{}", i))).collect();
        for ep in &eps[..MAX_QUEUED_OPS] {
            assert_eq!(
                ep.write(&session, ThreadId::Main, Value::Int(1), WriteFlags::NONE)
                    .unwrap(),
                WriteOutcome::Queued
            );
        }
        let err = eps[MAX_QUEUED_OPS]
            .write(&session, ThreadId::Main, Value::Int(1), WriteFlags::NONE)
            .unwrap_err();
        assert_eq!(
            err,
            EndpointError::QueueFull {
                thread: ThreadId::Dsp,
                capacity: MAX_QUEUED_OPS
            }
        );
    }

    #[test]
    fn test_callbacks_deduplicate() {
        let session = Session::new();
        let ep = Endpoint::builder("x", "X", 0.0f32, ThreadId::Dsp)
            .with_gui_callback(|_| {})
            .build();
        for _ in 0..5 {
            session.queue_callback(ThreadId::Server, &ep, CallbackSlot::Gui, ThreadId::Main);
        }
        session.queue_callback(ThreadId::Server, &ep, CallbackSlot::Proj, ThreadId::Main);
        assert_eq!(session.pending_callbacks(ThreadId::Main), 2);
        assert_eq!(session.flush_callbacks(ThreadId::Main), Some(2));
        assert_eq!(session.pending_callbacks(ThreadId::Main), 0);
    }

    #[test]
    fn test_dsp_flush_skips_locked_queue() {
        let session = Session::new();
        let guard = session.val_changes[ThreadId::Dsp.index()].lock().unwrap();
        assert_eq!(session.flush_val_changes(ThreadId::Dsp), None);
        drop(guard);
        assert_eq!(session.flush_val_changes(ThreadId::Dsp), Some(0));
    }

    #[test]
    fn test_dsp_callback_parked_when_queue_locked() {
        let session = Session::new();
        let ep = Endpoint::builder("x", "X", 0.0f32, ThreadId::Dsp)
            .with_gui_callback(|_| {})
            .build();
        {
            let _guard = session.callbacks[ThreadId::Main.index()].lock().unwrap();
            session.queue_callback(ThreadId::Dsp, &ep, CallbackSlot::Gui, ThreadId::Main);
        }
        assert_eq!(session.pending_callbacks(ThreadId::Main), 0);
        session.flush_val_changes(ThreadId::Dsp);
        assert_eq!(session.pending_callbacks(ThreadId::Main), 1);
    }

    #[test]
    fn test_single_writer_fifo_under_contention() {
        let session = Session::new();
        session.set_playing(true);
        let ep = dsp_int("level");
        const LAST: i32 = 2000;

        crossbeam::scope(|s| {
            s.spawn(|_| {
                for v in 1..=LAST {
                    ep.write(&session, ThreadId::Main, Value::Int(v), WriteFlags::NONE)
                        .unwrap();
                }
            });
            s.spawn(|_| {
                let mut prev = 0;
                loop {
                    session.flush_val_changes(ThreadId::Dsp);
                    let Value::Int(now) = ep.read(ThreadId::Dsp) else {
                        panic!("wrong type");
                    };
                    assert!(now >= prev, "value went backwards: {} -> {}", prev, now);
                    prev = now;
                    if now == LAST {
                        break;
                    }
                    std::thread::yield_now();
                }
            });
        })
        .unwrap();

        assert_eq!(ep.read(ThreadId::Dsp), Value::Int(LAST));
        assert_eq!(session.pending_val_changes(ThreadId::Dsp), 0);
    }

    #[test]
    fn test_many_writers_final_value_is_a_last_write() {
        let session = Session::new();
        session.set_playing(true);
        let ep = dsp_int("shared");
        const WRITERS: i32 = 4;
        const PER_WRITER: i32 = 500;

        crossbeam::scope(|s| {
            for w in 0..WRITERS {
                let (session, ep) = (&session, &ep);
                s.spawn(move |_| {
                    let thread = if w % 2 == 0 { ThreadId::Main } else { ThreadId::Server };
                    for i in 1..=PER_WRITER {
                        ep.write(session, thread, Value::Int(w * 10_000 + i), WriteFlags::NONE)
                            .unwrap();
                    }
                });
            }
            s.spawn(|_| {
                for _ in 0..200 {
                    session.flush_val_changes(ThreadId::Dsp);
                    std::thread::yield_now();
                }
            });
        })
        .unwrap();

        while session.pending_val_changes(ThreadId::Dsp) > 0 {
            session.flush_val_changes(ThreadId::Dsp);
        }
        let Value::Int(v) = ep.read(ThreadId::Dsp) else {
            panic!("wrong type");
        };
        assert_eq!(v % 10_000, PER_WRITER);
        assert!((0..WRITERS).contains(&(v / 10_000)));
    }
}
