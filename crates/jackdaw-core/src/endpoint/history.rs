//! Undo/redo history of endpoint writes

use std::sync::Mutex;

use super::error::{EndpointError, EndpointResult};
use super::session::{Session, UndoSink};
use super::{Endpoint, ThreadId, Value, WriteFlags};

struct Entry {
    ep: Endpoint,
    old: Value,
    new: Value,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    /// Entries before this index are undoable, the rest redoable
    cursor: usize,
}

/// Linear undo stack fed by [`Session`]
///
/// Pushing after an undo discards the redo tail.
#[derive(Default)]
pub struct EndpointHistory {
    inner: Mutex<Inner>,
}

impl EndpointHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Undoable entries
    pub fn len(&self) -> usize {
        self.lock().cursor
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Restore the value before the most recent entry
    ///
    /// Returns false when there is nothing to undo.
    pub fn undo(&self, session: &Session, thread: ThreadId) -> EndpointResult<bool> {
        require_main(thread)?;
        let (ep, value) = {
            let mut inner = self.lock();
            if inner.cursor == 0 {
                return Ok(false);
            }
            inner.cursor -= 1;
            let entry = &inner.entries[inner.cursor];
            (entry.ep.clone(), entry.old)
        };
        self.replay(session, &ep, value)
    }

    /// Re-apply the most recently undone entry
    pub fn redo(&self, session: &Session, thread: ThreadId) -> EndpointResult<bool> {
        require_main(thread)?;
        let (ep, value) = {
            let mut inner = self.lock();
            let Some(entry) = inner.entries.get(inner.cursor) else {
                return Ok(false);
            };
            let pair = (entry.ep.clone(), entry.new);
            inner.cursor += 1;
            pair
        };
        self.replay(session, &ep, value)
    }

    fn replay(&self, session: &Session, ep: &Endpoint, value: Value) -> EndpointResult<bool> {
        log::debug!("undo/redo adj {}", ep.display_name());
        ep.write(session, ThreadId::Main, value, WriteFlags::ALL_CALLBACKS)?;
        Ok(true)
    }
}

impl UndoSink for EndpointHistory {
    fn push_endpoint_write(&self, ep: &Endpoint, old: Value, new: Value) {
        let mut inner = self.lock();
        let cursor = inner.cursor;
        inner.entries.truncate(cursor);
        inner.entries.push(Entry {
            ep: ep.clone(),
            old,
            new,
        });
        inner.cursor += 1;
    }
}

fn require_main(thread: ThreadId) -> EndpointResult<()> {
    if thread == ThreadId::Main {
        Ok(())
    } else {
        Err(EndpointError::WrongThread {
            op: "undo",
            expected: ThreadId::Main,
            actual: thread,
        })
    }
}
