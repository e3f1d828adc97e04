//! Fixed-capacity circular buffer with a movable active length
//!
//! Storage is allocated once at construction. The active length can shrink
//! or grow inside that capacity; every index computed from the cursor is
//! wrapped against the active length, so `0 <= pos < len` always holds.

use super::error::{try_zeroed, DspResult};

/// Circular buffer over `T` with a single read/write cursor
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    len: usize,
    pos: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Allocate `capacity` zeroed slots; the active length starts at `capacity`
    pub fn with_capacity(what: &'static str, capacity: usize) -> DspResult<Self> {
        let capacity = capacity.max(1);
        Ok(Self {
            data: try_zeroed(what, capacity)?,
            len: capacity,
            pos: 0,
        })
    }

    /// Active length
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; the active length never drops below one
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Cursor position, always `< len`
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Move the cursor, wrapping into the active region
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos % self.len;
    }

    /// Wrap a signed index into `[0, len)`
    #[inline]
    pub fn wrap(&self, index: isize) -> usize {
        index.rem_euclid(self.len as isize) as usize
    }

    /// Element `back` slots behind the cursor
    #[inline]
    pub fn behind(&self, back: usize) -> T {
        let idx = self.wrap(self.pos as isize - (back % self.len) as isize);
        self.data[idx]
    }

    /// Element under the cursor
    #[inline]
    pub fn current(&self) -> T {
        self.data[self.pos]
    }

    /// Mutable element under the cursor
    #[inline]
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.data[self.pos]
    }

    /// Step the cursor forward by one, wrapping at `len`
    #[inline]
    pub fn advance(&mut self) {
        self.pos += 1;
        if self.pos >= self.len {
            self.pos = 0;
        }
    }

    /// Zero the whole allocation and rewind the cursor
    pub fn clear(&mut self) {
        self.data.fill(T::default());
        self.pos = 0;
    }

    /// Active region in storage order
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len]
    }

    /// Change the active length, resampling existing contents
    ///
    /// Uses nearest-neighbour lookup (`src = round(i * old_len / new_len)`)
    /// into `scratch`, then copies back. The cursor is rescaled so that
    /// `pos / len` is preserved to within one sample. `new_len` is clamped
    /// to `[1, capacity]`; `scratch` must hold at least `new_len` elements.
    pub fn resize_resampled(&mut self, new_len: usize, scratch: &mut [T]) -> usize {
        let new_len = new_len.clamp(1, self.capacity());
        let old_len = self.len;
        if new_len == old_len {
            return new_len;
        }
        debug_assert!(scratch.len() >= new_len, "resample scratch too small");
        let new_len = new_len.min(scratch.len().max(1));

        for (i, slot) in scratch.iter_mut().take(new_len).enumerate() {
            let src = ((old_len as f64 * i as f64) / new_len as f64).round() as usize;
            *slot = self.data[src.min(old_len - 1)];
        }
        self.data[..new_len].copy_from_slice(&scratch[..new_len]);

        self.pos = (self.pos * new_len) / old_len;
        self.len = new_len;
        new_len
    }
}
