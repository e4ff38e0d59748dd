//! Bounded ring buffers decoupling producer and consumer rates.
//!
//! Three shapes share one wrap-around algorithm:
//! - [`BoundedBuffer`]: fixed capacity, fail-fast on overflow.
//! - [`BlockingBuffer`]: fixed capacity, reads and writes block until they
//!   can complete or the buffer is closed.
//! - [`GrowableBuffer`]: doubles its capacity on overflow, preserving unread
//!   content.
//!
//! [`AudioWindowBuffer`] layers sample accounting on top of the fail-fast
//! shape for slicing arbitrary input frames into fixed encoder windows.

mod blocking;
mod bounded;
mod growable;
mod window;

pub use blocking::BlockingBuffer;
pub use bounded::BoundedBuffer;
pub use growable::GrowableBuffer;
pub use window::AudioWindowBuffer;

/// Circular byte buffer with separate read/write cursors.
///
/// An explicit `full` flag disambiguates the cursors-equal case: equal and
/// not full means empty, equal and full means every slot is in use.
pub(crate) struct RingCore {
    buf: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    full: bool,
}

impl RingCore {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            buf: vec![0u8; capacity],
            read_pos: 0,
            write_pos: 0,
            full: false,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently buffered and readable.
    pub(crate) fn len(&self) -> usize {
        if self.full {
            self.capacity()
        } else if self.write_pos >= self.read_pos {
            self.write_pos - self.read_pos
        } else {
            self.write_pos + self.capacity() - self.read_pos
        }
    }

    pub(crate) fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.full && self.read_pos == self.write_pos
    }

    pub(crate) fn clear(&mut self) {
        self.read_pos = self.write_pos;
        self.full = false;
    }

    /// Copy up to `out.len()` buffered bytes into `out`.
    ///
    /// Returns the number of bytes read, 0 when empty.
    pub(crate) fn read(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.len());
        if count == 0 {
            return 0;
        }

        let reach_end = self.capacity() - self.read_pos;
        if count < reach_end {
            out[..count].copy_from_slice(&self.buf[self.read_pos..self.read_pos + count]);
            self.read_pos += count;
        } else if count == reach_end {
            out[..count].copy_from_slice(&self.buf[self.read_pos..]);
            self.read_pos = 0;
        } else {
            // run to the end of the backing array, then the residual head
            out[..reach_end].copy_from_slice(&self.buf[self.read_pos..]);
            out[reach_end..count].copy_from_slice(&self.buf[..count - reach_end]);
            self.read_pos = count - reach_end;
        }

        self.full = false;
        count
    }

    /// Copy all of `input` into the buffer, or nothing at all.
    ///
    /// Returns `false` when `input` does not fit into the free space.
    pub(crate) fn write(&mut self, input: &[u8]) -> bool {
        if input.is_empty() {
            return true;
        }
        let free = self.free();
        if input.len() > free {
            return false;
        }

        let count = input.len();
        let reach_end = self.capacity() - self.write_pos;
        if count < reach_end {
            self.buf[self.write_pos..self.write_pos + count].copy_from_slice(input);
            self.write_pos += count;
        } else if count == reach_end {
            self.buf[self.write_pos..].copy_from_slice(input);
            self.write_pos = 0;
        } else {
            self.buf[self.write_pos..].copy_from_slice(&input[..reach_end]);
            self.buf[..count - reach_end].copy_from_slice(&input[reach_end..]);
            self.write_pos = count - reach_end;
        }

        if count == free {
            self.full = true;
        }
        true
    }
}
