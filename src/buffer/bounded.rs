//! Fixed-capacity, fail-fast ring buffer.

use crate::buffer::RingCore;
use crate::error::{MediaError, Result};

/// Single-threaded ring buffer that rejects writes exceeding its free space.
///
/// A rejected write leaves the buffer untouched: the caller decides whether
/// to drop the data or drain first.
pub struct BoundedBuffer {
    ring: RingCore,
}

impl BoundedBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: RingCore::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn free(&self) -> usize {
        self.ring.free()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// Read up to `out.len()` bytes. Returns how many were copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.ring.read(out)
    }

    /// Write all of `input`, or fail without writing anything.
    pub fn write(&mut self, input: &[u8]) -> Result<()> {
        if self.ring.write(input) {
            Ok(())
        } else {
            Err(MediaError::BufferFull {
                capacity: self.capacity(),
                buffered: self.len(),
                requested: input.len(),
            })
        }
    }
}
