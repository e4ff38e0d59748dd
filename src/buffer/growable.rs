//! Ring buffer that grows instead of rejecting overflowing writes.

use crate::buffer::RingCore;

/// Ring buffer with a soft capacity that doubles whenever a write would not
/// fit, carrying unread content over to the new allocation.
pub struct GrowableBuffer {
    ring: RingCore,
}

impl GrowableBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: RingCore::with_capacity(capacity.max(1)),
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

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.ring.read(out)
    }

    /// Write all of `input`, growing the buffer first when needed.
    pub fn write(&mut self, input: &[u8]) {
        self.ensure(input.len());
        let written = self.ring.write(input);
        debug_assert!(written);
    }

    /// Grow until at least `additional` free bytes exist, doubling each step.
    fn ensure(&mut self, additional: usize) {
        if additional <= self.ring.free() {
            return;
        }
        let buffered = self.ring.len();
        let needed = buffered + additional;
        let mut capacity = self.ring.capacity();
        while capacity < needed {
            capacity *= 2;
        }

        // drain into a linear scratch, then refill the bigger ring
        let mut scratch = vec![0u8; buffered];
        let drained = self.ring.read(&mut scratch);
        debug_assert_eq!(drained, buffered);

        self.ring = RingCore::with_capacity(capacity);
        let restored = self.ring.write(&scratch);
        debug_assert!(restored);
    }
}
