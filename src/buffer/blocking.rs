//! Fixed-capacity ring buffer with blocking reads and writes.

use std::sync::{Arc, Condvar, Mutex};

use crate::buffer::RingCore;
use crate::error::{MediaError, Result};

struct RingState {
    ring: RingCore,
    closed: bool,
}

struct Shared {
    state: Mutex<RingState>,
    readable: Condvar,
    writable: Condvar,
}

/// Cloneable ring buffer connecting one producer thread to one consumer.
///
/// Reads block until the requested byte count is available, writes block
/// until the input fits. [`close`](BlockingBuffer::close) wakes every waiter:
/// pending reads return 0 and pending writes fail.
pub struct BlockingBuffer {
    shared: Arc<Shared>,
}

impl Clone for BlockingBuffer {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl BlockingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RingState {
                    ring: RingCore::with_capacity(capacity),
                    closed: false,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().ring.capacity()
    }

    pub fn len(&self) -> usize {
        self.lock().ring.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RingState> {
        // lock poisoning only happens if a holder panicked; the ring itself
        // is never left inconsistent mid-operation
        match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Read exactly `out.len()` bytes, blocking until they are available.
    ///
    /// Returns the byte count read, or 0 when the buffer was closed before
    /// enough data arrived. Requests larger than the capacity can never be
    /// satisfied and fail immediately.
    pub fn read(&self, out: &mut [u8]) -> Result<usize> {
        let mut state = self.lock();
        if out.len() > state.ring.capacity() {
            return Err(MediaError::OversizedRequest {
                requested: out.len(),
                capacity: state.ring.capacity(),
            });
        }
        while state.ring.len() < out.len() {
            if state.closed {
                return Ok(0);
            }
            state = match self.shared.readable.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        let count = state.ring.read(out);
        self.shared.writable.notify_all();
        Ok(count)
    }

    /// Write all of `input`, blocking until it fits.
    pub fn write(&self, input: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if input.len() > state.ring.capacity() {
            return Err(MediaError::OversizedRequest {
                requested: input.len(),
                capacity: state.ring.capacity(),
            });
        }
        loop {
            if state.closed {
                return Err(MediaError::Cancelled);
            }
            if state.ring.write(input) {
                self.shared.readable.notify_all();
                return Ok(());
            }
            state = match self.shared.writable.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Write without blocking. Returns `false` when the input did not fit.
    pub fn write_noblock(&self, input: &[u8]) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        let written = state.ring.write(input);
        if written {
            self.shared.readable.notify_all();
        }
        written
    }

    /// Mark the buffer closed and wake every blocked reader and writer.
    ///
    /// Buffered data stays readable; only blocking semantics change.
    pub fn close(&self) {
        self.lock().closed = true;
        self.shared.readable.notify_all();
        self.shared.writable.notify_all();
    }
}
