//! Error types shared across the capture runtime.

use thiserror::Error;

/// Convenience alias used by every fallible operation in the crate.
pub type Result<T, E = MediaError> = std::result::Result<T, E>;

/// Main error type for the capture runtime.
#[derive(Error, Debug)]
pub enum MediaError {
    /// The capture source reported itself not ready to open.
    #[error("device {uid} is not ready to open")]
    DeviceNotReady { uid: String },

    /// An operation was called in a state that forbids it.
    #[error("{operation} is not allowed while the device is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// A fixed-capacity buffer could not accept a write.
    #[error("buffer full: capacity {capacity}, buffered {buffered}, requested {requested}")]
    BufferFull {
        capacity: usize,
        buffered: usize,
        requested: usize,
    },

    /// A blocking request larger than the buffer itself can never complete.
    #[error("request of {requested} bytes exceeds buffer capacity {capacity}")]
    OversizedRequest { requested: usize, capacity: usize },

    /// A modifier or codec received a format it does not support.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O errors from sinks and muxer destinations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors raised by pluggable collaborators (sources, codecs, muxers).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
