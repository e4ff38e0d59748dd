//! Frame and packet buffer types.
//!
//! A [`RawFrame`] owns or borrows one contiguous block of raw sample data and
//! carries its timing metadata. Frames move through the pipeline by value:
//! a stage either returns the frame it received (mutated in place) or builds
//! a replacement, at which point the input drops and its memory is released
//! exactly once. Borrowed frames reference memory owned by a producer (for
//! example a decoder's internal buffer) and never free it.

use std::ptr::NonNull;
use std::time::Duration;

use bytes::Bytes;

use crate::format::{AudioFormat, VideoFormat};

/// Backing storage of a frame.
pub enum FrameData {
    /// Heap allocation released when the frame drops.
    Owned(Vec<u8>),
    /// Memory owned by the producer. Never freed by the holder.
    Borrowed { ptr: NonNull<u8>, len: usize },
}

// Borrowed frames are handed across the capture thread boundary by producers
// that guarantee exclusive access for the lifetime of the frame.
unsafe impl Send for FrameData {}

impl FrameData {
    pub fn len(&self) -> usize {
        match self {
            FrameData::Owned(data) => data.len(),
            FrameData::Borrowed { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, FrameData::Owned(_))
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            FrameData::Owned(data) => data,
            FrameData::Borrowed { ptr, len } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            FrameData::Owned(data) => data,
            FrameData::Borrowed { ptr, len } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
        }
    }
}

/// One raw unit of audio or video data with format and timing metadata.
///
/// `pts`/`duration` of `None` mean the source has no native timestamp; the
/// playback gate forwards such frames unconditionally.
pub struct RawFrame<F> {
    data: FrameData,
    pub format: F,
    pub pts: Option<Duration>,
    pub duration: Option<Duration>,
}

pub type AudioFrame = RawFrame<AudioFormat>;
pub type VideoFrame = RawFrame<VideoFormat>;

impl<F> RawFrame<F> {
    /// Allocate a zeroed, owned frame of `len` bytes.
    pub fn alloc(len: usize, format: F) -> Self {
        Self {
            data: FrameData::Owned(vec![0u8; len]),
            format,
            pts: None,
            duration: None,
        }
    }

    /// Wrap an existing allocation as an owned frame.
    pub fn from_vec(data: Vec<u8>, format: F) -> Self {
        Self {
            data: FrameData::Owned(data),
            format,
            pts: None,
            duration: None,
        }
    }

    /// Wrap producer-owned memory without taking ownership.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` valid bytes that outlive this frame, and no
    /// other reader or writer may touch them while the frame is alive.
    pub unsafe fn borrowed(ptr: *mut u8, len: usize, format: F) -> Self {
        Self {
            data: FrameData::Borrowed {
                ptr: NonNull::new(ptr).expect("borrowed frame pointer must be non-null"),
                len,
            },
            format,
            pts: None,
            duration: None,
        }
    }

    pub fn with_timing(mut self, pts: Duration, duration: Duration) -> Self {
        self.pts = Some(pts);
        self.duration = Some(duration);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether this frame releases its memory when dropped.
    pub fn owns_data(&self) -> bool {
        self.data.is_owner()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }

    /// View the payload as typed samples.
    ///
    /// # Panics
    ///
    /// The payload length must be a multiple of the sample size and the
    /// storage aligned for `T`. Owned frames always satisfy both for the
    /// sample widths the pipeline produces; a borrowed frame over a
    /// misaligned producer pointer panics here rather than handing out an
    /// invalid slice.
    pub fn samples<T: Copy>(&self) -> &[T] {
        let bytes = self.data.as_slice();
        let size = size_of::<T>();
        assert_eq!(bytes.len() % size, 0, "payload is not whole samples");
        assert_eq!(bytes.as_ptr().addr() % align_of::<T>(), 0, "payload is misaligned");
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const T, bytes.len() / size) }
    }

    pub fn samples_mut<T: Copy>(&mut self) -> &mut [T] {
        let bytes = self.data.as_mut_slice();
        let size = size_of::<T>();
        assert_eq!(bytes.len() % size, 0, "payload is not whole samples");
        assert_eq!(bytes.as_ptr().addr() % align_of::<T>(), 0, "payload is misaligned");
        unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut T, bytes.len() / size) }
    }
}

impl RawFrame<AudioFormat> {
    /// Number of per-channel samples carried by this frame.
    pub fn sample_count(&self) -> usize {
        let align = self.format.block_align() as usize;
        if align == 0 { 0 } else { self.len() / align }
    }
}

impl RawFrame<VideoFormat> {
    pub fn width(&self) -> u32 {
        self.format.width
    }

    pub fn height(&self) -> u32 {
        self.format.height
    }

    /// Bytes per row of the stored image.
    pub fn pitch(&self) -> usize {
        if self.format.height == 0 {
            0
        } else {
            self.len() / self.format.height as usize
        }
    }
}

impl<F: std::fmt::Debug> std::fmt::Debug for RawFrame<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("format", &self.format)
            .field("len", &self.len())
            .field("owned", &self.owns_data())
            .field("pts", &self.pts)
            .field("duration", &self.duration)
            .finish()
    }
}

/// One encoded unit of output data.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub data: Bytes,
    /// Presentation timestamp.
    pub pts: Option<Duration>,
    /// Decode timestamp; differs from `pts` for codecs with frame reordering.
    pub dts: Option<Duration>,
    pub keyframe: bool,
}

impl RawPacket {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            pts: None,
            dts: None,
            keyframe: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
