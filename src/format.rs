//! Frame format descriptors.
//!
//! Formats are immutable comparison-by-value types. A stage that changes the
//! format of the data flowing through it returns a new descriptor, it never
//! mutates one in place.

use crate::error::{MediaError, Result};

/// A positive fraction, used for frame rates and bytes-per-pixel ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    pub num: u32,
    pub den: u32,
}

impl Fraction {
    pub fn new(num: u32, den: u32) -> Self {
        assert!(den != 0, "fraction denominator must be non-zero");
        Self { num, den }
    }

    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl From<u32> for Fraction {
    fn from(value: u32) -> Self {
        Self { num: value, den: 1 }
    }
}

impl std::fmt::Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Common surface of audio and video format descriptors.
pub trait FrameFormat: Clone + PartialEq + Send + 'static {
    /// Average number of bytes one second of raw data occupies.
    fn average_bytes_per_second(&self) -> u64;
}

/// Raw audio sample layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u32,
    pub channels: u32,
    /// Planar: `AAA BBB`, interleaved: `AB AB AB`.
    pub planar: bool,
    pub float: bool,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, bits_per_sample: u32, channels: u32) -> Result<Self> {
        if bits_per_sample % 8 != 0 {
            return Err(MediaError::UnsupportedFormat(format!(
                "bits per sample must be a multiple of 8, got {bits_per_sample}"
            )));
        }
        Ok(Self {
            sample_rate,
            bits_per_sample,
            channels,
            planar: false,
            float: bits_per_sample >= 32,
        })
    }

    pub fn bytes_per_sample(&self) -> u32 {
        self.bits_per_sample / 8
    }

    /// Bytes occupied by one sample across all channels.
    pub fn block_align(&self) -> u32 {
        self.bytes_per_sample() * self.channels
    }
}

impl FrameFormat for AudioFormat {
    fn average_bytes_per_second(&self) -> u64 {
        self.block_align() as u64 * self.sample_rate as u64
    }
}

/// Raw pixel layouts accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Yv12,
    Nv12,
    Yuy2,
    Rgb24,
    Rgba32,
    Mjpg,
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> Result<Fraction> {
        Ok(match self {
            PixelFormat::Yv12 | PixelFormat::Nv12 => Fraction::new(3, 2),
            PixelFormat::Yuy2 => Fraction::from(2),
            PixelFormat::Rgb24 => Fraction::from(3),
            PixelFormat::Rgba32 => Fraction::from(4),
            PixelFormat::Gray8 => Fraction::from(1),
            PixelFormat::Mjpg => {
                return Err(MediaError::UnsupportedFormat(
                    "MJPG has no fixed bytes-per-pixel ratio".into(),
                ));
            }
        })
    }
}

/// Raw video frame layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub pixel: PixelFormat,
    pub frame_rate: Fraction,
}

impl VideoFormat {
    pub fn new(width: u32, height: u32, pixel: PixelFormat, frame_rate: Fraction) -> Self {
        Self {
            width,
            height,
            pixel,
            frame_rate,
        }
    }

    /// Bytes of one uncompressed frame.
    pub fn frame_bytes(&self) -> u64 {
        let bpp = self
            .pixel
            .bytes_per_pixel()
            .unwrap_or_else(|_| Fraction::new(0, 1));
        self.width as u64 * self.height as u64 * bpp.num as u64 / bpp.den as u64
    }
}

impl FrameFormat for VideoFormat {
    fn average_bytes_per_second(&self) -> u64 {
        (self.frame_bytes() as f64 * self.frame_rate.to_f64()) as u64
    }
}

/// Encoded audio output formats an encoder may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodedAudioFormat {
    Aac,
    Mp3,
    Opus,
    Flac,
    PcmS16Le,
}

/// Encoded video output formats an encoder may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodedVideoFormat {
    H264,
    Hevc,
    Vp8,
    Vp9,
}

/// Declared output format of a pipeline stage.
///
/// A tagged value rather than an `Option` so that "passes the format through"
/// can never be confused with a real format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatChange<F> {
    /// The stage emits the same format it receives.
    Unchanged,
    /// The stage emits this format regardless of its input.
    To(F),
}

impl<F: Clone> FormatChange<F> {
    /// Resolve the actual output format for a given source format.
    pub fn apply(&self, source: &F) -> F {
        match self {
            FormatChange::Unchanged => source.clone(),
            FormatChange::To(format) => format.clone(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, FormatChange::Unchanged)
    }

    pub fn as_changed(&self) -> Option<&F> {
        match self {
            FormatChange::Unchanged => None,
            FormatChange::To(format) => Some(format),
        }
    }
}
