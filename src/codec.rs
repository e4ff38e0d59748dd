//! Encoder and decoder traits.
//!
//! Encoders sit at the sink end of a device pipeline and publish their
//! output through [`EncoderEvents`]; decoders drive the opposite direction,
//! pushing decoded frames into a caller-supplied sink until the compressed
//! stream ends or capture is cancelled.

use tokio_util::sync::CancellationToken;

use crate::device::DeviceHandle;
use crate::error::Result;
use crate::event::Event;
use crate::format::{
    AudioFormat, EncodedAudioFormat, EncodedVideoFormat, FrameFormat, VideoFormat,
};
use crate::frame::{RawFrame, RawPacket};

/// The device-facing half of an encoder: what a capture pipeline needs in
/// order to feed it, with the target-format machinery erased.
pub trait FrameSink<F: FrameFormat>: Send {
    /// Called once when the owning device opens, with the format the sink
    /// will receive after the modifier chain.
    fn open(&mut self, device: &DeviceHandle, source_format: &F) -> Result<()>;

    /// Consume one frame. The sink owns the frame from here on.
    fn push_frame(&mut self, frame: RawFrame<F>) -> Result<()>;

    /// Called once when the owning device closes. Flushes delayed output.
    fn close(&mut self, device: &DeviceHandle) -> Result<()>;
}

/// Subscription points an encoder fires around its lifecycle.
///
/// All events fire synchronously on the capture thread, in order:
/// `opening` once, `frame_encoded` per output packet, `closing` once.
#[derive(Default, Debug)]
pub struct EncoderEvents {
    pub opening: Event<DeviceHandle>,
    pub frame_encoded: Event<RawPacket>,
    pub closing: Event<DeviceHandle>,
}

impl EncoderEvents {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A [`FrameSink`] that compresses its input and advertises the encoded
/// formats it can produce.
///
/// Changing the target while the encoder is open is an
/// [`InvalidState`](crate::error::MediaError::InvalidState) error;
/// implementations reconfigure only between close and open.
pub trait Encoder<F: FrameFormat>: FrameSink<F> {
    /// The encoded format family this encoder targets.
    type Target: Copy + PartialEq + Send;

    /// Formats this encoder can be configured to produce.
    fn supported_targets(&self) -> &[Self::Target];

    fn target(&self) -> Self::Target;

    fn set_target(&mut self, target: Self::Target) -> Result<()>;

    /// Output bitrate in bits per second, if rate-controlled.
    fn bitrate(&self) -> Option<u64> {
        None
    }

    fn events(&mut self) -> &mut EncoderEvents;
}

pub type AudioEncoder = dyn Encoder<AudioFormat, Target = EncodedAudioFormat>;
pub type VideoEncoder = dyn Encoder<VideoFormat, Target = EncodedVideoFormat>;

/// What one decode call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeResult {
    /// At least one frame was delivered to the sink.
    Success,
    /// The decoder needs more input before it can emit; call again.
    Again,
    /// The compressed stream is exhausted. No further frames will come.
    Eof,
    /// Cancellation was observed mid-decode.
    Cancelled,
}

/// Pull-based decoder feeding raw frames into a sink.
///
/// One call may deliver zero, one, or many frames; codecs with internal
/// reordering buffer freely and report [`DecodeResult::Again`] until they
/// have output.
pub trait Decoder<F: FrameFormat>: Send {
    /// The format of the frames this decoder emits, fixed at open.
    fn output_format(&self) -> &F;

    /// Presentation time of the decode cursor, when the stream tracks one.
    fn current_time(&self) -> Option<std::time::Duration> {
        None
    }

    /// Decode the next unit of input, delivering frames through `sink`.
    fn decode(
        &mut self,
        cancel: &CancellationToken,
        sink: &mut dyn FnMut(RawFrame<F>),
    ) -> Result<DecodeResult>;

    /// Reposition the stream, discarding buffered frames.
    fn seek(&mut self, position: std::time::Duration) -> Result<()> {
        let _ = position;
        Err(crate::error::MediaError::UnsupportedFormat(
            "decoder does not support seeking".into(),
        ))
    }
}
