//! Capturify
//!
//! A capture-transform-encode runtime for media recording pipelines.
//!
//! An [`InputDevice`](device::InputDevice) wraps a frame producer (a
//! microphone, a camera, a decoded file) and drives it from a dedicated
//! worker thread through a chain of [`Modifier`](modifier::Modifier)s into
//! a [`FrameSink`](codec::FrameSink), typically an encoder feeding a
//! [`Muxer`](muxer::Muxer). The device exposes a small control surface
//! (`open`/`start`/`pause`/`close`) and reports worker errors through a
//! handler or a sticky slot instead of unwinding.

pub mod buffer;
pub mod clock;
pub mod codec;
pub mod device;
pub mod error;
pub mod event;
pub mod format;
pub mod frame;
pub mod modifier;
pub mod modifiers;
pub mod muxer;

pub use crate::codec::{
    AudioEncoder, DecodeResult, Decoder, Encoder, EncoderEvents, FrameSink, VideoEncoder,
};
pub use crate::device::{
    AudioInputDevice, CaptureContext, CaptureSource, DecodedSource, DeviceHandle, DeviceState,
    InputDevice, VideoInputDevice,
};
pub use crate::error::{MediaError, Result};
pub use crate::format::{
    AudioFormat, EncodedAudioFormat, EncodedVideoFormat, FormatChange, Fraction, FrameFormat,
    PixelFormat, VideoFormat,
};
pub use crate::frame::{AudioFrame, FrameData, RawFrame, RawPacket, VideoFrame};
pub use crate::modifier::{AggregateModifier, Modifier};
pub use crate::muxer::{Muxer, MuxerOutput, StreamId, attach_encoder};
