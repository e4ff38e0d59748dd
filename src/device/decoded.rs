//! A capture source backed by a decoder instead of hardware.

use std::collections::VecDeque;
use std::time::Duration;

use crate::codec::{DecodeResult, Decoder};
use crate::device::{CaptureContext, CaptureSource, DeviceHandle};
use crate::error::{MediaError, Result};
use crate::format::FrameFormat;
use crate::frame::RawFrame;

/// Adapts a [`Decoder`] into a [`CaptureSource`], so decoded files and
/// streams drive the same device pipeline live inputs do.
///
/// The session ends on its own when the decoder reports end of stream.
/// Real-time pacing is not applied here; put a playback gate in the modifier
/// chain when the consumer expects wall-clock timing.
pub struct DecodedSource<F: FrameFormat> {
    uid: String,
    format: F,
    decoder: Box<dyn Decoder<F>>,
    pending: VecDeque<RawFrame<F>>,
}

impl<F: FrameFormat> DecodedSource<F> {
    pub fn new(uid: impl Into<String>, decoder: Box<dyn Decoder<F>>) -> Self {
        let format = decoder.output_format().clone();
        Self {
            uid: uid.into(),
            format,
            decoder,
            pending: VecDeque::new(),
        }
    }

    /// Reposition the underlying stream, dropping frames decoded but not
    /// yet delivered.
    pub fn seek(&mut self, position: Duration) -> Result<()> {
        self.decoder.seek(position)?;
        self.pending.clear();
        Ok(())
    }
}

impl<F: FrameFormat> CaptureSource<F> for DecodedSource<F> {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn format(&self) -> &F {
        &self.format
    }

    fn open(&mut self, _device: &DeviceHandle) -> Result<()> {
        Ok(())
    }

    fn run(&mut self, ctx: &mut CaptureContext<'_, F>) -> Result<()> {
        loop {
            ctx.checkpoint()?;

            let result = {
                let Self {
                    decoder, pending, ..
                } = self;
                decoder.decode(ctx.cancellation(), &mut |frame| pending.push_back(frame))?
            };

            // deliver everything this call produced, in decode order
            while let Some(frame) = self.pending.pop_front() {
                ctx.checkpoint()?;
                ctx.process_frame(frame)?;
            }

            match result {
                DecodeResult::Success | DecodeResult::Again => {}
                DecodeResult::Eof => return Ok(()),
                DecodeResult::Cancelled => return Err(MediaError::Cancelled),
            }
        }
    }

    fn close(&mut self, _device: &DeviceHandle) -> Result<()> {
        self.pending.clear();
        Ok(())
    }
}
