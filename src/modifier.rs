//! In-place frame transformation stages.

use crate::device::DeviceHandle;
use crate::error::Result;
use crate::format::{FormatChange, FrameFormat};
use crate::frame::RawFrame;

/// A pipeline stage that transforms raw frames between capture and the sink.
///
/// Frames pass through by value: a modifier returns the frame it received
/// (mutated in place), a replacement it built, or `None` to swallow the
/// frame entirely. Either way whatever it does not return is dropped here
/// and released exactly once.
pub trait Modifier<F: FrameFormat>: Send {
    /// The output format this stage produces, declared before any frame
    /// flows. [`FormatChange::Unchanged`] passes the source format through.
    fn target_format(&self) -> FormatChange<F> {
        FormatChange::Unchanged
    }

    /// Called once when the owning device opens, with the format the stage
    /// will receive.
    fn open(&mut self, device: &DeviceHandle, source_format: &F) -> Result<()> {
        let _ = (device, source_format);
        Ok(())
    }

    /// Transform one frame. Returning `None` drops the frame.
    fn modify_frame(&mut self, frame: RawFrame<F>) -> Result<Option<RawFrame<F>>>;

    /// Called once when the owning device closes.
    fn close(&mut self, device: &DeviceHandle) -> Result<()> {
        let _ = device;
        Ok(())
    }
}

/// Chains modifiers so a device slot holding one modifier can run many.
///
/// Frames flow through the stages front to back; a stage returning `None`
/// stops the chain for that frame.
pub struct AggregateModifier<F: FrameFormat> {
    stages: Vec<Box<dyn Modifier<F>>>,
}

impl<F: FrameFormat> AggregateModifier<F> {
    pub fn new(stages: Vec<Box<dyn Modifier<F>>>) -> Self {
        Self { stages }
    }

    pub fn push(&mut self, stage: Box<dyn Modifier<F>>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<F: FrameFormat> Modifier<F> for AggregateModifier<F> {
    /// The chain's output format is the last stage that declares one;
    /// everything after it passes the format through.
    fn target_format(&self) -> FormatChange<F> {
        for stage in self.stages.iter().rev() {
            if let FormatChange::To(format) = stage.target_format() {
                return FormatChange::To(format);
            }
        }
        FormatChange::Unchanged
    }

    /// Opens every stage with the format it will actually receive: the
    /// source format threaded through the declared changes of the stages
    /// before it.
    fn open(&mut self, device: &DeviceHandle, source_format: &F) -> Result<()> {
        let mut format = source_format.clone();
        for stage in &mut self.stages {
            stage.open(device, &format)?;
            format = stage.target_format().apply(&format);
        }
        Ok(())
    }

    fn modify_frame(&mut self, frame: RawFrame<F>) -> Result<Option<RawFrame<F>>> {
        let mut current = frame;
        for stage in &mut self.stages {
            match stage.modify_frame(current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn close(&mut self, device: &DeviceHandle) -> Result<()> {
        for stage in &mut self.stages {
            stage.close(device)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceHandle;
    use crate::format::AudioFormat;

    use std::sync::{Arc, Mutex};

    struct Resample {
        out: AudioFormat,
        opened_with: Arc<Mutex<Option<AudioFormat>>>,
    }

    impl Modifier<AudioFormat> for Resample {
        fn target_format(&self) -> FormatChange<AudioFormat> {
            FormatChange::To(self.out)
        }

        fn open(&mut self, _device: &DeviceHandle, source: &AudioFormat) -> Result<()> {
            *self.opened_with.lock().unwrap() = Some(*source);
            Ok(())
        }

        fn modify_frame(
            &mut self,
            mut frame: RawFrame<AudioFormat>,
        ) -> Result<Option<RawFrame<AudioFormat>>> {
            frame.format = self.out;
            Ok(Some(frame))
        }
    }

    struct DropAll;

    impl Modifier<AudioFormat> for DropAll {
        fn modify_frame(
            &mut self,
            _frame: RawFrame<AudioFormat>,
        ) -> Result<Option<RawFrame<AudioFormat>>> {
            Ok(None)
        }
    }

    fn fmt(rate: u32) -> AudioFormat {
        AudioFormat::new(rate, 16, 2).unwrap()
    }

    #[test]
    fn test_aggregate_target_is_last_declared() {
        let chain = AggregateModifier::new(vec![
            Box::new(Resample {
                out: fmt(16_000),
                opened_with: Arc::default(),
            }),
            Box::new(DropAll),
        ]);
        assert_eq!(chain.target_format(), FormatChange::To(fmt(16_000)));

        let passthrough = AggregateModifier::<AudioFormat>::new(vec![Box::new(DropAll)]);
        assert!(passthrough.target_format().is_unchanged());
    }

    #[test]
    fn test_open_threads_formats_through_stages() {
        let first_seen = Arc::new(Mutex::new(None));
        let second_seen = Arc::new(Mutex::new(None));
        let mut chain = AggregateModifier::new(vec![
            Box::new(Resample {
                out: fmt(16_000),
                opened_with: first_seen.clone(),
            }),
            Box::new(Resample {
                out: fmt(8_000),
                opened_with: second_seen.clone(),
            }),
        ]);
        let device = DeviceHandle::detached("test");
        chain.open(&device, &fmt(48_000)).unwrap();

        assert_eq!(*first_seen.lock().unwrap(), Some(fmt(48_000)));
        // the second stage sees the first stage's declared output
        assert_eq!(*second_seen.lock().unwrap(), Some(fmt(16_000)));
        assert_eq!(chain.target_format(), FormatChange::To(fmt(8_000)));
    }

    #[test]
    fn test_swallowed_frame_stops_the_chain() {
        let mut chain = AggregateModifier::new(vec![Box::new(DropAll)]);
        let frame = RawFrame::alloc(8, fmt(48_000));
        assert!(chain.modify_frame(frame).unwrap().is_none());
    }
}
