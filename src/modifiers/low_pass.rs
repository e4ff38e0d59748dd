//! Single-pole low-pass smoothing.

use crate::device::DeviceHandle;
use crate::error::Result;
use crate::format::AudioFormat;
use crate::frame::RawFrame;
use crate::modifier::Modifier;

/// Smooths 16-bit integer audio in place: each output sample is a 7:1
/// blend of the previous output and the incoming sample, a cheap one-pole
/// filter that tames hiss from noisy capture hardware. Filter state is per
/// channel and carries across frames. Other sample layouts pass through
/// untouched.
pub struct LowPassFilterModifier {
    prev: Vec<i16>,
}

impl LowPassFilterModifier {
    pub fn new() -> Self {
        Self { prev: Vec::new() }
    }
}

impl Default for LowPassFilterModifier {
    fn default() -> Self {
        Self::new()
    }
}

fn smooth(sample: &mut i16, prev: &mut i16) {
    *sample = ((*sample as i32 + *prev as i32 * 7) >> 3) as i16;
    *prev = *sample;
}

impl Modifier<AudioFormat> for LowPassFilterModifier {
    fn open(&mut self, _device: &DeviceHandle, source_format: &AudioFormat) -> Result<()> {
        self.prev = vec![0; source_format.channels as usize];
        Ok(())
    }

    fn modify_frame(
        &mut self,
        mut frame: RawFrame<AudioFormat>,
    ) -> Result<Option<RawFrame<AudioFormat>>> {
        if frame.format.float || frame.format.bits_per_sample != 16 {
            return Ok(Some(frame));
        }
        let channels = frame.format.channels as usize;
        if channels == 0 {
            return Ok(Some(frame));
        }
        if self.prev.len() != channels {
            self.prev = vec![0; channels];
        }

        let planar = frame.format.planar;
        let samples = frame.samples_mut::<i16>();
        if planar {
            let per_channel = samples.len() / channels;
            for (channel, prev) in self.prev.iter_mut().enumerate() {
                for sample in &mut samples[channel * per_channel..(channel + 1) * per_channel] {
                    smooth(sample, prev);
                }
            }
        } else {
            for (index, sample) in samples.iter_mut().enumerate() {
                smooth(sample, &mut self.prev[index % channels]);
            }
        }
        Ok(Some(frame))
    }

    fn close(&mut self, _device: &DeviceHandle) -> Result<()> {
        self.prev.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_s16() -> AudioFormat {
        AudioFormat::new(48_000, 16, 1).unwrap()
    }

    fn stereo_s16() -> AudioFormat {
        AudioFormat::new(48_000, 16, 2).unwrap()
    }

    fn open(filter: &mut LowPassFilterModifier, format: &AudioFormat) {
        filter
            .open(&DeviceHandle::detached("lpf"), format)
            .unwrap();
    }

    #[test]
    fn test_step_input_rises_smoothly() {
        let mut filter = LowPassFilterModifier::new();
        open(&mut filter, &mono_s16());

        let mut frame = RawFrame::alloc(8, mono_s16());
        frame.samples_mut::<i16>().fill(32_000);
        let out = filter.modify_frame(frame).unwrap().unwrap();

        let samples = out.samples::<i16>();
        assert_eq!(samples[0], 4_000);
        assert!(samples.windows(2).all(|w| w[0] < w[1]));
        assert!(samples.iter().all(|s| *s < 32_000));

        // state carries into the next frame
        let mut frame = RawFrame::alloc(2, mono_s16());
        frame.samples_mut::<i16>().fill(32_000);
        let out = filter.modify_frame(frame).unwrap().unwrap();
        assert!(out.samples::<i16>()[0] > samples[3]);
    }

    #[test]
    fn test_channels_filter_independently() {
        let mut filter = LowPassFilterModifier::new();
        open(&mut filter, &stereo_s16());

        let mut frame = RawFrame::alloc(8, stereo_s16());
        // left steps to 8000, right stays silent
        frame.samples_mut::<i16>().copy_from_slice(&[8_000, 0, 8_000, 0]);
        let out = filter.modify_frame(frame).unwrap().unwrap();
        assert_eq!(out.samples::<i16>(), &[1_000, 0, 1_875, 0]);
    }

    #[test]
    fn test_float_samples_pass_through() {
        let mut format = AudioFormat::new(48_000, 32, 1).unwrap();
        format.float = true;
        let mut filter = LowPassFilterModifier::new();
        open(&mut filter, &format);

        let mut frame = RawFrame::alloc(8, format);
        frame.samples_mut::<f32>().copy_from_slice(&[0.5, -0.5]);
        let out = filter.modify_frame(frame).unwrap().unwrap();
        assert_eq!(out.samples::<f32>(), &[0.5, -0.5]);
    }
}
