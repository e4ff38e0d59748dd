//! Software gain for raw audio.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{MediaError, Result};
use crate::format::AudioFormat;
use crate::frame::RawFrame;
use crate::modifier::Modifier;

/// Thread-safe volume control for a [`VolumeModifier`].
#[derive(Clone)]
pub struct VolumeHandle {
    raw: Arc<AtomicU64>,
}

impl VolumeHandle {
    /// Set the volume in `0.0..=1.0`. Values outside the range are clamped.
    pub fn set_volume(&self, volume: f64) {
        self.raw
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }

    pub fn volume(&self) -> f64 {
        f64::from_bits(self.raw.load(Ordering::Acquire))
    }
}

/// Scales audio samples by the current volume.
///
/// The slider value maps to gain through a cube curve, which tracks
/// perceived loudness far better than a linear map: half volume is an
/// eighth of the amplitude, about -18 dB.
///
/// Gain is uniform across channels, so sample layout (planar or
/// interleaved) does not matter here.
pub struct VolumeModifier {
    raw: Arc<AtomicU64>,
    format: Option<AudioFormat>,
}

impl VolumeModifier {
    pub fn new(volume: f64) -> Self {
        Self {
            raw: Arc::new(AtomicU64::new(volume.clamp(0.0, 1.0).to_bits())),
            format: None,
        }
    }

    pub fn handle(&self) -> VolumeHandle {
        VolumeHandle {
            raw: self.raw.clone(),
        }
    }

    fn gain(&self) -> f64 {
        let volume = f64::from_bits(self.raw.load(Ordering::Acquire));
        volume * volume * volume
    }
}

fn scale_i16(frame: &mut RawFrame<AudioFormat>, gain: f64) {
    for sample in frame.samples_mut::<i16>() {
        *sample = (*sample as f64 * gain)
            .round()
            .clamp(i16::MIN as f64, i16::MAX as f64) as i16;
    }
}

fn scale_i32(frame: &mut RawFrame<AudioFormat>, gain: f64) {
    for sample in frame.samples_mut::<i32>() {
        *sample = (*sample as f64 * gain)
            .round()
            .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
    }
}

/// 8-bit PCM is unsigned with silence at 128.
fn scale_u8(frame: &mut RawFrame<AudioFormat>, gain: f64) {
    for sample in frame.data_mut() {
        let centered = *sample as f64 - 128.0;
        *sample = (centered * gain + 128.0).round().clamp(0.0, 255.0) as u8;
    }
}

fn scale_f32(frame: &mut RawFrame<AudioFormat>, gain: f64) {
    for sample in frame.samples_mut::<f32>() {
        *sample *= gain as f32;
    }
}

fn scale_f64(frame: &mut RawFrame<AudioFormat>, gain: f64) {
    for sample in frame.samples_mut::<f64>() {
        *sample *= gain;
    }
}

impl Modifier<AudioFormat> for VolumeModifier {
    fn open(
        &mut self,
        _device: &crate::device::DeviceHandle,
        source_format: &AudioFormat,
    ) -> Result<()> {
        match (source_format.float, source_format.bits_per_sample) {
            (false, 8 | 16 | 32) | (true, 32 | 64) => {
                self.format = Some(*source_format);
                Ok(())
            }
            (float, bits) => Err(MediaError::UnsupportedFormat(format!(
                "volume control does not support {bits}-bit {} samples",
                if float { "float" } else { "integer" }
            ))),
        }
    }

    fn modify_frame(
        &mut self,
        mut frame: RawFrame<AudioFormat>,
    ) -> Result<Option<RawFrame<AudioFormat>>> {
        let gain = self.gain();
        if gain >= 1.0 {
            return Ok(Some(frame));
        }
        if gain <= 0.0 {
            match (frame.format.float, frame.format.bits_per_sample) {
                // unsigned silence is mid-scale
                (false, 8) => frame.data_mut().fill(128),
                _ => frame.data_mut().fill(0),
            }
            return Ok(Some(frame));
        }

        match (frame.format.float, frame.format.bits_per_sample) {
            (false, 8) => scale_u8(&mut frame, gain),
            (false, 16) => scale_i16(&mut frame, gain),
            (false, 32) => scale_i32(&mut frame, gain),
            (true, 32) => scale_f32(&mut frame, gain),
            (true, 64) => scale_f64(&mut frame, gain),
            (float, bits) => {
                return Err(MediaError::UnsupportedFormat(format!(
                    "volume control does not support {bits}-bit {} samples",
                    if float { "float" } else { "integer" }
                )));
            }
        }
        Ok(Some(frame))
    }
}
