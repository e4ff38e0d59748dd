//! Per-channel peak metering.

use std::sync::{Arc, Mutex};

use crate::error::{MediaError, Result};
use crate::format::AudioFormat;
use crate::frame::RawFrame;
use crate::modifier::Modifier;

/// Read side of a [`MeteringModifier`].
#[derive(Clone)]
pub struct MeteringHandle {
    levels: Arc<Mutex<Vec<f64>>>,
}

impl MeteringHandle {
    /// Peak levels of the most recent frame, one `0.0..=1.0` value per
    /// channel. Empty until the first frame passes.
    pub fn levels(&self) -> Vec<f64> {
        self.levels.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn level(&self, channel: usize) -> Option<f64> {
        self.levels().get(channel).copied()
    }

    /// Peak of `channel` in decibels relative to full scale. Silence is
    /// negative infinity.
    pub fn dbfs(&self, channel: usize) -> Option<f64> {
        self.level(channel).map(|level| 20.0 * level.log10())
    }
}

/// Measures the peak amplitude of every channel in each passing frame,
/// leaving the audio untouched. Feeds level meters in a UI.
pub struct MeteringModifier {
    levels: Arc<Mutex<Vec<f64>>>,
}

impl MeteringModifier {
    pub fn new() -> Self {
        Self {
            levels: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn handle(&self) -> MeteringHandle {
        MeteringHandle {
            levels: self.levels.clone(),
        }
    }

    fn measure(frame: &RawFrame<AudioFormat>) -> Result<Vec<f64>> {
        let channels = frame.format.channels as usize;
        let mut peaks = vec![0.0f64; channels];
        if channels == 0 {
            return Ok(peaks);
        }

        match (frame.format.float, frame.format.bits_per_sample) {
            (false, 8) => fold_peaks(&mut peaks, frame.data(), frame.format.planar, |s| {
                (*s as f64 - 128.0).abs() / 128.0
            }),
            (false, 16) => fold_peaks(&mut peaks, frame.samples::<i16>(), frame.format.planar, |s| {
                (*s as f64 / i16::MIN as f64).abs()
            }),
            (false, 32) => fold_peaks(&mut peaks, frame.samples::<i32>(), frame.format.planar, |s| {
                (*s as f64 / i32::MIN as f64).abs()
            }),
            (true, 32) => fold_peaks(&mut peaks, frame.samples::<f32>(), frame.format.planar, |s| {
                (*s as f64).abs()
            }),
            (true, 64) => fold_peaks(&mut peaks, frame.samples::<f64>(), frame.format.planar, |s| {
                s.abs()
            }),
            (float, bits) => {
                return Err(MediaError::UnsupportedFormat(format!(
                    "metering does not support {bits}-bit {} samples",
                    if float { "float" } else { "integer" }
                )));
            }
        }
        Ok(peaks)
    }
}

/// Peak per channel over one frame. Planar data lays channels out in runs,
/// interleaved data cycles through them sample by sample.
fn fold_peaks<T>(peaks: &mut [f64], samples: &[T], planar: bool, normalize: impl Fn(&T) -> f64) {
    let channels = peaks.len();
    if planar {
        let per_channel = samples.len() / channels;
        for (channel, peak) in peaks.iter_mut().enumerate() {
            let run = &samples[channel * per_channel..(channel + 1) * per_channel];
            for sample in run {
                *peak = peak.max(normalize(sample));
            }
        }
    } else {
        for (index, sample) in samples.iter().enumerate() {
            let peak = &mut peaks[index % channels];
            *peak = peak.max(normalize(sample));
        }
    }
}

impl Default for MeteringModifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Modifier<AudioFormat> for MeteringModifier {
    fn modify_frame(
        &mut self,
        frame: RawFrame<AudioFormat>,
    ) -> Result<Option<RawFrame<AudioFormat>>> {
        let peaks = Self::measure(&frame)?;
        *self.levels.lock().unwrap_or_else(|e| e.into_inner()) = peaks;
        Ok(Some(frame))
    }

    fn close(&mut self, _device: &crate::device::DeviceHandle) -> Result<()> {
        self.levels.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }
}
