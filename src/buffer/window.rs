//! Audio accumulation buffer for fixed-size encoder windows.

use std::time::Duration;

use crate::error::Result;
use crate::format::{AudioFormat, FrameFormat};

use super::BoundedBuffer;

/// Accumulates raw audio and releases it in whole-sample windows.
///
/// Encoders that consume fixed frame sizes (AAC's 1024 samples, Opus's 20 ms
/// packets) feed arbitrary capture frames in and pull exact windows out. The
/// capacity is derived from the format and a maximum buffered duration.
pub struct AudioWindowBuffer {
    inner: BoundedBuffer,
    format: AudioFormat,
    /// Per-channel samples handed out so far, for timestamp reconstruction.
    samples_read: u64,
}

impl AudioWindowBuffer {
    pub fn new(format: AudioFormat, max_buffered: Duration) -> Self {
        let bytes = (format.average_bytes_per_second() as f64 * max_buffered.as_secs_f64()) as usize;
        let align = format.block_align() as usize;
        let capacity = bytes.max(align).next_multiple_of(align);
        Self {
            inner: BoundedBuffer::with_capacity(capacity),
            format,
            samples_read: 0,
        }
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Whole per-channel samples currently buffered.
    pub fn buffered_samples(&self) -> usize {
        self.inner.len() / self.format.block_align() as usize
    }

    /// Presentation time of the next sample to be read, assuming the stream
    /// started at zero.
    pub fn next_pts(&self) -> Duration {
        Duration::from_secs_f64(self.samples_read as f64 / self.format.sample_rate as f64)
    }

    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write(data)
    }

    /// Pull exactly `samples` per-channel samples, or `None` when fewer are
    /// buffered.
    pub fn pull_window(&mut self, samples: usize) -> Option<Vec<u8>> {
        if self.buffered_samples() < samples {
            return None;
        }
        let mut out = vec![0u8; samples * self.format.block_align() as usize];
        let read = self.inner.read(&mut out);
        debug_assert_eq!(read, out.len());
        self.samples_read += samples as u64;
        Some(out)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
        self.samples_read = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_s16() -> AudioFormat {
        AudioFormat::new(1000, 16, 1).unwrap()
    }

    #[test]
    fn test_windows_come_out_whole() {
        let mut buf = AudioWindowBuffer::new(mono_s16(), Duration::from_secs(1));

        buf.push(&[1, 1, 2, 2, 3, 3]).unwrap();
        assert_eq!(buf.buffered_samples(), 3);
        assert!(buf.pull_window(4).is_none());

        buf.push(&[4, 4]).unwrap();
        let window = buf.pull_window(4).unwrap();
        assert_eq!(window, vec![1, 1, 2, 2, 3, 3, 4, 4]);
        assert_eq!(buf.buffered_samples(), 0);
    }

    #[test]
    fn test_next_pts_advances_with_reads() {
        let mut buf = AudioWindowBuffer::new(mono_s16(), Duration::from_secs(1));
        assert_eq!(buf.next_pts(), Duration::ZERO);

        buf.push(&[0u8; 1000]).unwrap();
        buf.pull_window(500).unwrap();
        // 500 samples at 1 kHz
        assert_eq!(buf.next_pts(), Duration::from_millis(500));
    }

    #[test]
    fn test_capacity_is_block_aligned() {
        let format = AudioFormat::new(48_000, 16, 2).unwrap();
        let buf = AudioWindowBuffer::new(format, Duration::from_millis(100));
        assert_eq!(buf.inner.capacity() % format.block_align() as usize, 0);
        assert!(buf.inner.capacity() >= 19_200);
    }
}
